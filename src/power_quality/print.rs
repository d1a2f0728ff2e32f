use crate::power_quality::measurement::MeasurementResult;

/*
* @brief Print the voltage and current RMS and the frequency.
* @param result Measurement of the current cycle
*/
pub fn print_signals(result: &MeasurementResult) {
    log::info!("Signals:");
    log::info!("  Voltage RMS: {:.2} V", result.v_rms);
    log::info!("  Current RMS: {:.3} A", result.i_rms);
    log::info!(
        "  Frequency: {:.2} Hz{}",
        result.frequency,
        if result.frequency_valid { "" } else { " (invalid)" }
    );
}

/*
* @brief Print the Budeanu power decomposition.
* @param result Measurement of the current cycle
*/
pub fn print_power(result: &MeasurementResult) {
    log::info!("Power:");
    log::info!("  Active: {:.2} W", result.active_power);
    log::info!("  Apparent: {:.2} VA", result.apparent_power);
    log::info!("  Reactive (Q1): {:.2} var", result.reactive_power);
    log::info!("  Distortion: {:.2} VA", result.distortion_power);
    log::info!("  Factor: {:.3}", result.power_factor);
}

/*
* @brief Print THD and the first orders of both channels.
* @param result Measurement of the current cycle
* @note Only orders up to the 7th are printed; the full arrays go out on the wire.
*/
pub fn print_harmonics(result: &MeasurementResult) {
    log::info!("Harmonics:");
    log::info!("  THD V: {:.2} %", result.thd_v);
    log::info!("  THD I: {:.2} %", result.thd_i);
    log::info!("  V: {:.2?}", &result.harmonics_v[..7]);
    log::info!("  I: {:.3?}", &result.harmonics_i[..7]);
}

/// Full per-cycle report.
pub fn log_measurement(result: &MeasurementResult) {
    print_signals(result);
    print_power(result);
    print_harmonics(result);
}
