use crate::power_quality::types::*;

/*
* @brief Calculate the DC offset of a raw window.
* @param signal Raw ADC codes of one channel
* @return Mean of the window in LSB
* @note The mean over the full window is used, not the (max+min)/2 midpoint,
*       so a single spike does not move the reference.
*/
pub fn dc_offset(signal: &[AdcCode]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }

    let sum: f64 = signal.iter().map(|&s| s as f64).sum();
    sum / signal.len() as f64
}

/*
* @brief Convert a raw channel into a DC-removed, scaled waveform.
* @param signal Raw ADC codes
* @param signal_type Voltage or current (selects scale and dead zone)
* @param config Node configuration
* @return Scaled waveform in volts or amps
* @note Current samples whose DC-removed magnitude is below the dead zone are
*       forced to zero before scaling.
*/
pub fn scale_channel(signal: &[AdcCode; WINDOW_SIZE], signal_type: SignalType, config: &NodeConfig) -> ScaledWaveform {
    let offset = dc_offset(signal);
    let scale = signal_type.scale(config);
    let dead_zone = signal_type.dead_zone(config);

    let mut samples = [0.0; WINDOW_SIZE];
    for (out, &raw) in samples.iter_mut().zip(signal.iter()) {
        let centered = raw as f64 - offset;
        *out = if centered.abs() < dead_zone { 0.0 } else { centered * scale };
    }

    ScaledWaveform {
        samples,
        dc_offset: offset,
        signal_type,
    }
}

/*
* @brief Calculate the RMS value of a waveform.
* @param signal Scaled samples
* @return RMS over the whole slice
*/
pub fn calculate_rms(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }

    let power = calculate_signal_power(signal, signal);
    if power > 0.0 {
        power.sqrt()
    } else {
        0.0
    }
}

/*
* @brief Mean of the instantaneous product of two equally sampled signals.
* @param signal1 First signal (voltage)
* @param signal2 Second signal (current)
* @return Mean product; active power when given volts and amps
*/
pub fn calculate_signal_power(signal1: &[f64], signal2: &[f64]) -> f64 {
    let length = signal1.len().min(signal2.len());
    if length == 0 {
        return 0.0;
    }

    let square: f64 = signal1.iter().zip(signal2.iter()).map(|(a, b)| a * b).sum();
    square / length as f64
}

/// RMS of both channels and mean active power of one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowTotals {
    pub v_rms: f64,
    pub i_rms: f64,
    pub active_power: f64,
}

pub fn window_totals(voltage: &ScaledWaveform, current: &ScaledWaveform) -> WindowTotals {
    WindowTotals {
        v_rms: calculate_rms(&voltage.samples),
        i_rms: calculate_rms(&current.samples),
        active_power: calculate_signal_power(&voltage.samples, &current.samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_window(amplitude: f64, cycles: f64) -> [AdcCode; WINDOW_SIZE] {
        let mut out = [0; WINDOW_SIZE];
        for (n, s) in out.iter_mut().enumerate() {
            let phase = 2.0 * PI * cycles * n as f64 / WINDOW_SIZE as f64;
            *s = (ADC_MIDPOINT as f64 + amplitude * phase.sin()).round() as AdcCode;
        }
        out
    }

    #[test]
    fn test_dc_offset_is_window_mean() {
        let raw = [1000, 1002, 1004, 1006];
        assert!((dc_offset(&raw) - 1003.0).abs() < 1e-12);
        assert_eq!(dc_offset(&[]), 0.0);
    }

    #[test]
    fn test_scaled_sine_rms_matches_amplitude() {
        let config = NodeConfig::default();
        let raw = sine_window(600.0, 10.0);
        let wave = scale_channel(&raw, SignalType::Voltage, &config);

        assert!((wave.dc_offset - ADC_MIDPOINT as f64).abs() < 0.5);
        let expected = 600.0 * config.voltage_coeff / SQRT_2;
        let rms = calculate_rms(&wave.samples);
        assert!((rms - expected).abs() / expected < 1e-3, "rms {} expected {}", rms, expected);
        assert!((wave.rms() - rms).abs() < 1e-12);
    }

    #[test]
    fn test_current_dead_zone_zeroes_small_codes() {
        let config = NodeConfig::default();
        let mut raw = [ADC_MIDPOINT; WINDOW_SIZE];
        for (n, s) in raw.iter_mut().enumerate() {
            // +-3 LSB of jitter, inside the 4 LSB dead zone
            *s = if n % 2 == 0 { ADC_MIDPOINT + 3 } else { ADC_MIDPOINT - 3 };
        }

        let current = scale_channel(&raw, SignalType::Current, &config);
        assert!(current.samples.iter().all(|&s| s == 0.0));

        // The voltage channel has no dead zone.
        let voltage = scale_channel(&raw, SignalType::Voltage, &config);
        assert!(voltage.samples.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_active_power_of_in_phase_resistive_load() {
        let config = NodeConfig::default();
        let v = scale_channel(&sine_window(591.0, 10.0), SignalType::Voltage, &config);
        let i = scale_channel(&sine_window(500.0, 10.0), SignalType::Current, &config);
        let totals = window_totals(&v, &i);

        let expected = totals.v_rms * totals.i_rms;
        assert!((totals.active_power - expected).abs() / expected < 1e-3);
    }
}
