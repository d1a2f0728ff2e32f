use crate::power_quality::types::{NodeConfig, PowerMetrics, SQRT_2};

/// Quantities the power decomposition needs from the earlier stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerInputs {
    pub v_rms: f64,
    pub i_rms: f64,
    pub active_power: f64,
    pub voltage_fundamental: f64, // Peak magnitude of order 1
    pub current_fundamental: f64,
    pub voltage_phase: f64,       // Fundamental phase, radians
    pub current_phase: f64,
}

/*
* @brief Calculate the reactive power of the fundamental.
* @param voltage_fundamental Voltage order 1 peak magnitude
* @param current_fundamental Current order 1 peak magnitude
* @param phase_shift Current phase minus voltage phase, radians
* @return Q1 in var (signed)
*/
pub fn calculate_fundamental_reactive_power(voltage_fundamental: f64, current_fundamental: f64, phase_shift: f64) -> f64 {
    let u1 = voltage_fundamental / SQRT_2;
    let i1 = current_fundamental / SQRT_2;
    u1 * i1 * phase_shift.sin()
}

/*
* @brief Calculate the distortion power from S, P and Q1.
* @return D = sqrt(S^2 - P^2 - Q1^2), 0 when the residual is not positive
*/
pub fn calculate_distortion_power(apparent_power: f64, active_power: f64, reactive_power: f64) -> f64 {
    let residual = apparent_power.powi(2) - active_power.powi(2) - reactive_power.powi(2);
    if residual > 0.0 {
        residual.sqrt()
    } else {
        0.0
    }
}

/*
* @brief Calculate the power factor lambda = |P| / S.
* @param apparent_power Apparent power in VA
* @param active_power Active power in W
* @param min_apparent_power Below or at this S the factor is defined as 1.0
* @return Power factor in [0, 1]
*/
pub fn calculate_power_factor(apparent_power: f64, active_power: f64, min_apparent_power: f64) -> f64 {
    if apparent_power > min_apparent_power {
        (active_power.abs() / apparent_power).min(1.0)
    } else {
        1.0
    }
}

/*
* @brief Budeanu decomposition with the current noise gate applied.
* @param inputs Window RMS, active power and fundamental magnitudes/phases
* @param config Node configuration (noise gate, power factor guard)
* @return Power metrics; `gated` tells whether the current side was forced to zero
* @note The gate is inclusive: i_rms equal to the threshold is gated.
*/
pub fn compute_power(inputs: &PowerInputs, config: &NodeConfig) -> PowerMetrics {
    if inputs.i_rms <= config.noise_gate_rms {
        return PowerMetrics {
            power_factor: 1.0,
            gated: true,
            ..Default::default()
        };
    }

    let apparent_power = inputs.v_rms * inputs.i_rms;
    let phase_shift = inputs.current_phase - inputs.voltage_phase;
    let reactive_power =
        calculate_fundamental_reactive_power(inputs.voltage_fundamental, inputs.current_fundamental, phase_shift);

    PowerMetrics {
        i_rms: inputs.i_rms,
        active_power: inputs.active_power,
        apparent_power,
        reactive_power,
        distortion_power: calculate_distortion_power(apparent_power, inputs.active_power, reactive_power),
        power_factor: calculate_power_factor(apparent_power, inputs.active_power, config.min_apparent_power),
        gated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_3;

    fn sinusoidal(v_rms: f64, i_rms: f64, lag: f64) -> PowerInputs {
        PowerInputs {
            v_rms,
            i_rms,
            active_power: v_rms * i_rms * lag.cos(),
            voltage_fundamental: v_rms * SQRT_2,
            current_fundamental: i_rms * SQRT_2,
            voltage_phase: 0.3,
            current_phase: 0.3 - lag,
        }
    }

    #[test]
    fn test_sinusoidal_load_has_no_distortion_power() {
        let config = NodeConfig::default();
        let metrics = compute_power(&sinusoidal(230.0, 5.0, FRAC_PI_3), &config);

        assert!(!metrics.gated);
        assert!((metrics.apparent_power - 1150.0).abs() < 1e-9);
        assert!((metrics.active_power - 575.0).abs() < 1e-9);
        assert!((metrics.reactive_power.abs() - 1150.0 * FRAC_PI_3.sin()).abs() < 1e-6);
        // Current lags voltage: Q1 comes out negative with this phase convention.
        assert!(metrics.reactive_power < 0.0);
        assert!(metrics.distortion_power < 1e-3);
        assert!((metrics.power_factor - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_noise_gate_boundary() {
        let config = NodeConfig::default();
        let gate = config.noise_gate_rms;

        for &i_rms in &[gate, gate * 0.5, 0.0] {
            let metrics = compute_power(&sinusoidal(230.0, i_rms, 0.2), &config);
            assert!(metrics.gated, "i_rms {} should be gated", i_rms);
            assert_eq!(metrics.i_rms, 0.0);
            assert_eq!(metrics.active_power, 0.0);
            assert_eq!(metrics.apparent_power, 0.0);
            assert_eq!(metrics.reactive_power, 0.0);
            assert_eq!(metrics.distortion_power, 0.0);
            assert_eq!(metrics.power_factor, 1.0);
        }

        // One 1 mA display step above the gate.
        let metrics = compute_power(&sinusoidal(230.0, gate + 0.001, 0.2), &config);
        assert!(!metrics.gated);
        assert!(metrics.i_rms > 0.0);
        assert!(metrics.apparent_power > 0.0);
        assert!(metrics.active_power > 0.0);
    }

    #[test]
    fn test_power_factor_guard() {
        assert_eq!(calculate_power_factor(0.05, 0.01, 0.05), 1.0);
        assert_eq!(calculate_power_factor(0.0, 0.0, 0.05), 1.0);
        assert!((calculate_power_factor(100.0, -80.0, 0.05) - 0.8).abs() < 1e-12);
        // Rounding can push |P| past S; the factor stays clamped.
        assert_eq!(calculate_power_factor(100.0, 100.0001, 0.05), 1.0);
    }

    #[test]
    fn test_distortion_power_never_negative() {
        assert_eq!(calculate_distortion_power(10.0, 8.0, 7.0), 0.0);
        assert!((calculate_distortion_power(13.0, 12.0, 4.0) - 3.0).abs() < 1e-12);
    }
}
