use std::f64::consts::PI;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::power_quality::acquisition::AdcPair;
use crate::power_quality::types::*;

/// Analog front end description used to synthesize raw ADC windows.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalProfile {
    pub voltage_rms: f64,                        // Fundamental RMS, V
    pub current_rms: f64,                        // Fundamental RMS, A
    pub frequency_hz: f64,
    pub current_lag_rad: f64,                    // Positive: current lags voltage
    pub voltage_harmonics: [f64; MAX_HARMONIC],  // Entry h-1: order h peak relative to the fundamental
    pub current_harmonics: [f64; MAX_HARMONIC],
    pub adc_midpoint: f64,                       // Bias of both channels in LSB
    pub noise_lsb: f64,                          // Uniform noise half-width in LSB
}

impl SignalProfile {
    pub fn sinusoidal(voltage_rms: f64, current_rms: f64, frequency_hz: f64, current_lag_rad: f64) -> Self {
        Self {
            voltage_rms,
            current_rms,
            frequency_hz,
            current_lag_rad,
            voltage_harmonics: [0.0; MAX_HARMONIC],
            current_harmonics: [0.0; MAX_HARMONIC],
            adc_midpoint: ADC_MIDPOINT as f64,
            noise_lsb: 0.0,
        }
    }

    /*
    * @brief Instantaneous voltage and current at time t.
    * @param t Time in seconds
    * @return (volts, amps)
    * @note Orders whose relative entry is zero are skipped; entry 0 (the fundamental) is ignored.
    */
    pub fn sample(&self, t: f64) -> (f64, f64) {
        let omega_t = 2.0 * PI * self.frequency_hz * t;
        let v_peak = self.voltage_rms * SQRT_2;
        let i_peak = self.current_rms * SQRT_2;

        let mut v = v_peak * omega_t.sin();
        let mut i = i_peak * (omega_t - self.current_lag_rad).sin();

        for order in 2..=MAX_HARMONIC {
            let h = order as f64;
            let rel_v = self.voltage_harmonics[order - 1];
            let rel_i = self.current_harmonics[order - 1];
            if rel_v != 0.0 {
                v += rel_v * v_peak * (h * omega_t).sin();
            }
            if rel_i != 0.0 {
                i += rel_i * i_peak * (h * (omega_t - self.current_lag_rad)).sin();
            }
        }

        (v, i)
    }

    /// Quantize one instant into ADC codes with the given scale coefficients.
    fn to_codes(&self, t: f64, config: &NodeConfig, noise: (f64, f64)) -> (AdcCode, AdcCode) {
        let (v, i) = self.sample(t);
        let v_code = self.adc_midpoint + v / config.voltage_coeff + noise.0;
        let i_code = self.adc_midpoint + i / config.current_coeff + noise.1;
        (quantize(v_code), quantize(i_code))
    }
}

fn quantize(code: f64) -> AdcCode {
    code.round().clamp(0.0, ADC_FULL_SCALE as f64) as AdcCode
}

fn draw_noise<R: Rng>(rng: &mut R, half_width: f64) -> (f64, f64) {
    if half_width > 0.0 {
        (rng.gen_range(-half_width..=half_width), rng.gen_range(-half_width..=half_width))
    } else {
        (0.0, 0.0)
    }
}

/*
* @brief Generate one full raw window for the given profile.
* @param profile Signal description
* @param config Node configuration (sample rate and scale coefficients)
* @param rng Noise source
* @return Window of raw ADC codes as the sampler would capture it
*/
pub fn generate_window<R: Rng>(profile: &SignalProfile, config: &NodeConfig, rng: &mut R) -> SampleWindow {
    let samples = Array1::range(0.0, WINDOW_SIZE as f64, 1.0);
    let period = config.sample_period_s();

    let mut window = SampleWindow::default();
    for (n, &s) in samples.iter().enumerate() {
        let noise = draw_noise(rng, profile.noise_lsb);
        let (v, i) = profile.to_codes(s * period, config, noise);
        window.voltage[n] = v;
        window.current[n] = i;
    }

    window
}

/// Streaming stand-in for the two ADC channels, one sample pair per timer tick.
#[derive(Debug)]
pub struct SyntheticAdc {
    profile: SignalProfile,
    config: NodeConfig,
    tick: u64,
    rng: StdRng,
}

impl SyntheticAdc {
    pub fn new(profile: SignalProfile, config: NodeConfig, seed: u64) -> Self {
        Self {
            profile,
            config,
            tick: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl AdcPair for SyntheticAdc {
    fn read_pair(&mut self) -> (AdcCode, AdcCode) {
        let t = self.tick as f64 * self.config.sample_period_s();
        self.tick = self.tick.wrapping_add(1);
        let noise = draw_noise(&mut self.rng, self.profile.noise_lsb);
        self.profile.to_codes(t, &self.config, noise)
    }
}
