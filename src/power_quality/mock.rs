//! Measurement generator for exercising the publication path without an
//! analog front end. Values are drawn around a 230 V / 50 Hz grid with a
//! residential load, and every record keeps the Budeanu relations between
//! S, P, Q1 and D.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{NodeError, NodeResult};
use crate::power_quality::generate_signal::SignalProfile;
use crate::power_quality::measurement::{MeasurementResult, WaveformSnippet};
use crate::power_quality::power;
use crate::power_quality::types::*;

pub const BASE_VOLTAGE: f64 = 230.0;

// Relative peak of orders 1..=8; the rest stay at zero.
const VOLTAGE_SHAPE: [f64; 8] = [1.0, 0.02, 0.01, 0.005, 0.003, 0.002, 0.001, 0.001];
const CURRENT_SHAPE: [f64; 8] = [1.0, 0.03, 0.015, 0.008, 0.005, 0.003, 0.002, 0.001];

/// Power quality event injected into a generated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    Sag,            // 80-90 % of nominal
    Swell,          // 110-115 % of nominal
    HighThd,        // Voltage THD 9-15 %
    FrequencyDrift, // 50.6-51.2 Hz or 48.8-49.4 Hz
}

impl Anomaly {
    pub const ALL: [Anomaly; 4] = [Anomaly::Sag, Anomaly::Swell, Anomaly::HighThd, Anomaly::FrequencyDrift];

    pub fn as_str(&self) -> &'static str {
        match self {
            Anomaly::Sag => "voltage sag",
            Anomaly::Swell => "voltage swell",
            Anomaly::HighThd => "high THD",
            Anomaly::FrequencyDrift => "frequency drift",
        }
    }
}

#[derive(Debug)]
pub struct MockGenerator {
    config: NodeConfig,
    anomaly_probability: f64,
    rng: StdRng,
}

impl MockGenerator {
    pub fn new(config: NodeConfig, anomaly_probability: f64, seed: Option<u64>) -> NodeResult<Self> {
        config.validate()?;
        if !(0.0..=1.0).contains(&anomaly_probability) {
            return Err(NodeError::Config(format!(
                "anomaly probability must be within [0, 1], got {}",
                anomaly_probability
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            anomaly_probability,
            rng,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Decide whether this cycle carries an event, and which one.
    pub fn next_anomaly(&mut self) -> Option<Anomaly> {
        if self.rng.gen_bool(self.anomaly_probability) {
            Some(Anomaly::ALL[self.rng.gen_range(0..Anomaly::ALL.len())])
        } else {
            None
        }
    }

    pub fn next_measurement(&mut self) -> (MeasurementResult, Option<Anomaly>) {
        let anomaly = self.next_anomaly();
        (self.measurement_for(anomaly), anomaly)
    }

    /*
    * @brief Generate one record, optionally carrying the given event.
    * @param anomaly Event to inject, None for a normal cycle
    * @return A full precision measurement result
    * @note v_rms and i_rms are total RMS; the harmonic arrays hold peak amplitudes
    *       whose fundamental is derived from the total through the THD.
    */
    pub fn measurement_for(&mut self, anomaly: Option<Anomaly>) -> MeasurementResult {
        let v_rms = match anomaly {
            Some(Anomaly::Sag) => BASE_VOLTAGE * self.rng.gen_range(0.80..0.90),
            Some(Anomaly::Swell) => BASE_VOLTAGE * self.rng.gen_range(1.10..1.15),
            _ => BASE_VOLTAGE + self.rng.gen_range(-5.0..5.0),
        };

        let frequency = match anomaly {
            Some(Anomaly::FrequencyDrift) => {
                if self.rng.gen_bool(0.5) {
                    self.rng.gen_range(50.6..51.2)
                } else {
                    self.rng.gen_range(48.8..49.4)
                }
            }
            _ => self.config.nominal_frequency_hz + self.rng.gen_range(-0.1..0.1),
        };

        let i_rms = self.rng.gen_range(2.0..4.0);
        let displacement = self.rng.gen_range(0.92..0.98_f64).acos();

        let mut voltage_rel = relative_content(&VOLTAGE_SHAPE);
        if anomaly == Some(Anomaly::HighThd) {
            let target = self.rng.gen_range(0.09..0.15);
            let scale = target / distortion_ratio(&voltage_rel);
            voltage_rel.iter_mut().skip(1).for_each(|r| *r *= scale);
        }
        let current_rel = relative_content(&CURRENT_SHAPE);

        // Fundamental RMS from the total RMS: X = X1 * sqrt(1 + THD^2).
        let v1_rms = v_rms / (1.0 + distortion_ratio(&voltage_rel).powi(2)).sqrt();
        let i1_rms = i_rms / (1.0 + distortion_ratio(&current_rel).powi(2)).sqrt();

        let voltage = channel_spectrum(&voltage_rel, v1_rms * SQRT_2, 0.0);
        let current = channel_spectrum(&current_rel, i1_rms * SQRT_2, -displacement);

        let apparent_power = v_rms * i_rms;
        let active_power = v1_rms * i1_rms * displacement.cos();
        let reactive_power = power::calculate_fundamental_reactive_power(
            voltage.fundamental(),
            current.fundamental(),
            current.fundamental_phase - voltage.fundamental_phase,
        );

        let waveform = if self.config.include_waveform {
            let mut profile = SignalProfile::sinusoidal(v1_rms, i1_rms, frequency, displacement);
            profile.voltage_harmonics = voltage_rel;
            profile.current_harmonics = current_rel;
            Some(self.snippet(&profile))
        } else {
            None
        };

        MeasurementResult {
            v_rms,
            i_rms,
            active_power,
            apparent_power,
            reactive_power,
            distortion_power: power::calculate_distortion_power(apparent_power, active_power, reactive_power),
            power_factor: power::calculate_power_factor(apparent_power, active_power, self.config.min_apparent_power),
            frequency,
            frequency_valid: self.config.is_frequency_valid(frequency),
            thd_v: voltage.thd(self.config.thd_v_min_fundamental),
            thd_i: current.thd(self.config.thd_i_threshold()),
            harmonics_v: voltage.harmonics,
            harmonics_i: current.harmonics,
            waveform,
        }
    }

    /// Two cycles of the ideal waveform at the configured sample rate.
    fn snippet(&self, profile: &SignalProfile) -> WaveformSnippet {
        let samples_per_cycle = (self.config.sample_rate_hz / profile.frequency_hz).round() as usize;
        let samples_to_send = (samples_per_cycle * 2).min(WINDOW_SIZE);
        let period = self.config.sample_period_s();

        let (voltage, current) = (0..samples_to_send)
            .step_by(self.config.waveform_decimation.max(1))
            .map(|n| profile.sample(n as f64 * period))
            .unzip();

        WaveformSnippet { voltage, current }
    }
}

fn relative_content(shape: &[f64]) -> [f64; MAX_HARMONIC] {
    let mut rel = [0.0; MAX_HARMONIC];
    rel[..shape.len()].copy_from_slice(shape);
    rel
}

/// sqrt(sum of squared relative orders >= 2), i.e. THD as a fraction.
fn distortion_ratio(rel: &[f64; MAX_HARMONIC]) -> f64 {
    rel.iter().skip(1).map(|r| r * r).sum::<f64>().sqrt()
}

fn channel_spectrum(rel: &[f64; MAX_HARMONIC], fundamental_peak: f64, fundamental_phase: f64) -> ChannelSpectrum {
    let mut harmonics = [0.0; MAX_HARMONIC];
    for (h, &r) in harmonics.iter_mut().zip(rel.iter()) {
        *h = r * fundamental_peak;
    }
    let harmonic_sum_sq = harmonics.iter().skip(1).map(|h| h * h).sum();

    ChannelSpectrum {
        harmonics,
        fundamental_phase,
        harmonic_sum_sq,
    }
}
