use std::time::Duration;

use crate::error::{NodeError, NodeResult};

/// Samples per channel in one acquisition window.
pub const WINDOW_SIZE: usize = 512;

/// Highest harmonic order reported (orders 1..=MAX_HARMONIC).
pub const MAX_HARMONIC: usize = 25;

pub const FREQ_NOMINAL_50: f64 = 50.0;

pub const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// Raw 12-bit ADC reading.
pub type AdcCode = u16;

pub const ADC_MIDPOINT: AdcCode = 2048;
pub const ADC_FULL_SCALE: AdcCode = 4095;

pub const DEFAULT_TOPIC: &str = "scada/measurements/node1";

/// Node configuration, built once at startup and handed to every stage.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub sample_rate_hz: f64,          // Acquisition rate (timer tick rate)
    pub voltage_coeff: f64,           // Volts per LSB
    pub current_coeff: f64,           // Amps per LSB
    pub adc_dead_zone: f64,           // Current dead zone in LSB around the offset
    pub noise_gate_rms: f64,          // Current RMS at or below this is treated as no load
    pub thd_i_margin: f64,            // Fraction of the noise gate peak used for the THD_i gate
    pub thd_v_min_fundamental: f64,   // Minimum voltage fundamental (V peak) for THD_v
    pub min_apparent_power: f64,      // Power factor denominator guard (VA)
    pub zero_crossing_threshold: f64, // Hysteresis half-width in LSB
    pub max_zero_crossings: usize,
    pub min_zero_crossings: usize,
    pub freq_min_hz: f64,
    pub freq_max_hz: f64,
    pub nominal_frequency_hz: f64,
    pub publish_interval: Duration,
    pub include_waveform: bool,
    pub waveform_decimation: usize,
    pub topic: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 1_000_000.0 / 333.0,
            voltage_coeff: 0.550,
            current_coeff: 0.0096,
            adc_dead_zone: 4.0,
            noise_gate_rms: 0.01,
            thd_i_margin: 0.15,
            thd_v_min_fundamental: 10.0,
            min_apparent_power: 0.05,
            zero_crossing_threshold: 5.0,
            max_zero_crossings: 20,
            min_zero_crossings: 2,
            freq_min_hz: 45.0,
            freq_max_hz: 55.0,
            nominal_frequency_hz: FREQ_NOMINAL_50,
            publish_interval: Duration::from_millis(3000),
            include_waveform: true,
            waveform_decimation: 1,
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> NodeResult<()> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(NodeError::Config(format!("sample rate must be positive, got {}", self.sample_rate_hz)));
        }
        if !(self.voltage_coeff > 0.0) || !(self.current_coeff > 0.0) {
            return Err(NodeError::Config("scale coefficients must be positive".into()));
        }
        if self.freq_min_hz >= self.freq_max_hz || self.freq_min_hz <= 0.0 {
            return Err(NodeError::Config(format!(
                "invalid frequency band [{}, {}]",
                self.freq_min_hz, self.freq_max_hz
            )));
        }
        if self.freq_max_hz >= self.sample_rate_hz / 2.0 {
            return Err(NodeError::Config("frequency band reaches Nyquist".into()));
        }
        if self.min_zero_crossings < 2 || self.max_zero_crossings < self.min_zero_crossings {
            return Err(NodeError::Config(format!(
                "zero crossing limits {}..{} are not usable",
                self.min_zero_crossings, self.max_zero_crossings
            )));
        }
        if self.waveform_decimation == 0 {
            return Err(NodeError::Config("waveform decimation must be at least 1".into()));
        }
        if self.noise_gate_rms < 0.0 || self.adc_dead_zone < 0.0 {
            return Err(NodeError::Config("thresholds must not be negative".into()));
        }
        Ok(())
    }

    pub fn sample_period_s(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }

    /// Hardware timer period, microsecond granularity.
    pub fn tick_period(&self) -> Duration {
        Duration::from_micros((1_000_000.0 / self.sample_rate_hz).round() as u64)
    }

    /// Width of one transform bin in Hz.
    pub fn bin_resolution_hz(&self) -> f64 {
        self.sample_rate_hz / WINDOW_SIZE as f64
    }

    /// Current fundamental (peak) below which THD_i is reported as 0.
    /// Tied to the RMS noise gate so both thresholds move together.
    pub fn thd_i_threshold(&self) -> f64 {
        self.noise_gate_rms * SQRT_2 * self.thd_i_margin
    }

    pub fn is_frequency_valid(&self, freq: f64) -> bool {
        freq >= self.freq_min_hz && freq <= self.freq_max_hz
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Voltage,
    Current,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Voltage => "voltage",
            SignalType::Current => "current",
        }
    }

    pub fn scale(&self, config: &NodeConfig) -> f64 {
        match self {
            SignalType::Voltage => config.voltage_coeff,
            SignalType::Current => config.current_coeff,
        }
    }

    /// Dead zone applied to the DC-removed raw value before scaling.
    pub fn dead_zone(&self, config: &NodeConfig) -> f64 {
        match self {
            SignalType::Voltage => 0.0,
            SignalType::Current => config.adc_dead_zone,
        }
    }
}

/// One acquisition window: both channels captured at the same sample instants.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    pub voltage: [AdcCode; WINDOW_SIZE],
    pub current: [AdcCode; WINDOW_SIZE],
}

impl SampleWindow {
    pub fn channel(&self, signal_type: SignalType) -> &[AdcCode; WINDOW_SIZE] {
        match signal_type {
            SignalType::Voltage => &self.voltage,
            SignalType::Current => &self.current,
        }
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self {
            voltage: [ADC_MIDPOINT; WINDOW_SIZE],
            current: [ADC_MIDPOINT; WINDOW_SIZE],
        }
    }
}

/// DC-removed, scaled samples of one channel. Rebuilt every cycle.
#[derive(Debug, Clone)]
pub struct ScaledWaveform {
    pub samples: [f64; WINDOW_SIZE],
    pub dc_offset: f64,            // Mean of the raw window in LSB
    pub signal_type: SignalType,
}

impl ScaledWaveform {
    pub fn rms(&self) -> f64 {
        let sum_sq: f64 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / WINDOW_SIZE as f64).sqrt()
    }
}

/// Where the reported frequency came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencySource {
    ZeroCrossing,
    Transform,
}

impl FrequencySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencySource::ZeroCrossing => "zero-crossing",
            FrequencySource::Transform => "FFT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyEstimate {
    pub frequency: f64,
    pub fundamental_bin: usize,
    pub source: FrequencySource,
    pub valid: bool,
}

/// Per-channel harmonic decomposition. Index 0 holds order 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpectrum {
    pub harmonics: [f64; MAX_HARMONIC],
    pub fundamental_phase: f64,    // atan2(im, re) of the fundamental bin, radians
    pub harmonic_sum_sq: f64,      // Sum of squared magnitudes for orders >= 2
}

impl ChannelSpectrum {
    /// Fundamental peak magnitude.
    pub fn fundamental(&self) -> f64 {
        self.harmonics[0]
    }

    /// THD in percent, 0 when the fundamental does not exceed `min_fundamental`.
    pub fn thd(&self, min_fundamental: f64) -> f64 {
        let fundamental = self.fundamental();
        if fundamental > min_fundamental && fundamental > 0.0 {
            self.harmonic_sum_sq.sqrt() / fundamental * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumResult {
    pub voltage: ChannelSpectrum,
    pub current: ChannelSpectrum,
    pub frequency: FrequencyEstimate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerMetrics {
    pub i_rms: f64,
    pub active_power: f64,
    pub apparent_power: f64,
    pub reactive_power: f64,       // Fundamental reactive power Q1 (signed)
    pub distortion_power: f64,
    pub power_factor: f64,
    pub gated: bool,               // Noise gate forced the current side to zero
}
