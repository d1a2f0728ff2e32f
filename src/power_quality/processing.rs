use crate::error::NodeResult;
use crate::power_quality::{
    frequency,
    harmonics::{self, HarmonicAnalyzer},
    measurement::{MeasurementResult, WaveformSnippet},
    power::{self, PowerInputs},
    signal,
    types::*,
};

/// Drain-side pipeline: frequency, harmonics and power for one window.
#[derive(Debug)]
pub struct MeasurementPipeline {
    pub config: NodeConfig,
    analyzer: HarmonicAnalyzer,
}

impl MeasurementPipeline {
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            analyzer: HarmonicAnalyzer::new(),
        })
    }

    /// Run the full pipeline over one window. Each channel is transformed once.
    pub fn process(&mut self, window: &SampleWindow) -> NodeResult<MeasurementResult> {
        let config = &self.config;

        let voltage_wave = signal::scale_channel(&window.voltage, SignalType::Voltage, config);
        let current_wave = signal::scale_channel(&window.current, SignalType::Current, config);
        let totals = signal::window_totals(&voltage_wave, &current_wave);

        // The voltage spectrum serves both the frequency fallback and the harmonics.
        let mut voltage_spectrum = self.analyzer.transform(&voltage_wave)?;
        voltage_spectrum.zero_dc();

        let estimate = frequency::estimate_frequency(&window.voltage, voltage_wave.dc_offset, &voltage_spectrum, config);
        if !estimate.valid {
            log::warn!(
                "Invalid Frequency: {:.2} Hz (source: {})",
                estimate.frequency,
                estimate.source.as_str()
            );
        }

        let voltage = harmonics::analyze_channel(voltage_spectrum, estimate.fundamental_bin, SignalType::Voltage);

        let current_spectrum = self.analyzer.transform(&current_wave)?;
        let current = harmonics::analyze_channel(current_spectrum, estimate.fundamental_bin, SignalType::Current);

        let metrics = power::compute_power(
            &PowerInputs {
                v_rms: totals.v_rms,
                i_rms: totals.i_rms,
                active_power: totals.active_power,
                voltage_fundamental: voltage.fundamental(),
                current_fundamental: current.fundamental(),
                voltage_phase: voltage.fundamental_phase,
                current_phase: current.fundamental_phase,
            },
            config,
        );

        let spectrum = SpectrumResult {
            voltage,
            current,
            frequency: estimate,
        };

        Ok(self.build_result(&spectrum, totals.v_rms, &metrics, &voltage_wave, &current_wave))
    }

    fn build_result(
        &self,
        spectrum: &SpectrumResult,
        v_rms: f64,
        metrics: &PowerMetrics,
        voltage_wave: &ScaledWaveform,
        current_wave: &ScaledWaveform,
    ) -> MeasurementResult {
        let config = &self.config;

        // Current THD uses the raw fundamental, not the gated RMS.
        let thd_v = spectrum.voltage.thd(config.thd_v_min_fundamental);
        let thd_i = spectrum.current.thd(config.thd_i_threshold());

        let harmonics_i = if metrics.gated {
            [0.0; MAX_HARMONIC]
        } else {
            spectrum.current.harmonics
        };

        let waveform = if config.include_waveform {
            Some(waveform_snippet(voltage_wave, current_wave, spectrum.frequency.frequency, config))
        } else {
            None
        };

        MeasurementResult {
            v_rms,
            i_rms: metrics.i_rms,
            active_power: metrics.active_power,
            apparent_power: metrics.apparent_power,
            reactive_power: metrics.reactive_power,
            distortion_power: metrics.distortion_power,
            power_factor: metrics.power_factor,
            frequency: spectrum.frequency.frequency,
            frequency_valid: spectrum.frequency.valid,
            thd_v,
            thd_i,
            harmonics_v: spectrum.voltage.harmonics,
            harmonics_i,
            waveform,
        }
    }
}

/*
* @brief Two cycles of the scaled waveforms for display.
* @param frequency Estimated frequency; the nominal frequency is used when it is not positive,
*        and values below one bin are raised to one bin
* @return Snippet of 2 x samples-per-cycle samples (capped at the window), every k-th kept
*/
pub fn waveform_snippet(
    voltage: &ScaledWaveform,
    current: &ScaledWaveform,
    frequency: f64,
    config: &NodeConfig,
) -> WaveformSnippet {
    let reference = if frequency > 0.0 {
        frequency.max(config.bin_resolution_hz())
    } else {
        config.nominal_frequency_hz
    };
    let samples_per_cycle = (config.sample_rate_hz / reference).round() as usize;
    let samples_to_send = (samples_per_cycle * 2).min(WINDOW_SIZE);
    let step = config.waveform_decimation.max(1);

    WaveformSnippet {
        voltage: voltage.samples[..samples_to_send].iter().step_by(step).copied().collect(),
        current: current.samples[..samples_to_send].iter().step_by(step).copied().collect(),
    }
}
