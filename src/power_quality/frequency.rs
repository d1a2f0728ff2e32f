use crate::power_quality::harmonics::RawSpectrum;
use crate::power_quality::types::*;

/*
* @brief Calculate the frequency of a raw window from rising zero crossings.
* @param signal Raw ADC codes of the voltage channel
* @param dc_offset Mean of the window in LSB
* @param config Node configuration (hysteresis, crossing limits, band)
* @return Frequency in Hz, or None when detection failed or fell outside the band
* @note Works in raw LSB before scaling. A crossing is a consecutive pair with
*       the previous sample below -threshold and the current one above +threshold.
*       A sample landing inside the band drops that crossing.
*/
pub fn zero_crossing_frequency(signal: &[AdcCode], dc_offset: f64, config: &NodeConfig) -> Option<f64> {
    let threshold = config.zero_crossing_threshold;
    let mut first: usize = 0;
    let mut last: usize = 0;
    let mut num_crossing: usize = 0;

    for (p, pair) in signal.windows(2).enumerate() {
        let v_prev = pair[0] as f64 - dc_offset;
        let v_curr = pair[1] as f64 - dc_offset;

        if v_prev < -threshold && v_curr > threshold {
            if num_crossing == 0 {
                first = p + 1;
            }
            last = p + 1;
            num_crossing += 1;

            if num_crossing >= config.max_zero_crossings {
                break;
            }
        }
    }

    if num_crossing < config.min_zero_crossings.max(2) {
        return None;
    }

    // Sum of consecutive deltas telescopes to last - first.
    let avg_samples = (last - first) as f64 / (num_crossing - 1) as f64;
    if avg_samples <= 0.0 {
        return None;
    }

    let frequency = 1.0 / (avg_samples * config.sample_period_s());
    if config.is_frequency_valid(frequency) {
        Some(frequency)
    } else {
        None
    }
}

/*
* @brief Dominant frequency of an already computed voltage spectrum.
* @param spectrum Raw voltage spectrum (DC bin ignored)
* @param config Node configuration
* @return Frequency of the largest bin in Hz
*/
pub fn transform_frequency(spectrum: &RawSpectrum, config: &NodeConfig) -> f64 {
    spectrum.peak_bin() as f64 * config.bin_resolution_hz()
}

/*
* @brief Map a frequency to the transform bin used as the fundamental.
* @param frequency Frequency in Hz
* @param config Node configuration
* @return round(frequency / resolution), at least 1 and below N/2
*/
pub fn fundamental_bin(frequency: f64, config: &NodeConfig) -> usize {
    let bin = (frequency / config.bin_resolution_hz()).round();
    if !bin.is_finite() || bin < 1.0 {
        1
    } else {
        (bin as usize).min(WINDOW_SIZE / 2 - 1)
    }
}

/*
* @brief Estimate the fundamental frequency of a window.
* @param voltage Raw voltage codes
* @param dc_offset Mean of the raw voltage window
* @param spectrum The voltage spectrum that the harmonic analysis also uses
* @param config Node configuration
* @return Frequency estimate with its source, fundamental bin and validity
* @note Zero crossing first; the transform peak is the fallback. An out of band
*       fallback is still returned, flagged invalid.
*/
pub fn estimate_frequency(
    voltage: &[AdcCode],
    dc_offset: f64,
    spectrum: &RawSpectrum,
    config: &NodeConfig,
) -> FrequencyEstimate {
    let (frequency, source) = match zero_crossing_frequency(voltage, dc_offset, config) {
        Some(f) => (f, FrequencySource::ZeroCrossing),
        None => {
            log::warn!("Zero-crossing failed, using FFT frequency");
            (transform_frequency(spectrum, config), FrequencySource::Transform)
        }
    };

    FrequencyEstimate {
        frequency,
        fundamental_bin: fundamental_bin(frequency, config),
        source,
        valid: config.is_frequency_valid(frequency),
    }
}
