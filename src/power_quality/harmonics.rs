use core::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::{NodeError, NodeResult};
use crate::power_quality::types::*;

/// Forward transform over one channel plus the Hamming window, planned once.
pub struct HarmonicAnalyzer {
    r2c: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    input: Vec<f64>,
    scratch: Vec<Complex<f64>>,
}

impl fmt::Debug for HarmonicAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarmonicAnalyzer").field("len", &self.r2c.len()).finish()
    }
}

impl HarmonicAnalyzer {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(WINDOW_SIZE);
        let input = r2c.make_input_vec();
        let scratch = r2c.make_scratch_vec();

        Self {
            r2c,
            window: hamming_window(WINDOW_SIZE),
            input,
            scratch,
        }
    }

    /// Window the scaled samples and run one forward transform.
    pub fn transform(&mut self, wave: &ScaledWaveform) -> NodeResult<RawSpectrum> {
        for ((dst, &s), &w) in self.input.iter_mut().zip(wave.samples.iter()).zip(self.window.iter()) {
            *dst = s * w;
        }

        let mut bins = self.r2c.make_output_vec();
        self.r2c
            .process_with_scratch(&mut self.input, &mut bins, &mut self.scratch)
            .map_err(|e| NodeError::Transform(e.to_string()))?;

        Ok(RawSpectrum { bins })
    }
}

impl Default for HarmonicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/*
* @brief Build a Hamming window with amplitude compensation.
* @param n Window length
* @return Window coefficients
* @note Coefficients are divided by their mean (coherent gain) so a tone on a bin
*       centre reads its true peak amplitude as |X[k]| / N * 2.
*/
fn hamming_window(n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n as f64 - 1.0)).cos())
        .collect();
    let coherent_gain = raw.iter().sum::<f64>() / n as f64;
    raw.into_iter().map(|w| w / coherent_gain).collect()
}

/// Complex spectrum straight out of the transform, bins 0..=N/2.
/// Phase can only be read at this stage.
#[derive(Debug, Clone)]
pub struct RawSpectrum {
    bins: Vec<Complex<f64>>,
}

impl RawSpectrum {
    pub fn phase(&self, bin: usize) -> f64 {
        self.bins.get(bin).map(|c| c.im.atan2(c.re)).unwrap_or(0.0)
    }

    pub fn zero_dc(&mut self) {
        if let Some(dc) = self.bins.first_mut() {
            *dc = Complex::new(0.0, 0.0);
        }
    }

    /// Largest bin in 1..N/2, DC excluded.
    pub fn peak_bin(&self) -> usize {
        let mut best = 1;
        let mut best_mag = f64::MIN;
        for (k, c) in self.bins.iter().enumerate().take(WINDOW_SIZE / 2).skip(1) {
            let mag = c.norm_sqr();
            if mag > best_mag {
                best_mag = mag;
                best = k;
            }
        }
        best
    }

    /// Convert every bin to its magnitude in place. The phase is gone afterwards.
    pub fn into_magnitude(mut self) -> MagnitudeSpectrum {
        for c in self.bins.iter_mut() {
            *c = Complex::new(c.norm(), 0.0);
        }
        MagnitudeSpectrum { bins: self.bins }
    }
}

/// Magnitude-only spectrum; the real part of each bin holds |X[k]|.
#[derive(Debug, Clone)]
pub struct MagnitudeSpectrum {
    bins: Vec<Complex<f64>>,
}

impl MagnitudeSpectrum {
    pub fn magnitude(&self, bin: usize) -> f64 {
        self.bins.get(bin).map(|c| c.re).unwrap_or(0.0)
    }

    pub fn zero_dc(&mut self) {
        if let Some(dc) = self.bins.first_mut() {
            dc.re = 0.0;
        }
    }

    /// Peak amplitude of the given bin, 0 at or above N/2.
    pub fn amplitude(&self, bin: usize) -> f64 {
        if bin < WINDOW_SIZE / 2 {
            (self.magnitude(bin) / WINDOW_SIZE as f64) * 2.0
        } else {
            0.0
        }
    }
}

/*
* @brief Per-harmonic magnitudes and fundamental phase of one channel.
* @param spectrum Raw spectrum of the channel (consumed)
* @param fundamental_bin Bin of order 1
* @param signal_type Current channels also drop the DC bin after conversion
* @return Channel spectrum with orders 1..=MAX_HARMONIC
* @note Order h reads bin fundamental_bin * h. The fundamental phase is taken
*       before the spectrum is converted to magnitudes.
*/
pub fn analyze_channel(spectrum: RawSpectrum, fundamental_bin: usize, signal_type: SignalType) -> ChannelSpectrum {
    let fundamental_phase = spectrum.phase(fundamental_bin);

    let mut magnitudes = spectrum.into_magnitude();
    if signal_type == SignalType::Current {
        magnitudes.zero_dc();
    }

    let mut harmonics = [0.0; MAX_HARMONIC];
    let mut harmonic_sum_sq = 0.0;

    for (i, slot) in harmonics.iter_mut().enumerate() {
        let order = i + 1;
        let amp = magnitudes.amplitude(fundamental_bin * order);
        *slot = amp;

        if order > 1 {
            harmonic_sum_sq += amp * amp;
        }
    }

    ChannelSpectrum {
        harmonics,
        fundamental_phase,
        harmonic_sum_sq,
    }
}
