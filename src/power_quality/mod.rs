pub mod acquisition;
pub mod frequency;
pub mod generate_signal;
pub mod harmonics;
pub mod measurement;
pub mod mock;
pub mod power;
pub mod print;
pub mod processing;
pub mod signal;
pub mod types;

pub use acquisition::{AcquisitionBuffer, AdcPair, Drain, ReadyWindow, Sampler, TickOutcome};
pub use generate_signal::{generate_window, SignalProfile, SyntheticAdc};
pub use measurement::{MeasurementMessage, MeasurementResult, WaveformSnippet};
pub use mock::{Anomaly, MockGenerator};
pub use processing::MeasurementPipeline;
pub use types::*;
