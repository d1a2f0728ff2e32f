pub mod calibrate;
pub mod error;
pub mod node;
pub mod power_quality;
pub mod transport;

pub use error::{NodeError, NodeResult};
