//! Scale coefficient calibration against a known reference.
//!
//! The node is fed a reference signal of known RMS (a calibrated meter on
//! the same line). The coefficient that maps the DC-removed channel RMS,
//! in LSB, onto that reference is logged for the operator; storing it is
//! left to the deployment.

use crate::error::{NodeError, NodeResult};
use crate::power_quality::signal::{calculate_rms, dc_offset};
use crate::power_quality::types::{AdcCode, SampleWindow, SignalType};

/// Channels whose DC-removed RMS is below this many LSB carry no usable signal.
pub const MIN_SIGNAL_LSB: f64 = 1.0;

/*
* @brief Calculate the scale coefficient for one raw channel.
* @param channel Raw ADC codes of the channel
* @param target_rms Reference RMS in volts or amps
* @return Coefficient in units per LSB
*/
pub fn coefficient_for(channel: &[AdcCode], target_rms: f64) -> NodeResult<f64> {
    if !(target_rms > 0.0) {
        return Err(NodeError::Calibration(format!("target RMS must be positive, got {}", target_rms)));
    }

    let offset = dc_offset(channel);
    let centered: Vec<f64> = channel.iter().map(|&raw| raw as f64 - offset).collect();
    let rms_lsb = calculate_rms(&centered);

    if rms_lsb < MIN_SIGNAL_LSB {
        return Err(NodeError::Calibration(format!(
            "channel is flat ({:.3} LSB RMS), no reference signal applied",
            rms_lsb
        )));
    }

    Ok(target_rms / rms_lsb)
}

/// Calibrate one channel of a captured window and log the result.
pub fn calibrate_window(window: &SampleWindow, signal_type: SignalType, target_rms: f64) -> NodeResult<f64> {
    let coefficient = coefficient_for(window.channel(signal_type), target_rms)?;
    let unit = match signal_type {
        SignalType::Voltage => "V",
        SignalType::Current => "A",
    };
    log::info!(
        "Calibrated {} coefficient: {:.6} {}/LSB (reference {:.3} {})",
        signal_type.as_str(),
        coefficient,
        unit,
        target_rms,
        unit
    );
    Ok(coefficient)
}
