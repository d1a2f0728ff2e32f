//! The published record and its JSON wire form.
//!
//! Values are rounded only when the message is built, per physical range:
//! voltage-scale and power quantities to 1 decimal, current-scale to 3,
//! ratios (power factor, THD) to 2. Harmonic and waveform arrays follow
//! their channel: voltage 2 decimals, current 3.

use serde::{Deserialize, Serialize};

use crate::error::NodeResult;
use crate::power_quality::types::MAX_HARMONIC;

pub const VOLTAGE_DECIMALS: i32 = 1;
pub const CURRENT_DECIMALS: i32 = 3;
pub const POWER_DECIMALS: i32 = 1;
pub const RATIO_DECIMALS: i32 = 2;
pub const FREQUENCY_DECIMALS: i32 = 1;
pub const VOLTAGE_ARRAY_DECIMALS: i32 = 2;
pub const CURRENT_ARRAY_DECIMALS: i32 = 3;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// First samples of the scaled window, for display downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformSnippet {
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
}

/// Result of one processing cycle, full precision.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    pub v_rms: f64,
    pub i_rms: f64,
    pub active_power: f64,
    pub apparent_power: f64,
    pub reactive_power: f64,
    pub distortion_power: f64,
    pub power_factor: f64,
    pub frequency: f64,
    pub frequency_valid: bool,
    pub thd_v: f64,
    pub thd_i: f64,
    pub harmonics_v: [f64; MAX_HARMONIC],
    pub harmonics_i: [f64; MAX_HARMONIC],
    pub waveform: Option<WaveformSnippet>,
}

impl MeasurementResult {
    pub fn to_message(&self) -> MeasurementMessage {
        MeasurementMessage::from(self)
    }
}

/// Wire layout of a measurement, one JSON object per publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementMessage {
    pub v_rms: f64,
    pub i_rms: f64,
    pub p_act: f64,
    pub power_apparent: f64,
    pub power_reactive: f64,
    pub power_distortion: f64,
    pub power_factor: f64,
    pub freq: f64,
    pub freq_valid: bool,
    pub thd_v: f64,
    pub thd_i: f64,
    pub harm_v: Vec<f64>,
    pub harm_i: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform_v: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform_i: Option<Vec<f64>>,
}

impl From<&MeasurementResult> for MeasurementMessage {
    fn from(result: &MeasurementResult) -> Self {
        let round_all = |values: &[f64], decimals: i32| -> Vec<f64> {
            values.iter().map(|&v| round_to(v, decimals)).collect()
        };

        Self {
            v_rms: round_to(result.v_rms, VOLTAGE_DECIMALS),
            i_rms: round_to(result.i_rms, CURRENT_DECIMALS),
            p_act: round_to(result.active_power.abs(), POWER_DECIMALS),
            power_apparent: round_to(result.apparent_power, POWER_DECIMALS),
            power_reactive: round_to(result.reactive_power.abs(), POWER_DECIMALS),
            power_distortion: round_to(result.distortion_power, POWER_DECIMALS),
            power_factor: round_to(result.power_factor, RATIO_DECIMALS),
            freq: round_to(result.frequency, FREQUENCY_DECIMALS),
            freq_valid: result.frequency_valid,
            thd_v: round_to(result.thd_v, RATIO_DECIMALS),
            thd_i: round_to(result.thd_i, RATIO_DECIMALS),
            harm_v: round_all(&result.harmonics_v, VOLTAGE_ARRAY_DECIMALS),
            harm_i: round_all(&result.harmonics_i, CURRENT_ARRAY_DECIMALS),
            waveform_v: result
                .waveform
                .as_ref()
                .map(|w| round_all(&w.voltage, VOLTAGE_ARRAY_DECIMALS)),
            waveform_i: result
                .waveform
                .as_ref()
                .map(|w| round_all(&w.current, CURRENT_ARRAY_DECIMALS)),
        }
    }
}

pub fn encode(result: &MeasurementResult) -> NodeResult<String> {
    Ok(serde_json::to_string(&result.to_message())?)
}

pub fn decode(payload: &str) -> NodeResult<MeasurementMessage> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> MeasurementResult {
        let mut harmonics_v = [0.0; MAX_HARMONIC];
        let mut harmonics_i = [0.0; MAX_HARMONIC];
        harmonics_v[0] = 325.2671;
        harmonics_v[2] = 9.7549;
        harmonics_i[0] = 2.12345;
        harmonics_i[4] = 0.31219;

        MeasurementResult {
            v_rms: 229.96,
            i_rms: 1.50049,
            active_power: -310.26,
            apparent_power: 345.07,
            reactive_power: -140.33,
            distortion_power: 51.77,
            power_factor: 0.89914,
            frequency: 49.96,
            frequency_valid: true,
            thd_v: 2.9987,
            thd_i: 14.7049,
            harmonics_v,
            harmonics_i,
            waveform: Some(WaveformSnippet {
                voltage: vec![0.0, 12.345, -50.555],
                current: vec![0.0, 0.01234, -0.5556],
            }),
        }
    }

    #[test]
    fn test_rounding_tiers() {
        let message = sample_result().to_message();

        assert_eq!(message.v_rms, 230.0);
        assert_eq!(message.i_rms, 1.5);
        assert_eq!(message.p_act, 310.3);
        assert_eq!(message.power_reactive, 140.3);
        assert_eq!(message.power_distortion, 51.8);
        assert_eq!(message.power_factor, 0.9);
        assert_eq!(message.freq, 50.0);
        assert_eq!(message.thd_i, 14.7);
        assert_eq!(message.harm_v[0], 325.27);
        assert_eq!(message.harm_i[4], 0.312);
        assert_eq!(message.harm_v.len(), MAX_HARMONIC);
        assert_eq!(message.waveform_i.as_deref(), Some(&[0.0, 0.012, -0.556][..]));
    }

    #[test]
    fn test_json_field_names() {
        let payload = encode(&sample_result()).expect("encode");
        let value: serde_json::Value = serde_json::from_str(&payload).expect("json");

        for key in [
            "v_rms",
            "i_rms",
            "p_act",
            "power_apparent",
            "power_reactive",
            "power_distortion",
            "power_factor",
            "freq",
            "freq_valid",
            "thd_v",
            "thd_i",
            "harm_v",
            "harm_i",
            "waveform_v",
            "waveform_i",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["freq_valid"], serde_json::Value::Bool(true));
    }

    #[test]
    fn test_waveform_omitted_when_absent() {
        let mut result = sample_result();
        result.waveform = None;
        let payload = encode(&result).expect("encode");
        assert!(!payload.contains("waveform_v"));

        let decoded = decode(&payload).expect("decode");
        assert_eq!(decoded.waveform_v, None);
        assert_eq!(decoded.waveform_i, None);
        assert_eq!(decoded.harm_i.len(), MAX_HARMONIC);
    }

    #[test]
    fn test_decode_reproduces_fields_within_precision() {
        let result = sample_result();
        let decoded = decode(&encode(&result).expect("encode")).expect("decode");

        assert!((decoded.v_rms - result.v_rms).abs() <= 0.05 + 1e-9);
        assert!((decoded.i_rms - result.i_rms).abs() <= 0.0005 + 1e-9);
        assert!((decoded.power_factor - result.power_factor).abs() <= 0.005 + 1e-9);
        assert!((decoded.p_act - result.active_power.abs()).abs() <= 0.05 + 1e-9);
        assert_eq!(decoded.freq_valid, result.frequency_valid);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("{\"v_rms\": \"high\"}").is_err());
    }
}
