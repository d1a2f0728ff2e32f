//! Property tests for the measurement math and the wire format.

use std::f64::consts::PI;

use power_quality_node::power_quality::frequency::zero_crossing_frequency;
use power_quality_node::power_quality::measurement::{decode, encode, MeasurementResult};
use power_quality_node::power_quality::power::{compute_power, PowerInputs};
use power_quality_node::power_quality::signal::dc_offset;
use power_quality_node::power_quality::*;
use proptest::prelude::*;

// ── Power decomposition ──────────────────────────────────────

fn arb_power_inputs() -> impl Strategy<Value = PowerInputs> {
    (
        0.0..400.0f64,
        0.0..50.0f64,
        -1.0..=1.0f64,
        0.5..1.0f64,
        0.5..1.0f64,
        -PI..PI,
        -PI..PI,
    )
        .prop_map(|(v_rms, i_rms, pf, v1_share, i1_share, phase_v, phase_i)| PowerInputs {
            v_rms,
            i_rms,
            active_power: v_rms * i_rms * pf,
            voltage_fundamental: v_rms * SQRT_2 * v1_share,
            current_fundamental: i_rms * SQRT_2 * i1_share,
            voltage_phase: phase_v,
            current_phase: phase_i,
        })
}

proptest! {
    /// D is never negative or undefined, and when positive it closes the
    /// Budeanu identity S^2 = P^2 + Q1^2 + D^2.
    #[test]
    fn distortion_power_closes_identity(inputs in arb_power_inputs()) {
        let config = NodeConfig::default();
        let m = compute_power(&inputs, &config);

        prop_assert!(m.distortion_power.is_finite());
        prop_assert!(m.distortion_power >= 0.0);
        prop_assert!((0.0..=1.0).contains(&m.power_factor));

        if !m.gated && m.distortion_power > 0.0 {
            let s2 = m.apparent_power.powi(2);
            let sum = m.active_power.powi(2) + m.reactive_power.powi(2) + m.distortion_power.powi(2);
            prop_assert!((s2 - sum).abs() <= 1e-9 * s2.max(1.0), "S^2 {} vs {}", s2, sum);
        }
    }

    /// Everything that depends on the current is zero at or below the gate.
    #[test]
    fn gate_zeroes_current_side(inputs in arb_power_inputs(), scale in 0.0..=1.0f64) {
        let config = NodeConfig::default();
        let gated = PowerInputs { i_rms: config.noise_gate_rms * scale, ..inputs };
        let m = compute_power(&gated, &config);

        prop_assert!(m.gated);
        prop_assert_eq!(m.i_rms, 0.0);
        prop_assert_eq!(m.active_power, 0.0);
        prop_assert_eq!(m.apparent_power, 0.0);
        prop_assert_eq!(m.reactive_power, 0.0);
        prop_assert_eq!(m.distortion_power, 0.0);
        prop_assert_eq!(m.power_factor, 1.0);
    }
}

// ── Wire format ──────────────────────────────────────────────

fn arb_result() -> impl Strategy<Value = MeasurementResult> {
    (
        (0.0..300.0f64, 0.0..40.0f64, -9000.0..9000.0f64, 0.0..12000.0f64),
        (-9000.0..9000.0f64, 0.0..5000.0f64, 0.0..=1.0f64, 40.0..60.0f64),
        (any::<bool>(), 0.0..40.0f64, 0.0..150.0f64),
        proptest::collection::vec(0.0..400.0f64, MAX_HARMONIC),
        proptest::collection::vec(0.0..60.0f64, MAX_HARMONIC),
    )
        .prop_map(|((v, i, p, s), (q, d, pf, f), (valid, thd_v, thd_i), hv, hi)| {
            let mut harmonics_v = [0.0; MAX_HARMONIC];
            let mut harmonics_i = [0.0; MAX_HARMONIC];
            harmonics_v.copy_from_slice(&hv);
            harmonics_i.copy_from_slice(&hi);
            MeasurementResult {
                v_rms: v,
                i_rms: i,
                active_power: p,
                apparent_power: s,
                reactive_power: q,
                distortion_power: d,
                power_factor: pf,
                frequency: f,
                frequency_valid: valid,
                thd_v,
                thd_i,
                harmonics_v,
                harmonics_i,
                waveform: None,
            }
        })
}

fn within(decoded: f64, original: f64, decimals: i32) -> bool {
    (decoded - original).abs() <= 0.5 * 10f64.powi(-decimals) + 1e-9 * original.abs().max(1.0)
}

proptest! {
    /// Every published field survives encode/decode within its rounding tier.
    #[test]
    fn wire_round_trip_within_precision(result in arb_result()) {
        let m = decode(&encode(&result).expect("encode")).expect("decode");

        prop_assert!(within(m.v_rms, result.v_rms, 1));
        prop_assert!(within(m.i_rms, result.i_rms, 3));
        prop_assert!(within(m.p_act, result.active_power.abs(), 1));
        prop_assert!(within(m.power_apparent, result.apparent_power, 1));
        prop_assert!(within(m.power_reactive, result.reactive_power.abs(), 1));
        prop_assert!(within(m.power_distortion, result.distortion_power, 1));
        prop_assert!(within(m.power_factor, result.power_factor, 2));
        prop_assert!(within(m.freq, result.frequency, 1));
        prop_assert_eq!(m.freq_valid, result.frequency_valid);
        prop_assert!(within(m.thd_v, result.thd_v, 2));
        prop_assert!(within(m.thd_i, result.thd_i, 2));
        for (d, o) in m.harm_v.iter().zip(result.harmonics_v.iter()) {
            prop_assert!(within(*d, *o, 2));
        }
        for (d, o) in m.harm_i.iter().zip(result.harmonics_i.iter()) {
            prop_assert!(within(*d, *o, 3));
        }
    }
}

// ── Frequency and acquisition ────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// An in-band tone is estimated to 0.5 Hz whenever every rising
    /// transition steps over the hysteresis band in one sample.
    #[test]
    fn zero_crossing_tracks_in_band_tones(
        freq in 45.5..54.5f64,
        amplitude in 1000.0..2000.0f64,
        phase in 0.0..(2.0 * PI),
    ) {
        let config = NodeConfig { sample_rate_hz: 2560.0, ..Default::default() };
        let mut raw = [0 as AdcCode; WINDOW_SIZE];
        for (n, s) in raw.iter_mut().enumerate() {
            let v = amplitude * (2.0 * PI * freq * n as f64 / config.sample_rate_hz + phase).sin();
            *s = (ADC_MIDPOINT as f64 + v).round() as AdcCode;
        }

        let offset = dc_offset(&raw);
        let threshold = config.zero_crossing_threshold;
        let all_clear = raw.windows(2).all(|pair| {
            let (prev, curr) = (pair[0] as f64 - offset, pair[1] as f64 - offset);
            !(prev < 0.0 && curr >= 0.0) || (prev < -threshold && curr > threshold)
        });
        prop_assume!(all_clear);

        let estimate = zero_crossing_frequency(&raw, offset, &config);
        prop_assert!(estimate.is_some());
        let estimate = estimate.unwrap_or_default();
        prop_assert!((estimate - freq).abs() <= 0.5, "estimated {} for {}", estimate, freq);
    }

    /// However many ticks arrive while a window is held, it stays intact.
    #[test]
    fn held_window_is_never_overwritten(extra_ticks in 1usize..4096, level in 0u16..4096) {
        let mut buffer = AcquisitionBuffer::new();
        let (mut sampler, mut drain) = buffer.split();
        let mut fixed = || (level, level);
        for _ in 0..WINDOW_SIZE {
            sampler.on_tick(&mut fixed);
        }

        let window = drain.poll().expect("ready");
        let mut other = || (level ^ 0x0fff, 0);
        for _ in 0..extra_ticks {
            prop_assert_eq!(sampler.on_tick(&mut other), TickOutcome::Held);
        }
        prop_assert!(window.voltage().iter().all(|&v| v == level));
        prop_assert!(window.current().iter().all(|&i| i == level));
    }
}
