//! Runtime behavior of the recursive evaluators: coefficient changes
//! under load, the biquad's approximate control path and an FIR design
//! actually convolved against audio.

use std::f64::consts::PI;

use klang::biquad::{BiquadConfig, BiquadFilter, BiquadNormalize, BiquadType};
use klang::design;
use klang::fir;
use klang::iir::IirFilter;

fn sine(freq: f64, mix_freq: f64, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f64 * freq * 2.0 * PI / mix_freq).sin() as f32)
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|v| v * v).sum::<f32>() / samples.len() as f32).sqrt()
}

#[test]
fn coefficient_change_does_not_click() {
    let mix = 44_100.0;
    let lp1 = design::butter_lp(6, 0.3 * PI, 0.1);
    let lp2 = design::butter_lp(6, 0.5 * PI, 0.1);

    let x = sine(440.0, mix, 2048);
    let mut y = vec![0.0f32; 2048];
    let mut filter = IirFilter::with_coefficients(lp1.order(), &lp1.a, &lp1.b);
    filter.evaluate(&x[..1024], &mut y[..1024]);
    filter.change(lp2.order(), &lp2.a, &lp2.b);
    filter.evaluate(&x[1024..], &mut y[1024..]);

    // 440 Hz in the passband moves slowly sample to sample; a history
    // reset at the change would show up as a step
    for i in 1..y.len() {
        let delta = (y[i] - y[i - 1]).abs();
        assert!(
            delta < 0.3,
            "discontinuity of {delta} at sample {i} across the coefficient change"
        );
    }
}

#[test]
fn resonance_gain_normalization_sets_dc_level() {
    let mut config = BiquadConfig::new(
        BiquadType::ResonantLowpass,
        BiquadNormalize::ResonanceGain,
    );
    config.setup(0.2, 12.0, 1.0);
    let mut filter = BiquadFilter::new();
    filter.configure(&mut config, true);

    let x = vec![1.0f32; 8192];
    let mut y = vec![0.0f32; 8192];
    filter.evaluate(&x, &mut y);

    // resonance-gain normalization scales DC down by the resonance
    let expected = 10f64.powf(-12.0 / 20.0) as f32;
    let settled = y[8191];
    assert!(
        (settled - expected).abs() / expected < 1e-3,
        "DC settled at {settled}, expected {expected}"
    );
}

#[test]
fn approximate_gain_tracks_the_exact_path() {
    let mut exact = BiquadConfig::new(
        BiquadType::ResonantLowpass,
        BiquadNormalize::ResonanceGain,
    );
    exact.setup(0.15, 3.0, 1.0);

    let mut approx = BiquadConfig::new(
        BiquadType::ResonantLowpass,
        BiquadNormalize::ResonanceGain,
    );
    approx.setup(0.15, 0.0, 1.0);
    approx.approx_gain(3.0);
    assert!(approx.is_approximate());

    let x = sine(300.0, 44_100.0, 4096);
    let mut ye = vec![0.0f32; 4096];
    let mut ya = vec![0.0f32; 4096];
    let mut fe = BiquadFilter::new();
    fe.configure(&mut exact, true);
    fe.evaluate(&x, &mut ye);
    let mut fa = BiquadFilter::new();
    fa.configure(&mut approx, true);
    fa.evaluate(&x, &mut ya);

    let err = ye
        .iter()
        .zip(&ya)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    assert!(err < 1e-3, "approximate gain path diverges by {err}");
}

#[test]
fn biquad_lowpass_separates_bands() {
    let mix = 44_100.0;
    let mut config = BiquadConfig::new(
        BiquadType::ResonantLowpass,
        BiquadNormalize::Passband,
    );
    // corner at ~2.2 kHz
    config.setup(0.1, 3.0, 1.0);
    let mut filter = BiquadFilter::new();
    filter.configure(&mut config, true);

    let low = sine(300.0, mix, 8192);
    let high = sine(15_000.0, mix, 8192);
    let mixed: Vec<f32> = low.iter().zip(&high).map(|(a, b)| a + b).collect();
    let mut y = vec![0.0f32; 8192];
    filter.evaluate(&mixed, &mut y);

    let out_rms = rms(&y[2048..]);
    let low_rms = rms(&low[2048..]);
    // the low component should dominate the output
    assert!(
        (out_rms - low_rms).abs() / low_rms < 0.2,
        "lowpass output rms {out_rms} vs low component {low_rms}"
    );
}

#[test]
fn fir_lowpass_attenuates_the_high_band() {
    let mix = 44_100.0;
    // pass below ~3.5 kHz, block above ~7 kHz
    let points = vec![(0.5, 1.0), (1.0, 0.0), (3.14, 0.0)];
    let taps = fir::fir_approx(64, &points, false);

    let low = sine(1_000.0, mix, 4096);
    let high = sine(12_000.0, mix, 4096);

    let convolve = |x: &[f32]| -> Vec<f32> {
        let mut y = vec![0.0f32; x.len()];
        for i in taps.len()..x.len() {
            let mut acc = 0.0f64;
            for (k, &t) in taps.iter().enumerate() {
                acc += t * x[i - k] as f64;
            }
            y[i] = acc as f32;
        }
        y
    };

    let low_out = rms(&convolve(&low)[256..]);
    let high_out = rms(&convolve(&high)[256..]);
    assert!(low_out > 0.6, "passband rms {low_out}");
    assert!(
        high_out < low_out * 0.05,
        "stopband rms {high_out} vs passband {low_out}"
    );
}
