//! End-to-end verification of the analog-prototype filter designs.
//!
//! Every design is checked against its analytic transfer function on the
//! unit circle and then actually run as a recursive filter, because a
//! coefficient set that looks right but blows up over ten thousand
//! samples is worthless.

use std::f64::consts::PI;

use klang::design::{self, FilterDesign};
use klang::iir::IirFilter;
use num_complex::Complex64;

/// Magnitude response |H(e^{jw})| from the a/b coefficient sets.
fn response_at(d: &FilterDesign, omega: f64) -> f64 {
    let z = Complex64::new(0.0, -omega).exp();
    let mut num = Complex64::new(0.0, 0.0);
    let mut den = Complex64::new(0.0, 0.0);
    let mut zk = Complex64::new(1.0, 0.0);
    for k in 0..=d.order() {
        num += d.a[k] * zk;
        den += d.b[k] * zk;
        zk *= z;
    }
    (num / den).norm()
}

/// Feed an impulse and return the full response.
fn impulse_response(d: &FilterDesign, len: usize) -> Vec<f32> {
    let mut filter = IirFilter::with_coefficients(d.order(), &d.a, &d.b);
    let mut x = vec![0.0f32; len];
    x[0] = 1.0;
    let mut y = vec![0.0f32; len];
    filter.evaluate(&x, &mut y);
    y
}

#[test]
fn lowpass_designs_hit_the_epsilon_contract() {
    // the magnitude at the cutoff must be exactly 1 - epsilon, and the
    // passband peak exactly 1 (DC for Butterworth; even-order Chebyshev
    // has its ripple minimum at DC, so scan for the peak instead)
    for order in [2, 4, 8] {
        for freq in [0.3 * PI, 0.5 * PI, 0.7 * PI] {
            for (name, d) in [
                ("butter", design::butter_lp(order, freq, 0.1)),
                ("tscheb1", design::tscheb1_lp(order, freq, 0.1)),
            ] {
                let mut peak = 0.0f64;
                let mut w = 0.0;
                while w < freq {
                    peak = peak.max(response_at(&d, w));
                    w += freq / 4096.0;
                }
                assert!(
                    (peak - 1.0).abs() < 1e-5,
                    "{name} order {order}: passband peak {peak} != 1"
                );
                let cut = response_at(&d, freq);
                assert!(
                    (cut - 0.9).abs() < 1e-6,
                    "{name} order {order}: cutoff gain {cut} != 0.9"
                );
            }
        }
    }
}

#[test]
fn highpass_mirrors_lowpass() {
    let lp = design::butter_lp(6, 0.4 * PI, 0.1);
    let hp = design::butter_hp(6, 0.6 * PI, 0.1);
    for i in 1..16 {
        let w = i as f64 * PI / 16.0;
        let l = response_at(&lp, w);
        let h = response_at(&hp, PI - w);
        assert!(
            (l - h).abs() < 1e-9,
            "mirror mismatch at {w}: lp {l} vs hp {h}"
        );
    }
}

#[test]
fn impulse_responses_decay() {
    let designs = [
        design::butter_lp(8, 0.2 * PI, 0.1),
        design::tscheb1_lp(8, 0.8 * PI, 0.5),
        design::tscheb2_lp(8, 0.3 * PI, 1.5, 0.2),
        design::tscheb1_hp(7, 0.6 * PI, 0.25),
        design::butter_bp(8, 0.3 * PI, 0.6 * PI, 0.1),
        design::tscheb1_bs(8, 0.4 * PI, 0.7 * PI, 0.1),
    ];
    for (n, d) in designs.iter().enumerate() {
        let y = impulse_response(d, 10_000);
        assert!(
            y.iter().all(|v| v.is_finite()),
            "design {n} produced a non-finite sample"
        );
        let tail: f32 = y[9_000..].iter().map(|v| v.abs()).sum();
        assert!(tail < 1e-3, "design {n} did not decay (tail energy {tail})");
    }
}

#[test]
fn bandpass_passes_center_and_blocks_edges() {
    let d = design::tscheb1_bp(8, 0.4 * PI, 0.6 * PI, 0.15);
    let center = response_at(&d, 0.5 * PI);
    let low = response_at(&d, 0.1 * PI);
    let high = response_at(&d, 0.9 * PI);
    assert!(center > 0.8, "center gain {center}");
    assert!(low < 0.05, "low stopband leak {low}");
    assert!(high < 0.05, "high stopband leak {high}");
}

#[test]
fn bandstop_blocks_center_and_passes_edges() {
    let d = design::butter_bs(8, 0.4 * PI, 0.6 * PI, 0.1);
    let center = response_at(&d, 0.5 * PI);
    let low = response_at(&d, 0.05 * PI);
    let high = response_at(&d, 0.95 * PI);
    assert!(center < 1e-3, "stopband center leak {center}");
    assert!(low > 0.85, "low passband {low}");
    assert!(high > 0.85, "high passband {high}");
}

#[test]
fn tscheb2_keeps_the_stopband_residue() {
    let order = 6;
    let freq = 0.4 * PI;
    let epsilon = 0.2;
    let steepness = design::tscheb2_steepness_db(order, freq, epsilon, 40.0);
    let d = design::tscheb2_lp(order, freq, steepness, epsilon);

    // everything past cutoff * steepness stays below -40 dB
    let stop_start = freq * steepness;
    let mut w = stop_start;
    while w < PI {
        let g = response_at(&d, w);
        assert!(
            g < 0.0101,
            "stopband at {w} rel {} leaks {g}",
            w / PI
        );
        w += 0.01 * PI;
    }
}

#[test]
fn cutoff_magnitude_is_half_power_for_matched_epsilon() {
    // epsilon = 1 - 1/sqrt(2) places the design gain at the cutoff on the
    // half-power point, measurable from the running filter itself
    let mix = 44_100.0;
    let cutoff_hz = 5_000.0;
    let freq = cutoff_hz / mix * 2.0 * PI;
    let half_power = 1.0 / 2f64.sqrt();
    let d = design::butter_lp(6, freq, 1.0 - half_power);
    let measured = design::filter_sine_scan(&d.a, &d.b, cutoff_hz, mix);
    assert!(
        (measured - half_power).abs() < 1e-3,
        "cutoff magnitude {measured} vs half power {half_power}"
    );
}

#[test]
fn sine_scan_agrees_with_analytic_response() {
    let d = design::butter_lp(4, 0.5 * PI, 0.1);
    for freq_hz in [500.0, 5_000.0, 15_000.0] {
        let mix = 44_100.0;
        let measured = design::filter_sine_scan(&d.a, &d.b, freq_hz, mix);
        let analytic = response_at(&d, freq_hz * 2.0 * PI / mix);
        assert!(
            (measured - analytic).abs() < 1e-3,
            "{freq_hz} Hz: scan {measured} vs analytic {analytic}"
        );
    }
}
