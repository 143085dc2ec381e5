//! Recursive filter design from classical analog prototypes.
//!
//! Each design function computes s-plane poles (and zeros) for one of the
//! Butterworth / Chebyshev-1 / Chebyshev-2 prototypes, warps them into the
//! z-plane through the bilinear transform, applies the requested band
//! transform and returns normalized digital coefficients.
//!
//! # Conventions
//!
//! Frequencies are digital angular frequencies as a fraction of pi, i.e.
//! the valid range is `(0, PI)` with `PI` at Nyquist. `epsilon` in `(0, 1)`
//! is the fall-off of the transfer function at the cutoff: the design gain
//! there is `1 - epsilon`. Low-pass and high-pass designs satisfy the
//! unity-gain contract: `|H| == 1.0` at the reference frequency (DC, or
//! Nyquist after high-pass mirroring), so callers never need to
//! re-normalize. Band designs build on a half-order prototype; when that
//! half-order is even the passband peak sits at the fluctuation minimum
//! `1 - epsilon` instead of unity.
//!
//! These functions run at control rate and may allocate. Invalid argument
//! ranges are programmer errors and panic; there is nothing sensible a
//! caller could do with a filter designed from a meaningless request.

use num_complex::Complex64;
use std::f64::consts::PI;
use tracing::trace;

use crate::iir::IirFilter;
use crate::polynomial::{
    cpoly_mul, cpoly_mul_reciprocal, poly_eval, poly_scale, trans_freq2s, trans_freq2z,
    trans_s2z, trans_zepsilon2ss,
};
use crate::signal;

/// Digital filter coefficients: numerator `a` and denominator `b`, both
/// indexed `0..=order`, with `b[0] == 1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDesign {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl FilterDesign {
    pub fn order(&self) -> usize {
        self.a.len() - 1
    }
}

#[inline]
fn cotan(x: f64) -> f64 {
    -(x + PI * 0.5).tan()
}

fn one() -> Complex64 {
    Complex64::new(1.0, 0.0)
}

/// Evaluate the Chebyshev polynomial of the first kind at `x`.
fn tschebyscheff_eval(degree: usize, x: f64) -> f64 {
    if degree == 0 {
        return 1.0;
    }
    let mut td = x;
    let mut td_m_1 = 1.0;
    let mut d = 1;
    while d < degree {
        let td1 = 2.0 * x * td - td_m_1;
        td_m_1 = td;
        td = td1;
        d += 1;
    }
    td
}

/// Inverse of [`tschebyscheff_eval`] on the cosh branch:
/// `tschebyscheff_eval(degree, x) == cosh(degree * acosh(x))`.
fn tschebyscheff_inverse(degree: usize, x: f64) -> f64 {
    ((x.acosh()) / degree as f64).cosh()
}

/// Butterworth z-plane poles and roots (roots all at -1, all-pole design).
///
/// The s-plane poles are equally spaced on a circle whose radius is scaled
/// by `epsilon^(-1/order)` so the response passes through `1 - epsilon` at
/// the cutoff.
pub fn butter_rp(order: usize, freq: f64, epsilon: f64) -> (Vec<Complex64>, Vec<Complex64>) {
    let n = order as f64;
    let beta_mul = PI / (2.0 * n);
    let epsilon = trans_zepsilon2ss(epsilon);
    let kappa = trans_freq2s(freq) * epsilon.powf(-1.0 / n);

    let mut poles = Vec::with_capacity(order);
    for i in 1..=order {
        let t = (i << 1) as f64 + n - 1.0;
        let beta = t * beta_mul;
        let root = Complex64::new(kappa * beta.cos(), kappa * beta.sin());
        poles.push(trans_s2z(root));
    }
    let roots = vec![Complex64::new(-1.0, 0.0); order];
    (roots, poles)
}

/// Chebyshev type 1 z-plane poles and roots (roots all at -1).
pub fn tscheb1_rp(order: usize, freq: f64, epsilon: f64) -> (Vec<Complex64>, Vec<Complex64>) {
    let n = order as f64;
    let beta_mul = PI / (2.0 * n);
    let kappa = trans_freq2s(freq);
    let epsilon = trans_zepsilon2ss(epsilon);
    let alpha = (1.0 / epsilon).asinh() / n;

    let mut poles = Vec::with_capacity(order);
    for i in 1..=order {
        let t = (i << 1) as f64 + n - 1.0;
        let beta = t * beta_mul;
        let root = Complex64::new(
            kappa * alpha.sinh() * beta.cos(),
            kappa * alpha.cosh() * beta.sin(),
        );
        poles.push(trans_s2z(root));
    }
    let roots = vec![Complex64::new(-1.0, 0.0); order];
    (roots, poles)
}

/// Chebyshev type 2 z-plane poles and roots, both derived from the
/// Chebyshev polynomial evaluated at the stop-to-pass frequency ratio.
///
/// # Panics
/// Panics unless `steepness > 1.0`.
pub fn tscheb2_rp(
    order: usize,
    c_freq: f64,
    steepness: f64,
    epsilon: f64,
) -> (Vec<Complex64>, Vec<Complex64>) {
    assert!(steepness > 1.0);

    let n = order as f64;
    let r_freq = c_freq * steepness;
    let kappa_c = trans_freq2s(c_freq);
    let kappa_r = trans_freq2s(r_freq);
    let epsilon = trans_zepsilon2ss(epsilon);
    let tepsilon = epsilon * tschebyscheff_eval(order, kappa_r / kappa_c);
    let alpha = tepsilon.asinh() / n;
    let beta_mul = PI / (2.0 * n);

    let mut poles = Vec::with_capacity(order);
    for i in 1..=order {
        let t = (i << 1) as f64 + n - 1.0;
        let beta = t * beta_mul;
        let root = Complex64::new(alpha.sinh() * beta.cos(), alpha.cosh() * beta.sin());
        let root = Complex64::new(kappa_r, 0.0) / root;
        poles.push(trans_s2z(root));
    }

    let mut roots = Vec::with_capacity(order);
    for i in 1..=order {
        let t = ((i << 1) - 1) as f64;
        let root = Complex64::new(0.0, (t * beta_mul).cos());
        let root = if root.im.abs() > 1e-14 {
            trans_s2z(Complex64::new(kappa_r, 0.0) / root)
        } else {
            Complex64::new(-1.0, 0.0)
        };
        roots.push(root);
    }
    (roots, poles)
}

/// Expand z-plane roots/poles into numerator/denominator coefficients.
fn filter_rp_to_z(roots: &[Complex64], poles: &[Complex64]) -> FilterDesign {
    let order = roots.len();
    let mut poly = vec![Complex64::new(0.0, 0.0); order + 1];

    poly[0] = one();
    for (i, &root) in roots.iter().enumerate() {
        cpoly_mul_reciprocal(&mut poly, i + 1, root);
    }
    let a: Vec<f64> = poly.iter().map(|c| c.re).collect();

    poly.fill(Complex64::new(0.0, 0.0));
    poly[0] = one();
    for (i, &pole) in poles.iter().enumerate() {
        cpoly_mul_reciprocal(&mut poly, i + 1, pole);
    }
    let b: Vec<f64> = poly.iter().map(|c| c.re).collect();

    FilterDesign { a, b }
}

/// Low-pass to high-pass mirroring: negate odd-indexed coefficients.
fn filter_lp_invert(design: &mut FilterDesign) {
    for i in (1..design.a.len()).step_by(2) {
        design.a[i] = -design.a[i];
        design.b[i] = -design.b[i];
    }
}

/// Shared band-pass/band-stop machinery: combines a low-pass prototype of
/// half the requested order with the alpha band-mapping term and applies a
/// quadratic polynomial substitution per complex root/pole pair.
fn band_filter_common(
    order: usize,
    p_freq: f64,
    s_freq: f64,
    epsilon: f64,
    roots: &[Complex64],
    poles: &[Complex64],
    band_pass: bool,
) -> FilterDesign {
    let order2 = order >> 1;
    let epsilon = trans_zepsilon2ss(epsilon);
    let alpha = ((s_freq + p_freq) * 0.5).cos() / ((s_freq - p_freq) * 0.5).cos();
    let alphac = Complex64::new(alpha, 0.0);

    let mut num = one();
    let mut den = one();
    for i in 0..order2 {
        num *= one() - roots[i].inv();
        den *= one() - poles[i].inv();
    }
    let mut norm = (den / num).re;

    if order2 & 1 == 0 {
        // norm is the fluctuation minimum for even prototype orders
        norm *= (1.0 / (1.0 + epsilon * epsilon)).sqrt();
    }

    let substitute = |seed: Complex64, pair_roots: &[Complex64]| -> Vec<f64> {
        let mut poly = vec![seed];
        for &r in pair_roots {
            let t = if band_pass { -r } else { r };
            let fpoly = [-t.inv(), alphac / t - alphac, one()];
            poly = cpoly_mul(&poly, &fpoly);
        }
        poly.iter().map(|c| c.re).collect()
    };

    let mut a = substitute(Complex64::new(norm, 0.0), roots);
    let mut b = substitute(one(), poles);

    let b0_inv = 1.0 / b[0];
    poly_scale(&mut a, b0_inv);
    poly_scale(&mut b, b0_inv);
    FilterDesign { a, b }
}

fn assert_band_args(order: usize, freq1: f64, freq2: f64) {
    assert!(order & 1 == 0, "band filters require an even order");
    assert!(freq1 > 0.0);
    assert!(freq1 < freq2);
    assert!(freq2 < PI);
}

/// Butterworth low-pass filter.
pub fn butter_lp(order: usize, freq: f64, epsilon: f64) -> FilterDesign {
    assert!(freq > 0.0 && freq < PI);

    let (roots, poles) = butter_rp(order, freq, epsilon);
    let mut design = filter_rp_to_z(&roots, &poles);

    // scale the maximum to 1.0
    let norm = poly_eval(&design.b, 1.0) / poly_eval(&design.a, 1.0);
    poly_scale(&mut design.a, norm);
    design
}

/// Chebyshev type 1 low-pass filter.
pub fn tscheb1_lp(order: usize, freq: f64, epsilon: f64) -> FilterDesign {
    assert!(freq > 0.0 && freq < PI);

    let (roots, poles) = tscheb1_rp(order, freq, epsilon);
    let mut design = filter_rp_to_z(&roots, &poles);

    let mut norm = poly_eval(&design.b, 1.0) / poly_eval(&design.a, 1.0);
    if order & 1 == 0 {
        // norm is the fluctuation minimum for even orders
        let epsilon = trans_zepsilon2ss(epsilon);
        norm *= (1.0 / (1.0 + epsilon * epsilon)).sqrt();
    }
    poly_scale(&mut design.a, norm);
    design
}

/// Chebyshev type 2 low-pass filter.
///
/// To obtain a transition band between `freq1` and `freq2`, pass
/// `freq = freq1` and `steepness = freq2 / freq1`; to specify the width in
/// fractions of octaves, pass `steepness = 2^octave_fraction`.
pub fn tscheb2_lp(order: usize, freq: f64, steepness: f64, epsilon: f64) -> FilterDesign {
    assert!(freq > 0.0 && freq < PI);
    assert!(freq * steepness < PI);
    assert!(steepness > 1.0);

    let (roots, poles) = tscheb2_rp(order, freq, steepness, epsilon);
    let mut design = filter_rp_to_z(&roots, &poles);

    let norm = poly_eval(&design.b, 1.0) / poly_eval(&design.a, 1.0);
    poly_scale(&mut design.a, norm);
    trace!(order, freq, steepness, "designed tscheb2 lowpass");
    design
}

/// Butterworth high-pass filter.
pub fn butter_hp(order: usize, freq: f64, epsilon: f64) -> FilterDesign {
    assert!(freq > 0.0 && freq < PI);

    let mut design = butter_lp(order, PI - freq, epsilon);
    filter_lp_invert(&mut design);
    design
}

/// Chebyshev type 1 high-pass filter.
pub fn tscheb1_hp(order: usize, freq: f64, epsilon: f64) -> FilterDesign {
    assert!(freq > 0.0 && freq < PI);

    let mut design = tscheb1_lp(order, PI - freq, epsilon);
    filter_lp_invert(&mut design);
    design
}

/// Chebyshev type 2 high-pass filter.
pub fn tscheb2_hp(order: usize, freq: f64, steepness: f64, epsilon: f64) -> FilterDesign {
    assert!(freq > 0.0 && freq < PI);

    let mut design = tscheb2_lp(order, PI - freq, steepness, epsilon);
    filter_lp_invert(&mut design);
    design
}

/// Butterworth band-pass filter (`order` must be even).
pub fn butter_bp(order: usize, freq1: f64, freq2: f64, epsilon: f64) -> FilterDesign {
    assert_band_args(order, freq1, freq2);

    let theta = 2.0 * f64::atan2(1.0, cotan((freq2 - freq1) * 0.5));
    let (roots, poles) = butter_rp(order >> 1, theta, epsilon);
    band_filter_common(order, freq1, freq2, epsilon, &roots, &poles, true)
}

/// Chebyshev type 1 band-pass filter (`order` must be even).
pub fn tscheb1_bp(order: usize, freq1: f64, freq2: f64, epsilon: f64) -> FilterDesign {
    assert_band_args(order, freq1, freq2);

    let theta = 2.0 * f64::atan2(1.0, cotan((freq2 - freq1) * 0.5));
    let (roots, poles) = tscheb1_rp(order >> 1, theta, epsilon);
    band_filter_common(order, freq1, freq2, epsilon, &roots, &poles, true)
}

/// Chebyshev type 2 band-pass filter (`order` must be even).
pub fn tscheb2_bp(
    order: usize,
    freq1: f64,
    freq2: f64,
    steepness: f64,
    epsilon: f64,
) -> FilterDesign {
    assert_band_args(order, freq1, freq2);

    let theta = 2.0 * f64::atan2(1.0, cotan((freq2 - freq1) * 0.5));
    let (roots, poles) = tscheb2_rp(order >> 1, theta, steepness, epsilon);
    band_filter_common(order, freq1, freq2, epsilon, &roots, &poles, true)
}

/// Butterworth band-stop filter (`order` must be even).
pub fn butter_bs(order: usize, freq1: f64, freq2: f64, epsilon: f64) -> FilterDesign {
    assert_band_args(order, freq1, freq2);

    let theta = 2.0 * f64::atan2(1.0, ((freq2 - freq1) * 0.5).tan());
    let (roots, poles) = butter_rp(order >> 1, theta, epsilon);
    band_filter_common(order, freq1, freq2, epsilon, &roots, &poles, false)
}

/// Chebyshev type 1 band-stop filter (`order` must be even).
pub fn tscheb1_bs(order: usize, freq1: f64, freq2: f64, epsilon: f64) -> FilterDesign {
    assert_band_args(order, freq1, freq2);

    let theta = 2.0 * f64::atan2(1.0, ((freq2 - freq1) * 0.5).tan());
    let (roots, poles) = tscheb1_rp(order >> 1, theta, epsilon);
    band_filter_common(order, freq1, freq2, epsilon, &roots, &poles, false)
}

/// Chebyshev type 2 band-stop filter (`order` must be even).
pub fn tscheb2_bs(
    order: usize,
    freq1: f64,
    freq2: f64,
    steepness: f64,
    epsilon: f64,
) -> FilterDesign {
    assert_band_args(order, freq1, freq2);

    let theta = 2.0 * f64::atan2(1.0, ((freq2 - freq1) * 0.5).tan());
    let (roots, poles) = tscheb2_rp(order >> 1, theta, steepness, epsilon);
    band_filter_common(order, freq1, freq2, epsilon, &roots, &poles, false)
}

/// Steepness parameter for a Chebyshev type 2 low-pass hitting a given
/// stop-band residue (maximum of the transfer function in the stop band,
/// 0..1). Closed-form inversion of the Chebyshev relation, no search.
pub fn tscheb2_steepness(order: usize, c_freq: f64, epsilon: f64, residue: f64) -> f64 {
    let epsilon = trans_zepsilon2ss(epsilon);
    let kappa_c = trans_freq2s(c_freq);
    let kappa_r =
        tschebyscheff_inverse(order, (1.0 / (residue * residue) - 1.0).sqrt() / epsilon) * kappa_c;
    trans_freq2z(kappa_r) / c_freq
}

/// Steepness parameter for a Chebyshev type 2 low-pass hitting a target
/// stop-band attenuation in dB (>= 0).
pub fn tscheb2_steepness_db(order: usize, c_freq: f64, epsilon: f64, stopband_db: f64) -> f64 {
    tscheb2_steepness(order, c_freq, epsilon, signal::db_to_factor(-stopband_db))
}

/// Measure the realized transfer-function magnitude of a designed filter
/// at `freq` by streaming a complex sine through two IIR evaluators.
///
/// Unlike evaluating the polynomial quotient on the unit circle, this
/// exposes the effects of finite arithmetic during filter evaluation. The
/// volume is averaged over 0.1-second blocks until two adjacent blocks
/// agree, or 5 seconds have passed (the filter may never settle if it is
/// unstable or too noisy).
pub fn filter_sine_scan(a: &[f64], b: &[f64], freq: f64, mix_freq: f64) -> f64 {
    assert!(a.len() == b.len() && a.len() > 1);
    assert!(freq >= 0.0 && freq < mix_freq / 2.0);

    let block_size = 256.max((mix_freq / 10.0) as usize);
    let phase_inc = freq / mix_freq * 2.0 * PI;
    let volume_epsilon = 1e-8;
    let order = a.len() - 1;

    let mut filter_re = IirFilter::with_coefficients(order, a, b);
    let mut filter_im = IirFilter::with_coefficients(order, a, b);

    let mut x_re = vec![0.0f32; block_size];
    let mut x_im = vec![0.0f32; block_size];
    let mut y_re = vec![0.0f32; block_size];
    let mut y_im = vec![0.0f32; block_size];

    // Filtering a complex sine lets each sample's magnitude be read off as
    // the complex absolute value; a single real sine's magnitude would
    // oscillate within every block.
    let mut phase: f64 = 0.0;
    let mut volume: f64 = -1.0;
    let mut blocks = 0;
    loop {
        for i in 0..block_size {
            x_re[i] = phase.cos() as f32;
            x_im[i] = phase.sin() as f32;
            phase += phase_inc;
            if phase > 2.0 * PI {
                // wrapping keeps mantissa bits out of the useless k*2pi part
                phase -= 2.0 * PI;
            }
        }
        filter_re.evaluate(&x_re, &mut y_re);
        filter_im.evaluate(&x_im, &mut y_im);

        let last_volume = volume;
        volume = 0.0;
        for i in 0..block_size {
            volume += Complex64::new(y_re[i] as f64, y_im[i] as f64).norm();
        }
        volume /= block_size as f64;
        blocks += 1;

        if (volume - last_volume).abs() <= volume_epsilon || blocks >= 50 {
            return volume;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_at(design: &FilterDesign, omega: f64) -> f64 {
        // evaluate |a(z^-1)/b(z^-1)| on the unit circle
        let z_inv = Complex64::new(0.0, -omega).exp();
        let eval = |coeffs: &[f64]| {
            let mut acc = Complex64::new(0.0, 0.0);
            let mut zp = Complex64::new(1.0, 0.0);
            for &c in coeffs {
                acc += zp * c;
                zp *= z_inv;
            }
            acc
        };
        (eval(&design.a) / eval(&design.b)).norm()
    }

    #[test]
    fn chebyshev_polynomial_matches_cosh_identity() {
        for degree in 1..6 {
            for x in [1.0, 1.5, 2.0, 4.0] {
                let direct = tschebyscheff_eval(degree, x);
                let identity = ((degree as f64) * x.acosh()).cosh();
                assert!(((direct - identity) / identity).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn lowpass_dc_gain_is_unity() {
        let design = butter_lp(4, PI / 4.0, 0.1);
        assert!((response_at(&design, 0.0) - 1.0).abs() < 1e-9);

        let design = tscheb1_lp(5, PI / 3.0, 0.2);
        assert!((response_at(&design, 0.0) - 1.0).abs() < 1e-9);

        let design = tscheb2_lp(6, PI / 4.0, 1.5, 0.2);
        assert!((response_at(&design, 0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn highpass_nyquist_gain_is_unity() {
        let design = butter_hp(4, PI / 4.0, 0.1);
        assert!((response_at(&design, PI) - 1.0).abs() < 1e-9);

        let design = tscheb1_hp(3, PI / 2.5, 0.15);
        assert!((response_at(&design, PI) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lowpass_cutoff_hits_design_epsilon() {
        let epsilon = 0.1;
        let freq = PI / 4.0;
        let design = butter_lp(6, freq, epsilon);
        let at_cutoff = response_at(&design, freq);
        assert!(
            (at_cutoff - (1.0 - epsilon)).abs() < 1e-6,
            "gain at cutoff {at_cutoff} should be {}",
            1.0 - epsilon
        );
    }

    #[test]
    fn butterworth_poles_inside_unit_circle() {
        let (_, poles) = butter_rp(8, PI / 3.0, 0.1);
        for p in poles {
            assert!(p.norm() < 1.0, "unstable pole {p}");
        }
    }

    #[test]
    fn tscheb2_requires_steepness_above_one() {
        let result = std::panic::catch_unwind(|| tscheb2_rp(4, PI / 4.0, 0.9, 0.1));
        assert!(result.is_err());
    }

    #[test]
    fn steepness_solver_hits_stopband_target() {
        let order = 6;
        let c_freq = PI / 4.0;
        let epsilon = 0.1;
        let stopband_db = 40.0;
        let steepness = tscheb2_steepness_db(order, c_freq, epsilon, stopband_db);
        assert!(steepness > 1.0);

        let design = tscheb2_lp(order, c_freq, steepness, epsilon);
        // beyond the stop edge, the response must stay at or below the residue
        let residue = signal::db_to_factor(-stopband_db);
        let mut w = c_freq * steepness;
        while w < PI {
            assert!(
                response_at(&design, w) < residue * 1.01,
                "stopband leak at {w}"
            );
            w += 0.05;
        }
    }

    #[test]
    fn bandpass_peak_hits_design_epsilon() {
        let freq1 = PI / 5.0;
        let freq2 = PI / 2.5;
        let epsilon = 0.1;
        let design = butter_bp(8, freq1, freq2, epsilon);
        // the half-order prototype is even, so the band peak sits at the
        // fluctuation minimum 1 - epsilon rather than unity
        let mut peak = 0.0f64;
        let mut w = freq1;
        while w < freq2 {
            peak = peak.max(response_at(&design, w));
            w += 0.001;
        }
        assert!(
            (peak - (1.0 - epsilon)).abs() < 1e-6,
            "band peak {peak} vs {}",
            1.0 - epsilon
        );
        // rejection well outside the band
        assert!(response_at(&design, 0.01) < 0.05);
        assert!(response_at(&design, PI - 0.01) < 0.05);
    }

    #[test]
    fn bandstop_passband_hits_design_epsilon() {
        let freq1 = PI / 4.0;
        let freq2 = PI / 2.0;
        let epsilon = 0.1;
        let design = butter_bs(8, freq1, freq2, epsilon);
        // same fluctuation-minimum normalization as the band pass
        assert!((response_at(&design, 0.0) - (1.0 - epsilon)).abs() < 1e-9);
        // strong rejection at band center
        let center = (freq1 + freq2) / 2.0;
        assert!(response_at(&design, center) < 0.05);
    }

    #[test]
    fn sine_scan_agrees_with_polynomial_response() {
        let mix_freq = 44100.0;
        let cutoff_hz = 5000.0;
        let freq = cutoff_hz / mix_freq * 2.0 * PI;
        let design = butter_lp(4, freq, 0.1);

        for test_hz in [500.0, 2000.0, 8000.0] {
            let omega = test_hz / mix_freq * 2.0 * PI;
            let expected = response_at(&design, omega);
            let measured = filter_sine_scan(&design.a, &design.b, test_hz, mix_freq);
            assert!(
                (measured - expected).abs() < 1e-3,
                "at {test_hz} Hz: measured {measured}, expected {expected}"
            );
        }
    }
}
