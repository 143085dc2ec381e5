//! Complex polynomial algebra and s/z-plane transforms for filter design.
//!
//! Polynomials are coefficient slices indexed `0..=degree`, lowest power
//! first, in the variable `x = z^-1`. Multiplying by `(1 - r*x)` therefore
//! places a zero (or pole) of the digital transfer function at `z = r`.
//! All of this runs at control rate only; allocation is fine here.

use num_complex::Complex64;

/// Multiply `c[0..=degree-1]` by the monomial `(x - root)` in place,
/// extending the polynomial to `degree`.
pub fn cpoly_mul_monomial(c: &mut [Complex64], degree: usize, root: Complex64) {
    c[degree] = c[degree - 1];
    for j in (1..degree).rev() {
        c[j] = c[j - 1] - c[j] * root;
    }
    c[0] = -c[0] * root;
}

/// Multiply `c[0..=degree-1]` by `(1 - root*x)` in place, extending the
/// polynomial to `degree`.
pub fn cpoly_mul_reciprocal(c: &mut [Complex64], degree: usize, root: Complex64) {
    c[degree] = -(c[degree - 1] * root);
    for j in (1..degree).rev() {
        c[j] = c[j] - c[j - 1] * root;
    }
}

/// Full polynomial product; returns `a * b`.
pub fn cpoly_mul(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    let mut p = vec![Complex64::new(0.0, 0.0); a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            p[i + j] += ai * bj;
        }
    }
    p
}

/// Scale all coefficients in place.
pub fn poly_scale(a: &mut [f64], scale: f64) {
    for v in a.iter_mut() {
        *v *= scale;
    }
}

/// Horner evaluation of a real polynomial at `x`.
pub fn poly_eval(a: &[f64], x: f64) -> f64 {
    let mut sum = a[a.len() - 1];
    for &c in a[..a.len() - 1].iter().rev() {
        sum = sum * x + c;
    }
    sum
}

/// Bilinear transform of an s-plane point into the z-plane:
/// `z = (1 + s) / (1 - s)`.
pub fn trans_s2z(s: Complex64) -> Complex64 {
    let one = Complex64::new(1.0, 0.0);
    (one + s) / (one - s)
}

/// Prewarp a digital angular frequency (0..pi) onto the s-plane imaginary
/// axis: the inverse of the bilinear transform's frequency mapping.
#[inline]
pub fn trans_freq2s(w: f64) -> f64 {
    (w / 2.0).tan()
}

/// Map an s-plane frequency back to the digital domain.
#[inline]
pub fn trans_freq2z(s: f64) -> f64 {
    2.0 * s.atan()
}

/// Convert a z-domain pass-band fall-off (0..1, fraction of unity gain
/// lost at the cutoff) into the s-domain epsilon used by the analog
/// prototypes, which satisfies `1 - zepsilon == sqrt(1 / (1 + ss^2))`.
pub fn trans_zepsilon2ss(zepsilon: f64) -> f64 {
    let e2 = (1.0 - zepsilon) * (1.0 - zepsilon);
    ((1.0 - e2) / e2).sqrt()
}
