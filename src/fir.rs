//! Windowed FIR approximation of an arbitrary transfer-function sketch.
//!
//! The desired magnitude response arrives as (frequency, value) points;
//! it is resampled onto a power-of-two spectral grid, run through an
//! inverse real FFT and Blackman-windowed down to the requested number of
//! taps. The result is a linear-phase filter symmetric around the center
//! tap.

use realfft::RealFftPlanner;

use crate::signal;

/// Approximate a transfer function with `order + 1` FIR coefficients.
///
/// `points` are `(freq, value)` pairs with frequencies in `0..PI`,
/// ascending; the sketch is treated as 1.0 below the first point and held
/// at the last value above it. With `interpolate_db` the segments between
/// points are interpolated in dB (floored at -96 dB) instead of linearly
/// in magnitude, which matches how equalizer-style sketches are drawn.
///
/// Supplying at least `order` points is recommended; fewer points leave
/// the grid dominated by interpolation rather than by the sketch.
///
/// # Panics
/// Panics unless `order` is even and >= 2.
pub fn fir_approx(order: usize, points: &[(f64, f64)], interpolate_db: bool) -> Vec<f64> {
    assert!(order >= 2);
    assert!(order & 1 == 0, "linear-phase design needs an even order");

    let mut fft_size = 8usize;
    while fft_size / 2 <= order {
        fft_size *= 2;
    }

    let mut spectrum = vec![num_complex::Complex::new(0.0f64, 0.0); fft_size / 2 + 1];
    let ffact = 2.0 * std::f64::consts::PI / fft_size as f64;

    let mut point = 0;
    let (mut lfreq, mut lval) = (-2.0f64, 1.0f64);
    let (mut rfreq, mut rval) = (-1.0f64, 1.0f64);
    for (i, bin) in spectrum.iter_mut().enumerate() {
        let f = i as f64 * ffact;
        while f > rfreq && point != points.len() {
            lfreq = rfreq;
            lval = rval;
            (rfreq, rval) = points[point];
            point += 1;
        }
        let pos = (f - lfreq) / (rfreq - lfreq);
        let val = if interpolate_db {
            signal::db_to_factor(
                signal::db_from_factor(lval, -96.0) * (1.0 - pos)
                    + signal::db_from_factor(rval, -96.0) * pos,
            )
        } else {
            lval * (1.0 - pos) + rval * pos
        };
        bin.re = val;
    }

    let mut planner = RealFftPlanner::new();
    let c2r = planner.plan_fft_inverse(fft_size);
    let mut taps = vec![0.0f64; fft_size];
    c2r.process(&mut spectrum, &mut taps).unwrap();
    // realfft's inverse is unnormalized
    let scale = 1.0 / fft_size as f64;

    let mut a = vec![0.0f64; order + 1];
    for i in 0..=order / 2 {
        let c = taps[i] * scale * signal::window_blackman(2.0 * i as f64 / (order as f64 + 2.0));
        a[order / 2 - i] = c;
        a[order / 2 + i] = c;
    }
    a
}
