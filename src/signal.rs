//! Signal-level conventions shared by the filter and oscillator engines.
//!
//! Modulation streams that represent frequencies carry Nyquist-relative
//! values in [-1, 1]; [`signal_to_freq`] maps them to Hz. Sync streams are
//! expected to be piecewise constant, so edge detection is a plain
//! comparison of adjacent samples. The `*_changed` helpers define the
//! hysteresis thresholds used to decide whether a modulation input moved
//! enough to warrant recomputing derived state (filter coefficients, step
//! sizes) at audio rate.

/// Smallest signal magnitude treated as non-silent by runtime state checks.
pub const SIGNAL_EPSILON: f64 = 1.15e-14;

/// Largest musically valid signal magnitude; filter state beyond this is
/// treated as diverging and healed in place.
pub const SIGNAL_KAPPA: f64 = 1.5;

/// Frequency represented by a signal value of 1.0.
pub const MAX_FREQUENCY: f64 = 24000.0;

/// Convert a frequency-valued signal sample to Hz.
#[inline]
pub fn signal_to_freq(value: f32) -> f64 {
    value as f64 * MAX_FREQUENCY
}

/// Convert a frequency in Hz to its signal representation.
#[inline]
pub fn signal_from_freq(freq: f64) -> f32 {
    (freq / MAX_FREQUENCY) as f32
}

/// Whether a frequency-valued signal moved enough to matter.
#[inline]
pub fn freq_changed(v1: f32, v2: f32) -> bool {
    (v1 - v2).abs() > 1e-7
}

/// Whether a modulation-valued signal moved enough to matter.
#[inline]
pub fn mod_changed(v1: f32, v2: f32) -> bool {
    (v1 - v2).abs() > 1e-8
}

/// Rising edge between two adjacent samples of a sync stream.
#[inline]
pub fn raising_edge(last: f32, current: f32) -> bool {
    last < current
}

/// Convert a dB value to a linear factor.
#[inline]
pub fn db_to_factor(db: f64) -> f64 {
    (db * std::f64::consts::LN_10 / 20.0).exp()
}

/// Convert a linear factor to dB, clamped below at `min_db` for
/// non-positive input.
#[inline]
pub fn db_from_factor(factor: f64, min_db: f64) -> f64 {
    if factor > 0.0 {
        let db = 20.0 * factor.log10();
        db.max(min_db)
    } else {
        min_db
    }
}

/// Blackman window over [-1, 1], zero outside.
pub fn window_blackman(x: f64) -> f64 {
    use std::f64::consts::PI;
    if x.abs() > 1.0 {
        return 0.0;
    }
    0.42 + 0.5 * (PI * x).cos() + 0.08 * (2.0 * PI * x).cos()
}

/// log2(10) / 20, scales a dB value for [`approx5_exp2`] so that
/// `approx5_exp2(db * LOG2POW20_10) == 10^(db/20)`.
pub const LOG2POW20_10: f64 = 0.166_096_404_744_368_1;

/// Fast 2^x approximation, fifth-order minimax polynomial on the
/// fractional part.
///
/// The exponent splits with round-to-nearest so the polynomial only has
/// to cover [-0.5, 0.5]; relative error stays below 4.7e-6 (about 17.7
/// bits) and vanishes at integer exponents. Good enough for gain
/// smoothing where the exact `exp2` would dominate the control path.
pub fn approx5_exp2(ex: f64) -> f64 {
    let i = ex.round();
    let x = ex - i;
    let frac = 1.0
        + x * (0.693_147_180_559_945_3
            + x * (0.240_226_506_959_100_7
                + x * (0.055_504_108_664_821_58
                    + x * (0.009_618_129_107_628_477
                        + x * 0.001_333_355_814_642_844_3))));
    // 2^i via exponent arithmetic; i is small in all musical uses.
    frac * f64::powi(2.0, i as i32)
}
