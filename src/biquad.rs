//! Resonant second-order filter with a split config / filter-state API.
//!
//! The config side holds the musical parameters (Nyquist-relative corner,
//! resonance gain in dB) and derives the five biquad coefficients lazily
//! through a dirty flag, so audio-rate parameter nudges stay cheap. The
//! filter side is just the coefficient set plus four delay slots.
//!
//! High-pass is designed as the mirrored low-pass: the corner frequency is
//! complemented and the odd coefficients are negated after derivation.

use std::f64::consts::{PI, SQRT_2};

use crate::signal;

/// Filter response type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadType {
    ResonantLowpass,
    ResonantHighpass,
}

/// Gain normalization policy for the resonant designs.
///
/// `Passband` holds the passband at unity and lets the resonance peak rise
/// with gain. `ResonanceGain` holds the response at the corner frequency
/// at unity. `PeakGain` keeps the highest point of the magnitude response
/// at unity regardless of resonance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadNormalize {
    Passband,
    ResonanceGain,
    PeakGain,
}

/// Musical parameters and derived intermediates for one biquad.
#[derive(Debug, Clone)]
pub struct BiquadConfig {
    kind: BiquadType,
    normalize: BiquadNormalize,
    f_fn: f64,
    gain: f64,
    quality: f64,
    k: f64,
    v: f64,
    dirty: bool,
    approx_values: bool,
}

impl BiquadConfig {
    /// New config with default parameters (corner at half Nyquist, 3 dB
    /// gain). The defaults are derived with the approximate gain path, so
    /// call [`setup`](BiquadConfig::setup) before precision matters.
    pub fn new(kind: BiquadType, normalize: BiquadNormalize) -> Self {
        let mut c = BiquadConfig {
            kind,
            normalize,
            f_fn: 0.0,
            gain: 0.0,
            quality: 0.0,
            k: 0.0,
            v: 0.0,
            dirty: true,
            approx_values: false,
        };
        c.setup(0.5, 3.0, 1.0);
        c.approx_values = true;
        c
    }

    /// Exact parameter update. `f_fn` is Nyquist-relative (0 = DC,
    /// 1 = Nyquist), `gain` is the resonance gain in dB. `quality` is
    /// stored for later derivation variants; the resonant designs place
    /// their poles from gain alone.
    ///
    /// # Panics
    /// Panics unless `0 <= f_fn <= 1`.
    pub fn setup(&mut self, f_fn: f64, gain: f64, quality: f64) {
        assert!((0.0..=1.0).contains(&f_fn));

        let f_fn = if self.kind == BiquadType::ResonantHighpass {
            1.0 - f_fn
        } else {
            f_fn
        };
        self.f_fn = f_fn;
        self.gain = gain;
        self.quality = quality;
        self.k = (f_fn * PI / 2.0).tan();
        self.v = 10f64.powf(gain / 20.0);
        self.dirty = true;
        self.approx_values = false;
    }

    /// Audio-rate corner update; skips the exact gain recomputation.
    pub fn approx_freq(&mut self, f_fn: f64) {
        assert!((0.0..=1.0).contains(&f_fn));

        let f_fn = if self.kind == BiquadType::ResonantHighpass {
            1.0 - f_fn
        } else {
            f_fn
        };
        self.f_fn = f_fn;
        self.k = (f_fn * PI / 2.0).tan();
        self.dirty = true;
        self.approx_values = true;
    }

    /// Audio-rate gain update through the fast exp2 approximation.
    pub fn approx_gain(&mut self, gain: f64) {
        self.gain = gain;
        self.v = signal::approx5_exp2(gain * signal::LOG2POW20_10);
        self.dirty = true;
        self.approx_values = true;
    }

    /// Whether the current derived values came from an approximate path.
    pub fn is_approximate(&self) -> bool {
        self.approx_values
    }

    /// Quality as last passed to [`setup`](BiquadConfig::setup).
    pub fn quality(&self) -> f64 {
        self.quality
    }

    fn derive_lpreso(&self) -> [f64; 5] {
        let kk = self.k * self.k;
        // pole placement at -sqrt2_reso +- j
        let sqrt2_reso = 1.0 / self.v;
        let denominator = 1.0 + (self.k + sqrt2_reso) * self.k;

        let r2p_norm = match self.normalize {
            BiquadNormalize::Passband => kk,
            BiquadNormalize::ResonanceGain => kk * sqrt2_reso,
            BiquadNormalize::PeakGain => {
                let r2p = (SQRT_2 * sqrt2_reso - 1.0) / (sqrt2_reso * sqrt2_reso - 0.5);
                if r2p > 1.0 {
                    kk * sqrt2_reso
                } else {
                    kk * r2p * sqrt2_reso
                }
            }
        };

        let xc0 = r2p_norm / denominator;
        [
            xc0,
            2.0 * xc0,
            xc0,
            2.0 * (kk - 1.0) / denominator,
            (1.0 + (self.k - sqrt2_reso) * self.k) / denominator,
        ]
    }
}

/// Biquad coefficients plus delay state.
#[derive(Debug, Clone, Default)]
pub struct BiquadFilter {
    xc0: f64,
    xc1: f64,
    xc2: f64,
    yc1: f64,
    yc2: f64,
    xd1: f64,
    xd2: f64,
    yd1: f64,
    yd2: f64,
}

impl BiquadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull coefficients from `config` if it changed since the last call.
    /// Pass `reset_state` to also clear the delay slots (retrigger).
    pub fn configure(&mut self, config: &mut BiquadConfig, reset_state: bool) {
        if config.dirty {
            let [xc0, xc1, xc2, yc1, yc2] = config.derive_lpreso();
            self.xc0 = xc0;
            self.xc1 = xc1;
            self.xc2 = xc2;
            self.yc1 = yc1;
            self.yc2 = yc2;
            if config.kind == BiquadType::ResonantHighpass {
                self.xc1 = -self.xc1;
                self.yc1 = -self.yc1;
            }
            config.dirty = false;
        }

        if reset_state {
            self.xd1 = 0.0;
            self.xd2 = 0.0;
            self.yd1 = 0.0;
            self.yd2 = 0.0;
        }
    }

    /// Evaluate one block through the difference equation
    /// `y[n] = xc0*x[n] + xc1*x[n-1] + xc2*x[n-2] - yc1*y[n-1] - yc2*y[n-2]`.
    pub fn evaluate(&mut self, x: &[f32], y: &mut [f32]) {
        assert_eq!(x.len(), y.len());

        let (xc0, xc1, xc2) = (self.xc0, self.xc1, self.xc2);
        let (yc1, yc2) = (self.yc1, self.yc2);
        let (mut xd1, mut xd2) = (self.xd1, self.xd2);
        let (mut yd1, mut yd2) = (self.yd1, self.yd2);

        for (xi, yi) in x.iter().zip(y.iter_mut()) {
            let mut k2 = xd2 * xc2;
            let mut k1 = xd1 * xc1;
            xd2 = xd1;
            xd1 = *xi as f64;
            k2 -= yd2 * yc2;
            k1 -= yd1 * yc1;
            yd2 = yd1;
            let k0 = xd1 * xc0;
            yd1 = k2 + k1 + k0;
            *yi = yd1 as f32;
        }

        self.xd1 = xd1;
        self.xd2 = xd2;
        self.yd1 = yd1;
        self.yd2 = yd2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_at(f: &BiquadFilter, omega: f64) -> f64 {
        use num_complex::Complex64;
        let z1 = Complex64::new(0.0, -omega).exp();
        let z2 = z1 * z1;
        let num = Complex64::new(f.xc0, 0.0) + z1 * f.xc1 + z2 * f.xc2;
        let den = Complex64::new(1.0, 0.0) + z1 * f.yc1 + z2 * f.yc2;
        (num / den).norm()
    }

    fn configured(kind: BiquadType, normalize: BiquadNormalize, f_fn: f64, gain: f64) -> BiquadFilter {
        let mut c = BiquadConfig::new(kind, normalize);
        c.setup(f_fn, gain, 1.0);
        let mut f = BiquadFilter::new();
        f.configure(&mut c, true);
        f
    }

    #[test]
    fn passband_lowpass_dc_gain_is_unity() {
        let f = configured(
            BiquadType::ResonantLowpass,
            BiquadNormalize::Passband,
            0.25,
            12.0,
        );
        assert!((response_at(&f, 0.0) - 1.0).abs() < 1e-9);
        // resonance pushes the peak above the passband
        assert!(response_at(&f, 0.25 * PI) > 1.5);
    }

    #[test]
    fn resonance_gain_normalization_pins_corner() {
        let f_fn = 0.3;
        let f = configured(
            BiquadType::ResonantLowpass,
            BiquadNormalize::ResonanceGain,
            f_fn,
            18.0,
        );
        let at_corner = response_at(&f, f_fn * PI);
        assert!(
            (at_corner - 1.0).abs() < 0.05,
            "corner gain {at_corner} should be near unity"
        );
    }

    #[test]
    fn peak_gain_normalization_bounds_response() {
        for gain in [0.0, 6.0, 12.0, 24.0] {
            let f = configured(
                BiquadType::ResonantLowpass,
                BiquadNormalize::PeakGain,
                0.25,
                gain,
            );
            let mut peak = 0.0f64;
            let mut w = 0.0;
            while w < PI {
                peak = peak.max(response_at(&f, w));
                w += 0.001;
            }
            assert!(peak < 1.1, "gain {gain} dB: peak {peak} exceeds unity bound");
        }
    }

    #[test]
    fn highpass_mirrors_lowpass() {
        let lp = configured(
            BiquadType::ResonantLowpass,
            BiquadNormalize::Passband,
            0.25,
            6.0,
        );
        let hp = configured(
            BiquadType::ResonantHighpass,
            BiquadNormalize::Passband,
            0.75,
            6.0,
        );
        for w in [0.1, 0.5, 1.0, 2.0] {
            let a = response_at(&lp, w);
            let b = response_at(&hp, PI - w);
            assert!((a - b).abs() < 1e-9, "mirror mismatch at {w}: {a} vs {b}");
        }
    }

    #[test]
    fn approx_gain_tracks_exact_setup() {
        let mut exact = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        exact.setup(0.25, 9.0, 1.0);
        let mut approx = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        approx.setup(0.25, 0.0, 1.0);
        approx.approx_gain(9.0);
        assert!(approx.is_approximate());
        // bounded by the fast exp2 path's worst-case relative error
        assert!(((approx.v - exact.v) / exact.v).abs() < 4.7e-6);
    }

    #[test]
    fn dirty_flag_skips_rederivation() {
        let mut c = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        c.setup(0.25, 6.0, 1.0);
        let mut f = BiquadFilter::new();
        f.configure(&mut c, true);
        let xc0 = f.xc0;

        // poking the coefficient and re-configuring with a clean config
        // must not overwrite it
        f.xc0 = 0.123;
        f.configure(&mut c, false);
        assert_eq!(f.xc0, 0.123);

        c.setup(0.25, 6.0, 1.0);
        f.configure(&mut c, false);
        assert!((f.xc0 - xc0).abs() < 1e-15);
    }

    #[test]
    fn state_reset_is_optional() {
        let mut c = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        c.setup(0.2, 6.0, 1.0);
        let mut f = BiquadFilter::new();
        f.configure(&mut c, true);

        let x: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).sin()).collect();
        let mut y = vec![0.0f32; 64];
        f.evaluate(&x, &mut y);
        assert!(f.yd1 != 0.0);

        c.approx_freq(0.21);
        f.configure(&mut c, false);
        assert!(f.yd1 != 0.0, "state must survive configure without reset");

        f.configure(&mut c, true);
        assert_eq!(f.yd1, 0.0);
    }

    #[test]
    fn lowpass_attenuates_high_frequencies() {
        let mut c = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        c.setup(0.1, 0.0, 1.0);
        let mut f = BiquadFilter::new();
        f.configure(&mut c, true);

        // high-frequency alternation should come out strongly attenuated
        let x: Vec<f32> = (0..512).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let mut y = vec![0.0f32; 512];
        f.evaluate(&x, &mut y);
        let tail_rms: f64 = (y[256..].iter().map(|&v| (v as f64).powi(2)).sum::<f64>() / 256.0).sqrt();
        assert!(tail_rms < 0.05, "tail rms {tail_rms}");
    }
}
