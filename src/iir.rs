//! Arbitrary-order recursive filter state and block evaluation.
//!
//! The evaluator runs a direct-form canonical recursion over `f32` sample
//! streams with `f64` state, so cascading high-order filters stays stable
//! at audio block rates. Coefficients come from [`crate::design`]; the
//! denominator is stored negated so the inner loop is all multiply-adds.

/// State of an order-N recursive filter.
///
/// `a` holds the numerator, `b` the negated denominator, `w` the delay
/// line. [`change`](IirFilter::change) swaps coefficients while keeping
/// the delay line intact, which is what a modulated filter needs to avoid
/// clicking on every coefficient update.
#[derive(Debug, Clone)]
pub struct IirFilter {
    order: usize,
    a: Vec<f64>,
    b: Vec<f64>,
    w: Vec<f64>,
}

impl IirFilter {
    /// Create a filter with all-zero history from design coefficients.
    ///
    /// # Panics
    /// Panics if `order == 0`, the coefficient slices are shorter than
    /// `order + 1`, or the denominator is not normalized (`b[0] != 1`).
    pub fn with_coefficients(order: usize, a: &[f64], b: &[f64]) -> Self {
        assert!(order > 0);
        let mut f = IirFilter {
            order: 0,
            a: Vec::new(),
            b: Vec::new(),
            w: Vec::new(),
        };
        f.setup(order, a, b);
        f
    }

    /// (Re)initialize coefficients and reset the delay line.
    pub fn setup(&mut self, order: usize, a: &[f64], b: &[f64]) {
        assert!(order > 0);
        assert!((b[0] - 1.0).abs() < 1e-14, "denominator must be normalized");

        self.order = order;
        self.a.clear();
        self.a.extend_from_slice(&a[..=order]);
        self.b.clear();
        self.b.extend(b[..=order].iter().map(|&v| -v));
        self.w.clear();
        self.w.resize((order + 1) * 2, 0.0);
    }

    /// Replace the coefficients, preserving the delay line when the order
    /// is unchanged. A different order forces a full [`setup`]
    /// (no state mapping between delay lines of different length exists).
    ///
    /// [`setup`]: IirFilter::setup
    pub fn change(&mut self, order: usize, a: &[f64], b: &[f64]) {
        assert!(order > 0);

        if self.order != order {
            self.setup(order, a, b);
            return;
        }
        assert!((b[0] - 1.0).abs() < 1e-14, "denominator must be normalized");

        self.a.copy_from_slice(&a[..=order]);
        for (dst, &src) in self.b.iter_mut().zip(b[..=order].iter()) {
            *dst = -src;
        }
        // w untouched
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Zero the delay line without touching the coefficients.
    pub fn reset(&mut self) {
        self.w.fill(0.0);
    }

    /// The delay line. Exposed so stream processors can inspect and heal
    /// filter state that has gone denormal or divergent.
    pub fn history(&self) -> &[f64] {
        &self.w
    }

    pub fn history_mut(&mut self) -> &mut [f64] {
        &mut self.w
    }

    #[inline]
    fn step(&mut self, x: f64) -> f64 {
        let n = self.order;
        let a = &self.a;
        let b = &self.b;
        let w = &mut self.w;

        let y = x * a[0] + w[0];
        let mut v = x * a[n] + y * b[n];
        for k in (1..n).rev() {
            let t = w[k];
            w[k] = v;
            v = t + x * a[k] + y * b[k];
        }
        w[0] = v;
        y
    }

    /// Evaluate one block; `x` and `y` may alias in length only, both
    /// slices must be the same size.
    pub fn evaluate(&mut self, x: &[f32], y: &mut [f32]) {
        assert_eq!(x.len(), y.len());
        for (xi, yi) in x.iter().zip(y.iter_mut()) {
            *yi = self.step(*xi as f64) as f32;
        }
    }

    /// Evaluate a block in place.
    pub fn evaluate_in_place(&mut self, xy: &mut [f32]) {
        for v in xy.iter_mut() {
            *v = self.step(*v as f64) as f32;
        }
    }

    /// Feed a single sample and return the filtered value as `f64`,
    /// keeping full precision for callers that interpolate outputs.
    #[inline]
    pub fn push(&mut self, x: f64) -> f64 {
        self.step(x)
    }
}
