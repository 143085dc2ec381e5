//! Fixed-point phase accumulators for the oscillator engines.
//!
//! Two flavours exist. [`StepPhase`] is a 16.16 accumulator that counts
//! fractional source samples for the wavetable engine: each output sample
//! adds a quantized step and consumes the resulting whole-sample
//! crossings. [`TablePhase`] is a full 32-bit wrapping accumulator for the
//! table oscillator: a table of power-of-two length owns the top bits, the
//! remaining bits are the intra-slot fraction, and `u32` wraparound is
//! exactly the phase wrap.
//!
//! Both types exist so the step semantics live in one place instead of
//! being re-derived with raw shifts and masks at every call site.

/// Fractional bits of [`StepPhase`].
pub const FRAC_SHIFT: u32 = 16;
const FRAC_MASK: u32 = (1 << FRAC_SHIFT) - 1;

/// 16.16 fixed-point step accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepPhase {
    acc: u32,
}

impl StepPhase {
    pub fn new() -> Self {
        StepPhase { acc: 0 }
    }

    /// Quantize a floating-point samples-per-output step to 16.16.
    /// Comparing quantized steps is the hysteresis used to decide whether
    /// a modulation change is material.
    #[inline]
    pub fn quantize_step(step: f64) -> u32 {
        (step * (1 << FRAC_SHIFT) as f64 + 0.5) as u32
    }

    /// Add a quantized step.
    #[inline]
    pub fn advance(&mut self, istep: u32) {
        self.acc = self.acc.wrapping_add(istep);
    }

    /// Consume and return the whole source samples crossed so far,
    /// leaving only the fractional part in the accumulator.
    #[inline]
    pub fn take_whole(&mut self) -> u32 {
        let whole = self.acc >> FRAC_SHIFT;
        self.acc &= FRAC_MASK;
        whole
    }

    /// Fractional position within the current source sample, in [0, 1).
    #[inline]
    pub fn frac(&self) -> f64 {
        (self.acc & FRAC_MASK) as f64 / (1u32 << FRAC_SHIFT) as f64
    }

    pub fn reset(&mut self) {
        self.acc = 0;
    }
}

/// 32-bit wrapping phase for power-of-two lookup tables.
///
/// A full period is always `1 << 32` regardless of table length, so the
/// per-sample step for frequency `f` at mixing frequency `m` is
/// `f / m * 2^32` and never depends on which table is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePhase {
    pos: u32,
    frac_bits: u32,
}

impl TablePhase {
    /// Phase at `fraction` (in [0, 1)) of a period, addressing a table of
    /// `table_len` slots.
    ///
    /// # Panics
    /// Panics unless `table_len` is a power of two (>= 2).
    pub fn new(table_len: usize, fraction: f64) -> Self {
        assert!(table_len >= 2 && table_len.is_power_of_two());

        let frac_bits = 32 - (table_len as u32 - 1).ilog2() - 1;
        TablePhase {
            pos: Self::pos_from_fraction(fraction),
            frac_bits,
        }
    }

    #[inline]
    fn pos_from_fraction(fraction: f64) -> u32 {
        let wrapped = fraction - fraction.floor();
        (wrapped * 4294967296.0) as u32
    }

    /// Quantized per-sample step for `freq` Hz at `mix_freq`.
    #[inline]
    pub fn freq_to_step(freq: f64, mix_freq: f64) -> u32 {
        (freq / mix_freq * 4294967296.0 + 0.5) as u32
    }

    /// Advance one sample; wrapping is the period boundary.
    #[inline]
    pub fn advance(&mut self, step: u32) {
        self.pos = self.pos.wrapping_add(step);
    }

    /// Whether the last [`advance`](TablePhase::advance) by `step` wrapped
    /// the period, given the position before the advance.
    #[inline]
    pub fn wrapped_from(&self, previous: TablePhase) -> bool {
        self.pos < previous.pos
    }

    /// Index of the current table slot.
    #[inline]
    pub fn index(&self) -> usize {
        (self.pos >> self.frac_bits) as usize
    }

    /// Interpolation weight toward the next slot, in [0, 1).
    #[inline]
    pub fn frac(&self) -> f64 {
        let mask = (1u32 << self.frac_bits) - 1;
        (self.pos & mask) as f64 / (1u64 << self.frac_bits) as f64
    }

    /// The same phase shifted by `delta` phase units, wrapping at the
    /// period. Used for the pulse oscillator's phase-offset second read.
    #[inline]
    pub fn offset_by(&self, delta: u32) -> TablePhase {
        TablePhase {
            pos: self.pos.wrapping_add(delta),
            frac_bits: self.frac_bits,
        }
    }

    /// Period fraction in [0, 1); survives switching to a table of a
    /// different length.
    #[inline]
    pub fn fraction(&self) -> f64 {
        self.pos as f64 / 4294967296.0
    }

    /// Re-address the same period fraction for a different table length.
    pub fn retarget(&self, table_len: usize) -> TablePhase {
        let mut p = TablePhase::new(table_len, 0.0);
        p.pos = self.pos;
        p
    }

    pub fn set_fraction(&mut self, fraction: f64) {
        self.pos = Self::pos_from_fraction(fraction);
    }
}
