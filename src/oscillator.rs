//! Table-lookup oscillator with band-limit tracking and pulse-width
//! modulation.
//!
//! The oscillator walks a [`TablePhase`] through the table served by an
//! [`OscTable`] for its current effective frequency, re-looking the wave
//! up whenever modulation pushes the frequency outside the table's
//! validity range. Output is linearly interpolated; a pulse variant
//! takes the difference of two reads of a falling-saw table a duty-cycle
//! phase offset apart and re-normalizes so any duty cycle stays within
//! +-1.
//!
//! Like the wavetable engine, the per-block entry point keys a single
//! generic inner loop on which inputs are connected and only resets the
//! per-mode level trackers when that connectivity changes.

use std::sync::Arc;

use tracing::trace;

use crate::osctable::{OscTable, OscWave};
use crate::phase::TablePhase;
use crate::signal;

const SIGNAL_LEVEL_INVAL: f32 = -2.0;

const MODE_SYNC: u32 = 1;
const MODE_FREQ: u32 = 2;
const MODE_MOD: u32 = 4;
const MODE_EXP_FM: u32 = 8;
const MODE_PWM: u32 = 16;

/// Oscillator parameters; applied with [`Osc::config`].
#[derive(Clone)]
pub struct OscConfig {
    pub table: Arc<OscTable>,
    /// Frequency played when no frequency input is connected.
    pub cfreq: f64,
    /// Pulse duty cycle in [0, 1]; only meaningful for the pulse entry
    /// point.
    pub pulse_width: f64,
    pub pulse_mod_strength: f64,
    pub fm_strength: f64,
    pub exponential_fm: bool,
    /// Phase feedback of the previous output sample.
    pub self_fm_strength: f64,
    pub transpose_factor: f64,
    /// Fine tune in cents.
    pub fine_tune: i32,
}

pub struct Osc {
    mix_freq: f64,
    config: OscConfig,
    /// transpose * fine tune, folded into one factor.
    tune_factor: f64,
    wave: OscWave,
    phase: TablePhase,
    step: u32,
    last_mode: u32,
    last_sync_level: f32,
    last_freq_level: f32,
    last_mod_level: f32,
    last_pwm_level: f32,
    last_value: f32,
    pwm_offset: u32,
    pwm_center: f32,
    pwm_scale: f32,
}

impl Osc {
    pub fn new(mix_freq: f64, config: OscConfig) -> Self {
        assert!(mix_freq > 0.0);
        assert!((0.0..=1.0).contains(&config.pulse_width));

        let tune_factor =
            config.transpose_factor * 2f64.powf(config.fine_tune as f64 / 1200.0);
        let freq = config.cfreq * tune_factor;
        let wave = config.table.lookup(freq);
        let phase = TablePhase::new(wave.n_values, 0.0);
        let mut osc = Osc {
            mix_freq,
            config,
            tune_factor,
            wave,
            phase,
            step: 0,
            last_mode: 0,
            last_sync_level: 0.0,
            last_freq_level: SIGNAL_LEVEL_INVAL,
            last_mod_level: 0.0,
            last_pwm_level: 0.0,
            last_value: 0.0,
            pwm_offset: 0,
            pwm_center: 0.0,
            pwm_scale: 1.0,
        };
        osc.update_step(freq);
        osc.update_pwm_offset(0.0);
        osc
    }

    /// Apply new parameters, keeping the running phase.
    pub fn config(&mut self, config: OscConfig) {
        self.config = config;
        self.tune_factor = self.config.transpose_factor
            * 2f64.powf(self.config.fine_tune as f64 / 1200.0);
        let freq = self.config.cfreq * self.tune_factor;
        self.wave = self.config.table.lookup(freq);
        self.phase = self.phase.retarget(self.wave.n_values);
        self.last_freq_level = SIGNAL_LEVEL_INVAL;
        self.update_step(freq);
        self.update_pwm_offset(self.last_pwm_level);
    }

    /// Rewind the phase and invalidate all level trackers.
    pub fn reset(&mut self) {
        self.phase.set_fraction(0.0);
        self.last_mode = 0;
        self.last_sync_level = 0.0;
        self.last_freq_level = SIGNAL_LEVEL_INVAL;
        self.last_mod_level = 0.0;
        self.last_pwm_level = 0.0;
        self.last_value = 0.0;
    }

    /// Current period fraction in [0, 1).
    pub fn phase_fraction(&self) -> f64 {
        self.phase.fraction()
    }

    fn update_step(&mut self, freq: f64) {
        if freq <= self.wave.min_freq || freq > self.wave.max_freq {
            trace!(freq, "wave re-lookup");
            self.wave = self.config.table.lookup(freq);
            self.phase = self.phase.retarget(self.wave.n_values);
        }
        self.step = TablePhase::freq_to_step(freq, self.mix_freq);
    }

    fn effective_freq<const FREQ: bool, const MOD: bool, const EXP: bool>(&self) -> f64 {
        let base = if FREQ {
            signal::signal_to_freq(self.last_freq_level)
        } else {
            self.config.cfreq
        } * self.tune_factor;
        if MOD {
            if EXP {
                base * signal::approx5_exp2(
                    self.config.fm_strength * self.last_mod_level as f64,
                )
            } else {
                base * (1.0 + self.config.fm_strength * self.last_mod_level as f64)
            }
        } else {
            base
        }
        .max(0.0)
    }

    /// Derive pulse offset, center and scale for the current duty cycle.
    ///
    /// The pulse wave is `saw(x) - saw(x + offset)`; its excursion range
    /// is asymmetric and shrinks toward zero at the duty extremes.
    /// Candidate positions at the table extrema (shifted both ways by
    /// the offset) bracket the true min/max, which gives the
    /// center/scale mapping onto +-1. Near-zero excursions fall back to
    /// a fixed +-1 center instead of dividing by the vanishing range.
    fn update_pwm_offset(&mut self, pulse_mod: f32) {
        let pw = (self.config.pulse_width
            + pulse_mod as f64 * self.config.pulse_mod_strength)
            .clamp(0.0, 1.0);
        self.pwm_offset = (pw * 4294967296.0) as u32;

        let n = self.wave.n_values;
        let d = (pw * n as f64) as usize;
        let at = |i: usize| self.wave.values[i % n];
        // offset read minus direct read keeps the high time at `pw` of
        // the period for the falling-saw source
        let pulse = |x: usize| at(x + d) - at(x);

        let candidates = [
            self.wave.max_pos,
            self.wave.min_pos,
            (self.wave.max_pos + n - d % n) % n,
            (self.wave.min_pos + n - d % n) % n,
        ];
        let mut pmin = f32::INFINITY;
        let mut pmax = f32::NEG_INFINITY;
        for &x in &candidates {
            let p = pulse(x);
            pmin = pmin.min(p);
            pmax = pmax.max(p);
        }

        let center = -(pmin + pmax) / 2.0;
        let hi = (pmin + center).abs().max((pmax + center).abs());
        if hi > 1e-6 {
            self.pwm_center = center;
            self.pwm_scale = 1.0 / hi;
        } else {
            // degenerate duty cycle: constant low or high
            self.pwm_center = if pw < 0.5 { -1.0 } else { 1.0 };
            self.pwm_scale = 1.0;
        }
    }

    #[inline]
    fn table_read(&self, phase: TablePhase) -> f32 {
        let i = phase.index();
        let a = self.wave.values[i];
        let b = self.wave.values[i + 1];
        a + (b - a) * phase.frac() as f32
    }

    #[allow(clippy::too_many_arguments)]
    fn process_block<
        const SYNC: bool,
        const FREQ: bool,
        const MOD: bool,
        const EXP: bool,
        const PULSE: bool,
        const PWM: bool,
    >(
        &mut self,
        freq_in: &[f32],
        mod_in: &[f32],
        sync_in: &[f32],
        pwm_in: &[f32],
        out: &mut [f32],
        mut sync_out: Option<&mut [f32]>,
    ) {
        for i in 0..out.len() {
            if SYNC {
                let s = sync_in[i];
                if signal::raising_edge(self.last_sync_level, s) {
                    self.phase.set_fraction(0.0);
                }
                self.last_sync_level = s;
            }
            if FREQ && signal::freq_changed(self.last_freq_level, freq_in[i]) {
                self.last_freq_level = freq_in[i];
                let f = self.effective_freq::<FREQ, MOD, EXP>();
                self.update_step(f);
            }
            if MOD && signal::mod_changed(self.last_mod_level, mod_in[i]) {
                self.last_mod_level = mod_in[i];
                let f = self.effective_freq::<FREQ, MOD, EXP>();
                self.update_step(f);
            }
            if PWM && signal::mod_changed(self.last_pwm_level, pwm_in[i]) {
                self.last_pwm_level = pwm_in[i];
                self.update_pwm_offset(self.last_pwm_level);
            }

            let value = if PULSE {
                let p = self.table_read(self.phase.offset_by(self.pwm_offset))
                    - self.table_read(self.phase);
                (p + self.pwm_center) * self.pwm_scale
            } else {
                self.table_read(self.phase)
            };
            self.last_value = value;
            out[i] = value;

            let advance = if self.config.self_fm_strength != 0.0 {
                let factor = 1.0 + value as f64 * self.config.self_fm_strength;
                (self.step as f64 * factor.max(0.0)) as u32
            } else {
                self.step
            };
            let before = self.phase;
            self.phase.advance(advance);
            if let Some(so) = sync_out.as_deref_mut() {
                so[i] = if self.phase.wrapped_from(before) { 1.0 } else { 0.0 };
            }
        }
    }

    fn adapt_mode(&mut self, mode: u32, freq_connected: bool) {
        if mode == self.last_mode {
            return;
        }
        let mask = self.last_mode ^ mode;
        if mask & MODE_SYNC != 0 {
            self.last_sync_level = 0.0;
        }
        if mask & MODE_FREQ != 0 {
            if freq_connected {
                self.last_freq_level = SIGNAL_LEVEL_INVAL;
            } else {
                let f = self.config.cfreq * self.tune_factor;
                self.update_step(f);
            }
        }
        if mask & MODE_MOD != 0 {
            self.last_mod_level = 0.0;
            if !freq_connected {
                let f = self.config.cfreq * self.tune_factor;
                self.update_step(f);
            }
        }
        if mask & MODE_PWM != 0 {
            self.last_pwm_level = 0.0;
            self.update_pwm_offset(0.0);
        }
        self.last_mode = mode;
    }

    fn mode_bits(
        &self,
        freq_in: Option<&[f32]>,
        mod_in: Option<&[f32]>,
        sync_in: Option<&[f32]>,
        pwm_in: Option<&[f32]>,
    ) -> u32 {
        let mut mode = 0;
        if sync_in.is_some() {
            mode |= MODE_SYNC;
        }
        if freq_in.is_some() {
            mode |= MODE_FREQ;
        }
        if mod_in.is_some() {
            mode |= MODE_MOD;
        }
        if self.config.exponential_fm {
            mode |= MODE_EXP_FM;
        }
        if pwm_in.is_some() {
            mode |= MODE_PWM;
        }
        mode
    }

    /// Render one block of the plain waveform. `sync_out` (if given)
    /// carries a 1.0 pulse on every sample whose phase wrapped.
    pub fn process(
        &mut self,
        freq_in: Option<&[f32]>,
        mod_in: Option<&[f32]>,
        sync_in: Option<&[f32]>,
        out: &mut [f32],
        sync_out: Option<&mut [f32]>,
    ) {
        assert!(!out.is_empty());
        let mode = self.mode_bits(freq_in, mod_in, sync_in, None);
        self.adapt_mode(mode, freq_in.is_some());

        let fi = freq_in.unwrap_or(&[]);
        let mi = mod_in.unwrap_or(&[]);
        let si = sync_in.unwrap_or(&[]);
        match (
            mode & MODE_SYNC != 0,
            mode & MODE_FREQ != 0,
            mode & MODE_MOD != 0,
            mode & MODE_EXP_FM != 0,
        ) {
            // without FM input the exponential flag is irrelevant
            (false, false, false, _) => {
                self.process_block::<false, false, false, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (false, false, true, false) => {
                self.process_block::<false, false, true, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (false, false, true, true) => {
                self.process_block::<false, false, true, true, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (false, true, false, _) => {
                self.process_block::<false, true, false, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (false, true, true, false) => {
                self.process_block::<false, true, true, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (false, true, true, true) => {
                self.process_block::<false, true, true, true, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (true, false, false, _) => {
                self.process_block::<true, false, false, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (true, false, true, false) => {
                self.process_block::<true, false, true, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (true, false, true, true) => {
                self.process_block::<true, false, true, true, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (true, true, false, _) => {
                self.process_block::<true, true, false, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (true, true, true, false) => {
                self.process_block::<true, true, true, false, false, false>(fi, mi, si, &[], out, sync_out)
            }
            (true, true, true, true) => {
                self.process_block::<true, true, true, true, false, false>(fi, mi, si, &[], out, sync_out)
            }
        }
    }

    /// Render one block of the pulse waveform; the table must be a
    /// `PulseSaw` set. `pwm_in` modulates the duty cycle around the
    /// configured pulse width.
    #[allow(clippy::too_many_arguments)]
    pub fn process_pulse(
        &mut self,
        freq_in: Option<&[f32]>,
        mod_in: Option<&[f32]>,
        sync_in: Option<&[f32]>,
        pwm_in: Option<&[f32]>,
        out: &mut [f32],
        sync_out: Option<&mut [f32]>,
    ) {
        assert!(!out.is_empty());
        let mode = self.mode_bits(freq_in, mod_in, sync_in, pwm_in) | MODE_PWM;
        // the pulse entry always derives its offset state, connected
        // modulation or not
        self.adapt_mode(mode, freq_in.is_some());

        let fi = freq_in.unwrap_or(&[]);
        let mi = mod_in.unwrap_or(&[]);
        let si = sync_in.unwrap_or(&[]);
        let pi = pwm_in.unwrap_or(&[]);
        let pwm = !pi.is_empty();
        match (
            mode & MODE_SYNC != 0,
            mode & MODE_FREQ != 0,
            mode & MODE_MOD != 0,
            mode & MODE_EXP_FM != 0,
        ) {
            (false, false, false, _) => {
                self.pulse_block::<false, false, false, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (false, false, true, false) => {
                self.pulse_block::<false, false, true, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (false, false, true, true) => {
                self.pulse_block::<false, false, true, true>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (false, true, false, _) => {
                self.pulse_block::<false, true, false, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (false, true, true, false) => {
                self.pulse_block::<false, true, true, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (false, true, true, true) => {
                self.pulse_block::<false, true, true, true>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (true, false, false, _) => {
                self.pulse_block::<true, false, false, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (true, false, true, false) => {
                self.pulse_block::<true, false, true, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (true, false, true, true) => {
                self.pulse_block::<true, false, true, true>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (true, true, false, _) => {
                self.pulse_block::<true, true, false, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (true, true, true, false) => {
                self.pulse_block::<true, true, true, false>(pwm, fi, mi, si, pi, out, sync_out)
            }
            (true, true, true, true) => {
                self.pulse_block::<true, true, true, true>(pwm, fi, mi, si, pi, out, sync_out)
            }
        }
    }

    /// Pulse inner loop with the pwm-input connectivity resolved to a
    /// compile-time flag.
    #[allow(clippy::too_many_arguments)]
    fn pulse_block<const SYNC: bool, const FREQ: bool, const MOD: bool, const EXP: bool>(
        &mut self,
        pwm_connected: bool,
        freq_in: &[f32],
        mod_in: &[f32],
        sync_in: &[f32],
        pwm_in: &[f32],
        out: &mut [f32],
        sync_out: Option<&mut [f32]>,
    ) {
        if pwm_connected {
            self.process_block::<SYNC, FREQ, MOD, EXP, true, true>(
                freq_in, mod_in, sync_in, pwm_in, out, sync_out,
            )
        } else {
            self.process_block::<SYNC, FREQ, MOD, EXP, true, false>(
                freq_in, mod_in, sync_in, pwm_in, out, sync_out,
            )
        }
    }
}
