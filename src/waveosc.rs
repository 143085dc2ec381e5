//! Anti-aliased wavetable oscillator.
//!
//! The oscillator streams a [`WaveChunk`] at an arbitrary playback pitch.
//! Source samples are zero-padded 2x and pushed through a Chebyshev
//! type 2 low-pass whose corner tracks the playback step, so reading the
//! chunk faster than 1:1 never folds energy back below Nyquist. Each
//! output sample linearly interpolates the two most recent filter
//! outputs at the fractional phase.
//!
//! The per-block entry point adapts to which modulation inputs are
//! connected (sync, frequency, linear/exponential FM) and monomorphizes
//! one generic inner loop per combination instead of branching per
//! sample.
//!
//! Numerical safety: after every processed block the filter state is
//! checked against the valid signal range and forcibly clamped to +-1 or
//! zero if it diverged or went denormal. Extreme FM can push an IIR this
//! steep into instability; a clamped click is recoverable, a runaway
//! filter is not.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::design;
use crate::iir::IirFilter;
use crate::phase::StepPhase;
use crate::signal;
use crate::wavechunk::{BlockRef, ChunkSelector, WaveChunk, PADDING};

/// Order of the anti-aliasing filter.
pub const FILTER_ORDER: usize = 8;

const ZERO_PADDING: u32 = 2;
const SIGNAL_LEVEL_INVAL: f32 = -2.0;

const MODE_SYNC: u32 = 1;
const MODE_FREQ: u32 = 2;
const MODE_MOD: u32 = 4;
const MODE_EXP_FM: u32 = 8;

/// Oscillator configuration; applied with [`WaveOsc::config`].
#[derive(Clone)]
pub struct WaveOscConfig {
    pub start_offset: i64,
    pub play_dir: i32,
    pub channel: usize,
    /// Frequency played when no frequency input is connected.
    pub cfreq: f64,
    pub fm_strength: f64,
    pub exponential_fm: bool,
    pub selector: Arc<dyn ChunkSelector + Send + Sync>,
}

pub struct WaveOsc {
    mix_freq: f64,
    config: WaveOscConfig,
    block: Option<BlockRef>,
    loops_left: usize,
    filter: IirFilter,
    step_factor: f64,
    istep: u32,
    phase: StepPhase,
    pad_parity: u32,
    prev_out: f64,
    cur_out: f64,
    last_mode: u32,
    last_sync_level: f32,
    last_freq_level: f32,
    last_mod_level: f32,
    done: bool,
}

impl WaveOsc {
    /// Create an oscillator bound to the engine sample rate and acquire
    /// the initial chunk for the configured frequency.
    pub fn new(mix_freq: f64, config: WaveOscConfig) -> Self {
        const { assert!(FILTER_ORDER <= PADDING) };
        assert!(mix_freq > 0.0);
        assert!(config.play_dir == 1 || config.play_dir == -1);

        let ident = {
            // identity design until the first retrigger installs real
            // coefficients
            let mut a = [0.0; FILTER_ORDER + 1];
            let mut b = [0.0; FILTER_ORDER + 1];
            a[0] = 1.0;
            b[0] = 1.0;
            IirFilter::with_coefficients(FILTER_ORDER, &a, &b)
        };
        let mut osc = WaveOsc {
            mix_freq,
            config,
            block: None,
            loops_left: 0,
            filter: ident,
            step_factor: 0.0,
            istep: 0,
            phase: StepPhase::new(),
            pad_parity: 0,
            prev_out: 0.0,
            cur_out: 0.0,
            last_mode: 0,
            last_sync_level: 0.0,
            last_freq_level: SIGNAL_LEVEL_INVAL,
            last_mod_level: 0.0,
            done: false,
        };
        osc.retrigger(osc.config.cfreq);
        osc
    }

    /// Apply a new configuration. Changing the selector or channel drops
    /// the current chunk and retriggers; changing only `cfreq` or the
    /// start offset retriggers in place; play direction and FM strength
    /// update without disturbing playback.
    pub fn config(&mut self, config: WaveOscConfig) {
        let same_source = Arc::ptr_eq(&self.config.selector, &config.selector)
            && self.config.channel == config.channel;

        if !same_source {
            self.block = None;
            self.config = config;
            self.retrigger(self.config.cfreq);
            self.last_sync_level = self.last_sync_level.min(0.0);
        } else {
            self.config.play_dir = config.play_dir;
            self.config.fm_strength = config.fm_strength;
            self.config.exponential_fm = config.exponential_fm;
            if self.config.cfreq != config.cfreq || self.config.start_offset != config.start_offset
            {
                self.config.start_offset = config.start_offset;
                self.config.cfreq = config.cfreq;
                self.retrigger(self.config.cfreq);
                self.last_sync_level = self.last_sync_level.min(0.0);
            }
        }
    }

    /// Return to the just-configured state: filter rebuilt and cleared,
    /// level trackers invalidated, `done` rescinded.
    pub fn reset(&mut self) {
        self.set_filter(self.config.cfreq, true);
        self.last_mode = 0;
        self.last_sync_level = 0.0;
        self.last_freq_level = SIGNAL_LEVEL_INVAL;
        self.last_mod_level = 0.0;
        self.done = false;
    }

    /// Restart playback: release the current block, pick the chunk for
    /// `base_freq`, seek to the configured start offset and rebuild the
    /// anti-aliasing filter with cleared state.
    pub fn retrigger(&mut self, base_freq: f64) {
        self.block = None;
        let chunk = self.config.selector.chunk_for_freq(base_freq);
        self.loops_left = chunk.loop_spec.map_or(0, |l| l.count);
        trace!(
            want = base_freq,
            got = chunk.osc_freq,
            length = chunk.n_frames(),
            "wave lookup"
        );
        self.block = Some(chunk.use_block(
            self.config.play_dir,
            self.config.start_offset,
            self.loops_left,
        ));

        self.last_freq_level = signal::signal_from_freq(base_freq);
        self.last_mod_level = 0.0;
        self.set_filter(base_freq, true);
    }

    fn chunk(&self) -> Option<&Arc<WaveChunk>> {
        self.block.as_ref().map(|b| b.chunk())
    }

    /// Rebuild the anti-aliasing filter for `play_freq`.
    ///
    /// The corner and stop frequencies scale with the inverse playback
    /// step, clamped between the spectrum half of the zero-padded stream
    /// and an empirical stability limit of 6x the padding. The filter is
    /// only re-designed when the quantized fixed-point step actually
    /// changes, so audio-rate modulation that stays within one step
    /// quantum costs nothing.
    pub fn set_filter(&mut self, play_freq: f64, clear_state: bool) {
        assert!(play_freq > 0.0);

        let Some(chunk) = self.chunk().cloned() else {
            return;
        };
        self.step_factor =
            ZERO_PADDING as f64 * chunk.mix_freq / (chunk.osc_freq * self.mix_freq);
        let step = self.step_factor * play_freq;
        let istep = StepPhase::quantize_step(step);

        if istep != self.istep {
            let empiric_filter_stability_limit = 6.0;
            let nyquist_fact = std::f64::consts::PI * 2.0 / self.mix_freq;
            let (cutoff_freq, stop_freq) = (18000.0, 24000.0);
            let filt_fact = (1.0 / step).clamp(
                1.0 / (empiric_filter_stability_limit * ZERO_PADDING as f64),
                1.0 / ZERO_PADDING as f64, // spectrum half
            );
            let freq_c = cutoff_freq * nyquist_fact * filt_fact;
            let freq_r = stop_freq * nyquist_fact * filt_fact;

            self.istep = istep;
            let mut d = design::tscheb2_lp(FILTER_ORDER, freq_c, freq_r / freq_c, 0.18);
            for v in d.a.iter_mut() {
                // compensate the energy removed by zero-padding
                *v *= ZERO_PADDING as f64;
            }
            self.filter.change(FILTER_ORDER, &d.a, &d.b);
            debug!(
                fc = freq_c / std::f64::consts::PI * 2.0,
                fr = freq_r / std::f64::consts::PI * 2.0,
                step,
                istep,
                "rebuilt anti-aliasing filter"
            );
        }

        if clear_state {
            self.filter.reset();
            self.phase.reset();
            self.pad_parity = 0;
            self.prev_out = 0.0;
            self.cur_out = 0.0;
        }
    }

    /// Current playback offset in frames of the active chunk.
    pub fn cur_pos(&self) -> i64 {
        match &self.block {
            Some(b) => b.offset,
            None => self.config.start_offset,
        }
    }

    /// True once playback ran off a non-looping chunk and only silence
    /// remains; callers use this to release the voice.
    pub fn done(&self) -> bool {
        self.done
    }

    fn next_source_sample(&mut self) -> f32 {
        let channel = self.config.channel;
        loop {
            let Some(block) = self.block.as_mut() else {
                return 0.0;
            };
            if let Some(v) = block.step(channel) {
                return v;
            }
            // boundary crossing: exchange this guard for its successor
            let next = block.next_offset();
            let dir = block.play_dir;
            let wrapped = (dir > 0 && next < block.offset) || (dir < 0 && next > block.offset);
            let chunk = Arc::clone(block.chunk());
            if wrapped && self.loops_left > 0 {
                self.loops_left -= 1;
            }
            self.block = Some(chunk.use_block(dir, next, self.loops_left));
        }
    }

    #[inline]
    fn next_virtual_sample(&mut self) -> f64 {
        let parity = self.pad_parity;
        self.pad_parity += 1;
        if self.pad_parity == ZERO_PADDING {
            self.pad_parity = 0;
        }
        if parity == 0 {
            self.next_source_sample() as f64
        } else {
            0.0
        }
    }

    fn process_block<const SYNC: bool, const FREQ: bool, const MOD: bool, const EXP: bool>(
        &mut self,
        freq_in: &[f32],
        mod_in: &[f32],
        sync_in: &[f32],
        out: &mut [f32],
    ) {
        for i in 0..out.len() {
            if SYNC {
                let s = sync_in[i];
                if signal::raising_edge(self.last_sync_level, s) {
                    let base = if FREQ {
                        signal::signal_to_freq(freq_in[i])
                    } else {
                        self.config.cfreq
                    };
                    self.retrigger(base);
                }
                self.last_sync_level = s;
            }

            let mut refilter = false;
            if FREQ && signal::freq_changed(self.last_freq_level, freq_in[i]) {
                self.last_freq_level = freq_in[i];
                refilter = true;
            }
            if MOD && signal::mod_changed(self.last_mod_level, mod_in[i]) {
                self.last_mod_level = mod_in[i];
                refilter = true;
            }
            if refilter {
                let base = if FREQ {
                    signal::signal_to_freq(self.last_freq_level)
                } else {
                    self.config.cfreq
                };
                let play = if MOD {
                    if EXP {
                        base * signal::approx5_exp2(
                            self.config.fm_strength * self.last_mod_level as f64,
                        )
                    } else {
                        base * (1.0 + self.config.fm_strength * self.last_mod_level as f64)
                    }
                } else {
                    base
                };
                // FM can push the effective frequency to or below zero;
                // the filter only needs a positive step
                self.set_filter(play.max(1e-6), false);
            }

            self.phase.advance(self.istep);
            let mut crossings = self.phase.take_whole();
            while crossings > 0 {
                let v = self.next_virtual_sample();
                self.prev_out = self.cur_out;
                self.cur_out = self.filter.push(v);
                crossings -= 1;
            }
            out[i] = (self.prev_out + (self.cur_out - self.prev_out) * self.phase.frac()) as f32;
        }
    }

    /// Render one block. Passing `None` for an input means "not
    /// connected"; connectivity changes between calls are detected and
    /// the per-mode level trackers reset accordingly. Returns false when
    /// the oscillator has no wave to play.
    pub fn process(
        &mut self,
        freq_in: Option<&[f32]>,
        mod_in: Option<&[f32]>,
        sync_in: Option<&[f32]>,
        out: &mut [f32],
    ) -> bool {
        assert!(!out.is_empty());
        if self.block.is_none() {
            return false;
        }

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

        if mode != self.last_mode {
            let mask = self.last_mode ^ mode;
            if mask & MODE_SYNC != 0 {
                self.last_sync_level = 0.0;
            }
            if mask & MODE_FREQ != 0 {
                if freq_in.is_some() {
                    self.last_freq_level = SIGNAL_LEVEL_INVAL;
                } else {
                    self.set_filter(self.config.cfreq, false);
                }
            }
            if mask & MODE_MOD != 0 {
                if mod_in.is_some() {
                    self.last_mod_level = 0.0;
                } else if freq_in.is_some() {
                    self.last_freq_level = SIGNAL_LEVEL_INVAL;
                } else {
                    self.set_filter(self.config.cfreq, false);
                }
            }
            self.last_mode = mode;
        }

        // auto-trigger after reset when no sync stream drives us
        if sync_in.is_none() && self.last_sync_level < 0.5 {
            let base = match freq_in {
                Some(f) => signal::signal_to_freq(f[0]),
                None => self.config.cfreq,
            };
            self.retrigger(base);
            self.last_sync_level = 1.0;
        }

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
            (false, false, false, _) => self.process_block::<false, false, false, false>(fi, mi, si, out),
            (false, false, true, false) => self.process_block::<false, false, true, false>(fi, mi, si, out),
            (false, false, true, true) => self.process_block::<false, false, true, true>(fi, mi, si, out),
            (false, true, false, _) => self.process_block::<false, true, false, false>(fi, mi, si, out),
            (false, true, true, false) => self.process_block::<false, true, true, false>(fi, mi, si, out),
            (false, true, true, true) => self.process_block::<false, true, true, true>(fi, mi, si, out),
            (true, false, false, _) => self.process_block::<true, false, false, false>(fi, mi, si, out),
            (true, false, true, false) => self.process_block::<true, false, true, false>(fi, mi, si, out),
            (true, false, true, true) => self.process_block::<true, false, true, true>(fi, mi, si, out),
            (true, true, false, _) => self.process_block::<true, true, false, false>(fi, mi, si, out),
            (true, true, true, false) => self.process_block::<true, true, true, false>(fi, mi, si, out),
            (true, true, true, true) => self.process_block::<true, true, true, true>(fi, mi, si, out),
        }

        self.heal_filter_state();

        self.done = match &self.block {
            Some(b) => {
                b.is_silent
                    && ((b.play_dir < 0 && b.offset < 0)
                        || (b.play_dir > 0 && b.offset > b.chunk().n_frames() as i64))
            }
            None => true,
        };
        true
    }

    /// Clamp diverged or denormal filter state back into the valid
    /// signal range.
    fn heal_filter_state(&mut self) {
        let w0 = self.filter.history()[0];
        let out_of_range =
            w0 != 0.0 && !(w0.abs() > signal::SIGNAL_EPSILON && w0.abs() < signal::SIGNAL_KAPPA);
        if out_of_range {
            debug!(w0, "clearing filter state");
            let replacement = if !w0.is_finite() || w0.abs() > signal::SIGNAL_KAPPA {
                if w0.is_sign_negative() {
                    -1.0
                } else {
                    1.0
                }
            } else {
                0.0
            };
            for v in self.filter.history_mut() {
                *v = replacement;
            }
            self.prev_out = replacement;
            self.cur_out = replacement;
        }
    }
}
