//! Band-limited lookup tables for the table oscillator.
//!
//! For every requested playback frequency a reference waveform is
//! rendered into a power-of-two table, transformed to the spectral
//! domain, attenuated by a window evaluated at each harmonic's
//! playback-relative frequency (so everything at or above Nyquist for
//! that playback rate is removed), transformed back and re-normalized to
//! the original level. [`OscTable::lookup`] then serves the narrowest
//! table that still band-limits a given frequency.
//!
//! Tables store one extra sample so `values[n] == values[0]`; linear
//! interpolation at the wrap point needs no modulo.

use std::sync::Arc;

use realfft::RealFftPlanner;
use tracing::debug;

/// Frequencies closer than this (in Hz) share one table.
const OSC_FREQ_EPSILON: f64 = 1e-3;

/// Reference waveform shapes.
///
/// `PulseSaw` is the pulse-width-modulation source: it renders `SawFall`
/// tables, from which the oscillator subtracts a phase-shifted copy to
/// obtain a variable-duty pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscWaveForm {
    Sine,
    SawRise,
    SawFall,
    PeakRise,
    PeakFall,
    Triangle,
    MoogSaw,
    Square,
    PulseSaw,
}

/// Render one period of `form` into `values`.
pub fn fill_wave_buffer(form: OscWaveForm, values: &mut [f32]) {
    let n = values.len();
    let max = n as f64;
    let hmax = max * 0.5;
    let qmax = max * 0.25;
    let half = n / 2;
    let quarter = half / 2;

    match form {
        OscWaveForm::Sine => {
            for (i, v) in values.iter_mut().enumerate() {
                let frac = i as f64 / max;
                *v = (frac * 2.0 * std::f64::consts::PI).sin() as f32;
            }
        }
        OscWaveForm::SawRise => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = (2.0 * i as f64 / max - 1.0) as f32;
            }
        }
        OscWaveForm::SawFall | OscWaveForm::PulseSaw => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = (1.0 - 2.0 * i as f64 / max) as f32;
            }
        }
        OscWaveForm::PeakRise => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = if i < half {
                    (2.0 * i as f64 / hmax - 1.0) as f32
                } else {
                    -1.0
                };
            }
        }
        OscWaveForm::PeakFall => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = if i < half {
                    (1.0 - 2.0 * i as f64 / hmax) as f32
                } else {
                    -1.0
                };
            }
        }
        OscWaveForm::Triangle => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = if i < quarter {
                    (i as f64 / qmax) as f32
                } else if i < half + quarter {
                    (1.0 - 2.0 * (i - quarter) as f64 / hmax) as f32
                } else {
                    ((i - half - quarter) as f64 / qmax - 1.0) as f32
                };
            }
        }
        OscWaveForm::MoogSaw => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = if i < half {
                    (2.0 * i as f64 / hmax - 1.0) as f32
                } else {
                    (1.0 - 2.0 * i as f64 / max) as f32
                };
            }
        }
        OscWaveForm::Square => {
            for (i, v) in values.iter_mut().enumerate() {
                *v = if i < half { 1.0 } else { -1.0 };
            }
        }
    }
}

fn wave_extrema_pos(values: &[f32]) -> (usize, usize) {
    let mut minp = 0;
    let mut maxp = 0;
    let mut min = values[0];
    let mut max = min;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > max {
            max = v;
            maxp = i;
        } else if v < min {
            min = v;
            minp = i;
        }
    }
    (minp, maxp)
}

/// Minimum and maximum sample value.
pub fn wave_extrema(values: &[f32]) -> (f32, f32) {
    assert!(!values.is_empty());
    let (minp, maxp) = wave_extrema_pos(values);
    (values[minp], values[maxp])
}

/// Shift and scale so the given extrema map onto `new_center` and
/// `new_max`. A near-zero excursion range collapses the wave to zero
/// instead of dividing by noise.
pub fn wave_adjust_range(
    values: &mut [f32],
    min: f32,
    max: f32,
    new_center: f32,
    new_max: f32,
) {
    assert!(!values.is_empty());

    let center = new_center - (min + max) / 2.0;
    let lo = (min + center).abs();
    let hi = (max + center).abs().max(lo);
    let scale = if hi > f32::MIN_POSITIVE {
        new_max / hi
    } else {
        0.0
    };
    for v in values.iter_mut() {
        *v = (*v + center) * scale;
    }
}

/// [`wave_adjust_range`] with the extrema measured from the data.
pub fn wave_normalize(values: &mut [f32], new_center: f32, new_max: f32) {
    let (min, max) = wave_extrema(values);
    wave_adjust_range(values, min, max, new_center, new_max);
}

fn wave_table_size(form: OscWaveForm) -> usize {
    // SawFall feeds pulse-width modulation and needs the extra stepping
    // granularity
    match form {
        OscWaveForm::SawFall | OscWaveForm::PulseSaw => 8192,
        _ => 2048,
    }
}

struct TableEntry {
    /// mix_freq-relative frequency bound, in [0, 0.5].
    mfreq: f64,
    min_pos: usize,
    max_pos: usize,
    /// `n_values + 1` samples, `values[n] == values[0]`.
    values: Arc<Vec<f32>>,
}

/// One table selected for a concrete playback frequency.
#[derive(Clone)]
pub struct OscWave {
    /// `n_values + 1` samples with the first duplicated at the end.
    pub values: Arc<Vec<f32>>,
    pub n_values: usize,
    /// Frequencies in `(min_freq, max_freq]` are correctly band-limited
    /// by this table; outside, re-lookup.
    pub min_freq: f64,
    pub max_freq: f64,
    /// Extrema positions, used for pulse-width offset derivation.
    pub min_pos: usize,
    pub max_pos: usize,
}

/// A set of progressively band-limited tables of one waveform.
pub struct OscTable {
    pub mix_freq: f64,
    pub wave_form: OscWaveForm,
    entries: Vec<TableEntry>,
}

impl OscTable {
    /// Build tables for each of `freqs` (Hz, clamped to Nyquist),
    /// band-limited through `window` (1 at DC falling to 0 at the
    /// playback Nyquist). Frequencies within 1 mHz reuse one table.
    pub fn new(
        mix_freq: f64,
        wave_form: OscWaveForm,
        window: fn(f64) -> f64,
        freqs: &[f64],
    ) -> OscTable {
        assert!(mix_freq > 0.0);
        assert!(!freqs.is_empty());

        let mut table = OscTable {
            mix_freq,
            wave_form,
            entries: Vec::new(),
        };
        let nyquist = mix_freq * 0.5;
        for &freq in freqs {
            let mfreq = freq.min(nyquist) / mix_freq;
            let exists = table
                .entries
                .iter()
                .any(|e| ((e.mfreq - mfreq) * mix_freq).abs() <= OSC_FREQ_EPSILON);
            if exists {
                debug!(freq, "table for frequency already present");
                continue;
            }
            table.entries.push(build_entry(wave_form, window, mfreq));
        }
        table
            .entries
            .sort_by(|a, b| a.mfreq.total_cmp(&b.mfreq));
        table
    }

    /// Pick the narrowest table that still band-limits `freq`. A
    /// frequency above every table's bound returns the widest table and
    /// may alias.
    pub fn lookup(&self, freq: f64) -> OscWave {
        let mfreq = freq / self.mix_freq;
        let i = match self
            .entries
            .iter()
            .position(|e| e.mfreq >= mfreq)
        {
            Some(i) => i,
            None => {
                debug!(
                    want = freq,
                    got = self.entries[self.entries.len() - 1].mfreq * self.mix_freq,
                    "lookup mismatch, aliasing possible"
                );
                self.entries.len() - 1
            }
        };
        let e = &self.entries[i];
        let min_mfreq = if i > 0 { self.entries[i - 1].mfreq } else { 0.0 };
        OscWave {
            values: Arc::clone(&e.values),
            n_values: e.values.len() - 1,
            min_freq: min_mfreq * self.mix_freq,
            max_freq: e.mfreq * self.mix_freq,
            min_pos: e.min_pos,
            max_pos: e.max_pos,
        }
    }
}

fn build_entry(wave_form: OscWaveForm, window: fn(f64) -> f64, mfreq: f64) -> TableEntry {
    let size = wave_table_size(wave_form);
    let mut values = vec![0.0f32; size];
    fill_wave_buffer(wave_form, &mut values);
    let (min, max) = wave_extrema(&values);

    // band-limit: window each harmonic at its playback-relative frequency
    let mut time: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let mut planner = RealFftPlanner::new();
    let r2c = planner.plan_fft_forward(size);
    let c2r = planner.plan_fft_inverse(size);
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut time, &mut spectrum).unwrap();
    for (i, bin) in spectrum.iter_mut().enumerate() {
        // harmonic i plays back at i * mfreq; 2 * mfreq maps Nyquist to 1
        *bin = *bin * window(i as f64 * 2.0 * mfreq);
    }
    c2r.process(&mut spectrum, &mut time).unwrap();
    let scale = 1.0 / size as f64;
    for (dst, &src) in values.iter_mut().zip(time.iter()) {
        *dst = (src * scale) as f32;
    }

    wave_normalize(&mut values, (min + max) / 2.0, max);

    // provide values[n] == values[0]
    values.push(values[0]);

    let (min_pos, max_pos) = wave_extrema_pos(&values[..size]);
    TableEntry {
        mfreq,
        min_pos,
        max_pos,
        values: Arc::new(values),
    }
}
