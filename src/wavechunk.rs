//! Pre-rendered wave chunks and scoped block access.
//!
//! A [`WaveChunk`] holds one recording of a waveform at a fixed pitch
//! (`osc_freq`) and sample rate (`mix_freq`). Oscillators never hold the
//! sample data directly; they acquire a [`BlockRef`], a scoped guard over
//! one contiguous playback region. The guard releases its acquisition on
//! drop on every exit path, including the mid-block boundary crossing
//! where one guard is exchanged for the next. Acquisition counts are
//! observable so tests can verify that no path leaks a block.
//!
//! Reads a few samples beyond either chunk end are legal and return
//! silence; [`WaveChunk::PADDING`] frames are guaranteed readable past the
//! bounds, which is what the oscillator's anti-aliasing filter needs to
//! drain across an edge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Guaranteed readable frames beyond either end of a chunk. Must cover
/// the wave oscillator's filter order.
pub const PADDING: usize = 8;

/// A loop region `[start, end)` in frames, traversed `count` additional
/// times before playback runs out the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSpec {
    pub start: usize,
    pub end: usize,
    pub count: usize,
}

/// One pre-rendered waveform at a fixed pitch.
#[derive(Debug)]
pub struct WaveChunk {
    data: Vec<f32>,
    n_channels: usize,
    n_frames: usize,
    /// Frequency the recording plays back at when stepped 1:1.
    pub osc_freq: f64,
    /// Sample rate of the recording.
    pub mix_freq: f64,
    pub loop_spec: Option<LoopSpec>,
    acquisitions: AtomicUsize,
}

impl WaveChunk {
    /// Wrap interleaved sample data. `data.len()` must be a multiple of
    /// `n_channels`; a loop region must lie within the chunk.
    pub fn new(
        data: Vec<f32>,
        n_channels: usize,
        osc_freq: f64,
        mix_freq: f64,
        loop_spec: Option<LoopSpec>,
    ) -> Arc<WaveChunk> {
        assert!(n_channels > 0);
        assert!(data.len() % n_channels == 0);
        let n_frames = data.len() / n_channels;
        if let Some(l) = loop_spec {
            assert!(l.start < l.end && l.end <= n_frames);
        }
        Arc::new(WaveChunk {
            data,
            n_channels,
            n_frames,
            osc_freq,
            mix_freq,
            loop_spec,
            acquisitions: AtomicUsize::new(0),
        })
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Sample at a signed frame offset; frames outside the chunk read as
    /// silence (the padding contract).
    #[inline]
    pub fn value(&self, frame: i64, channel: usize) -> f32 {
        debug_assert!(channel < self.n_channels);
        if frame < 0 || frame >= self.n_frames as i64 {
            0.0
        } else {
            self.data[frame as usize * self.n_channels + channel]
        }
    }

    /// Current number of live block references, for leak tests.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Acquire the playback block containing `offset`.
    ///
    /// Forward playback inside an armed loop yields a block ending at the
    /// loop end whose successor starts back at the loop start; `loops_left`
    /// says how many wraps the caller still intends. Offsets beyond the
    /// data yield a silent block, so a voice can drain its filter tail
    /// without special-casing the end of the wave.
    pub fn use_block(self: &Arc<Self>, play_dir: i32, offset: i64, loops_left: usize) -> BlockRef {
        assert!(play_dir == 1 || play_dir == -1);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);

        let n = self.n_frames as i64;
        let (end_exclusive, next_offset, is_silent) = if play_dir > 0 {
            if offset >= n {
                (i64::MAX, i64::MAX, true)
            } else if let Some(l) = self.loop_spec {
                if loops_left > 0 && offset < l.end as i64 {
                    (l.end as i64, l.start as i64, false)
                } else {
                    (n, n, false)
                }
            } else {
                (n, n, false)
            }
        } else if offset < 0 {
            (i64::MIN, i64::MIN, true)
        } else if let Some(l) = self.loop_spec {
            if loops_left > 0 && offset >= l.start as i64 {
                (l.start as i64 - 1, l.end as i64 - 1, false)
            } else {
                (-1, -1, false)
            }
        } else {
            (-1, -1, false)
        };

        BlockRef {
            chunk: Arc::clone(self),
            play_dir,
            offset,
            bound: end_exclusive,
            next_offset,
            is_silent,
        }
    }
}

/// Scoped acquisition of one playback block.
#[derive(Debug)]
pub struct BlockRef {
    chunk: Arc<WaveChunk>,
    pub play_dir: i32,
    /// Current read position in frames; moved by [`step`](BlockRef::step).
    pub offset: i64,
    bound: i64,
    next_offset: i64,
    pub is_silent: bool,
}

impl BlockRef {
    /// Read the current frame and advance one frame in the play
    /// direction. Returns `None` once the block boundary is reached; the
    /// caller then exchanges this guard for the successor block.
    #[inline]
    pub fn step(&mut self, channel: usize) -> Option<f32> {
        if self.play_dir > 0 {
            if self.offset >= self.bound {
                return None;
            }
        } else if self.offset <= self.bound {
            return None;
        }
        let v = if self.is_silent {
            0.0
        } else {
            self.chunk.value(self.offset, channel)
        };
        self.offset += self.play_dir as i64;
        Some(v)
    }

    /// Where the successor block starts.
    pub fn next_offset(&self) -> i64 {
        self.next_offset
    }

    pub fn chunk(&self) -> &Arc<WaveChunk> {
        &self.chunk
    }
}

impl Drop for BlockRef {
    fn drop(&mut self) {
        self.chunk.acquisitions.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Chunk lookup by playback frequency. Multi-sample sets return the chunk
/// recorded closest to the requested pitch.
pub trait ChunkSelector {
    fn chunk_for_freq(&self, freq: f64) -> Arc<WaveChunk>;
}

/// Selector over a fixed set of chunks, picking the nearest `osc_freq`
/// on a log-frequency scale.
pub struct NearestChunkSelector {
    chunks: Vec<Arc<WaveChunk>>,
}

impl NearestChunkSelector {
    pub fn new(chunks: Vec<Arc<WaveChunk>>) -> Self {
        assert!(!chunks.is_empty());
        NearestChunkSelector { chunks }
    }
}

impl ChunkSelector for NearestChunkSelector {
    fn chunk_for_freq(&self, freq: f64) -> Arc<WaveChunk> {
        let mut best = &self.chunks[0];
        let mut best_dist = f64::INFINITY;
        for c in &self.chunks {
            let dist = (c.osc_freq.ln() - freq.ln()).abs();
            if dist < best_dist {
                best_dist = dist;
                best = c;
            }
        }
        Arc::clone(best)
    }
}
