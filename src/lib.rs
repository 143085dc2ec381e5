//! # Klang - Filter Design and Oscillator Core
//!
//! Klang is a software sound-synthesis core: classic IIR filter design
//! from analog prototypes, a generic recursive filter evaluator, a
//! resonant biquad, FIR approximation of sketched frequency responses,
//! and two band-limit-aware oscillators (anti-aliased wavetable playback
//! and table-lookup synthesis with pulse-width modulation).
//!
//! Control-rate math runs in `f64`; audio streams are `f32` blocks.
//! Frequencies on the filter-design API are expressed in radians, with
//! `PI` corresponding to the Nyquist frequency.
//!
//! ## Core Features
//!
//! - **Filter Design**: Butterworth, Chebyshev type 1 and type 2
//!   prototypes, transformed to digital lowpass/highpass/bandpass/bandstop
//! - **IIR Evaluation**: direct-form recursion over `f32` blocks with
//!   history carried across coefficient changes
//! - **Resonant Biquad**: lowpass/highpass with selectable gain
//!   normalization and cheap approximate parameter updates
//! - **FIR Approximation**: frequency sampling of a piecewise-linear
//!   response sketch, Blackman-windowed
//! - **Wavetable Oscillator**: multi-chunk playback with an
//!   anti-aliasing Chebyshev stage, looping, reverse play and hard sync
//! - **Table Oscillator**: band-limited waveform tables with FM,
//!   self-FM, hard sync and pulse-width modulation
//!
//! ## Quick Start
//!
//! ### Designing and Running a Filter
//!
//! ```rust
//! use std::f64::consts::PI;
//! use klang::design;
//! use klang::iir::IirFilter;
//!
//! // 6th order Chebyshev lowpass, cutoff at a quarter of the sample
//! // rate, 0.1 passband ripple epsilon
//! let lp = design::tscheb1_lp(6, 0.5 * PI, 0.1);
//! let mut filter = IirFilter::with_coefficients(lp.order(), &lp.a, &lp.b);
//!
//! let input = vec![1.0f32; 64];
//! let mut output = vec![0.0f32; 64];
//! filter.evaluate(&input, &mut output);
//! ```
//!
//! ### Rendering a Band-Limited Oscillator
//!
//! ```rust
//! use std::sync::Arc;
//! use klang::osctable::{OscTable, OscWaveForm};
//! use klang::oscillator::{Osc, OscConfig};
//! use klang::signal;
//!
//! let table = Arc::new(OscTable::new(
//!     44100.0,
//!     OscWaveForm::SawFall,
//!     signal::window_blackman,
//!     &[110.0, 220.0, 440.0, 880.0],
//! ));
//! let mut osc = Osc::new(44100.0, OscConfig {
//!     table,
//!     cfreq: 440.0,
//!     pulse_width: 0.5,
//!     pulse_mod_strength: 0.0,
//!     fm_strength: 0.0,
//!     exponential_fm: false,
//!     self_fm_strength: 0.0,
//!     transpose_factor: 1.0,
//!     fine_tune: 0,
//! });
//!
//! let mut block = vec![0.0f32; 256];
//! osc.process(None, None, None, &mut block, None);
//! ```
//!
//! ## Main Modules
//!
//! - [`design`] - analog prototypes and z-domain filter design
//! - [`iir`] - generic recursive filter evaluator
//! - [`biquad`] - resonant second-order filter
//! - [`fir`] - frequency-sampling FIR approximation
//! - [`waveosc`] - anti-aliased wavetable oscillator over [`wavechunk`] data
//! - [`osctable`] / [`oscillator`] - band-limited table synthesis
//! - [`signal`] - shared stream conventions and small approximations

pub mod biquad;
pub mod design;
pub mod fir;
pub mod iir;
pub mod oscillator;
pub mod osctable;
pub mod phase;
pub mod polynomial;
pub mod signal;
pub mod wavechunk;
pub mod waveosc;
