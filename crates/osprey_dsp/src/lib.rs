//! Osprey DSP - Digital Signal Processing Module
//!
//! This crate provides the signal-analysis and filtering core of Osprey:
//! - 6-band parametric equalizer built on cascaded BiQuad filters
//! - Background FFT spectrum analyzer (pre/post filter) for visualization
//! - Time-domain waveform analyzer for modulation-source display
//! - Lock-free sample FIFOs between the audio callback and analysis threads
//! - Zero-allocation processing path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Thread                           │
//! │  block ──▶ FilterBank ──▶ block      (adopts coefficient    │
//! │     │            │                    updates at block start)│
//! │     └──fifo──┐   └──fifo──┐                                 │
//! └──────────────┼────────────┼─────────────────────────────────┘
//! ┌──────────────▼────────────▼─────────────────────────────────┐
//! │        SpectrumAnalyzer worker threads (FFT + averaging)    │
//! │        publish averaged curve under a short-hold mutex      │
//! └──────────────┬──────────────────────────────────────────────┘
//! ┌──────────────▼──────────────────────────────────────────────┐
//! │   UI Thread: Equalizer (band state, coefficient design,     │
//! │   response plots), polls check_for_new_data per render tick │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Coefficient updates and the published analysis curve are the only state
//! crossing thread boundaries; both are guarded by locks held no longer
//! than a struct copy.

mod eq;
mod error;
mod fifo;
mod filter;
mod plot;
mod spectrum;
mod waveform;

pub use eq::{
    band_param_id, Band, BandField, Equalizer, FilterBank, Rgb, BAND_COUNT, FALLBACK_COLOUR,
};
pub use error::DspError;
pub use fifo::{SampleFifo, SampleReader, SampleWriter};
pub use filter::{
    db_to_gain, design_coefficients, frequency_grid, gain_to_db, gain_to_db_with_floor,
    magnitude_response, FilterKind, FilterRanges, FREQUENCY_MAX, FREQUENCY_MIN, GAIN_MAX,
    PLOT_RESOLUTION, QUALITY_MAX, QUALITY_MIN,
};
pub use plot::{map_range, CurvePath, PlotArea};
pub use spectrum::{SpectrumAnalyzer, FFT_SIZE, SPECTRUM_BINS};
pub use waveform::WaveformAnalyzer;
