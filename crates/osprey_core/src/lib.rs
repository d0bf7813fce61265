//! Osprey Core - Effect Engine
//!
//! This crate orchestrates the Osprey multi-effect plugin:
//! - Engine lifecycle: prepare / per-block processing / release
//! - Reorderable phaser/chorus/reverb/delay chain with a lock-free
//!   processing-order handoff to the audio thread
//! - Parameter binding: stable string ids, tagged dispatch, atomic value
//!   store shared with the audio thread, numeric/text conversion
//! - Engine configuration
//!
//! The DSP primitives (filter bank, analyzers, FIFOs) live in `osprey_dsp`;
//! this crate wires them to the host-facing lifecycle.

mod chain;
mod config;
mod effects;
mod engine;
mod error;
mod params;

pub use chain::{
    EffectChain, EffectStage, OrderControl, StageOrder, DEFAULT_ORDER, ORDER_QUEUE_CAPACITY,
    STAGE_COUNT,
};
pub use config::{AnalyzerSettings, EngineConfig, StreamConfig};
pub use effects::{AudioProcessor, Chorus, Delay, Phaser, ProcessContext, Reverb};
pub use engine::{BlockProcessor, EffectEngine};
pub use error::{EngineError, EngineResult};
pub use params::{
    format_frequency, format_gain, format_quality, parse_frequency, parse_gain, ParamRange,
    ParameterStore, PhaserParam, SmoothedValue, NOTE_LENGTHS,
};

// Re-export DSP types for convenience
pub use osprey_dsp::{
    Band, BandField, CurvePath, Equalizer, FilterKind, FilterRanges, PlotArea, BAND_COUNT,
};
