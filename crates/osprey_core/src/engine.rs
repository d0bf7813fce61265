//! Effect Engine - Main Entry Point
//!
//! The engine coordinates the host-facing lifecycle with the control-side
//! state (equalizer, parameters, processing order) and hands the audio-side
//! processing graph to the host callback.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ UI / Control Thread                                         │
//! │   EffectEngine: band edits, solo, parameter sets,           │
//! │   order pushes, plot rendering at the redraw rate           │
//! └───────┬──────────────────────────┬──────────────────────────┘
//!         │ order queue (SPSC)       │ coefficient slots / atomics
//! ┌───────▼──────────────────────────▼──────────────────────────┐
//! │ Audio Thread (host callback)                                │
//! │   BlockProcessor: effect chain in current order, then the   │
//! │   EQ filter bank with its pre/post analyzer taps            │
//! └───────┬─────────────────────────────────────────────────────┘
//!         │ sample fifos
//! ┌───────▼─────────────────────────────────────────────────────┐
//! │ Analyzer worker threads (spectrum x2, waveform x1)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `prepare` wires everything for a sample rate and returns the
//! [`BlockProcessor`]; `release` tears the analysis threads down again.

use std::sync::Arc;

use tracing::info;

use osprey_dsp::{CurvePath, Equalizer, FilterBank, FilterRanges, PlotArea, WaveformAnalyzer};

use crate::chain::{EffectChain, OrderControl, StageOrder};
use crate::config::EngineConfig;
use crate::effects::ProcessContext;
use crate::error::{EngineError, EngineResult};
use crate::params::{ParameterStore, PhaserParam};

/// Control-side engine object
///
/// Lives on the UI/main thread. All processing state it shares with the
/// audio side is lock-free or guarded by struct-copy critical sections.
pub struct EffectEngine {
    config: EngineConfig,
    equalizer: Equalizer,
    params: Arc<ParameterStore>,
    modulation_analyzer: WaveformAnalyzer,
    order_control: Option<OrderControl>,
}

impl EffectEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;
        Ok(Self {
            config,
            equalizer: Equalizer::new(FilterRanges::default()),
            params: Arc::new(ParameterStore::new()),
            modulation_analyzer: WaveformAnalyzer::new(),
            order_control: None,
        })
    }

    /// Wire the engine for a stream and hand back the audio-side processor
    ///
    /// Called by the host before streaming begins; calling it again tears
    /// down the previous analyzers and rebuilds for the new rate. Blocks
    /// passed to the returned processor may be any size up to `max_block`.
    pub fn prepare(&mut self, sample_rate: f32, max_block: usize) -> EngineResult<BlockProcessor> {
        let bank = self
            .equalizer
            .prepare(sample_rate, self.config.analyzer.fifo_capacity)?;

        let context = ProcessContext::new(sample_rate, 2, max_block);
        let (order_control, mut chain) = EffectChain::new(context, Arc::clone(&self.params));

        let modulation_feed = self.modulation_analyzer.setup(
            self.config.analyzer.fifo_capacity,
            sample_rate,
            self.config.analyzer.refresh_rate_hz,
        )?;
        chain.set_modulation_feed(modulation_feed);

        self.order_control = Some(order_control);
        info!(
            "engine prepared: {} Hz, blocks up to {} frames",
            sample_rate, max_block
        );

        Ok(BlockProcessor { chain, bank })
    }

    /// Stop the analysis threads and drop the order queue
    ///
    /// The previously returned [`BlockProcessor`] keeps working on stale
    /// state if the host is still calling it, but should be dropped too.
    pub fn release(&mut self) {
        self.equalizer.release();
        self.modulation_analyzer
            .stop(std::time::Duration::from_secs(1));
        self.order_control = None;
        info!("engine released");
    }

    /// Whether `prepare` has produced a live processor
    pub fn is_prepared(&self) -> bool {
        self.order_control.is_some()
    }

    /// Request a new stage order for the chain
    ///
    /// Returns `false` when the engine is not prepared or the queue is
    /// momentarily full; the caller can simply re-push.
    pub fn push_order(&mut self, order: StageOrder) -> bool {
        match self.order_control.as_mut() {
            Some(control) => control.push(order),
            None => false,
        }
    }

    /// Route a host parameter change by its string id
    ///
    /// Phaser ids (`"phaser-..."`) land in the atomic store; band ids
    /// (`"<band name>-<field>"`) are dispatched into the equalizer.
    /// Unknown ids are reported, not errors: hosts probe speculatively.
    pub fn set_parameter_by_id(&mut self, id: &str, value: f32) -> EngineResult<bool> {
        if self.params.set_by_id(id, value) {
            return Ok(true);
        }
        if let Some((index, field)) = self.equalizer.parse_param_id(id) {
            self.equalizer.set_band_parameter(index, field, value)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Set one phaser parameter directly
    pub fn set_phaser_parameter(&self, param: PhaserParam, value: f32) {
        self.params.set(param, value);
    }

    /// The shared parameter store (e.g. for binding UI controls)
    pub fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    pub fn equalizer(&self) -> &Equalizer {
        &self.equalizer
    }

    pub fn equalizer_mut(&mut self) -> &mut Equalizer {
        &mut self.equalizer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True when either EQ analyzer published a frame since the last check
    pub fn check_for_new_analyser_data(&self) -> bool {
        self.equalizer.check_for_new_analyser_data()
    }

    /// Render the pre- (`input == true`) or post-filter spectrum
    pub fn create_analyser_plot(
        &self,
        path: &mut CurvePath,
        area: PlotArea,
        min_frequency: f32,
        input: bool,
    ) {
        self.equalizer
            .create_analyser_plot(path, area, min_frequency, input);
    }

    /// True when the modulation scope captured a new frame
    pub fn check_for_new_modulation_data(&self) -> bool {
        self.modulation_analyzer.check_for_new_data()
    }

    /// Render the phaser LFO trace
    pub fn create_modulation_plot(&self, path: &mut CurvePath, area: PlotArea) {
        self.modulation_analyzer.create_path(path, area);
    }
}

/// Audio-side processing graph, moved into the host callback
///
/// # Real-time Safety
/// `process` never allocates or blocks: the chain drains its order queue
/// with try-pops, the filter bank's only locks are per-stage struct copies,
/// and analyzer feeds drop blocks instead of waiting.
pub struct BlockProcessor {
    chain: EffectChain,
    bank: FilterBank,
}

impl BlockProcessor {
    /// Process one interleaved stereo block in-place
    pub fn process(&mut self, buffer: &mut [f32]) {
        self.chain.process(buffer);
        self.bank.process_interleaved(buffer);
    }

    /// The stage order the next block will use
    pub fn current_order(&self) -> StageOrder {
        self.chain.current_order()
    }

    /// Clear all effect and filter state
    pub fn reset(&mut self) {
        self.chain.reset();
        self.bank.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{EffectStage, DEFAULT_ORDER};
    use osprey_dsp::BandField;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn prepared_engine() -> (EffectEngine, BlockProcessor) {
        // Quiet logger for test output; ignore double-init across tests
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let mut engine = EffectEngine::new(EngineConfig::default()).unwrap();
        let processor = engine.prepare(SAMPLE_RATE, 512).unwrap();
        (engine, processor)
    }

    fn sine_block(frames: usize) -> Vec<f32> {
        (0..frames * 2)
            .map(|i| (std::f32::consts::TAU * 440.0 * (i / 2) as f32 / SAMPLE_RATE).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.stream.sample_rate = 1;
        assert!(matches!(
            EffectEngine::new(config),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_prepare_then_process() {
        let (_engine, mut processor) = prepared_engine();

        let mut buffer = sine_block(512);
        for _ in 0..10 {
            processor.process(&mut buffer);
        }
        for sample in &buffer {
            assert!(sample.is_finite());
        }
    }

    #[test]
    fn test_smaller_blocks_than_maximum() {
        let (_engine, mut processor) = prepared_engine();

        // Hosts may deliver any size up to the prepared maximum
        for frames in [512, 64, 200, 1] {
            let mut buffer = sine_block(frames);
            processor.process(&mut buffer);
            for sample in &buffer {
                assert!(sample.is_finite());
            }
        }
    }

    #[test]
    fn test_second_order_push_wins_before_block() {
        let (mut engine, mut processor) = prepared_engine();

        let first = [
            EffectStage::Delay,
            EffectStage::Phaser,
            EffectStage::Reverb,
            EffectStage::Chorus,
        ];
        let second = [
            EffectStage::Chorus,
            EffectStage::Phaser,
            EffectStage::Delay,
            EffectStage::Reverb,
        ];
        assert!(engine.push_order(first));
        assert!(engine.push_order(second));

        let mut buffer = sine_block(128);
        processor.process(&mut buffer);
        assert_eq!(processor.current_order(), second);
    }

    #[test]
    fn test_push_order_before_prepare_fails() {
        let mut engine = EffectEngine::new(EngineConfig::default()).unwrap();
        assert!(!engine.is_prepared());
        assert!(!engine.push_order(DEFAULT_ORDER));
    }

    #[test]
    fn test_parameter_routing_by_id() {
        let (mut engine, _processor) = prepared_engine();

        // Phaser ids land in the store
        assert!(engine.set_parameter_by_id("phaser-depth", 0.8).unwrap());
        assert_eq!(engine.parameters().get(PhaserParam::Depth), 0.8);

        // Band ids land in the equalizer
        assert!(engine.set_parameter_by_id("Low Mids-gain", 2.0).unwrap());
        assert_eq!(engine.equalizer().band(2).unwrap().gain, 2.0);

        // Unknown ids are tolerated
        assert!(!engine.set_parameter_by_id("nonexistent", 1.0).unwrap());
    }

    #[test]
    fn test_band_param_id_naming_convention() {
        let (engine, _processor) = prepared_engine();
        let id = engine.equalizer().param_id(2, BandField::Gain).unwrap();
        assert_eq!(id, "Low Mids-gain");
    }

    #[test]
    fn test_analyzers_publish_while_processing() {
        let (engine, mut processor) = prepared_engine();

        let mut buffer = sine_block(512);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        let mut spectrum_seen = false;
        let mut modulation_seen = false;
        while std::time::Instant::now() < deadline && !(spectrum_seen && modulation_seen) {
            processor.process(&mut buffer);
            spectrum_seen |= engine.check_for_new_analyser_data();
            modulation_seen |= engine.check_for_new_modulation_data();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(spectrum_seen, "EQ analyzers never published");
        assert!(modulation_seen, "modulation scope never published");

        let mut path = CurvePath::new();
        engine.create_analyser_plot(&mut path, PlotArea::new(0.0, 0.0, 800.0, 300.0), 20.0, true);
        assert!(!path.is_empty());

        engine.create_modulation_plot(&mut path, PlotArea::new(0.0, 0.0, 400.0, 100.0));
        assert!(!path.is_empty());
    }

    #[test]
    fn test_release_stops_order_queue() {
        let (mut engine, _processor) = prepared_engine();
        assert!(engine.is_prepared());

        engine.release();
        assert!(!engine.is_prepared());
        assert!(!engine.push_order(DEFAULT_ORDER));

        // Release twice is fine
        engine.release();
    }

    #[test]
    fn test_reprepare_after_release() {
        let (mut engine, processor) = prepared_engine();
        drop(processor);
        engine.release();

        let mut processor = engine.prepare(44_100.0, 256).unwrap();
        let mut buffer = sine_block(256);
        processor.process(&mut buffer);
        for sample in &buffer {
            assert!(sample.is_finite());
        }
    }

    #[test]
    fn test_solo_scenario_through_engine() {
        let (mut engine, _processor) = prepared_engine();

        engine.equalizer_mut().set_band_solo(Some(2));
        for i in 0..osprey_dsp::BAND_COUNT {
            assert_eq!(engine.equalizer().band_solo(i), i == 2);
            assert_eq!(engine.equalizer().stage_bypassed(i), Some(i != 2));
        }
    }
}
