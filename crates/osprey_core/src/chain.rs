//! Effect Chain Ordering
//!
//! The four effect stages run in a user-defined order that can change while
//! audio is streaming. Order snapshots travel from the control thread to the
//! audio thread through a bounded SPSC queue: the producer never blocks (a
//! full queue rejects the push), and the audio thread drains every pending
//! snapshot at block start keeping only the newest, so it always converges
//! on the most recently requested order without backlog.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::debug;

use osprey_dsp::SampleWriter;

use crate::effects::{AudioProcessor, Chorus, Delay, Phaser, ProcessContext, Reverb};
use crate::params::ParameterStore;

/// One slot in the processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStage {
    Phaser,
    Chorus,
    Reverb,
    Delay,
}

/// Number of effect stages in the chain
pub const STAGE_COUNT: usize = 4;

/// A complete processing order, one slot per stage
pub type StageOrder = [EffectStage; STAGE_COUNT];

pub const DEFAULT_ORDER: StageOrder = [
    EffectStage::Phaser,
    EffectStage::Chorus,
    EffectStage::Reverb,
    EffectStage::Delay,
];

/// Queue depth for pending order changes. The audio thread keeps only the
/// newest entry, so this only needs to absorb a burst of UI drags.
pub const ORDER_QUEUE_CAPACITY: usize = 30;

/// Control-thread handle for requesting a new processing order
pub struct OrderControl {
    producer: Producer<StageOrder>,
}

impl OrderControl {
    /// Request a new order; returns `false` (order discarded) when the
    /// queue is full. Never blocks.
    pub fn push(&mut self, order: StageOrder) -> bool {
        let accepted = self.producer.push(order).is_ok();
        if accepted {
            debug!("queued processing order {:?}", order);
        }
        accepted
    }
}

/// Audio-side effect chain
///
/// Owns the four processors and the consumer half of the order queue.
/// `process` adopts the newest pending order, refreshes the phaser from the
/// parameter store, then runs the stages in order.
pub struct EffectChain {
    consumer: Consumer<StageOrder>,
    order: StageOrder,
    phaser: Phaser,
    chorus: Chorus,
    reverb: Reverb,
    delay: Delay,
    params: Arc<ParameterStore>,
    context: ProcessContext,
}

impl EffectChain {
    /// Build a prepared chain and the control handle for reordering it
    pub fn new(context: ProcessContext, params: Arc<ParameterStore>) -> (OrderControl, Self) {
        let (producer, consumer) = RingBuffer::<StageOrder>::new(ORDER_QUEUE_CAPACITY);

        let mut chain = Self {
            consumer,
            order: DEFAULT_ORDER,
            phaser: Phaser::new(),
            chorus: Chorus::new(),
            reverb: Reverb::new(),
            delay: Delay::new(),
            params,
            context,
        };
        chain.phaser.prepare(&context);
        chain.chorus.prepare(&context);
        chain.reverb.prepare(&context);
        chain.delay.prepare(&context);

        (OrderControl { producer }, chain)
    }

    /// Route the phaser LFO into a modulation-source analyzer
    pub fn set_modulation_feed(&mut self, feed: SampleWriter) {
        self.phaser.set_modulation_feed(feed);
    }

    /// The order the next block will be processed with
    pub fn current_order(&self) -> StageOrder {
        self.order
    }

    /// Drain all pending order snapshots, keeping only the newest
    fn adopt_pending_order(&mut self) {
        let mut newest = None;
        while let Ok(order) = self.consumer.pop() {
            newest = Some(order);
        }
        if let Some(order) = newest {
            self.order = order;
        }
    }

    /// Process one interleaved stereo block through the current chain order
    ///
    /// # Real-time Safety
    /// Non-blocking queue drain, atomic parameter reads, no allocations.
    pub fn process(&mut self, buffer: &mut [f32]) {
        self.adopt_pending_order();

        self.phaser.update_from_store(&self.params);

        for stage in self.order {
            let processor: &mut dyn AudioProcessor = match stage {
                EffectStage::Phaser => &mut self.phaser,
                EffectStage::Chorus => &mut self.chorus,
                EffectStage::Reverb => &mut self.reverb,
                EffectStage::Delay => &mut self.delay,
            };
            processor.process(buffer, &self.context);
        }
    }

    /// Reset every stage's internal state
    pub fn reset(&mut self) {
        self.phaser.reset();
        self.chorus.reset();
        self.reverb.reset();
        self.delay.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chain() -> (OrderControl, EffectChain) {
        EffectChain::new(
            ProcessContext::new(48_000.0, 2, 512),
            Arc::new(ParameterStore::new()),
        )
    }

    #[test]
    fn test_default_order() {
        let (_control, chain) = make_chain();
        assert_eq!(chain.current_order(), DEFAULT_ORDER);
    }

    #[test]
    fn test_last_pushed_order_wins() {
        let (mut control, mut chain) = make_chain();

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
        assert!(control.push(first));
        assert!(control.push(second));

        let mut buffer = vec![0.0_f32; 128 * 2];
        chain.process(&mut buffer);

        // Both snapshots were drained; only the second was adopted
        assert_eq!(chain.current_order(), second);
    }

    #[test]
    fn test_order_persists_across_blocks() {
        let (mut control, mut chain) = make_chain();
        let order = [
            EffectStage::Reverb,
            EffectStage::Delay,
            EffectStage::Chorus,
            EffectStage::Phaser,
        ];
        assert!(control.push(order));

        let mut buffer = vec![0.0_f32; 64 * 2];
        chain.process(&mut buffer);
        chain.process(&mut buffer);
        assert_eq!(chain.current_order(), order);
    }

    #[test]
    fn test_queue_rejects_pushes_beyond_capacity() {
        let (mut control, mut chain) = make_chain();

        let mut accepted = 0;
        for _ in 0..ORDER_QUEUE_CAPACITY + 10 {
            if control.push(DEFAULT_ORDER) {
                accepted += 1;
            }
        }
        // Full queue discards the excess instead of blocking
        assert_eq!(accepted, ORDER_QUEUE_CAPACITY);

        // One block drains the whole backlog
        let mut buffer = vec![0.0_f32; 64 * 2];
        chain.process(&mut buffer);
        assert!(control.push(DEFAULT_ORDER));
    }

    #[test]
    fn test_queue_preserves_fifo_order() {
        let (mut producer, mut consumer) = RingBuffer::<u32>::new(8);

        for value in 0..12_u32 {
            let _ = producer.push(value);
        }
        // Drain: exactly the first `capacity` accepted values, in order
        let mut drained = Vec::new();
        while let Ok(value) = consumer.pop() {
            drained.push(value);
        }
        assert_eq!(drained, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_processing_with_reordered_chain_is_stable() {
        let (mut control, mut chain) = make_chain();
        control.push([
            EffectStage::Delay,
            EffectStage::Reverb,
            EffectStage::Chorus,
            EffectStage::Phaser,
        ]);

        let mut buffer: Vec<f32> = (0..512 * 2)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();
        for _ in 0..10 {
            chain.process(&mut buffer);
        }
        for sample in &buffer {
            assert!(sample.is_finite());
        }
    }
}
