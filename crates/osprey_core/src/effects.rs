//! Effect Stage Processors
//!
//! The four reorderable stages of the chain: phaser, chorus, reverb and
//! delay. All process stereo interleaved buffers in-place and obey the
//! real-time contract of [`AudioProcessor`].

use osprey_dsp::SampleWriter;

use crate::params::{ParameterStore, PhaserParam, SmoothedValue};

/// Context passed to processors containing stream metadata
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    pub sample_rate: f32,
    pub channels: usize,
    pub max_block_size: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: f32, channels: usize, max_block_size: usize) -> Self {
        Self {
            sample_rate,
            channels,
            max_block_size,
        }
    }
}

/// Trait for audio processors in the effect chain
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls and NO blocking waits
/// - NO unbounded loops
/// - O(n) time where n = buffer length
///
/// Violating these rules causes audio dropouts.
pub trait AudioProcessor: Send {
    /// Size internal buffers for the stream; called before processing starts
    fn prepare(&mut self, context: &ProcessContext);

    /// Process an interleaved stereo buffer in-place
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext);

    /// Reset internal state (delay lines, LFO phases)
    fn reset(&mut self);

    /// Human-readable name for debugging/UI
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Phaser

const PHASER_STAGES: usize = 4;
/// Quarter-cycle LFO offset between channels gives the stereo sweep
const PHASER_CHANNEL_OFFSET: f32 = 0.25;

/// First-order allpass section, coefficient swept per sample by the LFO
#[derive(Default, Clone, Copy)]
struct AllpassStage {
    z1: f32,
}

impl AllpassStage {
    #[inline]
    fn process(&mut self, input: f32, coefficient: f32) -> f32 {
        let output = -coefficient * input + self.z1;
        self.z1 = input + coefficient * output;
        output
    }
}

#[derive(Default, Clone, Copy)]
struct PhaserChannel {
    stages: [AllpassStage; PHASER_STAGES],
    feedback_sample: f32,
    phase: f32,
}

/// Swept-allpass phaser with feedback and a warmth (saturation) stage on
/// the wet path. Parameters are read from the shared [`ParameterStore`] at
/// block start; the LFO is mirrored into the modulation scope.
pub struct Phaser {
    channels: [PhaserChannel; 2],
    rate_hz: f32,
    centre_hz: f32,
    depth: f32,
    feedback: f32,
    warmth: f32,
    mix_smoother: SmoothedValue,
    sample_rate: f32,
    modulation_scratch: Vec<f32>,
    modulation_feed: Option<SampleWriter>,
}

impl Phaser {
    pub fn new() -> Self {
        Self {
            channels: [PhaserChannel::default(); 2],
            rate_hz: PhaserParam::Rate.default_value(),
            centre_hz: PhaserParam::CentreFreq.default_value(),
            depth: PhaserParam::Depth.default_value(),
            feedback: PhaserParam::Feedback.default_value(),
            warmth: PhaserParam::Warmth.default_value(),
            mix_smoother: SmoothedValue::new(PhaserParam::Mix.default_value()),
            sample_rate: 48_000.0,
            modulation_scratch: Vec::new(),
            modulation_feed: None,
        }
    }

    /// Route the LFO into a modulation-source analyzer for display
    pub fn set_modulation_feed(&mut self, feed: SampleWriter) {
        self.modulation_feed = Some(feed);
    }

    /// Pull current parameter values; called once per block by the chain
    pub fn update_from_store(&mut self, store: &ParameterStore) {
        self.rate_hz = store.get(PhaserParam::Rate);
        self.centre_hz = store.get(PhaserParam::CentreFreq);
        self.depth = store.get(PhaserParam::Depth);
        self.feedback = store.get(PhaserParam::Feedback);
        self.warmth = store.get(PhaserParam::Warmth);
        self.mix_smoother.set_target(store.get(PhaserParam::Mix));
    }
}

impl Default for Phaser {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessor for Phaser {
    fn prepare(&mut self, context: &ProcessContext) {
        self.sample_rate = context.sample_rate;
        self.mix_smoother.reset(context.sample_rate, 0.02);
        self.modulation_scratch.clear();
        self.modulation_scratch.resize(context.max_block_size, 0.0);
        self.reset();
    }

    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        let min_freq = (self.centre_hz * (1.0 - self.depth)).max(40.0);
        let max_freq = (self.centre_hz * (1.0 + self.depth)).min(self.sample_rate * 0.45);
        let phase_increment = self.rate_hz / self.sample_rate;
        let drive = 1.0 + 2.0 * self.warmth;

        let mut recorded = 0;
        for frame in buffer.chunks_exact_mut(2) {
            let mix = self.mix_smoother.next();

            for (channel_index, sample) in frame.iter_mut().enumerate() {
                let channel = &mut self.channels[channel_index];
                channel.phase = (channel.phase + phase_increment).fract();
                let lfo = (std::f32::consts::TAU * channel.phase).sin();

                if channel_index == 0 && recorded < self.modulation_scratch.len() {
                    self.modulation_scratch[recorded] = lfo;
                    recorded += 1;
                }

                let sweep = lfo * 0.5 + 0.5;
                let freq = min_freq + (max_freq - min_freq) * sweep;
                let omega = (std::f32::consts::PI * freq / self.sample_rate)
                    .tan()
                    .min(10.0);
                let coefficient = (1.0 - omega) / (1.0 + omega);

                let dry = *sample;
                let mut wet = dry + channel.feedback_sample * self.feedback;
                for stage in &mut channel.stages {
                    wet = stage.process(wet, coefficient);
                }
                channel.feedback_sample = wet;

                if self.warmth > 0.0 {
                    let saturated = (wet * drive).tanh();
                    wet += (saturated - wet) * self.warmth;
                }

                *sample = wet * mix + dry * (1.0 - mix);
            }
        }

        if let Some(feed) = &mut self.modulation_feed {
            feed.write(&self.modulation_scratch[..recorded], 1);
        }
    }

    fn reset(&mut self) {
        self.channels = [PhaserChannel::default(); 2];
        self.channels[1].phase = PHASER_CHANNEL_OFFSET;
    }

    fn name(&self) -> &'static str {
        "Phaser"
    }
}

// ---------------------------------------------------------------------------
// Chorus

/// Delay line with a fractional, interpolated read tap
struct ModulatedDelay {
    buffer: Vec<f32>,
    write: usize,
}

impl ModulatedDelay {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(2)],
            write: 0,
        }
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }

    #[inline]
    fn push(&mut self, value: f32) {
        self.buffer[self.write] = value;
        self.write = (self.write + 1) % self.buffer.len();
    }

    #[inline]
    fn read_interpolated(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay_samples.clamp(1.0, (len as f32 - 2.0).max(1.0));
        let mut position = self.write as f32 - delay;
        if position < 0.0 {
            position += len as f32;
        }
        let index = position as usize % len;
        let next = (index + 1) % len;
        let fraction = position - position.floor();
        self.buffer[index] * (1.0 - fraction) + self.buffer[next] * fraction
    }
}

/// LFO-modulated delay chorus
pub struct Chorus {
    lines: [ModulatedDelay; 2],
    phases: [f32; 2],
    rate_hz: f32,
    depth_ms: f32,
    base_ms: f32,
    feedback: f32,
    mix: f32,
    sample_rate: f32,
}

impl Chorus {
    pub fn new() -> Self {
        Self {
            lines: [ModulatedDelay::new(2), ModulatedDelay::new(2)],
            phases: [0.0, 0.25],
            rate_hz: 1.2,
            depth_ms: 8.0,
            base_ms: 15.0,
            feedback: 0.15,
            mix: 0.4,
            sample_rate: 48_000.0,
        }
    }

    pub fn set_rate(&mut self, rate_hz: f32) {
        self.rate_hz = rate_hz.clamp(0.1, 5.0);
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }
}

impl Default for Chorus {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessor for Chorus {
    fn prepare(&mut self, context: &ProcessContext) {
        self.sample_rate = context.sample_rate;
        let max_delay =
            (((self.base_ms + self.depth_ms) / 1000.0) * context.sample_rate).ceil() as usize + 2;
        self.lines = [ModulatedDelay::new(max_delay), ModulatedDelay::new(max_delay)];
        self.reset();
    }

    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        let depth_samples = (self.depth_ms / 1000.0) * self.sample_rate;
        let base_samples = (self.base_ms / 1000.0) * self.sample_rate;
        let phase_increment = self.rate_hz / self.sample_rate;

        for frame in buffer.chunks_exact_mut(2) {
            for (channel_index, sample) in frame.iter_mut().enumerate() {
                let phase = &mut self.phases[channel_index];
                *phase = (*phase + phase_increment).fract();
                let lfo = (std::f32::consts::TAU * *phase).sin();

                let delay = base_samples + depth_samples * (lfo * 0.5 + 0.5);
                let line = &mut self.lines[channel_index];
                let delayed = line.read_interpolated(delay);
                line.push(*sample + delayed * self.feedback);

                *sample = *sample * (1.0 - self.mix) + delayed * self.mix;
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.phases = [0.0, 0.25];
    }

    fn name(&self) -> &'static str {
        "Chorus"
    }
}

// ---------------------------------------------------------------------------
// Reverb

/// Comb/allpass tunings in samples at 44.1kHz, scaled to the stream rate
const COMB_TUNINGS: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNINGS: [usize; 2] = [556, 441];
/// Offset added to the right channel's lines to decorrelate the tail
const STEREO_SPREAD: usize = 23;

struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp: f32,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            index: 0,
            feedback,
            damp,
            filter_state: 0.0,
        }
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.filter_state = 0.0;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        // One-pole lowpass in the loop damps the high end of the tail
        self.filter_state = output * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer[self.index] = input + self.filter_state * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

struct AllpassDiffuser {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassDiffuser {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            index: 0,
        }
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        let output = buffered - input;
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

struct ReverbChannel {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassDiffuser>,
}

impl ReverbChannel {
    fn new(sample_rate: f32, spread: usize, feedback: f32, damp: f32) -> Self {
        let scale = (sample_rate / 44_100.0).max(0.25);
        let combs = COMB_TUNINGS
            .iter()
            .map(|length| {
                let scaled = ((*length + spread) as f32 * scale).round().max(1.0) as usize;
                CombFilter::new(scaled, feedback, damp)
            })
            .collect();
        let allpasses = ALLPASS_TUNINGS
            .iter()
            .map(|length| {
                let scaled = ((*length + spread) as f32 * scale).round().max(1.0) as usize;
                AllpassDiffuser::new(scaled)
            })
            .collect();
        Self { combs, allpasses }
    }

    fn clear(&mut self) {
        for comb in &mut self.combs {
            comb.clear();
        }
        for allpass in &mut self.allpasses {
            allpass.clear();
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut sum = 0.0;
        for comb in &mut self.combs {
            sum += comb.process(input);
        }
        for allpass in &mut self.allpasses {
            sum = allpass.process(sum);
        }
        sum * 0.25
    }
}

/// Schroeder reverb: parallel damped combs into series allpass diffusers
pub struct Reverb {
    channels: Vec<ReverbChannel>,
    feedback: f32,
    damp: f32,
    mix: f32,
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            feedback: 0.84,
            damp: 0.2,
            mix: 0.3,
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn set_room_size(&mut self, room: f32) {
        self.feedback = 0.75 + room.clamp(0.0, 1.0) * 0.2;
        for channel in &mut self.channels {
            for comb in &mut channel.combs {
                comb.feedback = self.feedback;
            }
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessor for Reverb {
    fn prepare(&mut self, context: &ProcessContext) {
        self.channels = (0..2)
            .map(|channel| {
                let spread = if channel == 1 { STEREO_SPREAD } else { 0 };
                ReverbChannel::new(context.sample_rate, spread, self.feedback, self.damp)
            })
            .collect();
    }

    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        if self.channels.len() < 2 {
            return;
        }
        for frame in buffer.chunks_exact_mut(2) {
            for (channel_index, sample) in frame.iter_mut().enumerate() {
                let dry = *sample;
                let wet = self.channels[channel_index].process(dry);
                *sample = dry * (1.0 - self.mix) + wet * self.mix;
            }
        }
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
    }

    fn name(&self) -> &'static str {
        "Reverb"
    }
}

// ---------------------------------------------------------------------------
// Delay

struct DelayLine {
    buffer: Vec<f32>,
    index: usize,
}

impl DelayLine {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            index: 0,
        }
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let delayed = self.buffer[self.index];
        self.buffer[self.index] = input + delayed * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        delayed
    }
}

/// Feedback delay
pub struct Delay {
    lines: [DelayLine; 2],
    time_ms: f32,
    feedback: f32,
    mix: f32,
    sample_rate: f32,
}

impl Delay {
    pub fn new() -> Self {
        Self {
            lines: [DelayLine::new(1), DelayLine::new(1)],
            time_ms: 400.0,
            feedback: 0.35,
            mix: 0.35,
            sample_rate: 48_000.0,
        }
    }

    /// Change the delay time; resizes the lines, so control-time only
    pub fn set_time_ms(&mut self, time_ms: f32) {
        self.time_ms = time_ms.clamp(1.0, 2000.0);
        let length = ((self.time_ms / 1000.0) * self.sample_rate).round().max(1.0) as usize;
        self.lines = [DelayLine::new(length), DelayLine::new(length)];
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessor for Delay {
    fn prepare(&mut self, context: &ProcessContext) {
        self.sample_rate = context.sample_rate;
        let length = ((self.time_ms / 1000.0) * context.sample_rate).round().max(1.0) as usize;
        self.lines = [DelayLine::new(length), DelayLine::new(length)];
    }

    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        for frame in buffer.chunks_exact_mut(2) {
            for (channel_index, sample) in frame.iter_mut().enumerate() {
                let delayed = self.lines[channel_index].process(*sample, self.feedback);
                *sample = *sample * (1.0 - self.mix) + delayed * self.mix;
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }

    fn name(&self) -> &'static str {
        "Delay"
    }
}
