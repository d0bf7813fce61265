//! Parameter Binding
//!
//! The automatable parameter surface for the effect chain. Each parameter is
//! identified by a stable string id (what the host automates) and a tagged
//! enum (what the code dispatches on); values live in an atomic store shared
//! between the control thread and the audio thread, so the audio side reads
//! the current value at block start without locking.
//!
//! Values are validated against their [`ParamRange`] when set, never when
//! read: the audio path trusts the store.

use std::sync::atomic::{AtomicU32, Ordering};

use osprey_dsp::{db_to_gain, gain_to_db};

/// Note length choices for tempo-synced modulation rates
pub const NOTE_LENGTHS: [&str; 16] = [
    "1/32", "1/16T", "1/32.", "1/16", "1/8T", "1/16.", "1/8", "1/4T", "1/8.", "1/4", "1/2T",
    "1/4.", "1/2", "1/1T", "1/2.", "1/1",
];

/// Valid range of one parameter, with optional skewed normalization so
/// UI controls give frequency-like parameters a usable sweep
#[derive(Debug, Clone, Copy)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    skew: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32, step: f32) -> Self {
        Self {
            min,
            max,
            step,
            skew: 1.0,
        }
    }

    /// Skew the normalized mapping so `centre` sits at the control's midpoint
    pub fn with_centre(mut self, centre: f32) -> Self {
        let proportion = (centre - self.min) / (self.max - self.min);
        self.skew = proportion.ln() / 0.5_f32.ln();
        self
    }

    /// Snap to the step grid and clamp into range
    pub fn clamp(&self, value: f32) -> f32 {
        let snapped = if self.step > 0.0 {
            self.min + ((value - self.min) / self.step).round() * self.step
        } else {
            value
        };
        snapped.clamp(self.min, self.max)
    }

    /// Map a value into [0, 1] through the skew curve
    pub fn to_normalized(&self, value: f32) -> f32 {
        let proportion = ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        proportion.powf(1.0 / self.skew)
    }

    /// Map a [0, 1] control position back to a value
    pub fn from_normalized(&self, position: f32) -> f32 {
        self.min + (self.max - self.min) * position.clamp(0.0, 1.0).powf(self.skew)
    }
}

/// Linear ramp toward a target value, advanced once per sample
///
/// Keeps audible parameters (the wet/dry mix) from stepping when the host
/// automates them.
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    step_size: f32,
    steps_remaining: u32,
    ramp_samples: u32,
}

impl SmoothedValue {
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step_size: 0.0,
            steps_remaining: 0,
            ramp_samples: 0,
        }
    }

    /// Configure the ramp length and snap to the current target
    pub fn reset(&mut self, sample_rate: f32, ramp_seconds: f32) {
        self.ramp_samples = (sample_rate * ramp_seconds).max(1.0) as u32;
        self.current = self.target;
        self.steps_remaining = 0;
    }

    pub fn set_target(&mut self, target: f32) {
        if (target - self.target).abs() < f32::EPSILON {
            return;
        }
        self.target = target;
        if self.ramp_samples == 0 {
            self.current = target;
            self.steps_remaining = 0;
        } else {
            self.steps_remaining = self.ramp_samples;
            self.step_size = (target - self.current) / self.ramp_samples as f32;
        }
    }

    /// Advance one sample and return the smoothed value
    pub fn next(&mut self) -> f32 {
        if self.steps_remaining > 0 {
            self.current += self.step_size;
            self.steps_remaining -= 1;
            if self.steps_remaining == 0 {
                self.current = self.target;
            }
        }
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }
}

/// The phaser's automatable fields
///
/// Routing dispatches on this tag; the string ids exist only at the host
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaserParam {
    Rate,
    CentreFreq,
    Depth,
    Feedback,
    Warmth,
    Mix,
    TempoSync,
    Note,
}

impl PhaserParam {
    pub const ALL: [PhaserParam; 8] = [
        PhaserParam::Rate,
        PhaserParam::CentreFreq,
        PhaserParam::Depth,
        PhaserParam::Feedback,
        PhaserParam::Warmth,
        PhaserParam::Mix,
        PhaserParam::TempoSync,
        PhaserParam::Note,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            PhaserParam::Rate => "phaser-rate",
            PhaserParam::CentreFreq => "phaser-centre-freq",
            PhaserParam::Depth => "phaser-depth",
            PhaserParam::Feedback => "phaser-feedback",
            PhaserParam::Warmth => "phaser-warmth",
            PhaserParam::Mix => "phaser-mix",
            PhaserParam::TempoSync => "phaser-tempo-sync",
            PhaserParam::Note => "phaser-note",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.id() == id)
    }

    pub fn range(&self) -> ParamRange {
        match self {
            PhaserParam::Rate => ParamRange::new(0.01, 1.0, 0.01),
            PhaserParam::CentreFreq => ParamRange::new(20.0, 20_000.0, 1.0).with_centre(2000.0),
            PhaserParam::Depth => ParamRange::new(0.0, 1.0, 0.01),
            PhaserParam::Feedback => ParamRange::new(-1.0, 1.0, 0.01),
            PhaserParam::Warmth => ParamRange::new(0.0, 1.0, 0.01),
            PhaserParam::Mix => ParamRange::new(0.0, 1.0, 0.01),
            PhaserParam::TempoSync => ParamRange::new(0.0, 1.0, 1.0),
            PhaserParam::Note => ParamRange::new(0.0, 15.0, 1.0),
        }
    }

    pub fn default_value(&self) -> f32 {
        match self {
            PhaserParam::Rate => 0.2,
            PhaserParam::CentreFreq => 1000.0,
            PhaserParam::Depth => 0.5,
            PhaserParam::Feedback => 0.0,
            PhaserParam::Warmth => 0.0,
            PhaserParam::Mix => 1.0,
            PhaserParam::TempoSync => 0.0,
            PhaserParam::Note => 9.0, // 1/4
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(0)
    }
}

/// Atomic value store shared between the control and audio threads
///
/// Setting validates through the parameter's range; reading is a relaxed
/// atomic load, cheap enough for every block.
pub struct ParameterStore {
    slots: [AtomicU32; PhaserParam::ALL.len()],
}

impl ParameterStore {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| {
                AtomicU32::new(PhaserParam::ALL[i].default_value().to_bits())
            }),
        }
    }

    pub fn set(&self, param: PhaserParam, value: f32) {
        let clamped = param.range().clamp(value);
        self.slots[param.index()].store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self, param: PhaserParam) -> f32 {
        f32::from_bits(self.slots[param.index()].load(Ordering::Relaxed))
    }

    /// Set by host-facing id; returns false for unknown ids
    pub fn set_by_id(&self, id: &str, value: f32) -> bool {
        match PhaserParam::from_id(id) {
            Some(param) => {
                self.set(param, value);
                true
            }
            None => false,
        }
    }

    /// Display text for the current value of a parameter
    pub fn format_value(&self, param: PhaserParam) -> String {
        let value = self.get(param);
        match param {
            PhaserParam::Rate | PhaserParam::CentreFreq => format_frequency(value),
            PhaserParam::Depth | PhaserParam::Warmth | PhaserParam::Mix => {
                format!("{:.0} %", value * 100.0)
            }
            PhaserParam::Feedback => format!("{:.0} %", value * 100.0),
            PhaserParam::TempoSync => (if value >= 0.5 { "on" } else { "off" }).to_string(),
            PhaserParam::Note => NOTE_LENGTHS
                .get(value.round().max(0.0) as usize)
                .unwrap_or(&"1/4")
                .to_string(),
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

// Numeric <-> text conversions shared by the parameter surfaces

pub fn format_frequency(hz: f32) -> String {
    if hz < 1000.0 {
        format!("{:.0} Hz", hz)
    } else {
        format!("{:.2} kHz", hz / 1000.0)
    }
}

pub fn parse_frequency(text: &str) -> Option<f32> {
    if let Some(value) = text.strip_suffix(" kHz").or_else(|| text.strip_suffix("kHz")) {
        return value.trim().parse::<f32>().ok().map(|v| v * 1000.0);
    }
    if let Some(value) = text.strip_suffix(" Hz").or_else(|| text.strip_suffix("Hz")) {
        return value.trim().parse::<f32>().ok();
    }
    text.trim().parse::<f32>().ok()
}

/// Linear gain factor rendered as decibel text
pub fn format_gain(linear: f32) -> String {
    format!("{:.1} dB", gain_to_db(linear))
}

/// Decibel text parsed back to a linear gain factor
pub fn parse_gain(text: &str) -> Option<f32> {
    let trimmed = text.strip_suffix(" dB").or_else(|| text.strip_suffix("dB"));
    trimmed
        .unwrap_or(text)
        .trim()
        .parse::<f32>()
        .ok()
        .map(db_to_gain)
}

pub fn format_quality(quality: f32) -> String {
    format!("{:.1}", quality)
}
