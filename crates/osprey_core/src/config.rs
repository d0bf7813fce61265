//! Engine Configuration

use serde::{Deserialize, Serialize};

/// Host stream contract, established at prepare time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of audio channels (the engine processes stereo)
    pub channels: u16,

    /// Maximum block size in frames; actual callbacks may deliver less
    pub max_block_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            max_block_size: 512,
        }
    }
}

impl StreamConfig {
    /// Worst-case latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.max_block_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels != 2 {
            return Err(format!(
                "Unsupported channel count: {} (stereo only)",
                self.channels
            ));
        }
        if self.max_block_size < 32 || self.max_block_size > 8192 {
            return Err(format!("Invalid block size: {}", self.max_block_size));
        }
        Ok(())
    }
}

/// Sizing and refresh settings for the analysis side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    /// Sample backlog each analyzer fifo can hold. Sized to roughly one
    /// second of audio so bursts at typical refresh rates never drop data.
    pub fifo_capacity: usize,

    /// UI redraw rate the analyzers pace themselves against (Hz)
    pub refresh_rate_hz: u32,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            fifo_capacity: 48_000,
            refresh_rate_hz: 30,
        }
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub stream: StreamConfig,
    pub analyzer: AnalyzerSettings,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        if self.analyzer.refresh_rate_hz == 0 || self.analyzer.refresh_rate_hz > 240 {
            return Err(format!(
                "Invalid refresh rate: {}",
                self.analyzer.refresh_rate_hz
            ));
        }
        if self.analyzer.fifo_capacity < 1024 {
            return Err(format!(
                "Analyzer fifo too small: {}",
                self.analyzer.fifo_capacity
            ));
        }
        Ok(())
    }
}
