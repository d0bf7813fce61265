//! 6-Band Parametric Equalizer
//!
//! A cascade of biquad stages with live pre/post spectrum analysis.
//!
//! The equalizer is split at the thread boundary:
//!
//! - [`Equalizer`] lives on the control/UI thread. It owns the band
//!   descriptors, designs coefficients on parameter changes, maintains the
//!   response plots and the solo/bypass policy, and owns both analyzers.
//! - [`FilterBank`] is handed to the audio thread by
//!   [`Equalizer::prepare`]. It holds the actual filter state and processes
//!   blocks, adopting pending coefficient updates at block start.
//!
//! The two sides share only the per-stage coefficient slots: a mutex held
//! for the duration of a struct copy, plus dirty/bypass flags. Everything
//! else is thread-confined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use biquad::{Biquad, Coefficients, DirectForm2Transposed};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::DspError;
use crate::fifo::SampleWriter;
use crate::filter::{
    design_coefficients, frequency_grid, magnitude_response, FilterKind, FilterRanges,
    PLOT_RESOLUTION,
};
use crate::plot::{CurvePath, PlotArea};
use crate::spectrum::SpectrumAnalyzer;

/// Number of EQ bands
pub const BAND_COUNT: usize = 6;

/// Display colour for a band (display-only, never touches the signal path)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Fallback colour for out-of-range band queries
pub const FALLBACK_COLOUR: Rgb = Rgb(192, 192, 192);

/// One configurable filter band
#[derive(Debug, Clone)]
pub struct Band {
    pub name: &'static str,
    pub kind: FilterKind,
    /// Centre/corner frequency in Hz
    pub frequency: f32,
    /// Filter steepness
    pub quality: f32,
    /// Linear gain factor
    pub gain: f32,
    pub active: bool,
    pub selected: bool,
    pub colour: Rgb,
    /// Magnitude response over the plot grid, refreshed on every change
    magnitudes: Vec<f32>,
}

impl Band {
    fn new(name: &'static str, kind: FilterKind, frequency: f32, colour: Rgb) -> Self {
        Self {
            name,
            kind,
            frequency,
            quality: 0.707,
            gain: 1.0,
            active: true,
            selected: false,
            colour,
            magnitudes: vec![1.0; PLOT_RESOLUTION],
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }
}

/// The default bank: a sweepable high-pass/low-pass pair bracketing shelves
/// and peaks across the spectrum
fn default_bands() -> Vec<Band> {
    vec![
        Band::new("Lowest", FilterKind::HighPass, 20.0, Rgb(0, 0, 255)),
        Band::new("Low", FilterKind::LowShelf, 250.0, Rgb(165, 42, 42)),
        Band::new("Low Mids", FilterKind::Peak, 500.0, Rgb(0, 128, 0)),
        Band::new("High Mids", FilterKind::Peak, 1000.0, Rgb(255, 127, 80)),
        Band::new("High", FilterKind::HighShelf, 5000.0, Rgb(255, 165, 0)),
        Band::new("Highest", FilterKind::LowPass, 12000.0, Rgb(255, 0, 0)),
    ]
}

/// Band fields addressable through the parameter system
///
/// Parameter-change routing dispatches on this tag instead of matching
/// string suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandField {
    Kind,
    Frequency,
    Quality,
    Gain,
    Active,
}

impl BandField {
    pub const ALL: [BandField; 5] = [
        BandField::Kind,
        BandField::Frequency,
        BandField::Quality,
        BandField::Gain,
        BandField::Active,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BandField::Kind => "type",
            BandField::Frequency => "frequency",
            BandField::Quality => "quality",
            BandField::Gain => "gain",
            BandField::Active => "active",
        }
    }

    pub fn from_str(text: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == text)
    }
}

/// Automatable parameter id for a band field: `"<band name>-<field>"`
pub fn band_param_id(band_name: &str, field: BandField) -> String {
    format!("{}-{}", band_name, field.as_str())
}

/// One stage's slot in the shared coefficient exchange
struct StageSlot {
    coefficients: Mutex<Coefficients<f32>>,
    dirty: AtomicBool,
    bypassed: AtomicBool,
}

impl StageSlot {
    fn new() -> Self {
        Self {
            // Pass-through until the first design lands
            coefficients: Mutex::new(Coefficients {
                a1: 0.0,
                a2: 0.0,
                b0: 1.0,
                b1: 0.0,
                b2: 0.0,
            }),
            dirty: AtomicBool::new(false),
            bypassed: AtomicBool::new(false),
        }
    }
}

/// Coefficient slots shared between the control and audio sides.
/// The only audio-critical shared mutable state in the equalizer.
struct BankShared {
    stages: [StageSlot; BAND_COUNT],
}

/// Per-stage filter state for a stereo signal
struct StereoStage {
    left: DirectForm2Transposed<f32>,
    right: DirectForm2Transposed<f32>,
}

impl StereoStage {
    fn new(coefficients: Coefficients<f32>) -> Self {
        Self {
            left: DirectForm2Transposed::<f32>::new(coefficients),
            right: DirectForm2Transposed::<f32>::new(coefficients),
        }
    }

    fn update(&mut self, coefficients: Coefficients<f32>) {
        self.left.update_coefficients(coefficients);
        self.right.update_coefficients(coefficients);
    }

    fn reset(&mut self) {
        self.left.reset_state();
        self.right.reset_state();
    }
}

/// Audio-side filter cascade
///
/// # Real-time Safety
/// `process_interleaved` performs no allocations and no blocking waits; the
/// only lock it can take is a per-stage coefficient copy, and only when that
/// stage was flagged dirty.
pub struct FilterBank {
    shared: Arc<BankShared>,
    stages: [StereoStage; BAND_COUNT],
    was_all_bypassed: bool,
    input_feed: SampleWriter,
    output_feed: SampleWriter,
}

impl FilterBank {
    /// Process a stereo interleaved buffer in-place, feeding the pre- and
    /// post-filter analyzers on the way through
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        self.input_feed.write(buffer, 2);

        // Adopt coefficient updates published since the last block
        for (stage, slot) in self.stages.iter_mut().zip(self.shared.stages.iter()) {
            if slot.dirty.swap(false, Ordering::Acquire) {
                let coefficients = *slot.coefficients.lock();
                stage.update(coefficients);
            }
        }

        let mut bypassed = [false; BAND_COUNT];
        for (flag, slot) in bypassed.iter_mut().zip(self.shared.stages.iter()) {
            *flag = slot.bypassed.load(Ordering::Acquire);
        }
        let all_bypassed = bypassed.iter().all(|b| *b);

        // Coming out of full bypass with stale delay lines would click
        if !all_bypassed && self.was_all_bypassed {
            self.reset();
        }
        self.was_all_bypassed = all_bypassed;

        if !all_bypassed {
            for frame in buffer.chunks_exact_mut(2) {
                let mut left = frame[0];
                let mut right = frame[1];
                for (stage, skip) in self.stages.iter_mut().zip(bypassed.iter()) {
                    if !skip {
                        left = stage.left.run(left);
                        right = stage.right.run(right);
                    }
                }
                frame[0] = left;
                frame[1] = right;
            }
        }

        self.output_feed.write(buffer, 2);
    }

    /// Clear all stage delay lines
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    /// Current bypass flags, one per stage
    pub fn bypassed_stages(&self) -> [bool; BAND_COUNT] {
        let mut flags = [false; BAND_COUNT];
        for (flag, slot) in flags.iter_mut().zip(self.shared.stages.iter()) {
            *flag = slot.bypassed.load(Ordering::Acquire);
        }
        flags
    }
}

/// Control-side equalizer engine
///
/// Owns band state, coefficient design, the response plots and both
/// spectrum analyzers. All methods are meant for the UI/control thread;
/// audio-side processing happens in the [`FilterBank`] this hands out.
pub struct Equalizer {
    bands: Vec<Band>,
    frequencies: Vec<f32>,
    /// Combined response of all contributing bands
    magnitudes: Vec<f32>,
    soloed: Option<usize>,
    sample_rate: Option<f32>,
    ranges: FilterRanges,
    shared: Arc<BankShared>,
    input_analyzer: SpectrumAnalyzer,
    output_analyzer: SpectrumAnalyzer,
    response_changed: bool,
}

impl Equalizer {
    pub fn new(ranges: FilterRanges) -> Self {
        Self {
            bands: default_bands(),
            frequencies: frequency_grid(),
            magnitudes: vec![1.0; PLOT_RESOLUTION],
            soloed: None,
            sample_rate: None,
            ranges,
            shared: Arc::new(BankShared {
                stages: core::array::from_fn(|_| StageSlot::new()),
            }),
            input_analyzer: SpectrumAnalyzer::new(),
            output_analyzer: SpectrumAnalyzer::new(),
            response_changed: false,
        }
    }

    /// Design all bands for `sample_rate`, start both analyzers, and hand
    /// back the audio-side filter bank
    pub fn prepare(
        &mut self,
        sample_rate: f32,
        analyzer_fifo_capacity: usize,
    ) -> Result<FilterBank, DspError> {
        if sample_rate <= 0.0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        self.sample_rate = Some(sample_rate);

        for index in 0..self.bands.len() {
            self.update_band(index)?;
        }

        let input_feed = self
            .input_analyzer
            .setup(analyzer_fifo_capacity, sample_rate)?;
        let output_feed = self
            .output_analyzer
            .setup(analyzer_fifo_capacity, sample_rate)?;

        debug!("equalizer prepared at {} Hz", sample_rate);

        let stages = core::array::from_fn(|i| {
            let coefficients = *self.shared.stages[i].coefficients.lock();
            StereoStage::new(coefficients)
        });

        Ok(FilterBank {
            shared: Arc::clone(&self.shared),
            stages,
            was_all_bypassed: false,
            input_feed,
            output_feed,
        })
    }

    /// Stop the analyzer threads. The engine calls this when streaming ends;
    /// dropping the equalizer does the same.
    pub fn release(&mut self) {
        self.input_analyzer.stop(Duration::from_secs(1));
        self.output_analyzer.stop(Duration::from_secs(1));
    }

    /// Redesign one band's coefficients and refresh the plots
    ///
    /// Does nothing (successfully) while no sample rate is known; the
    /// pending state is applied by the next [`prepare`](Self::prepare).
    pub fn update_band(&mut self, index: usize) -> Result<(), DspError> {
        if index >= self.bands.len() {
            return Err(DspError::InvalidBandIndex(index));
        }
        let Some(sample_rate) = self.sample_rate else {
            return Ok(());
        };

        let band = &self.bands[index];
        let coefficients =
            design_coefficients(band.kind, sample_rate, band.frequency, band.quality, band.gain)?;

        {
            // Lock scope covers only the struct copy
            let slot = &self.shared.stages[index];
            *slot.coefficients.lock() = coefficients;
            slot.dirty.store(true, Ordering::Release);
        }

        magnitude_response(
            &coefficients,
            &self.frequencies,
            sample_rate,
            &mut self.bands[index].magnitudes,
        );

        self.update_bypass_states();
        self.update_plots();
        Ok(())
    }

    /// Apply one validated parameter change to a band
    ///
    /// Values are normalized into the configured ranges before they land, so
    /// the coefficient design never sees out-of-range input.
    pub fn set_band_parameter(
        &mut self,
        index: usize,
        field: BandField,
        value: f32,
    ) -> Result<(), DspError> {
        let band = self
            .bands
            .get_mut(index)
            .ok_or(DspError::InvalidBandIndex(index))?;

        match field {
            BandField::Kind => {
                if let Some(kind) = FilterKind::from_index(value.round().max(0.0) as usize) {
                    band.kind = kind;
                }
            }
            BandField::Frequency => band.frequency = self.ranges.clamp_frequency(value),
            BandField::Quality => band.quality = self.ranges.clamp_quality(value),
            BandField::Gain => band.gain = self.ranges.clamp_gain(value),
            BandField::Active => band.active = value >= 0.5,
        }

        self.update_band(index)
    }

    /// Resolve a `"<band name>-<field>"` parameter id
    pub fn parse_param_id(&self, id: &str) -> Option<(usize, BandField)> {
        for (index, band) in self.bands.iter().enumerate() {
            if let Some(rest) = id.strip_prefix(band.name) {
                if let Some(field_name) = rest.strip_prefix('-') {
                    if let Some(field) = BandField::from_str(field_name) {
                        return Some((index, field));
                    }
                }
            }
        }
        None
    }

    /// Parameter id for a band field, `None` for an out-of-range index
    pub fn param_id(&self, index: usize, field: BandField) -> Option<String> {
        self.bands
            .get(index)
            .map(|band| band_param_id(band.name, field))
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> Option<&Band> {
        self.bands.get(index)
    }

    pub fn band_name(&self, index: usize) -> &'static str {
        self.bands.get(index).map(|b| b.name).unwrap_or("unknown")
    }

    pub fn band_colour(&self, index: usize) -> Rgb {
        self.bands
            .get(index)
            .map(|b| b.colour)
            .unwrap_or(FALLBACK_COLOUR)
    }

    /// Solo one band (or none): every other band is forced into bypass in
    /// the live chain regardless of its own active flag
    pub fn set_band_solo(&mut self, index: Option<usize>) {
        self.soloed = index.filter(|i| *i < self.bands.len());
        self.update_bypass_states();
        self.update_plots();
    }

    pub fn band_solo(&self, index: usize) -> bool {
        self.soloed == Some(index)
    }

    /// Mark one band as selected in the UI (or clear the selection)
    pub fn set_selected_band(&mut self, index: Option<usize>) {
        for band in &mut self.bands {
            band.selected = false;
        }
        if let Some(band) = index.and_then(|i| self.bands.get_mut(i)) {
            band.selected = true;
        }
    }

    pub fn selected_band(&self) -> Option<usize> {
        self.bands.iter().position(|b| b.selected)
    }

    /// Live bypass flag of a chain stage, as the audio side will see it
    pub fn stage_bypassed(&self, index: usize) -> Option<bool> {
        self.shared
            .stages
            .get(index)
            .map(|slot| slot.bypassed.load(Ordering::Acquire))
    }

    /// Combined magnitude response of all contributing bands
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// The log-spaced frequency grid the responses are evaluated on
    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    /// True once after every change to the combined response curve
    pub fn check_response_changed(&mut self) -> bool {
        std::mem::take(&mut self.response_changed)
    }

    /// Render a magnitude array over the plot grid; y is log2-magnitude
    /// scaled by `pixels_per_double` around the vertical centre
    pub fn create_frequency_plot(
        &self,
        path: &mut CurvePath,
        magnitudes: &[f32],
        area: PlotArea,
        pixels_per_double: f32,
    ) {
        path.clear();
        if magnitudes.is_empty() {
            return;
        }

        let x_factor = area.width / self.frequencies.len() as f32;
        path.move_to(
            area.x,
            area.centre_y() - pixels_per_double * magnitudes[0].max(1e-12).log2(),
        );
        for (i, mag) in magnitudes.iter().enumerate().skip(1) {
            let x = area.x + i as f32 * x_factor;
            let y = area.centre_y() - pixels_per_double * mag.max(1e-12).log2();
            path.line_to(x, y);
        }
    }

    /// Render the pre- (`input == true`) or post-filter spectrum
    pub fn create_analyser_plot(
        &self,
        path: &mut CurvePath,
        area: PlotArea,
        min_frequency: f32,
        input: bool,
    ) {
        if input {
            self.input_analyzer.create_path(path, area, min_frequency);
        } else {
            self.output_analyzer.create_path(path, area, min_frequency);
        }
    }

    /// True when either analyzer published a frame since the last check
    pub fn check_for_new_analyser_data(&self) -> bool {
        let input = self.input_analyzer.check_for_new_data();
        let output = self.output_analyzer.check_for_new_data();
        input | output
    }

    fn update_bypass_states(&self) {
        match self.soloed {
            Some(solo) => {
                for (i, slot) in self.shared.stages.iter().enumerate() {
                    slot.bypassed.store(i != solo, Ordering::Release);
                }
            }
            None => {
                for (band, slot) in self.bands.iter().zip(self.shared.stages.iter()) {
                    slot.bypassed.store(!band.active, Ordering::Release);
                }
            }
        }
    }

    fn update_plots(&mut self) {
        self.magnitudes.fill(1.0);

        match self.soloed {
            Some(solo) => {
                for (combined, mag) in self
                    .magnitudes
                    .iter_mut()
                    .zip(self.bands[solo].magnitudes.iter())
                {
                    *combined *= mag;
                }
            }
            None => {
                for band in self.bands.iter().filter(|b| b.active) {
                    for (combined, mag) in self.magnitudes.iter_mut().zip(band.magnitudes.iter()) {
                        *combined *= mag;
                    }
                }
            }
        }

        self.response_changed = true;
    }
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new(FilterRanges::default())
    }
}

impl Drop for Equalizer {
    fn drop(&mut self) {
        self.release();
    }
}
