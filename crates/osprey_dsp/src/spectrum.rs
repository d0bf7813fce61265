//! FFT Spectrum Analyzer
//!
//! Converts a continuous sample stream into a smoothed, displayable
//! magnitude spectrum on a dedicated background thread, so transform cost
//! never lands on the audio callback.
//!
//! # Architecture
//!
//! The audio thread feeds samples through a [`SampleWriter`]; the worker
//! drains one FFT frame at a time, windows it, transforms it, and folds the
//! magnitudes into a rotating 5-row averager. Row 0 is the published running
//! average; it is the only state shared with the UI thread and is guarded by
//! a mutex held just long enough to copy a row. A "new data" flag tells the
//! renderer when a fresh frame has been published; the renderer clears it,
//! not the worker, so a frame is reported at most once.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::{debug, error};

use crate::error::DspError;
use crate::fifo::{SampleFifo, SampleReader, SampleWriter};
use crate::filter::gain_to_db_with_floor;
use crate::plot::{map_range, CurvePath, PlotArea};

/// FFT frame length (power of 2). 4096 at 48kHz = ~85ms window, ~12Hz bins
pub const FFT_SIZE: usize = 4096;

/// Number of magnitude bins published per frame (positive frequencies only)
pub const SPECTRUM_BINS: usize = FFT_SIZE / 2;

/// Rows in the averager: row 0 accumulates, rows 1.. hold scaled history
const AVERAGER_ROWS: usize = 5;

/// Kaiser window shape parameter (sidelobes ~-45dB)
const KAISER_BETA: f64 = 6.0;

/// How long the worker sleeps when starved before re-checking
const STARVED_WAIT: Duration = Duration::from_millis(100);

/// How long shutdown waits for the worker before declaring it leaked
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Display floor for the spectrum plot
const DISPLAY_FLOOR_DB: f32 = -80.0;

/// Rotating history of averaged magnitude frames
///
/// Row 0 always holds the published running average. New frames replace the
/// oldest history row: its previous contribution is subtracted from row 0 and
/// the freshly scaled frame added, so row 0 stays the mean of the history
/// without re-summing.
struct Averager {
    rows: Vec<Vec<f32>>,
    ptr: usize,
}

impl Averager {
    fn new() -> Self {
        Self {
            rows: vec![vec![0.0; SPECTRUM_BINS]; AVERAGER_ROWS],
            ptr: 1,
        }
    }

    fn reset(&mut self) {
        for row in &mut self.rows {
            row.fill(0.0);
        }
        self.ptr = 1;
    }

    fn push_frame(&mut self, magnitudes: &[f32]) {
        // FFT normalization is folded into the averaging scale
        let scale = 1.0 / (SPECTRUM_BINS * (AVERAGER_ROWS - 1)) as f32;
        let ptr = self.ptr;
        for i in 0..SPECTRUM_BINS {
            let scaled = magnitudes[i] * scale;
            self.rows[0][i] += scaled - self.rows[ptr][i];
            self.rows[ptr][i] = scaled;
        }
        self.ptr += 1;
        if self.ptr == AVERAGER_ROWS {
            self.ptr = 1;
        }
    }

    fn published(&self) -> &[f32] {
        &self.rows[0]
    }
}

/// State shared between the worker thread and the UI thread
struct SpectrumShared {
    averager: Mutex<Averager>,
    new_data: AtomicBool,
    sample_rate_bits: AtomicU32,
}

struct Worker {
    handle: JoinHandle<()>,
    exit: Arc<AtomicBool>,
    wake: Sender<()>,
    done: Receiver<()>,
}

/// Background spectrum analyzer
///
/// Lifecycle: idle on construction, running after [`setup`](Self::setup)
/// (which hands back the real-time writer), stopped by
/// [`stop`](Self::stop) or drop.
pub struct SpectrumAnalyzer {
    shared: Arc<SpectrumShared>,
    worker: Option<Worker>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SpectrumShared {
                averager: Mutex::new(Averager::new()),
                new_data: AtomicBool::new(false),
                sample_rate_bits: AtomicU32::new(0.0_f32.to_bits()),
            }),
            worker: None,
        }
    }

    /// Start (or restart) the analysis thread
    ///
    /// `fifo_capacity` is the sample backlog the stream can hold; it must
    /// comfortably exceed [`FFT_SIZE`] or every frame would be dropped at the
    /// fifo boundary. Returns the writer the audio thread feeds.
    pub fn setup(&mut self, fifo_capacity: usize, sample_rate: f32) -> Result<SampleWriter, DspError> {
        if sample_rate <= 0.0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        self.stop(SHUTDOWN_TIMEOUT);

        let (writer, reader) = SampleFifo::new(fifo_capacity.max(FFT_SIZE * 2));

        self.shared
            .sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::Relaxed);
        self.shared.averager.lock().reset();
        self.shared.new_data.store(false, Ordering::Relaxed);

        let exit = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<()>(1);
        let wake = writer.wake_handle();

        let shared = Arc::clone(&self.shared);
        let thread_exit = Arc::clone(&exit);
        let handle = thread::Builder::new()
            .name("osprey-spectrum".into())
            .spawn(move || {
                analysis_loop(shared, reader, thread_exit);
                let _ = done_tx.send(());
            })
            .map_err(|e| DspError::ThreadSpawn(e.to_string()))?;

        debug!("spectrum analyzer started at {} Hz", sample_rate);
        self.worker = Some(Worker {
            handle,
            exit,
            wake,
            done: done_rx,
        });
        Ok(writer)
    }

    /// Signal the worker to exit and join it within `timeout`
    ///
    /// A worker that misses the deadline is a fatal resource leak: it is
    /// logged and abandoned, never retried.
    pub fn stop(&mut self, timeout: Duration) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.exit.store(true, Ordering::Release);
        let _ = worker.wake.try_send(());

        if worker.done.recv_timeout(timeout).is_ok() {
            let _ = worker.handle.join();
            debug!("spectrum analyzer stopped");
        } else {
            error!(
                "spectrum analysis thread did not exit within {:?}; leaking the thread",
                timeout
            );
        }
    }

    /// Whether the analysis thread is currently running
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// True at most once per computed frame; cleared here, by the renderer
    pub fn check_for_new_data(&self) -> bool {
        self.shared.new_data.swap(false, Ordering::AcqRel)
    }

    /// Render the published average into `path` over `area`
    ///
    /// x maps each bin's frequency logarithmically (octaves above
    /// `min_frequency`, width/10 per octave), y maps decibels with a -80dB
    /// floor into the vertical extent. Holds the publish lock only while
    /// walking the row.
    pub fn create_path(&self, path: &mut CurvePath, area: PlotArea, min_frequency: f32) {
        path.clear();

        let sample_rate = f32::from_bits(self.shared.sample_rate_bits.load(Ordering::Relaxed));
        if sample_rate <= 0.0 || min_frequency <= 0.0 {
            return;
        }

        let averager = self.shared.averager.lock();
        let data = averager.published();
        let factor = area.width / 10.0;

        let x = area.x + factor * index_to_x(0, min_frequency, sample_rate);
        path.move_to(x, bin_to_y(data[0], &area));
        for (i, bin) in data.iter().enumerate() {
            let x = area.x + factor * index_to_x(i, min_frequency, sample_rate);
            path.line_to(x, bin_to_y(*bin, &area));
        }
    }

    /// Copy of the published average row, for renderers that want raw bins
    pub fn averaged_magnitudes(&self) -> Vec<f32> {
        self.shared.averager.lock().published().to_vec()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.stop(SHUTDOWN_TIMEOUT);
    }
}

fn analysis_loop(shared: Arc<SpectrumShared>, mut reader: SampleReader, exit: Arc<AtomicBool>) {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    let window = kaiser_window(FFT_SIZE, KAISER_BETA);

    // Scratch buffers allocated once, reused every cycle
    let mut frame = vec![0.0_f32; FFT_SIZE];
    let mut transform = vec![Complex::new(0.0_f32, 0.0); FFT_SIZE];
    let mut magnitudes = vec![0.0_f32; SPECTRUM_BINS];

    while !exit.load(Ordering::Acquire) {
        if reader.available() >= FFT_SIZE {
            frame.fill(0.0);
            if reader.read_frame(&mut frame) {
                for ((dst, sample), coeff) in
                    transform.iter_mut().zip(frame.iter()).zip(window.iter())
                {
                    *dst = Complex::new(sample * coeff, 0.0);
                }
                fft.process(&mut transform);
                for (mag, bin) in magnitudes.iter_mut().zip(transform.iter()) {
                    *mag = bin.norm();
                }

                shared.averager.lock().push_frame(&magnitudes);
                shared.new_data.store(true, Ordering::Release);
            }
        }

        if reader.available() < FFT_SIZE {
            reader.wait(STARVED_WAIT);
        }
    }
}

fn index_to_x(index: usize, min_frequency: f32, sample_rate: f32) -> f32 {
    let freq = sample_rate * index as f32 / FFT_SIZE as f32;
    if freq > 0.01 {
        (freq / min_frequency).log2()
    } else {
        0.0
    }
}

fn bin_to_y(gain: f32, area: &PlotArea) -> f32 {
    let db = gain_to_db_with_floor(gain, DISPLAY_FLOOR_DB);
    map_range(db, DISPLAY_FLOOR_DB, 0.0, area.bottom(), area.y)
}

/// Zeroth-order modified Bessel function of the first kind (series expansion)
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..=24 {
        term *= (x / (2.0 * k as f64)).powi(2);
        sum += term;
    }
    sum
}

/// Precomputed Kaiser window, chosen for its spectral-leakage rejection
fn kaiser_window(size: usize, beta: f64) -> Vec<f32> {
    let denominator = bessel_i0(beta);
    (0..size)
        .map(|n| {
            let r = 2.0 * n as f64 / (size - 1) as f64 - 1.0;
            (bessel_i0(beta * (1.0 - r * r).sqrt()) / denominator) as f32
        })
        .collect()
}
