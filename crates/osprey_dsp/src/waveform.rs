//! Waveform Analyzer
//!
//! Time-domain sibling of the spectrum analyzer, used to display modulation
//! sources (the phaser LFO). Same skeleton - lock-free sample fifo in, a
//! worker with a bounded wait, a published buffer behind a short-hold mutex,
//! a renderer-cleared "new data" flag - but the frame is kept as raw samples
//! instead of being transformed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::DspError;
use crate::fifo::{SampleFifo, SampleReader, SampleWriter};
use crate::plot::{map_range, CurvePath, PlotArea};

/// Drawing stride: every 25th sample is enough for a scope trace
const PLOT_STRIDE: usize = 25;

const STARVED_WAIT: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

struct WaveformShared {
    /// Latest complete frame, copied under this lock by the worker
    frame: Mutex<Vec<f32>>,
    new_data: AtomicBool,
}

struct Worker {
    handle: JoinHandle<()>,
    exit: Arc<AtomicBool>,
    wake: Sender<()>,
    done: Receiver<()>,
}

/// Background envelope/scope analyzer for modulation sources
pub struct WaveformAnalyzer {
    shared: Arc<WaveformShared>,
    worker: Option<Worker>,
}

impl WaveformAnalyzer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(WaveformShared {
                frame: Mutex::new(Vec::new()),
                new_data: AtomicBool::new(false),
            }),
            worker: None,
        }
    }

    /// Start (or restart) the worker
    ///
    /// One published frame covers `sample_rate / refresh_rate_hz` samples,
    /// one display tick's worth of signal.
    pub fn setup(
        &mut self,
        fifo_capacity: usize,
        sample_rate: f32,
        refresh_rate_hz: u32,
    ) -> Result<SampleWriter, DspError> {
        if sample_rate <= 0.0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        self.stop(SHUTDOWN_TIMEOUT);

        let frame_len = ((sample_rate / refresh_rate_hz.max(1) as f32) as usize).max(1);
        let (writer, reader) = SampleFifo::new(fifo_capacity.max(frame_len * 2));

        {
            let mut frame = self.shared.frame.lock();
            frame.clear();
            frame.resize(frame_len, 0.0);
        }
        self.shared.new_data.store(false, Ordering::Relaxed);

        let exit = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<()>(1);
        let wake = writer.wake_handle();

        let shared = Arc::clone(&self.shared);
        let thread_exit = Arc::clone(&exit);
        let handle = thread::Builder::new()
            .name("osprey-waveform".into())
            .spawn(move || {
                capture_loop(shared, reader, thread_exit, frame_len);
                let _ = done_tx.send(());
            })
            .map_err(|e| DspError::ThreadSpawn(e.to_string()))?;

        debug!(
            "waveform analyzer started, {} samples per frame",
            frame_len
        );
        self.worker = Some(Worker {
            handle,
            exit,
            wake,
            done: done_rx,
        });
        Ok(writer)
    }

    /// Signal the worker to exit and join it within `timeout`; a missed
    /// deadline is logged as a fatal leak and the thread abandoned
    pub fn stop(&mut self, timeout: Duration) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.exit.store(true, Ordering::Release);
        let _ = worker.wake.try_send(());

        if worker.done.recv_timeout(timeout).is_ok() {
            let _ = worker.handle.join();
            debug!("waveform analyzer stopped");
        } else {
            error!(
                "waveform analysis thread did not exit within {:?}; leaking the thread",
                timeout
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// True at most once per captured frame; cleared here, by the renderer
    pub fn check_for_new_data(&self) -> bool {
        self.shared.new_data.swap(false, Ordering::AcqRel)
    }

    /// Render the latest frame into `path`: index maps linearly across the
    /// width, amplitude [-1, 1] maps into the vertical extent
    pub fn create_path(&self, path: &mut CurvePath, area: PlotArea) {
        path.clear();

        let frame = self.shared.frame.lock();
        if frame.is_empty() {
            return;
        }

        let count = frame.len();
        path.move_to(area.x, amp_to_y(frame[0], &area));
        for i in (0..count).step_by(PLOT_STRIDE) {
            let x = map_range(i as f32, 0.0, count as f32, area.x, area.right());
            path.line_to(x, amp_to_y(frame[i], &area));
        }
    }
}

impl Default for WaveformAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaveformAnalyzer {
    fn drop(&mut self) {
        self.stop(SHUTDOWN_TIMEOUT);
    }
}

fn capture_loop(
    shared: Arc<WaveformShared>,
    mut reader: SampleReader,
    exit: Arc<AtomicBool>,
    frame_len: usize,
) {
    let mut scratch = vec![0.0_f32; frame_len];

    while !exit.load(Ordering::Acquire) {
        if reader.available() >= frame_len {
            if reader.read_frame(&mut scratch) {
                shared.frame.lock().copy_from_slice(&scratch);
                shared.new_data.store(true, Ordering::Release);
            }
        }

        if reader.available() < frame_len {
            reader.wait(STARVED_WAIT);
        }
    }
}

fn amp_to_y(amplitude: f32, area: &PlotArea) -> f32 {
    map_range(amplitude, -1.0, 1.0, area.bottom(), area.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const SAMPLE_RATE: f32 = 48_000.0;

    #[test]
    fn test_setup_rejects_bad_sample_rate() {
        let mut analyzer = WaveformAnalyzer::new();
        assert!(analyzer.setup(48_000, -1.0, 30).is_err());
    }

    #[test]
    fn test_frame_published_and_rendered() {
        let mut analyzer = WaveformAnalyzer::new();
        let mut writer = analyzer.setup(48_000, SAMPLE_RATE, 30).unwrap();

        // A ramp makes the captured values easy to spot in the plot
        let block: Vec<f32> = (0..512).map(|i| i as f32 / 512.0).collect();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut published = false;
        while Instant::now() < deadline {
            writer.write(&block, 1);
            if analyzer.check_for_new_data() {
                published = true;
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(published, "no frame published before timeout");

        let mut path = CurvePath::new();
        let area = PlotArea::new(0.0, 0.0, 400.0, 200.0);
        analyzer.create_path(&mut path, area);

        assert!(!path.is_empty());
        for (x, y) in path.points() {
            assert!(*x >= area.x && *x <= area.right());
            assert!(*y >= area.y && *y <= area.bottom());
        }
    }

    #[test]
    fn test_empty_analyzer_renders_nothing() {
        let analyzer = WaveformAnalyzer::new();
        let mut path = CurvePath::new();
        analyzer.create_path(&mut path, PlotArea::new(0.0, 0.0, 400.0, 200.0));
        assert!(path.is_empty());
    }

    #[test]
    fn test_amplitude_mapping_is_centred() {
        let area = PlotArea::new(0.0, 0.0, 400.0, 200.0);
        assert_eq!(amp_to_y(0.0, &area), 100.0);
        assert_eq!(amp_to_y(1.0, &area), 0.0);
        assert_eq!(amp_to_y(-1.0, &area), 200.0);
    }

    #[test]
    fn test_stop_then_restart() {
        let mut analyzer = WaveformAnalyzer::new();
        let _w1 = analyzer.setup(48_000, SAMPLE_RATE, 30).unwrap();
        assert!(analyzer.is_running());
        let _w2 = analyzer.setup(48_000, SAMPLE_RATE, 30).unwrap();
        assert!(analyzer.is_running());
        analyzer.stop(Duration::from_secs(1));
        assert!(!analyzer.is_running());
    }
}
