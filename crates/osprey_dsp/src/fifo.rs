//! Streaming Sample FIFO
//!
//! Lock-free single-producer/single-consumer ring buffer carrying a
//! continuous stream of analysis samples from the audio callback to a
//! background analyzer thread.
//!
//! Writes are all-or-nothing: if the buffer does not have room for the whole
//! block, the block is dropped so the consumer never sees a torn frame.
//! Multi-channel input is downmixed by summing channels into a single
//! analysis channel before storage.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use rtrb::{chunks::ChunkError, Consumer, Producer, RingBuffer};

/// Builder for the analyzer sample stream
pub struct SampleFifo;

impl SampleFifo {
    /// Create a fifo with room for `capacity` samples and split it into its
    /// producer and consumer halves
    pub fn new(capacity: usize) -> (SampleWriter, SampleReader) {
        let (producer, consumer) = RingBuffer::<f32>::new(capacity.max(1));
        // Capacity-1 wake channel: a pending signal is enough, extras are dropped
        let (wake_tx, wake_rx) = bounded::<()>(1);
        (
            SampleWriter {
                producer,
                wake: wake_tx,
            },
            SampleReader {
                consumer,
                wake: wake_rx,
            },
        )
    }
}

/// Producer half, held by the real-time thread
pub struct SampleWriter {
    producer: Producer<f32>,
    wake: Sender<()>,
}

impl SampleWriter {
    /// Append one block of interleaved audio, downmixed to a single channel
    /// by summing across channels.
    ///
    /// Returns `false` without writing anything when the fifo is low on
    /// space; dropped blocks only slow the display down.
    ///
    /// # Real-time Safety
    /// No allocations, no blocking; the wake signal is a non-blocking
    /// `try_send` on a bounded channel.
    pub fn write(&mut self, interleaved: &[f32], channels: usize) -> bool {
        if channels == 0 || interleaved.len() < channels {
            return false;
        }

        let frames = interleaved.len() / channels;
        match self.producer.write_chunk_uninit(frames) {
            Ok(chunk) => {
                let written = chunk.fill_from_iter(
                    interleaved
                        .chunks_exact(channels)
                        .map(|frame| frame.iter().sum::<f32>()),
                );
                debug_assert_eq!(written, frames);
                let _ = self.wake.try_send(());
                true
            }
            Err(ChunkError::TooFewSlots(_)) => false,
        }
    }

    /// Clone of the wake sender, used to rouse the consumer at shutdown
    pub(crate) fn wake_handle(&self) -> Sender<()> {
        self.wake.clone()
    }
}

/// Consumer half, owned by the analyzer thread
pub struct SampleReader {
    consumer: Consumer<f32>,
    wake: Receiver<()>,
}

impl SampleReader {
    /// Number of samples currently buffered
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }

    /// Remove exactly `out.len()` samples, or fail without side effects if
    /// fewer are buffered
    pub fn read_frame(&mut self, out: &mut [f32]) -> bool {
        match self.consumer.read_chunk(out.len()) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                out[..first.len()].copy_from_slice(first);
                out[first.len()..].copy_from_slice(second);
                chunk.commit_all();
                true
            }
            Err(ChunkError::TooFewSlots(_)) => false,
        }
    }

    /// Block until the producer signals a write, or until `timeout` elapses
    pub fn wait(&self, timeout: Duration) {
        let _ = self.wake.recv_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_roundtrip() {
        let (mut writer, mut reader) = SampleFifo::new(64);

        let block = [0.1_f32, 0.2, 0.3, 0.4];
        assert!(writer.write(&block, 1));
        assert_eq!(reader.available(), 4);

        let mut out = [0.0_f32; 4];
        assert!(reader.read_frame(&mut out));
        assert_eq!(out, block);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn test_stereo_downmix_sums_channels() {
        let (mut writer, mut reader) = SampleFifo::new(64);

        // Two stereo frames: (0.5, 0.25) and (-0.5, 0.1)
        let block = [0.5_f32, 0.25, -0.5, 0.1];
        assert!(writer.write(&block, 2));

        let mut out = [0.0_f32; 2];
        assert!(reader.read_frame(&mut out));
        assert!((out[0] - 0.75).abs() < 1e-6);
        assert!((out[1] - (-0.4)).abs() < 1e-6);
    }

    #[test]
    fn test_oversized_write_is_all_or_nothing() {
        let (mut writer, mut reader) = SampleFifo::new(8);

        assert!(writer.write(&[1.0; 6], 1));
        assert_eq!(reader.available(), 6);

        // Only 2 slots left; the whole 4-sample block must be rejected
        assert!(!writer.write(&[2.0; 4], 1));
        assert_eq!(reader.available(), 6);

        let mut out = [0.0_f32; 6];
        assert!(reader.read_frame(&mut out));
        assert_eq!(out, [1.0; 6]);
    }

    #[test]
    fn test_read_frame_fails_without_enough_samples() {
        let (mut writer, mut reader) = SampleFifo::new(16);
        assert!(writer.write(&[1.0; 4], 1));

        let mut out = [0.0_f32; 8];
        assert!(!reader.read_frame(&mut out));
        // Failed read leaves the buffered samples untouched
        assert_eq!(reader.available(), 4);
    }

    #[test]
    fn test_read_across_wrap_point() {
        let (mut writer, mut reader) = SampleFifo::new(8);

        assert!(writer.write(&[1.0; 6], 1));
        let mut out = [0.0_f32; 6];
        assert!(reader.read_frame(&mut out));

        // Next write wraps around the ring; the read must reassemble it
        let block = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert!(writer.write(&block, 1));
        let mut out = [0.0_f32; 6];
        assert!(reader.read_frame(&mut out));
        assert_eq!(out, block);
    }

    #[test]
    fn test_wait_returns_after_signal() {
        let (mut writer, reader) = SampleFifo::new(16);
        assert!(writer.write(&[0.5; 4], 1));

        // Signal is pending, so this returns immediately
        let start = std::time::Instant::now();
        reader.wait(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let (mut writer, _reader) = SampleFifo::new(16);
        assert!(!writer.write(&[1.0; 4], 0));
    }
}
