//! Microphone capture pipeline: fixed-size frames -> PCM codec -> session queue.
//!
//! There is no backpressure. If the consumer stops accepting frames the capture
//! loop ends.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::sync::mpsc;

use super::pcm;
use crate::session::SessionEvent;

/// One encoded capture frame, ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub mime_type: String,
    pub payload: String,
}

/// Anything that yields mono float samples in [-1.0, 1.0].
pub trait FrameSource {
    /// Fill `buf` with up to `buf.len()` samples and return how many were written.
    fn read(&mut self, buf: &mut [f32]) -> Result<usize>;
}

pub struct CapturePipeline {
    frame_size: usize,
    mime_type: String,
    pending: Vec<f32>,
}

impl CapturePipeline {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            mime_type: format!("audio/pcm;rate={}", sample_rate),
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Encode one frame as-is.
    pub fn encode_frame(&self, frame: &[f32]) -> CapturedFrame {
        CapturedFrame {
            mime_type: self.mime_type.clone(),
            payload: pcm::encode_for_transport(frame),
        }
    }

    /// Accumulate samples and return every complete frame they finish.
    pub fn push(&mut self, samples: &[f32]) -> Vec<CapturedFrame> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            frames.push(self.encode_frame(&self.pending[..self.frame_size]));
            self.pending.drain(..self.frame_size);
        }
        frames
    }
}

/// Pull samples from `source` while `running` is set and forward each completed
/// frame to the session as `SessionEvent::FrameCaptured`.
///
/// Runs on a dedicated OS thread.
pub fn run_capture<S: FrameSource>(
    source: &mut S,
    mut pipeline: CapturePipeline,
    tx: mpsc::Sender<SessionEvent>,
    running: &AtomicBool,
) -> Result<()> {
    let mut read_buf = vec![0f32; pipeline.frame_size()];

    log::info!(
        "Capture started: frame_size={}, format={}",
        pipeline.frame_size(),
        pipeline.mime_type()
    );

    while running.load(Ordering::Relaxed) {
        let n = source.read(&mut read_buf)?;
        if n == 0 {
            continue;
        }
        for frame in pipeline.push(&read_buf[..n]) {
            if tx.blocking_send(SessionEvent::FrameCaptured(frame)).is_err() {
                log::warn!("Failed to send capture frame, receiver dropped");
                return Ok(());
            }
        }
    }

    log::info!("Capture stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_complete_frames() {
        let mut pipeline = CapturePipeline::new(4, 16000);
        assert!(pipeline.push(&[0.1, 0.2, 0.3]).is_empty());

        let frames = pipeline.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], pipeline.encode_frame(&[0.1, 0.2, 0.3, 0.4]));
        assert_eq!(frames[1], pipeline.encode_frame(&[0.5, 0.6, 0.7, 0.8]));
        assert_eq!(frames[0].mime_type, "audio/pcm;rate=16000");
    }

    #[test]
    fn frame_payload_decodes_to_the_samples() {
        let pipeline = CapturePipeline::new(2, 16000);
        let frame = pipeline.encode_frame(&[0.5, -0.25]);
        let bytes = pcm::decode_from_transport(&frame.payload).unwrap();
        let buffer = pcm::bytes_to_audio_buffer(&bytes, 16000, 1).unwrap();
        assert_eq!(buffer.channel(0), &[0.5, -0.25]);
    }

    struct Ramp<'a> {
        remaining: usize,
        running: &'a AtomicBool,
    }

    impl FrameSource for Ramp<'_> {
        fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
            let n = buf.len().min(self.remaining).min(3);
            buf[..n].fill(0.25);
            self.remaining -= n;
            if self.remaining == 0 {
                self.running.store(false, Ordering::SeqCst);
            }
            Ok(n)
        }
    }

    #[test]
    fn capture_loop_forwards_frames_until_stopped() {
        let running = AtomicBool::new(true);
        let (tx, mut rx) = mpsc::channel(16);
        let mut source = Ramp { remaining: 10, running: &running };

        run_capture(&mut source, CapturePipeline::new(4, 16000), tx, &running).unwrap();

        let mut frames = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, SessionEvent::FrameCaptured(_)));
            frames += 1;
        }
        assert_eq!(frames, 2);
    }

    #[test]
    fn capture_loop_ends_when_session_is_gone() {
        let running = AtomicBool::new(true);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut source = Ramp { remaining: 100, running: &running };
        run_capture(&mut source, CapturePipeline::new(2, 16000), tx, &running).unwrap();
        assert!(running.load(Ordering::SeqCst));
    }
}
