use std::sync::atomic::AtomicBool;

use anyhow::Result;
use tokio::sync::mpsc;

use super::alsa_device::AlsaStream;
use super::capture::{self, CapturePipeline, FrameSource};
use super::pcm::i16_to_float;
use crate::session::SessionEvent;

/// Microphone as a mono float sample source. Multi-channel input is averaged.
pub struct AlsaCapture {
    stream: AlsaStream,
    read_buf: Vec<i16>,
}

impl AlsaCapture {
    pub fn new(stream: AlsaStream) -> Self {
        let len = stream.params.period_size.max(1) * stream.params.channels.max(1) as usize;
        Self { stream, read_buf: vec![0i16; len] }
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream.params.sample_rate
    }
}

impl FrameSource for AlsaCapture {
    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let channels = self.stream.params.channels.max(1) as usize;
        let max_frames = buf.len().min(self.read_buf.len() / channels);
        let io = self.stream.pcm.io_i16()?;

        let frames = match io.readi(&mut self.read_buf[..max_frames * channels]) {
            Ok(frames) => frames,
            Err(e) => {
                self.stream.recover(&e)?;
                return Ok(0);
            }
        };

        for (i, out) in buf[..frames].iter_mut().enumerate() {
            let frame = &self.read_buf[i * channels..(i + 1) * channels];
            let sum: f32 = frame.iter().map(|&s| i16_to_float(s)).sum();
            *out = sum / channels as f32;
        }
        Ok(frames)
    }
}

pub fn record_thread(
    device: &str,
    sample_rate: u32,
    frame_size: usize,
    tx: mpsc::Sender<SessionEvent>,
    running: &AtomicBool,
) -> Result<()> {
    let mut mic = AlsaCapture::new(AlsaStream::capture(device, sample_rate, 1)?);
    let pipeline = CapturePipeline::new(frame_size, mic.sample_rate());
    capture::run_capture(&mut mic, pipeline, tx, running)
}
