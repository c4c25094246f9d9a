//! Software output device.
//!
//! The timeline keeps every started source on a sample-frame clock and mixes them
//! into interleaved i16 periods on demand. The device clock is the number of frames
//! rendered so far, so it only advances when the playback thread pulls audio.
//! Chunks are converted to the device rate once, when they are started.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::Duration;

use super::output::{OutputDevice, SourceId};
use super::pcm::{AudioBuffer, float_to_i16};
use super::resample;
use crate::session::SessionEvent;

struct ScheduledSource {
    id: SourceId,
    start_frame: u64,
    length_frames: u64,
    buffer: Arc<AudioBuffer>,
}

impl ScheduledSource {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.length_frames
    }

    /// Sample of `channel` at device frame `frame`. The buffer is already at the
    /// device rate.
    fn sample_at(&self, frame: u64, channel: usize) -> f32 {
        let data = self.buffer.channel(channel.min(self.buffer.channel_count() - 1));
        data.get((frame - self.start_frame) as usize).copied().unwrap_or(0.0)
    }
}

pub struct Timeline {
    sample_rate: u32,
    channels: u16,
    frames_rendered: u64,
    next_id: u64,
    sources: Vec<ScheduledSource>,
    mix: Vec<f32>,
}

impl Timeline {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frames_rendered: 0,
            next_id: 1,
            sources: Vec::new(),
            mix: Vec::new(),
        }
    }

    /// Adopt the format the hardware actually negotiated. Only valid before any
    /// source has been started.
    pub fn reconfigure(&mut self, sample_rate: u32, channels: u16) {
        debug_assert!(self.sources.is_empty() && self.frames_rendered == 0);
        self.sample_rate = sample_rate.max(1);
        self.channels = channels.max(1);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    /// Start `buffer` at device time `at`, resampling it first when its rate
    /// differs from the device rate.
    pub fn start(&mut self, buffer: Arc<AudioBuffer>, at: f64) -> Result<SourceId> {
        let duration = buffer.duration();
        let buffer = resample::to_rate(buffer, self.sample_rate)?;
        Ok(self.place(buffer, at, duration))
    }

    /// Place a device-rate buffer over `[at, at + duration)`. Both ends are
    /// rounded to frames independently, so sources placed back to back on
    /// the scheduler's clock share their boundary frame exactly.
    fn place(&mut self, buffer: Arc<AudioBuffer>, at: f64, duration: f64) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;

        if buffer.channel_count() == 0 || buffer.frame_count() == 0 {
            log::debug!("Empty buffer for {}, nothing to play", id);
            return id;
        }

        let at = at.max(0.0);
        let rate = self.sample_rate as f64;
        let requested = (at * rate).round() as u64;
        let end = ((at + duration) * rate).round() as u64;
        let start_frame = requested.max(self.frames_rendered);
        let length_frames = end.saturating_sub(requested);
        self.sources.push(ScheduledSource { id, start_frame, length_frames, buffer });
        id
    }

    pub fn stop(&mut self, id: SourceId) {
        self.sources.retain(|s| s.id != id);
    }

    /// Mix one period into `out` (interleaved, `channels` wide) and advance the clock.
    ///
    /// Returns the sources that finished playing within this period.
    pub fn render(&mut self, out: &mut [i16]) -> Vec<SourceId> {
        let channels = self.channels as usize;
        let frames = out.len() / channels;
        let now = self.frames_rendered;
        let period_end = now + frames as u64;

        self.mix.clear();
        self.mix.resize(frames * channels, 0.0);

        for source in &self.sources {
            let from = source.start_frame.max(now);
            let to = source.end_frame().min(period_end);
            for frame in from..to {
                let base = (frame - now) as usize * channels;
                for ch in 0..channels {
                    self.mix[base + ch] += source.sample_at(frame, ch);
                }
            }
        }

        for (dst, &v) in out.iter_mut().zip(&self.mix) {
            *dst = float_to_i16(v.clamp(-1.0, 1.0));
        }
        self.frames_rendered = period_end;

        let mut finished = Vec::new();
        self.sources.retain(|s| {
            if s.end_frame() <= period_end {
                finished.push(s.id);
                false
            } else {
                true
            }
        });
        finished
    }
}

/// A timeline shared between the session (which starts and stops sources) and the
/// playback thread (which renders it).
#[derive(Clone)]
pub struct SharedTimeline(Arc<Mutex<Timeline>>);

impl SharedTimeline {
    pub fn new(timeline: Timeline) -> Self {
        Self(Arc::new(Mutex::new(timeline)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Timeline> {
        // a panicking audio thread must not take playback down with it
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OutputDevice for SharedTimeline {
    fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    fn start(&mut self, buffer: Arc<AudioBuffer>, at: f64) -> Result<SourceId> {
        let duration = buffer.duration();
        let rate = self.lock().sample_rate();
        // resample before taking the lock the playback thread renders under
        let buffer = resample::to_rate(buffer, rate)?;
        Ok(self.lock().place(buffer, at, duration))
    }

    fn stop(&mut self, id: SourceId) {
        self.lock().stop(id);
    }
}

/// Advance the timeline on the wall clock with no speaker attached, reporting
/// finished sources. Returns once the session stops listening.
pub async fn run_muted(timeline: SharedTimeline, ended_tx: mpsc::Sender<SessionEvent>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    let mut buf = Vec::new();
    log::info!("No speaker attached, speech is rendered silently");

    while !ended_tx.is_closed() {
        ticker.tick().await;
        let finished = {
            let mut tl = timeline.lock();
            let frames = ((tl.sample_rate() as f64 * period.as_secs_f64()).round() as usize).max(1);
            buf.resize(frames * tl.channels().max(1) as usize, 0);
            tl.render(&mut buf)
        };
        for id in finished {
            if ended_tx.send(SessionEvent::SourceEnded(id)).await.is_err() {
                return;
            }
        }
    }
}
