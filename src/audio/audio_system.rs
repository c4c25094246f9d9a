//! The AudioSystem that owns the microphone and speaker threads.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::alsa_device::AlsaStream;
use super::timeline::{SharedTimeline, Timeline};
use super::{play, record};
use crate::config::Config;
use crate::session::SessionEvent;

/// Audio device configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
    /// Microphone rate sent to the live service (16000)
    pub input_sample_rate: u32,
    /// Samples per capture frame (4096)
    pub capture_frame_size: usize,
    /// Speaker rate, matching the streamed speech (24000)
    pub playback_sample_rate: u32,
    pub playback_channels: u16,
    /// Desired ALSA playback period size (0 = let ALSA decide)
    pub playback_period_size: usize,
}

impl From<&Config> for AudioConfig {
    fn from(config: &Config) -> Self {
        Self {
            capture_device: config.capture_device.clone(),
            playback_device: config.playback_device.clone(),
            input_sample_rate: config.input_sample_rate,
            capture_frame_size: config.capture_frame_size,
            playback_sample_rate: config.output_sample_rate,
            playback_channels: config.output_channels,
            playback_period_size: config.playback_period_size,
        }
    }
}

/// Microphone and speaker for one live session.
///
/// - Recording thread: ALSA capture -> capture frames -> `SessionEvent::FrameCaptured`
/// - Playback thread: `Timeline` -> ALSA playback, finished sources -> `SessionEvent::SourceEnded`
pub struct AudioSystem {
    running: Arc<AtomicBool>,
    timeline: SharedTimeline,
    record_handle: Option<JoinHandle<()>>,
    play_handle: Option<JoinHandle<()>>,
}

impl AudioSystem {
    /// Open both devices and start their threads. Returns once the speaker is
    /// configured, so the timeline is ready for the scheduler.
    pub fn start(config: AudioConfig, events: mpsc::Sender<SessionEvent>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let timeline = SharedTimeline::new(Timeline::new(
            config.playback_sample_rate,
            config.playback_channels,
        ));

        log::info!(
            "AudioSystem starting, capture: \"{}\" @{}Hz, playback: \"{}\" @{}Hz/{}ch",
            config.capture_device,
            config.input_sample_rate,
            config.playback_device,
            config.playback_sample_rate,
            config.playback_channels,
        );

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let play_handle = {
            let running = running.clone();
            let timeline = timeline.clone();
            let events = events.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    let period = (config.playback_period_size > 0).then_some(config.playback_period_size);
                    let stream = match AlsaStream::playback(
                        &config.playback_device,
                        config.playback_sample_rate,
                        config.playback_channels as u32,
                        period,
                    ) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    timeline
                        .lock()
                        .reconfigure(stream.params.sample_rate, stream.params.channels as u16);
                    let _ = ready_tx.send(Ok(()));

                    if let Err(e) = play::play_thread(&stream, &timeline, events, &running) {
                        log::error!("Playback thread error: {}", e);
                    }
                })?
        };

        ready_rx
            .recv()
            .context("Playback thread exited before opening the device")??;

        let record_handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-record".into())
                .spawn(move || {
                    if let Err(e) = record::record_thread(
                        &config.capture_device,
                        config.input_sample_rate,
                        config.capture_frame_size,
                        events,
                        &running,
                    ) {
                        log::error!("Recording thread error: {}", e);
                    }
                })?
        };

        Ok(Self {
            running,
            timeline,
            record_handle: Some(record_handle),
            play_handle: Some(play_handle),
        })
    }

    /// The output device the playback scheduler drives.
    pub fn output(&self) -> SharedTimeline {
        self.timeline.clone()
    }

    /// Signal threads to stop and wait for them to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.record_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.play_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop();
    }
}
