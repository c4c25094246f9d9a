//! One live voice session.
//!
//! Every callback source (network, microphone thread, speaker thread) posts a
//! `SessionEvent` into a single queue. `LiveSession::run` drains that queue on one
//! task, so the scheduler's cursor and live-source set are never shared.

use tokio::sync::mpsc;

use crate::audio::{
    AudioChunk, CapturedFrame, ChunkErrorPolicy, EnqueueOutcome, OutputDevice, PlaybackScheduler,
    SchedulerStats, SourceId,
};
use crate::net_link::NetCommand;

/// Shown when a turn ends without any transcript.
const EMPTY_TURN_TEXT: &str = "I heard you! Let me think...";

#[derive(Debug)]
pub enum SessionEvent {
    /// Transport is open
    Connected,
    /// The service accepted our setup
    Ready,
    ChunkArrived(AudioChunk),
    SourceEnded(SourceId),
    /// The remote turn was interrupted (the user started talking)
    Interrupted,
    FrameCaptured(CapturedFrame),
    Transcription(String),
    TurnComplete,
    /// Transport dropped, a reconnect is in progress
    Disconnected,
    /// Transport is gone for good, or the user ended the session
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Active,
    Transcript(String),
    BotMessage(String),
    Interrupted { stopped: usize },
    ChunkDropped { reason: String, total: u64 },
    Reconnecting,
    Ended(SessionReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionReport {
    pub playback: SchedulerStats,
    pub frames_sent: u64,
    pub frames_discarded: u64,
    pub turns: u64,
}

pub struct LiveSession<D: OutputDevice> {
    scheduler: PlaybackScheduler<D>,
    events: mpsc::Receiver<SessionEvent>,
    net_tx: mpsc::Sender<NetCommand>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    connected: bool,
    transcript: String,
    report: SessionReport,
}

impl<D: OutputDevice> LiveSession<D> {
    pub fn new(
        device: D,
        policy: ChunkErrorPolicy,
        events: mpsc::Receiver<SessionEvent>,
        net_tx: mpsc::Sender<NetCommand>,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> Self {
        Self {
            scheduler: PlaybackScheduler::new(device, policy),
            events,
            net_tx,
            updates,
            connected: false,
            transcript: String::new(),
            report: SessionReport::default(),
        }
    }

    /// Drain events until the session closes, then tear down playback.
    pub async fn run(mut self) -> SessionReport {
        while let Some(event) = self.events.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
        self.teardown().await
    }

    /// Apply one event. Returns false once the session is over.
    pub(crate) async fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Connected => {
                self.connected = true;
                log::info!("Live session connected");
            }
            SessionEvent::Ready => {
                self.notify(SessionUpdate::Active);
            }
            SessionEvent::ChunkArrived(chunk) => {
                if let EnqueueOutcome::Dropped { reason, reported: true } = self.scheduler.enqueue(&chunk) {
                    let total = self.scheduler.stats().dropped;
                    self.notify(SessionUpdate::ChunkDropped { reason, total });
                }
            }
            SessionEvent::SourceEnded(id) => {
                self.scheduler.on_source_ended(id);
            }
            SessionEvent::Interrupted => {
                let stopped = self.scheduler.interrupt();
                self.notify(SessionUpdate::Interrupted { stopped });
            }
            SessionEvent::FrameCaptured(frame) => {
                if !self.connected {
                    self.report.frames_discarded += 1;
                    return true;
                }
                if let Err(e) = self.net_tx.send(NetCommand::SendAudio(frame)).await {
                    log::warn!("Failed to send audio to NetLink: {}", e);
                    self.report.frames_discarded += 1;
                } else {
                    self.report.frames_sent += 1;
                }
            }
            SessionEvent::Transcription(text) => {
                self.transcript.push_str(&text);
                self.notify(SessionUpdate::Transcript(self.transcript.clone()));
            }
            SessionEvent::TurnComplete => {
                self.report.turns += 1;
                let text = if self.transcript.is_empty() {
                    EMPTY_TURN_TEXT.to_string()
                } else {
                    std::mem::take(&mut self.transcript)
                };
                self.notify(SessionUpdate::BotMessage(text));
            }
            SessionEvent::Disconnected => {
                self.connected = false;
                // whatever was queued belongs to a turn that is gone
                self.scheduler.interrupt();
                self.notify(SessionUpdate::Reconnecting);
            }
            SessionEvent::Closed => {
                log::info!("Live session closed");
                return false;
            }
        }
        true
    }

    async fn teardown(mut self) -> SessionReport {
        if self.scheduler.live_sources() > 0 {
            self.scheduler.interrupt();
        }
        self.report.playback = self.scheduler.stats();
        log::info!(
            "Live session ended: {} chunk(s) played, {} dropped, {} frame(s) sent, {} turn(s)",
            self.report.playback.scheduled,
            self.report.playback.dropped,
            self.report.frames_sent,
            self.report.turns,
        );
        let _ = self.net_tx.send(NetCommand::Close).await;
        self.notify(SessionUpdate::Ended(self.report));
        self.report
    }

    /// Never waits on the front end.
    fn notify(&self, update: SessionUpdate) {
        if self.updates.send(update).is_err() {
            log::debug!("No listener for session updates");
        }
    }

    #[cfg(test)]
    pub(crate) fn scheduler(&self) -> &PlaybackScheduler<D> {
        &self.scheduler
    }
}
