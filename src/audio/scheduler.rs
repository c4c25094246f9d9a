//! Gapless playback of streamed speech chunks.
//!
//! The scheduler keeps a cursor: the earliest device time at which the next chunk
//! may start. Every chunk is started at `max(cursor, now)` and the cursor moves to the
//! end of that chunk, so chunks play in arrival order, back to back, never in the past.
//! An interrupt stops everything in flight and clears the cursor.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use super::output::{OutputDevice, SourceId};
use super::pcm::{self, AudioBuffer};

/// What to do with a chunk that cannot be decoded or started.
///
/// Either way the chunk is skipped and the session continues; `Report` additionally
/// surfaces the drop to the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkErrorPolicy {
    #[default]
    Silent,
    Report,
}

impl FromStr for ChunkErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "report" => Ok(Self::Report),
            other => Err(format!("unknown chunk error policy: {}", other)),
        }
    }
}

/// One unit of streamed speech as delivered by the live service.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// base64 of interleaved little-endian i16 PCM
    pub payload: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledPlayback {
    pub id: SourceId,
    pub start_at: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Scheduled(ScheduledPlayback),
    /// Decoded to zero frames; nothing to play, cursor untouched.
    Empty,
    Dropped { reason: String, reported: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub finished: u64,
    pub dropped: u64,
    pub interrupts: u64,
    pub stopped: u64,
}

pub struct PlaybackScheduler<D: OutputDevice> {
    device: D,
    /// 0.0 means unset: the next chunk starts at the device clock
    cursor: f64,
    live: BTreeSet<SourceId>,
    policy: ChunkErrorPolicy,
    stats: SchedulerStats,
}

impl<D: OutputDevice> PlaybackScheduler<D> {
    pub fn new(device: D, policy: ChunkErrorPolicy) -> Self {
        Self {
            device,
            cursor: 0.0,
            live: BTreeSet::new(),
            policy,
            stats: SchedulerStats::default(),
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn live_sources(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: SourceId) -> bool {
        self.live.contains(&id)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Decode a chunk and schedule it right after the previously scheduled one.
    pub fn enqueue(&mut self, chunk: &AudioChunk) -> EnqueueOutcome {
        let decoded = pcm::decode_from_transport(&chunk.payload)
            .and_then(|bytes| pcm::bytes_to_audio_buffer(&bytes, chunk.sample_rate, chunk.channels));
        match decoded {
            Ok(buffer) => self.enqueue_buffer(buffer),
            Err(e) => self.drop_chunk(e.to_string()),
        }
    }

    /// Schedule an already decoded buffer.
    pub fn enqueue_buffer(&mut self, buffer: AudioBuffer) -> EnqueueOutcome {
        if buffer.frame_count() == 0 {
            return EnqueueOutcome::Empty;
        }

        let duration = buffer.duration();
        let start_at = self.cursor.max(self.device.current_time());
        let id = match self.device.start(Arc::new(buffer), start_at) {
            Ok(id) => id,
            Err(e) => return self.drop_chunk(format!("output device refused chunk: {:#}", e)),
        };

        self.cursor = start_at + duration;
        self.live.insert(id);
        self.stats.scheduled += 1;
        log::debug!("Scheduled {} at {:.3}s for {:.3}s, cursor {:.3}s", id, start_at, duration, self.cursor);

        EnqueueOutcome::Scheduled(ScheduledPlayback { id, start_at, duration })
    }

    /// Natural end of playback for `id`. Unknown ids (already stopped) are ignored.
    pub fn on_source_ended(&mut self, id: SourceId) -> bool {
        let removed = self.live.remove(&id);
        if removed {
            self.stats.finished += 1;
        }
        removed
    }

    /// Barge-in: stop every scheduled source, started or not, and reset the cursor.
    ///
    /// Returns how many sources were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.live.len();
        for id in std::mem::take(&mut self.live) {
            self.device.stop(id);
        }
        self.cursor = 0.0;
        self.stats.interrupts += 1;
        self.stats.stopped += stopped as u64;
        log::info!("Playback interrupted, stopped {} source(s)", stopped);
        stopped
    }

    fn drop_chunk(&mut self, reason: String) -> EnqueueOutcome {
        self.stats.dropped += 1;
        let reported = self.policy == ChunkErrorPolicy::Report;
        if reported {
            log::warn!("Dropping audio chunk ({} dropped so far): {}", self.stats.dropped, reason);
        } else {
            log::debug!("Dropping audio chunk: {}", reason);
        }
        EnqueueOutcome::Dropped { reason, reported }
    }
}
