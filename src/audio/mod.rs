//! audio - PCM codec, playback scheduling, and capture
//!
//! The codec, scheduler, timeline and capture pipeline are device independent.
//! With the `alsa` feature the timeline is rendered to a real speaker and the
//! capture pipeline is fed from a real microphone.

pub mod capture;
pub mod output;
pub mod pcm;
pub mod resample;
pub mod scheduler;
pub mod timeline;

#[cfg(feature = "alsa")]
mod alsa_device;
#[cfg(feature = "alsa")]
mod audio_system;
#[cfg(feature = "alsa")]
mod play;
#[cfg(feature = "alsa")]
mod record;

pub use capture::{CapturePipeline, CapturedFrame};
pub use output::{OutputDevice, SourceId};
pub use scheduler::{AudioChunk, ChunkErrorPolicy, EnqueueOutcome, PlaybackScheduler, SchedulerStats};
pub use timeline::{SharedTimeline, Timeline};

#[cfg(feature = "alsa")]
pub use audio_system::{AudioConfig, AudioSystem};
