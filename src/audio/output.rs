use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::pcm::AudioBuffer;

/// Handle of a buffer that has been handed to an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src#{}", self.0)
    }
}

/// An audio output with its own clock that can start buffers at a future time.
///
/// Natural completion is not reported through this trait; the device owner forwards
/// it to the session as a `SessionEvent::SourceEnded`.
pub trait OutputDevice {
    /// Current device clock, in seconds.
    fn current_time(&self) -> f64;

    /// Start `buffer` at device time `at` (seconds). `at` is never in the past.
    fn start(&mut self, buffer: Arc<AudioBuffer>, at: f64) -> Result<SourceId>;

    /// Stop a source immediately, whether it is playing or still waiting to start.
    fn stop(&mut self, id: SourceId);
}
