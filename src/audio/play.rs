use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::sync::mpsc;

use super::alsa_device::AlsaStream;
use super::timeline::SharedTimeline;
use crate::session::SessionEvent;

/// Render the timeline one period at a time into the speaker.
///
/// The blocking ALSA write paces the loop, so the timeline clock follows the
/// hardware clock. Sources that finish are reported back to the session.
pub fn play_thread(
    stream: &AlsaStream,
    timeline: &SharedTimeline,
    ended_tx: mpsc::Sender<SessionEvent>,
    running: &AtomicBool,
) -> Result<()> {
    let channels = stream.params.channels as usize;
    let period = stream.params.period_size.max(1);
    let mut period_buf = vec![0i16; period * channels];
    let io = stream.pcm.io_i16()?;

    log::info!(
        "Playback started: rate={}, ch={}, period={}",
        stream.params.sample_rate,
        channels,
        period,
    );

    while running.load(Ordering::Relaxed) {
        let finished = timeline.lock().render(&mut period_buf);
        for id in finished {
            if ended_tx.blocking_send(SessionEvent::SourceEnded(id)).is_err() {
                log::info!("Session gone, stopping playback");
                return Ok(());
            }
        }

        // Short writes and XRUN recovery without losing frames
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < period {
            let offset = frames_written * channels;
            match io.writei(&period_buf[offset..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    retry_count += 1;
                    stream.recover(&e)?;
                    // 熔断器：底层持续跟不上写入速度时，丢弃剩余帧防止死循环
                    if retry_count >= 3 {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            period - frames_written
                        );
                        break;
                    }
                }
            }
        }
    }

    log::info!("Playback stopped");
    Ok(())
}
