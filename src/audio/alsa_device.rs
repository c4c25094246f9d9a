//! ALSA PCM streams for the microphone and the speaker.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    pub sample_rate: u32,
    pub channels: u32,
    /// Period size in frames
    pub period_size: usize,
}

/// An opened, configured S16LE interleaved PCM stream.
pub struct AlsaStream {
    pub pcm: PCM,
    pub params: AlsaParams,
    label: &'static str,
}

impl AlsaStream {
    pub fn capture(device: &str, sample_rate: u32, channels: u32) -> Result<Self> {
        Self::open(device, Direction::Capture, sample_rate, channels, None, "Capture")
    }

    pub fn playback(
        device: &str,
        sample_rate: u32,
        channels: u32,
        period_size: Option<usize>,
    ) -> Result<Self> {
        Self::open(device, Direction::Playback, sample_rate, channels, period_size, "Playback")
    }

    /// Bring the stream back after an XRUN or suspend.
    pub fn recover(&self, err: &alsa::Error) -> Result<()> {
        log::warn!("ALSA {} error: {}, recovering...", self.label, err);
        self.pcm
            .prepare()
            .with_context(|| format!("Failed to recover PCM {}", self.label))
    }

    fn open(
        device: &str,
        direction: Direction,
        sample_rate: u32,
        channels: u32,
        period_size: Option<usize>,
        label: &'static str,
    ) -> Result<Self> {
        let pcm = PCM::new(device, direction, false)
            .with_context(|| format!("Failed to open PCM device '{}' for {}", device, label))?;

        {
            let hwp = HwParams::any(&pcm).context("Failed to initialize HwParams")?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(Format::S16LE)?;
            hwp.set_channels(channels)?;
            hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
            if let Some(ps) = period_size {
                hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
            }
            pcm.hw_params(&hwp)?;
        }

        // The hardware may not honour the request exactly
        let params = {
            let hwp = pcm.hw_params_current()?;
            AlsaParams {
                sample_rate: hwp.get_rate()?,
                channels: hwp.get_channels()?,
                period_size: hwp.get_period_size()? as usize,
            }
        };

        if params.sample_rate != sample_rate {
            log::warn!(
                "ALSA {}: asked for {}Hz, device gave {}Hz",
                label,
                sample_rate,
                params.sample_rate
            );
        }
        log::info!(
            "ALSA {}: device={}, rate={}, channels={}, period_size={}",
            label,
            device,
            params.sample_rate,
            params.channels,
            params.period_size,
        );

        Ok(Self { pcm, params, label })
    }
}
