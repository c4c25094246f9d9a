//! PCM codec for the live audio transport.
//!
//! Three representations of the same audio:
//! - float samples in [-1.0, 1.0] (devices and the output timeline)
//! - signed 16-bit little-endian integers (the wire sample format)
//! - base64 text (the transport-safe payload carried inside JSON messages)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Scale factor between float samples and i16 samples.
const I16_SCALE: f32 = 32768.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(String),
    #[error("payload of {len} bytes is not a whole number of {channels}-channel i16 frames")]
    Misaligned { len: usize, channels: u16 },
    #[error("channel count must be at least 1")]
    NoChannels,
    #[error("sample rate must be non-zero")]
    NoSampleRate,
}

/// A decoded, de-interleaved block of float audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self { sample_rate, channels }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Float sample to i16, truncating toward zero and saturating at the i16 range.
pub fn float_to_i16(sample: f32) -> i16 {
    // `as` saturates and maps NaN to 0
    (sample * I16_SCALE) as i16
}

pub fn i16_to_float(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

/// Encode float samples as base64 text of little-endian i16 PCM.
pub fn encode_for_transport(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&float_to_i16(s).to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// Undo the text encoding only. The result is raw PCM bytes.
pub fn decode_from_transport(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Interpret `bytes` as interleaved little-endian i16 samples and de-interleave them
/// into a float buffer.
pub fn bytes_to_audio_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: u16,
) -> Result<AudioBuffer, CodecError> {
    if channel_count == 0 {
        return Err(CodecError::NoChannels);
    }
    if sample_rate == 0 {
        return Err(CodecError::NoSampleRate);
    }
    let frame_bytes = channel_count as usize * 2;
    if bytes.len() % frame_bytes != 0 {
        return Err(CodecError::Misaligned { len: bytes.len(), channels: channel_count });
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut channels = vec![Vec::with_capacity(frame_count); channel_count as usize];
    for frame in bytes.chunks_exact(frame_bytes) {
        for (ch, sample) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channels[ch].push(i16_to_float(value));
        }
    }

    Ok(AudioBuffer::new(sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_quantization_bounded() {
        let samples: Vec<f32> = (0..=200)
            .map(|i| (-1.0 + i as f32 * 0.01).clamp(-1.0, 1.0))
            .collect();
        let text = encode_for_transport(&samples);
        let bytes = decode_from_transport(&text).unwrap();
        let buffer = bytes_to_audio_buffer(&bytes, 16000, 1).unwrap();

        assert_eq!(buffer.frame_count(), samples.len());
        for (orig, back) in samples.iter().zip(buffer.channel(0)) {
            assert!((orig - back).abs() <= 1.0 / 32768.0 + f32::EPSILON, "{orig} vs {back}");
        }
    }

    #[test]
    fn full_scale_saturates_instead_of_wrapping() {
        assert_eq!(float_to_i16(1.0), i16::MAX);
        assert_eq!(float_to_i16(-1.0), i16::MIN);
        assert_eq!(float_to_i16(2.5), i16::MAX);
        assert_eq!(float_to_i16(f32::NAN), 0);
    }

    #[test]
    fn truncates_toward_zero() {
        // 0.5 / 32768 above and below zero
        assert_eq!(float_to_i16(1.5 / 32768.0), 1);
        assert_eq!(float_to_i16(-1.5 / 32768.0), -1);
    }

    #[test]
    fn encodes_little_endian() {
        let text = encode_for_transport(&[0.5, -0.5]);
        let bytes = decode_from_transport(&text).unwrap();
        assert_eq!(bytes, vec![0x00, 0x40, 0x00, 0xC0]);
    }

    #[test]
    fn deinterleaves_stereo() {
        let mut bytes = Vec::new();
        for v in [100i16, -100, 200, -200, 300, -300] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let buffer = bytes_to_audio_buffer(&bytes, 24000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frame_count(), 3);
        assert_eq!(buffer.channel(0)[2], 300.0 / 32768.0);
        assert_eq!(buffer.channel(1)[0], -100.0 / 32768.0);
    }

    #[test]
    fn duration_follows_sample_rate() {
        let buffer = bytes_to_audio_buffer(&vec![0u8; 48000], 24000, 1).unwrap();
        assert_eq!(buffer.duration(), 1.0);
    }

    #[test]
    fn rejects_misaligned_and_bad_input() {
        assert_eq!(
            bytes_to_audio_buffer(&[0, 0, 0], 24000, 1),
            Err(CodecError::Misaligned { len: 3, channels: 1 })
        );
        assert_eq!(
            bytes_to_audio_buffer(&[0, 0], 24000, 2),
            Err(CodecError::Misaligned { len: 2, channels: 2 })
        );
        assert_eq!(bytes_to_audio_buffer(&[0, 0], 24000, 0), Err(CodecError::NoChannels));
        assert_eq!(bytes_to_audio_buffer(&[0, 0], 0, 1), Err(CodecError::NoSampleRate));
        assert!(matches!(decode_from_transport("not base64!"), Err(CodecError::Base64(_))));
    }
}
