//! Sample-rate conversion of decoded chunks to the device rate.

use std::sync::Arc;

use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler as _};

use super::pcm::AudioBuffer;

const CHUNK_FRAMES: usize = 1024;

/// Convert `buffer` to `rate`. Buffers already at `rate` are returned as is.
///
/// The result holds `ceil(frames * rate / buffer_rate)` frames with the
/// resampler delay removed, so frame 0 lines up with the input's frame 0.
pub fn to_rate(buffer: Arc<AudioBuffer>, rate: u32) -> Result<Arc<AudioBuffer>> {
    let from = buffer.sample_rate();
    let channels = buffer.channel_count();
    let frames = buffer.frame_count();
    if from == rate || channels == 0 || frames == 0 {
        return Ok(buffer);
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, rate as usize, CHUNK_FRAMES, 2, channels)
        .with_context(|| format!("cannot resample {} Hz to {} Hz", from, rate))?;
    let delay = resampler.output_delay();
    let wanted = (frames as f64 * rate as f64 / from as f64).ceil() as usize;

    let mut out = vec![Vec::with_capacity(delay + wanted); channels];
    let mut chunk = vec![Vec::new(); channels];
    let mut pos = 0;
    while out[0].len() < delay + wanted {
        let len = resampler.input_frames_next();
        let end = (pos + len).min(frames);
        for (ch, dst) in chunk.iter_mut().enumerate() {
            dst.clear();
            if pos < end {
                dst.extend_from_slice(&buffer.channel(ch)[pos..end]);
            }
            // zero tail flushes the filter
            dst.resize(len, 0.0);
        }
        let produced = resampler.process(&chunk, None).context("resampling failed")?;
        for (dst, src) in out.iter_mut().zip(produced) {
            dst.extend_from_slice(&src);
        }
        pos += len;
    }

    let out = out
        .into_iter()
        .map(|mut samples| {
            samples.drain(..delay);
            samples.truncate(wanted);
            samples
        })
        .collect();
    Ok(Arc::new(AudioBuffer::new(rate, out)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passed_through() {
        let buffer = Arc::new(AudioBuffer::new(24000, vec![vec![0.25; 100]]));
        let out = to_rate(buffer.clone(), 24000).unwrap();
        assert!(Arc::ptr_eq(&buffer, &out));
    }

    #[test]
    fn upsampling_keeps_length_and_level() {
        let buffer = Arc::new(AudioBuffer::new(16000, vec![vec![0.5; 4800], vec![-0.5; 4800]]));
        let out = to_rate(buffer, 24000).unwrap();

        assert_eq!(out.sample_rate(), 24000);
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.frame_count(), 7200);
        // away from the edges a constant signal stays constant
        for &s in &out.channel(0)[2000..5000] {
            assert!((s - 0.5).abs() < 0.02, "left sample {}", s);
        }
        for &s in &out.channel(1)[2000..5000] {
            assert!((s + 0.5).abs() < 0.02, "right sample {}", s);
        }
    }

    #[test]
    fn tiny_chunks_round_up_to_whole_frames() {
        let buffer = Arc::new(AudioBuffer::new(6, vec![vec![0.5]]));
        let out = to_rate(buffer, 10).unwrap();
        assert_eq!(out.sample_rate(), 10);
        assert_eq!(out.frame_count(), 2);
    }
}
