//! Conversion from device audio to the wire format.
//!
//! The ASR service takes **16 kHz mono 16-bit little-endian PCM**.  Capture
//! devices deliver interleaved `f32` at their native rate, so every callback
//! buffer goes through [`downmix`] → [`resample_linear`] → [`to_pcm16_le`],
//! bundled as [`PcmConverter::convert`].
//!
//! Resampling is per-buffer linear interpolation.  It does not carry phase
//! across buffers, which is inaudible at speech bandwidth.

/// Sample rate of the audio sent to the ASR service.
pub const WIRE_SAMPLE_RATE: u32 = 16_000;

/// Average interleaved frames down to one channel.  `channels == 0` yields
/// nothing; a trailing partial frame is dropped.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let width = usize::from(channels);
    match width {
        0 => Vec::new(),
        1 => samples.to_vec(),
        _ => samples
            .chunks_exact(width)
            .map(|frame| frame.iter().copied().sum::<f32>() / width as f32)
            .collect(),
    }
}

/// Linear-interpolation resample from `from_rate` to `to_rate`.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (samples.len() as f64 / step).ceil() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let t = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * t
        })
        .collect()
}

/// Clamp to `[-1.0, 1.0]`, scale to `i16`, little-endian bytes.
pub fn to_pcm16_le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let scaled = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            scaled.to_le_bytes()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PcmConverter
// ---------------------------------------------------------------------------

/// Fixed device format → wire PCM.
///
/// ```rust
/// use edge_voice_client::audio::PcmConverter;
///
/// // 10 ms of stereo 48 kHz silence → 160 mono samples → 320 bytes.
/// let conv = PcmConverter::new(48_000, 2);
/// assert_eq!(conv.convert(&vec![0.0; 960]).len(), 320);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PcmConverter {
    source_rate: u32,
    channels: u16,
}

impl PcmConverter {
    pub fn new(source_rate: u32, channels: u16) -> Self {
        Self {
            source_rate,
            channels,
        }
    }

    pub fn convert(&self, interleaved: &[f32]) -> Vec<u8> {
        let mono = downmix(interleaved, self.channels);
        let resampled = resample_linear(&mono, self.source_rate, WIRE_SAMPLE_RATE);
        to_pcm16_le(&resampled)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
