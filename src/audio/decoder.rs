use crate::audio::AudioError;
use tracing::trace;

const LOG_TARGET: &str = "slidecast::audio::decoder";

/// Bytes per sample for signed 16-bit PCM.
const BYTES_PER_SAMPLE: usize = 2;

/// Decoded narration audio: one normalized f32 plane per channel.
#[derive(Clone)]
pub struct DecodedBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedBuffer {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }
}

// Manual Debug: the sample planes are far too large to dump into logs.
impl std::fmt::Debug for DecodedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedBuffer")
            .field("channels", &self.channel_count())
            .field("frames", &self.frame_count())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Decodes interleaved signed 16-bit little-endian PCM into per-channel f32
/// planes normalized to [-1.0, 1.0].
///
/// Frame count is `raw.len() / 2 / channel_count`; a byte length that is not a
/// multiple of `2 * channel_count` is rejected as malformed input.
pub fn decode_pcm_s16le(
    raw: &[u8],
    sample_rate: u32,
    channel_count: usize,
) -> Result<DecodedBuffer, AudioError> {
    if channel_count == 0 {
        return Err(AudioError::DecodeError("channel count must be non-zero".to_string()));
    }
    if sample_rate == 0 {
        return Err(AudioError::DecodeError("sample rate must be non-zero".to_string()));
    }
    let frame_bytes = BYTES_PER_SAMPLE * channel_count;
    if raw.len() % frame_bytes != 0 {
        return Err(AudioError::DecodeError(format!(
            "raw byte length {} is not a multiple of {} (2 bytes x {} channels)",
            raw.len(),
            frame_bytes,
            channel_count
        )));
    }

    let num_frames = raw.len() / frame_bytes;
    let mut channels: Vec<Vec<f32>> = vec![vec![0.0f32; num_frames]; channel_count];

    trace!(target: LOG_TARGET, "Decoding {} bytes into {} frames x {} channels at {} Hz", raw.len(), num_frames, channel_count, sample_rate);

    for frame in 0..num_frames {
        for ch in 0..channel_count {
            let offset = (frame * channel_count + ch) * BYTES_PER_SAMPLE;
            let sample = i16::from_le_bytes([raw[offset], raw[offset + 1]]);
            channels[ch][frame] = f32::from(sample) / 32768.0;
        }
    }

    Ok(DecodedBuffer { channels, sample_rate })
}
