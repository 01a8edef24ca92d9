use tracing::trace;

/// Fixed microphone sample rate in hertz.
pub const MICROPHONE_SAMPLE_RATE: u32 = 16_000;
/// Fixed microphone channel count.
pub const MICROPHONE_CHANNELS: u16 = 1;

/// Normalised microphone audio ready for playback scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Returns samples in `[-1.0, 1.0]`.
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the sample rate in hertz.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel count.
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns whether the buffer holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the sample count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Maps signed 16-bit PCM to normalised float samples at 16 kHz mono.
///
/// `i16::MIN` would map slightly below `-1.0`, so outputs are clamped.
///
/// ```
/// use blinky::reassemble;
///
/// let buffer = reassemble(&[0, i16::MAX, i16::MIN]);
/// assert_eq!(&[0.0, 1.0, -1.0], buffer.samples());
/// assert_eq!(16_000, buffer.sample_rate());
/// ```
#[must_use]
pub fn reassemble(raw_samples: &[i16]) -> AudioBuffer {
    let scale = f32::from(i16::MAX);
    let samples = raw_samples
        .iter()
        .map(|sample| (f32::from(*sample) / scale).clamp(-1.0, 1.0))
        .collect();

    AudioBuffer {
        samples,
        sample_rate: MICROPHONE_SAMPLE_RATE,
        channels: MICROPHONE_CHANNELS,
    }
}

/// Splits a raw notification payload into little-endian signed samples.
///
/// A trailing odd byte is dropped.
#[must_use]
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    let chunks = bytes.chunks_exact(2);
    if !chunks.remainder().is_empty() {
        trace!(payload_len = bytes.len(), "dropping trailing odd PCM byte");
    }
    chunks
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Playback target for microphone audio.
///
/// The microphone lifecycle calls `start` once before the first buffer and
/// `stop` once when the sink is released.
pub trait AudioSink: Send {
    /// Prepares the sink for playback.
    fn start(&mut self) {}

    /// Schedules one buffer.
    fn schedule(&mut self, buffer: AudioBuffer);

    /// Stops playback and releases the sink.
    fn stop(&mut self) {}
}

impl<F> AudioSink for F
where
    F: FnMut(AudioBuffer) + Send,
{
    fn schedule(&mut self, buffer: AudioBuffer) {
        self(buffer);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn reassemble_empty_is_empty() {
        let buffer = reassemble(&[]);
        assert!(buffer.is_empty());
        assert_eq!(MICROPHONE_SAMPLE_RATE, buffer.sample_rate());
        assert_eq!(MICROPHONE_CHANNELS, buffer.channels());
    }

    #[rstest]
    #[case(&[i16::MIN, -1, 0, 1, i16::MAX])]
    #[case(&[i16::MIN; 4])]
    #[case(&[-12_345, 23_456, 7])]
    fn reassemble_stays_in_unit_range(#[case] raw: &[i16]) {
        let buffer = reassemble(raw);
        assert_eq!(raw.len(), buffer.len());
        assert!(
            buffer
                .samples()
                .iter()
                .all(|sample| (-1.0..=1.0).contains(sample))
        );
    }

    #[test]
    fn pcm16_from_le_bytes_ignores_trailing_byte() {
        assert_eq!(
            vec![0x0201, -1],
            pcm16_from_le_bytes(&[0x01, 0x02, 0xFF, 0xFF, 0x7F])
        );
    }

    #[test]
    fn closures_are_sinks() {
        let mut received = Vec::new();
        {
            let mut sink = |buffer: AudioBuffer| received.push(buffer.len());
            sink.start();
            sink.schedule(reassemble(&[1, 2, 3]));
            sink.stop();
        }
        assert_eq!(vec![3], received);
    }
}
