//! PCM16 mono WAV encoding.
//!
//! The layout is the classic 44-byte RIFF/WAVE header followed by raw
//! little-endian 16-bit samples:
//!
//! ```text
//!   "RIFF" | chunk size (36 + data) | "WAVE"
//!   "fmt " | 16 | PCM=1 | channels=1 | rate | byte rate | align=2 | bits=16
//!   "data" | data size | samples...
//! ```
//!
//! Encoding is a pure function of the input: the same samples at the same
//! rate always produce byte-identical output.

const HEADER_LEN: usize = 44;

/// An encoded WAV file, ready to hand to whatever saves or downloads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioFile {
    bytes: Vec<u8>,
    sample_rate: u32,
}

impl EncodedAudioFile {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total file size in bytes (header included).
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// A timestamped filename for the download surface,
    /// e.g. `recorded-audio-2026-08-04T12-30-00-000Z.wav`.
    pub fn suggested_filename(&self) -> String {
        let timestamp = chrono::Utc::now()
            .format("%Y-%m-%dT%H-%M-%S-%3fZ")
            .to_string();
        format!("recorded-audio-{timestamp}.wav")
    }
}

/// Encode mono `f32` samples into a PCM16 WAV file.
///
/// Samples are clamped to `[-1, 1]` and quantized with `round(s * 32767)`;
/// out-of-range input is clamped, never rejected. Empty input yields a valid
/// 44-byte file with a zero-length data chunk.
pub fn encode(samples: &[f32], sample_rate: u32) -> EncodedAudioFile {
    let data_len = samples.len() * 2;
    let mut bytes = Vec::with_capacity(HEADER_LEN + data_len);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data_len as u32).to_le_bytes());

    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }

    EncodedAudioFile { bytes, sample_rate }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    fn i16_at(bytes: &[u8], offset: usize) -> i16 {
        i16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn two_samples_at_8khz() {
        let file = encode(&[0.5, -0.5], 8000);
        let bytes = file.bytes();

        assert_eq!(bytes.len(), 48);
        assert_eq!(u32_at(bytes, 4), 40); // chunk size = 36 + 4
        assert_eq!(u32_at(bytes, 40), 4); // data bytes
        assert_eq!(i16_at(bytes, 44), 16384); // round(0.5 * 32767)
        assert_eq!(i16_at(bytes, 46), -16384);
    }

    #[test]
    fn header_fields() {
        let file = encode(&[0.0; 100], 44100);
        let bytes = file.bytes();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(bytes, 16), 16);
        assert_eq!(u16_at(bytes, 20), 1); // PCM
        assert_eq!(u16_at(bytes, 22), 1); // mono
        assert_eq!(u32_at(bytes, 24), 44100);
        assert_eq!(u32_at(bytes, 28), 88200); // byte rate
        assert_eq!(u16_at(bytes, 32), 2); // block align
        assert_eq!(u16_at(bytes, 34), 16); // bits per sample
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(bytes, 40), 200);
        assert_eq!(bytes.len(), 244);
    }

    #[test]
    fn empty_input_yields_valid_header_only_file() {
        let file = encode(&[], 16000);
        assert_eq!(file.len(), 44);
        assert_eq!(u32_at(file.bytes(), 4), 36);
        assert_eq!(u32_at(file.bytes(), 40), 0);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let file = encode(&[2.0, -3.5], 8000);
        assert_eq!(i16_at(file.bytes(), 44), 32767);
        assert_eq!(i16_at(file.bytes(), 46), -32767);
    }

    #[test]
    fn encoding_is_deterministic() {
        let samples: Vec<f32> = (0..500).map(|i| (i as f32 / 250.0) - 1.0).collect();
        let a = encode(&samples, 48000);
        let b = encode(&samples, 48000);
        assert_eq!(a.bytes(), b.bytes());
    }

    #[test]
    fn suggested_filename_has_wav_extension() {
        let file = encode(&[0.1], 8000);
        let name = file.suggested_filename();
        assert!(name.starts_with("recorded-audio-"));
        assert!(name.ends_with(".wav"));
        // No colons; the only dot is the extension separator
        assert!(!name.contains(':'));
        assert_eq!(name.matches('.').count(), 1);
    }
}
