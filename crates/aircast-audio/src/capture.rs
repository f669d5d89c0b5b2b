//! Recording capture buffer.
//!
//! While a recording is active the receiving peer appends each inbound frame
//! of mono `f32` samples here; stopping the recording encodes the
//! accumulated samples and clears the buffer. The buffer has a single owner
//! (the peer task), so frames, start/stop, and flushing all happen on one
//! event loop — feeds from another thread must go through an SPSC channel.

use crate::encoder::{self, EncodedAudioFile};

/// Ordered mono sample accumulator for one recording session.
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl CaptureBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Append one frame of captured samples.
    pub fn push_frame(&mut self, frame: &[f32]) {
        self.samples.extend_from_slice(frame);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encode everything accumulated so far and clear the buffer.
    pub fn finish(&mut self) -> EncodedAudioFile {
        let file = encoder::encode(&self.samples, self.sample_rate);
        self.samples.clear();
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_accumulate_in_order() {
        let mut buffer = CaptureBuffer::new(8000);
        buffer.push_frame(&[0.1, 0.2]);
        buffer.push_frame(&[0.3]);
        assert_eq!(buffer.sample_count(), 3);

        let file = buffer.finish();
        assert_eq!(file.len(), 44 + 6);
        assert!(buffer.is_empty());
    }

    #[test]
    fn finish_clears_for_the_next_session() {
        let mut buffer = CaptureBuffer::new(16000);
        buffer.push_frame(&[0.5; 128]);
        let first = buffer.finish();
        assert_eq!(first.len(), 44 + 256);

        // Nothing recorded since — an empty but valid file
        let second = buffer.finish();
        assert_eq!(second.len(), 44);
    }

    #[test]
    fn matches_direct_encoding() {
        let mut buffer = CaptureBuffer::new(8000);
        buffer.push_frame(&[0.25, -0.25]);
        buffer.push_frame(&[1.0]);
        let from_buffer = buffer.finish();
        let direct = encoder::encode(&[0.25, -0.25, 1.0], 8000);
        assert_eq!(from_buffer.bytes(), direct.bytes());
    }
}
