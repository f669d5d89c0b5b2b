//! # aircast-audio
//!
//! Audio persistence for the receiving peer: a deterministic PCM16 WAV
//! encoder and the capture buffer it drains. No media engine, no playback —
//! just samples in, bytes out.

pub mod capture;
pub mod encoder;

pub use capture::CaptureBuffer;
pub use encoder::{encode, EncodedAudioFile};
