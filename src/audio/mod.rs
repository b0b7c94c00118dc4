//! Audio input: capture source → wire PCM → fixed-size chunks.
//!
//! ```text
//! cpal callback (f32, native rate) → PcmConverter → Vec<u8> (mpsc)
//!     → PushToTalkGate → ChunkCoalescer (3200-byte chunks) → ASR session
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;

pub use buffer::ChunkCoalescer;
pub use capture::{AudioCapture, CaptureError, CpalCapture, NullCapture};
pub use resample::{downmix, resample_linear, to_pcm16_le, PcmConverter, WIRE_SAMPLE_RATE};
