//! PCM audio handling for the relay
//!
//! The browser records 16-bit mono PCM at 48kHz; the realtime model expects
//! 16-bit mono PCM at 24kHz. These rates are part of the wire contract with
//! the client UI and must not change silently.

pub mod frame;
pub mod resample;

pub use frame::AudioFrame;
pub use resample::resample;

/// Sample rate of PCM chunks sent by the browser client
pub const SOURCE_SAMPLE_RATE: u32 = 48_000;

/// Sample rate expected by the upstream realtime model
pub const TARGET_SAMPLE_RATE: u32 = 24_000;

/// Bits per sample (signed little-endian)
pub const SAMPLE_WIDTH_BITS: u16 = 16;

/// Mono
pub const CHANNELS: u16 = 1;
