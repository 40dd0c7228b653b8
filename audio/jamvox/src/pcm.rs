use std::fmt;

use thiserror::Error;

use crate::usb::{AllocError, BulkPipe};
use crate::BULK_ENDPOINT;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StreamDirection {
    Playback,
    Capture,
}

impl StreamDirection {
    pub fn pipe(self) -> BulkPipe {
        match self {
            Self::Playback => BulkPipe::snd(BULK_ENDPOINT),
            Self::Capture => BulkPipe::rcv(BULK_ENDPOINT),
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Capture => "capture",
        }
    }
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The audio subsystem's view of one open PCM stream.
pub trait PcmSubstream: Send + Sync {
    /// Wakes whoever waits on the stream. Called from completion context, once per period
    /// crossed; must not block.
    fn period_elapsed(&self);

    /// Reads `dst.len()` bytes of the ring starting at `offset`. The range never wraps.
    fn copy_from_ring(&self, offset: usize, dst: &mut [u8]);

    /// Writes `src` into the ring starting at `offset`. The range never wraps.
    fn copy_to_ring(&self, offset: usize, src: &[u8]);
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CardIdentity {
    pub driver: &'static str,
    pub short_name: &'static str,
    pub long_name: String,
}

impl CardIdentity {
    pub fn for_device(device_name: &str) -> Self {
        Self {
            driver: crate::DRIVER_NAME,
            short_name: "Jamvox",
            long_name: format!("VOX Jamvox at {}", device_name),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PcmDesc {
    pub name: &'static str,
    pub device: u32,
    pub playback_count: u32,
    pub capture_count: u32,
    /// Size of the ring the audio subsystem preallocates for each substream.
    pub ring_bytes: usize,
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("{0}")]
pub struct RegisterError(pub &'static str);

/// Card and PCM registration with the audio subsystem. Dropping a card frees it together with
/// its PCM instances.
pub trait SoundCore: Send + Sync {
    type Card: Send + 'static;

    fn new_card(&self, identity: &CardIdentity) -> Result<Self::Card, AllocError>;

    fn new_pcm(&self, card: &mut Self::Card, desc: &PcmDesc) -> Result<(), AllocError>;

    fn register_card(&self, card: &Self::Card) -> Result<(), RegisterError>;
}
