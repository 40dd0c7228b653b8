//! Driver for the VOX Jamvox USB audio interface.
//!
//! The device streams interleaved PCM over a pair of bulk endpoints (endpoint 1 OUT for
//! playback, endpoint 1 IN for capture). Each direction keeps exactly one transfer in flight
//! while running; every completion advances the ring position, reports elapsed periods to the
//! audio subsystem and resubmits the same transfer.
//!
//! The USB host stack and the audio subsystem are reached through the [`usb::UsbDevice`] and
//! [`pcm::SoundCore`]/[`pcm::PcmSubstream`] traits.

use std::fmt;

pub mod caps;
pub mod error;
pub mod pcm;
pub mod position;
pub mod session;
pub mod slot;
pub mod stream;
pub mod usb;

pub use caps::{HwParams, PcmHardware, SampleFormat, JAMVOX_PCM_HW};
pub use error::{Error, Result};
pub use pcm::{PcmSubstream, SoundCore, StreamDirection};
pub use session::Session;
pub use stream::{StreamController, StreamState};

pub const DRIVER_NAME: &str = "jamvox";

pub const VENDOR_ID: u16 = 0x0944;
pub const PRODUCT_ID: u16 = 0x0117;

/// Size of the coherent buffer behind each transfer slot, and the largest period the device
/// accepts in a single bulk transfer.
pub const TRANSFER_BUFFER_SIZE: usize = 4096;

/// Bulk endpoint number used for both directions.
pub const BULK_ENDPOINT: u8 = 1;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct UsbDeviceId {
    pub vendor: u16,
    pub product: u16,
}

impl UsbDeviceId {
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }
}

impl fmt::Display for UsbDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

pub const ID_TABLE: &[UsbDeviceId] = &[UsbDeviceId::new(VENDOR_ID, PRODUCT_ID)];

pub fn matches(id: UsbDeviceId) -> bool {
    ID_TABLE.contains(&id)
}
