use thiserror::Error;

use crate::UsbDeviceId;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EndpBinaryDirection {
    Out,
    In,
}

/// A bulk pipe: endpoint number plus direction, as encoded by `usb_sndbulkpipe` and
/// `usb_rcvbulkpipe`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BulkPipe {
    pub endpoint: u8,
    pub direction: EndpBinaryDirection,
}

impl BulkPipe {
    pub const fn snd(endpoint: u8) -> Self {
        Self {
            endpoint,
            direction: EndpBinaryDirection::Out,
        }
    }
    pub const fn rcv(endpoint: u8) -> Self {
        Self {
            endpoint,
            direction: EndpBinaryDirection::In,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TransferStatus {
    pub kind: TransferStatusKind,
    pub bytes_transferred: u32,
}

impl TransferStatus {
    pub fn success(bytes_transferred: u32) -> Self {
        Self {
            kind: TransferStatusKind::Success,
            bytes_transferred,
        }
    }
    pub fn failed(kind: TransferStatusKind) -> Self {
        Self {
            kind,
            bytes_transferred: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum TransferStatusKind {
    #[default]
    Success,
    ShortPacket,
    Stalled,
    /// Unlinked or killed before it completed.
    Cancelled,
    /// The device went away (disconnect, host controller shutdown).
    Shutdown,
    Unknown,
}

impl TransferStatusKind {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::ShortPacket)
    }
}

/// Called by the host stack, in completion context, once per submitted transfer.
pub type CompletionHandler = Box<dyn Fn(TransferStatus) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("out of memory allocating {0}")]
pub struct AllocError(pub &'static str);

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SubmitError {
    #[error("device not present")]
    NoDevice,

    #[error("out of transfer resources")]
    NoMemory,

    #[error("transfer already in flight")]
    Busy,

    #[error("transfer is being killed")]
    Rejected,

    #[error("endpoint halted")]
    Halted,
}

/// Memory shared with the host controller. Contents may only be touched while no transfer
/// referencing the buffer is outstanding.
pub trait DmaBuffer: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_at(&self, offset: usize, dst: &mut [u8]);

    fn write_at(&self, offset: usize, src: &[u8]);
}

/// The USB device the driver is bound to.
///
/// URBs and coherent buffers are released by dropping them. An URB must be dropped before the
/// buffer it was filled with.
pub trait UsbDevice: Send + Sync + 'static {
    type Urb: Send + Sync + 'static;
    type Buffer: DmaBuffer + 'static;

    fn id(&self) -> UsbDeviceId;

    /// Bus name of the device, e.g. `1-1.4`.
    fn name(&self) -> String;

    fn alloc_urb(&self) -> Result<Self::Urb, AllocError>;

    fn alloc_coherent(&self, size: usize) -> Result<Self::Buffer, AllocError>;

    /// Binds `urb` to `pipe` and `buffer`. `complete` runs once for every successful
    /// `submit_urb`.
    fn fill_bulk_urb(
        &self,
        urb: &mut Self::Urb,
        pipe: BulkPipe,
        buffer: &Self::Buffer,
        complete: CompletionHandler,
    );

    /// Queues the first `length` bytes of the bound buffer. Never blocks, and may be called
    /// from completion context.
    fn submit_urb(&self, urb: &Self::Urb, length: usize) -> Result<(), SubmitError>;

    /// Cancels `urb` if it is in flight and waits until its completion handler has returned.
    /// Submissions made while the kill is in progress fail with [`SubmitError::Rejected`].
    /// Must not be called from completion context.
    fn kill_urb(&self, urb: &Self::Urb);
}
