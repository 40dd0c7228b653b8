use std::result;

use thiserror::Error;

use crate::pcm::RegisterError;
use crate::stream::StreamState;
use crate::usb::{AllocError, SubmitError};
use crate::UsbDeviceId;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("unsupported hardware parameters: {0}")]
    UnsupportedParameters(&'static str),

    #[error("a substream is already bound to this stream")]
    AlreadyBound,

    #[error("no substream is bound to this stream")]
    NotBound,

    #[error("hardware parameters have not been configured")]
    NotConfigured,

    #[error("operation not permitted while the stream is {0}")]
    BadState(StreamState),

    #[error("failed to submit transfer: {0}")]
    SubmitFailed(#[source] SubmitError),

    #[error("transfer aborted by the transport")]
    TransferAborted,

    #[error("allocation failed: {0}")]
    AllocationFailed(#[from] AllocError),

    #[error("failed to register sound card: {0}")]
    RegistrationFailed(#[from] RegisterError),

    #[error("unsupported device {0}")]
    UnsupportedDevice(UsbDeviceId),

    #[error("device disconnected")]
    Disconnected,
}

pub type Result<T, E = Error> = result::Result<T, E>;
