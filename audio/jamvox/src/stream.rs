use std::cmp::min;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use log::{debug, trace, warn};
use spin::Mutex;

use crate::caps::{HwParams, PcmHardware, JAMVOX_PCM_HW};
use crate::error::{Error, Result};
use crate::pcm::{PcmSubstream, StreamDirection};
use crate::position::RingPosition;
use crate::slot::TransferSlot;
use crate::usb::{TransferStatus, UsbDevice};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StreamState {
    Idle,
    /// Prepared; the next start submits the first transfer.
    Armed,
    /// One transfer in flight, resubmitted on every completion.
    Running,
    /// A stop is cancelling the in-flight transfer; completions must not resubmit.
    Stopping,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Inner<D: UsbDevice> {
    state: StreamState,
    substream: Option<Arc<dyn PcmSubstream>>,
    params: Option<HwParams>,
    /// `None` once the session has been torn down.
    slot: Option<Arc<TransferSlot<D>>>,
    transfer_len: usize,
    in_flight: bool,
    /// Latched by a failed completion, reported by the next start or pointer query.
    aborted: bool,
}

/// Per-direction streaming state machine.
///
/// Commands arrive from the audio subsystem in calling context; completions arrive from the
/// USB host in completion context. Both sides take `inner`, a spinlock, so the completion path
/// never sleeps. The lock is never held across `kill_urb`, since the completion handler being
/// waited on needs it.
pub struct StreamController<D: UsbDevice> {
    direction: StreamDirection,
    device: Arc<D>,
    position: RingPosition,
    inner: Mutex<Inner<D>>,
}

impl<D: UsbDevice> StreamController<D> {
    pub fn new(direction: StreamDirection, device: Arc<D>, mut slot: TransferSlot<D>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this = this.clone();
            slot.bind(
                &device,
                Box::new(move |status| {
                    if let Some(stream) = this.upgrade() {
                        stream.complete(status);
                    }
                }),
            );
            Self {
                direction,
                device,
                position: RingPosition::new(),
                inner: Mutex::new(Inner {
                    state: StreamState::Idle,
                    substream: None,
                    params: None,
                    slot: Some(Arc::new(slot)),
                    transfer_len: 0,
                    in_flight: false,
                    aborted: false,
                }),
            }
        })
    }

    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    pub fn params(&self) -> Option<HwParams> {
        self.inner.lock().params
    }

    pub fn is_bound(&self) -> bool {
        self.inner.lock().substream.is_some()
    }

    /// Byte offset of the hardware pointer in the ring.
    pub fn position_bytes(&self) -> usize {
        self.position.position()
    }

    pub fn open(&self, substream: Arc<dyn PcmSubstream>) -> Result<&'static PcmHardware> {
        let mut inner = self.inner.lock();
        if inner.slot.is_none() {
            return Err(Error::Disconnected);
        }
        if inner.substream.is_some() {
            return Err(Error::AlreadyBound);
        }
        inner.substream = Some(substream);
        debug!("{}: opened", self.direction);
        Ok(&JAMVOX_PCM_HW)
    }

    pub fn close(&self) {
        self.force_stop();
        let substream = {
            let mut inner = self.inner.lock();
            inner.params = None;
            inner.aborted = false;
            inner.substream.take()
        };
        if substream.is_some() {
            debug!("{}: closed", self.direction);
        }
    }

    pub fn configure(&self, params: HwParams) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.slot.is_none() {
            return Err(Error::Disconnected);
        }
        if inner.substream.is_none() {
            return Err(Error::NotBound);
        }
        match inner.state {
            StreamState::Idle | StreamState::Armed => {}
            state => return Err(Error::BadState(state)),
        }
        JAMVOX_PCM_HW.constrain(&params)?;

        inner.params = Some(params);
        inner.state = StreamState::Idle;
        debug!(
            "{}: {:?} {} Hz {} ch, {} x {} bytes",
            self.direction,
            params.format,
            params.rate,
            params.channels,
            params.periods,
            params.period_bytes
        );
        Ok(())
    }

    pub fn hw_free(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            StreamState::Idle | StreamState::Armed => {}
            state => return Err(Error::BadState(state)),
        }
        inner.params = None;
        inner.state = StreamState::Idle;
        Ok(())
    }

    pub fn prepare(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot_capacity = match inner.slot {
            Some(ref slot) => slot.capacity(),
            None => return Err(Error::Disconnected),
        };
        if inner.substream.is_none() {
            return Err(Error::NotBound);
        }
        match inner.state {
            StreamState::Idle | StreamState::Armed => {}
            state => return Err(Error::BadState(state)),
        }
        if mem::take(&mut inner.aborted) {
            return Err(Error::TransferAborted);
        }
        let params = inner.params.ok_or(Error::NotConfigured)?;

        self.position.reset(params.buffer_bytes(), params.period_bytes);
        inner.transfer_len = min(params.period_bytes, slot_capacity);
        inner.state = StreamState::Armed;
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = inner.slot.clone().ok_or(Error::Disconnected)?;
        if mem::take(&mut inner.aborted) {
            return Err(Error::TransferAborted);
        }
        if inner.state != StreamState::Armed {
            return Err(Error::BadState(inner.state));
        }
        let substream = inner.substream.clone().ok_or(Error::NotBound)?;
        let params = inner.params.ok_or(Error::NotConfigured)?;

        if self.direction == StreamDirection::Playback {
            slot.stage_from_ring(
                &*substream,
                self.position.position(),
                params.buffer_bytes(),
                inner.transfer_len,
            );
        }
        debug_assert!(!inner.in_flight);
        if let Err(err) = slot.submit(&self.device, inner.transfer_len) {
            warn!("{}: failed to submit transfer: {}", self.direction, err);
            return Err(Error::SubmitFailed(err));
        }
        inner.in_flight = true;
        inner.state = StreamState::Running;
        debug!("{}: started", self.direction);
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let slot = {
            let mut inner = self.inner.lock();
            match inner.state {
                StreamState::Running | StreamState::Armed => {}
                state => return Err(Error::BadState(state)),
            }
            inner.state = StreamState::Stopping;
            inner.slot.clone()
        };
        self.quiesce(slot);
        debug!("{}: stopped", self.direction);
        Ok(())
    }

    /// Hardware pointer in frames.
    pub fn pointer(&self) -> Result<usize> {
        let frame_bytes = {
            let mut inner = self.inner.lock();
            if mem::take(&mut inner.aborted) {
                return Err(Error::TransferAborted);
            }
            inner.params.map(|params| params.frame_bytes())
        };
        Ok(frame_bytes.map_or(0, |frame_bytes| self.position.position() / frame_bytes))
    }

    /// Stops from any state, including a stop already in progress elsewhere. The slot is killed
    /// even when Idle: a completion that just went Idle may still be notifying the substream.
    fn force_stop(&self) {
        let slot = {
            let mut inner = self.inner.lock();
            if inner.state != StreamState::Idle {
                inner.state = StreamState::Stopping;
            }
            inner.slot.clone()
        };
        self.quiesce(slot);
    }

    fn quiesce(&self, slot: Option<Arc<TransferSlot<D>>>) {
        if let Some(slot) = slot {
            slot.kill(&self.device);
        }
        let mut inner = self.inner.lock();
        debug_assert!(!inner.in_flight);
        inner.state = StreamState::Idle;
    }

    /// Stops and unbinds the stream for good, then gives up the transfer slot. The slot is
    /// killed once more without the lock so that no completion handler can still be running
    /// when it is freed.
    pub(crate) fn retire(&self) {
        let (slot, substream) = {
            let mut inner = self.inner.lock();
            inner.state = StreamState::Stopping;
            inner.params = None;
            inner.aborted = false;
            (inner.slot.take(), inner.substream.take())
        };
        if let Some(ref slot) = slot {
            slot.kill(&self.device);
        }
        self.inner.lock().state = StreamState::Idle;
        drop(substream);
        drop(slot);
        debug!("{}: retired", self.direction);
    }

    fn complete(&self, status: TransferStatus) {
        let mut inner = self.inner.lock();
        inner.in_flight = false;
        if inner.state != StreamState::Running {
            trace!("{}: {:?} while {}", self.direction, status.kind, inner.state);
            return;
        }
        if !status.kind.is_success() {
            warn!("{}: transfer aborted: {:?}", self.direction, status.kind);
            inner.state = StreamState::Idle;
            inner.aborted = true;
            return;
        }
        let bound = (inner.slot.clone(), inner.substream.clone(), inner.params);
        let (slot, substream, params) = match bound {
            (Some(slot), Some(substream), Some(params)) => (slot, substream, params),
            _ => {
                inner.state = StreamState::Idle;
                inner.aborted = true;
                return;
            }
        };
        let ring_bytes = params.buffer_bytes();
        let transfer_len = inner.transfer_len;
        let bytes = min(status.bytes_transferred as usize, transfer_len);

        if self.direction == StreamDirection::Capture {
            slot.drain_to_ring(&*substream, self.position.position(), ring_bytes, bytes);
        }
        let periods = self.position.advance(bytes);
        if self.direction == StreamDirection::Playback {
            slot.stage_from_ring(&*substream, self.position.position(), ring_bytes, transfer_len);
        }
        match slot.submit(&self.device, transfer_len) {
            Ok(()) => inner.in_flight = true,
            Err(err) => {
                warn!("{}: failed to resubmit transfer: {}", self.direction, err);
                inner.state = StreamState::Idle;
                inner.aborted = true;
            }
        }
        drop(inner);

        trace!("{}: {} bytes, {} periods", self.direction, bytes, periods);
        for _ in 0..periods {
            substream.period_elapsed();
        }
    }
}
