use std::cmp::min;

use crate::pcm::PcmSubstream;
use crate::usb::{AllocError, BulkPipe, CompletionHandler, DmaBuffer, SubmitError, UsbDevice};

// Completion context must not allocate, so ring copies bounce through the stack.
const BOUNCE_SIZE: usize = 256;

/// One direction's bulk URB and the coherent buffer it transfers from or into.
///
/// Allocated once per session and reused for every submission. Field order matters: the URB
/// is dropped before the buffer it points at.
pub struct TransferSlot<D: UsbDevice> {
    urb: D::Urb,
    buffer: D::Buffer,
    pipe: BulkPipe,
}

impl<D: UsbDevice> TransferSlot<D> {
    pub fn alloc(device: &D, pipe: BulkPipe, size: usize) -> Result<Self, AllocError> {
        let urb = device.alloc_urb()?;
        let buffer = device.alloc_coherent(size)?;
        Ok(Self { urb, buffer, pipe })
    }

    pub fn bind(&mut self, device: &D, complete: CompletionHandler) {
        device.fill_bulk_urb(&mut self.urb, self.pipe, &self.buffer, complete);
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn submit(&self, device: &D, length: usize) -> Result<(), SubmitError> {
        debug_assert!(length <= self.capacity());
        device.submit_urb(&self.urb, length)
    }

    pub fn kill(&self, device: &D) {
        device.kill_urb(&self.urb);
    }

    /// Fills the first `length` bytes of the buffer from the ring, starting at `ring_offset` and
    /// wrapping at `ring_bytes`.
    pub fn stage_from_ring(
        &self,
        substream: &dyn PcmSubstream,
        ring_offset: usize,
        ring_bytes: usize,
        length: usize,
    ) {
        let mut bounce = [0u8; BOUNCE_SIZE];
        let mut done = 0;
        while done < length {
            let offset = (ring_offset + done) % ring_bytes;
            let chunk = min(min(BOUNCE_SIZE, length - done), ring_bytes - offset);
            substream.copy_from_ring(offset, &mut bounce[..chunk]);
            self.buffer.write_at(done, &bounce[..chunk]);
            done += chunk;
        }
    }

    /// Copies the first `length` bytes of the buffer into the ring at `ring_offset`, wrapping at
    /// `ring_bytes`.
    pub fn drain_to_ring(
        &self,
        substream: &dyn PcmSubstream,
        ring_offset: usize,
        ring_bytes: usize,
        length: usize,
    ) {
        let mut bounce = [0u8; BOUNCE_SIZE];
        let mut done = 0;
        while done < length {
            let offset = (ring_offset + done) % ring_bytes;
            let chunk = min(min(BOUNCE_SIZE, length - done), ring_bytes - offset);
            self.buffer.read_at(done, &mut bounce[..chunk]);
            substream.copy_to_ring(offset, &bounce[..chunk]);
            done += chunk;
        }
    }
}
