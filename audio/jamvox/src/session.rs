use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::pcm::{CardIdentity, PcmDesc, SoundCore, StreamDirection};
use crate::slot::TransferSlot;
use crate::stream::StreamController;
use crate::usb::UsbDevice;
use crate::{DRIVER_NAME, JAMVOX_PCM_HW, TRANSFER_BUFFER_SIZE};

/// Everything the driver holds for one attached device.
///
/// A session is torn down by whichever of [`Session::detach`] (USB side) and
/// [`Session::release`] (audio side) runs first; the other one, and any later call, is a no-op.
/// The memory itself lives until the last `Arc` is dropped.
pub struct Session<D: UsbDevice, S: SoundCore> {
    device: Arc<D>,
    playback: Arc<StreamController<D>>,
    capture: Arc<StreamController<D>>,
    /// Taken by teardown. Teardown sleeps (it waits for cancelled transfers), so this is a
    /// blocking mutex, never touched from completion context.
    card: Mutex<Option<S::Card>>,
}

impl<D: UsbDevice, S: SoundCore> Session<D, S> {
    /// Attaches to `device` if it is in the ID table.
    pub fn probe(device: Arc<D>, core: &S) -> Result<Arc<Self>> {
        let id = device.id();
        if !crate::matches(id) {
            return Err(Error::UnsupportedDevice(id));
        }
        Self::attach(device, core)
    }

    /// Builds the card, the PCM and both transfer slots, then registers the card. On any
    /// failure everything allocated so far is released again before returning.
    pub fn attach(device: Arc<D>, core: &S) -> Result<Arc<Self>> {
        let identity = CardIdentity::for_device(&device.name());

        let mut card = core.new_card(&identity)?;
        core.new_pcm(
            &mut card,
            &PcmDesc {
                name: DRIVER_NAME,
                device: 0,
                playback_count: 1,
                capture_count: 1,
                ring_bytes: JAMVOX_PCM_HW.buffer_bytes_max,
            },
        )?;

        let playback_slot = TransferSlot::alloc(
            &*device,
            StreamDirection::Playback.pipe(),
            TRANSFER_BUFFER_SIZE,
        )?;
        let capture_slot = TransferSlot::alloc(
            &*device,
            StreamDirection::Capture.pipe(),
            TRANSFER_BUFFER_SIZE,
        )?;
        let playback =
            StreamController::new(StreamDirection::Playback, Arc::clone(&device), playback_slot);
        let capture =
            StreamController::new(StreamDirection::Capture, Arc::clone(&device), capture_slot);

        core.register_card(&card)?;

        info!("{} ({})", identity.long_name, device.id());
        Ok(Arc::new(Self {
            device,
            playback,
            capture,
            card: Mutex::new(Some(card)),
        }))
    }

    pub fn stream(&self, direction: StreamDirection) -> &Arc<StreamController<D>> {
        match direction {
            StreamDirection::Playback => &self.playback,
            StreamDirection::Capture => &self.capture,
        }
    }

    pub fn playback(&self) -> &Arc<StreamController<D>> {
        &self.playback
    }

    pub fn capture(&self) -> &Arc<StreamController<D>> {
        &self.capture
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn is_attached(&self) -> bool {
        self.card
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The USB device went away.
    pub fn detach(&self) {
        self.teardown("detach");
    }

    /// The audio subsystem dropped its last reference to the card.
    pub fn release(&self) {
        self.teardown("card release");
    }

    fn teardown(&self, reason: &str) {
        // held for the whole teardown, so a racing caller returns only once it is complete
        let mut guard = self.card.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(card) = guard.take() else {
            debug!("{}: already torn down", reason);
            return;
        };

        self.playback.retire();
        self.capture.retire();
        drop(card);

        info!("{}: {} torn down", self.device.name(), reason);
    }
}

impl<D: UsbDevice, S: SoundCore> Drop for Session<D, S> {
    fn drop(&mut self) {
        self.teardown("drop");
    }
}
