#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{Receiver, Sender};
use jamvox::pcm::{CardIdentity, PcmDesc, RegisterError, SoundCore};
use jamvox::usb::{
    AllocError, BulkPipe, CompletionHandler, DmaBuffer, EndpBinaryDirection, SubmitError,
    TransferStatus, TransferStatusKind, UsbDevice,
};
use jamvox::{HwParams, PcmSubstream, SampleFormat, Session, StreamDirection, UsbDeviceId};

/// Counts live allocations and fails the n-th one on request.
#[derive(Debug, Default)]
pub struct Allocator {
    live: AtomicUsize,
    steps: AtomicUsize,
    fail_at: Option<usize>,
}

impl Allocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    pub fn failing_at(step: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_at: Some(step),
            ..Self::default()
        })
    }
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }
    fn step(self: &Arc<Self>, what: &'static str) -> Result<Allocation, AllocError> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(step) {
            return Err(AllocError(what));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Allocation(Arc::clone(self)))
    }
    fn check(&self) -> bool {
        let step = self.steps.fetch_add(1, Ordering::SeqCst);
        self.fail_at != Some(step)
    }
}

#[derive(Debug)]
pub struct Allocation(Arc<Allocator>);

impl Drop for Allocation {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

type Handler = Arc<dyn Fn(TransferStatus) + Send + Sync>;

#[derive(Default)]
struct UrbInner {
    pipe: Option<BulkPipe>,
    buffer: Option<Arc<Mutex<Vec<u8>>>>,
    handler: Option<Handler>,
    /// Length of the submitted-but-not-completed transfer.
    pending: Option<usize>,
    delivering: usize,
    killing: usize,
    submissions: usize,
    double_submits: usize,
    payloads: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct UrbState {
    inner: Mutex<UrbInner>,
    idle: Condvar,
}

impl UrbState {
    fn deliver(&self, handler: Option<Handler>, status: TransferStatus) {
        if let Some(handler) = handler {
            handler(status);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.delivering -= 1;
        self.idle.notify_all();
    }
}

pub struct MockUrb {
    state: Arc<UrbState>,
    _allocation: Allocation,
}

pub struct MockBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    _allocation: Allocation,
}

impl DmaBuffer for MockBuffer {
    fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }
    fn read_at(&self, offset: usize, dst: &mut [u8]) {
        let data = self.data.lock().unwrap();
        dst.copy_from_slice(&data[offset..offset + dst.len()]);
    }
    fn write_at(&self, offset: usize, src: &[u8]) {
        let mut data = self.data.lock().unwrap();
        data[offset..offset + src.len()].copy_from_slice(src);
    }
}

/// A USB device whose transfers complete only when the test says so.
pub struct MockDevice {
    id: UsbDeviceId,
    allocator: Arc<Allocator>,
    urbs: Mutex<Vec<Arc<UrbState>>>,
    submit_error: Mutex<Option<SubmitError>>,
}

impl MockDevice {
    pub fn new(allocator: &Arc<Allocator>) -> Arc<Self> {
        Self::with_id(allocator, UsbDeviceId::new(jamvox::VENDOR_ID, jamvox::PRODUCT_ID))
    }

    pub fn with_id(allocator: &Arc<Allocator>, id: UsbDeviceId) -> Arc<Self> {
        Arc::new(Self {
            id,
            allocator: Arc::clone(allocator),
            urbs: Mutex::new(Vec::new()),
            submit_error: Mutex::new(None),
        })
    }

    pub fn fail_submissions(&self, error: Option<SubmitError>) {
        *self.submit_error.lock().unwrap() = error;
    }

    fn urb(&self, direction: EndpBinaryDirection) -> Arc<UrbState> {
        self.urbs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|urb| {
                urb.inner.lock().unwrap().pipe.map(|pipe| pipe.direction) == Some(direction)
            })
            .cloned()
            .expect("no urb for direction")
    }

    fn urb_for(&self, stream: StreamDirection) -> Arc<UrbState> {
        self.urb(stream.pipe().direction)
    }

    /// Completes the in-flight transfer of `stream`, as the host controller interrupt would.
    /// Returns false if nothing was in flight.
    pub fn complete(&self, stream: StreamDirection, kind: TransferStatusKind, bytes: u32) -> bool {
        let state = self.urb_for(stream);
        let handler = {
            let mut inner = state.inner.lock().unwrap();
            if inner.pending.take().is_none() {
                return false;
            }
            inner.delivering += 1;
            inner.handler.clone()
        };
        state.deliver(handler, TransferStatus { kind, bytes_transferred: bytes });
        true
    }

    /// Completes a capture transfer with `data` as the received payload.
    pub fn complete_capture(&self, data: &[u8]) -> bool {
        let state = self.urb_for(StreamDirection::Capture);
        let handler = {
            let mut inner = state.inner.lock().unwrap();
            if inner.pending.take().is_none() {
                return false;
            }
            if let Some(ref buffer) = inner.buffer {
                buffer.lock().unwrap()[..data.len()].copy_from_slice(data);
            }
            inner.delivering += 1;
            inner.handler.clone()
        };
        state.deliver(handler, TransferStatus::success(data.len() as u32));
        true
    }

    pub fn outstanding(&self, stream: StreamDirection) -> usize {
        self.urb_for(stream).inner.lock().unwrap().pending.iter().count()
    }

    pub fn pending_len(&self, stream: StreamDirection) -> Option<usize> {
        self.urb_for(stream).inner.lock().unwrap().pending
    }

    pub fn submissions(&self, stream: StreamDirection) -> usize {
        self.urb_for(stream).inner.lock().unwrap().submissions
    }

    pub fn double_submits(&self, stream: StreamDirection) -> usize {
        self.urb_for(stream).inner.lock().unwrap().double_submits
    }

    /// Buffer contents at the time of each submission.
    pub fn payloads(&self, stream: StreamDirection) -> Vec<Vec<u8>> {
        self.urb_for(stream).inner.lock().unwrap().payloads.clone()
    }
}

impl UsbDevice for MockDevice {
    type Urb = MockUrb;
    type Buffer = MockBuffer;

    fn id(&self) -> UsbDeviceId {
        self.id
    }

    fn name(&self) -> String {
        "1-1.4".to_owned()
    }

    fn alloc_urb(&self) -> Result<MockUrb, AllocError> {
        let allocation = self.allocator.step("urb")?;
        let state = Arc::new(UrbState::default());
        self.urbs.lock().unwrap().push(Arc::clone(&state));
        Ok(MockUrb {
            state,
            _allocation: allocation,
        })
    }

    fn alloc_coherent(&self, size: usize) -> Result<MockBuffer, AllocError> {
        let allocation = self.allocator.step("coherent buffer")?;
        Ok(MockBuffer {
            data: Arc::new(Mutex::new(vec![0; size])),
            _allocation: allocation,
        })
    }

    fn fill_bulk_urb(
        &self,
        urb: &mut MockUrb,
        pipe: BulkPipe,
        buffer: &MockBuffer,
        complete: CompletionHandler,
    ) {
        let mut inner = urb.state.inner.lock().unwrap();
        inner.pipe = Some(pipe);
        inner.buffer = Some(Arc::clone(&buffer.data));
        inner.handler = Some(Arc::from(complete));
    }

    fn submit_urb(&self, urb: &MockUrb, length: usize) -> Result<(), SubmitError> {
        if let Some(err) = *self.submit_error.lock().unwrap() {
            return Err(err);
        }
        let mut inner = urb.state.inner.lock().unwrap();
        if inner.killing > 0 {
            return Err(SubmitError::Rejected);
        }
        if inner.pending.is_some() {
            inner.double_submits += 1;
            return Err(SubmitError::Busy);
        }
        let payload = match inner.buffer {
            Some(ref buffer) => buffer.lock().unwrap()[..length].to_vec(),
            None => Vec::new(),
        };
        inner.payloads.push(payload);
        inner.pending = Some(length);
        inner.submissions += 1;
        Ok(())
    }

    fn kill_urb(&self, urb: &MockUrb) {
        let state = &urb.state;
        let mut inner = state.inner.lock().unwrap();
        inner.killing += 1;
        if inner.pending.take().is_some() {
            inner.delivering += 1;
            let handler = inner.handler.clone();
            drop(inner);
            state.deliver(handler, TransferStatus::failed(TransferStatusKind::Cancelled));
            inner = state.inner.lock().unwrap();
        }
        while inner.delivering > 0 {
            inner = state.idle.wait(inner).unwrap();
        }
        inner.killing -= 1;
    }
}

pub struct MockCard {
    pub identity: CardIdentity,
    pub pcm: Option<PcmDesc>,
    _card: Allocation,
    _pcm: Option<Allocation>,
}

pub struct MockCore {
    allocator: Arc<Allocator>,
    pub registered: AtomicBool,
    pub cards: Mutex<Vec<CardIdentity>>,
}

impl MockCore {
    pub fn new(allocator: &Arc<Allocator>) -> Self {
        Self {
            allocator: Arc::clone(allocator),
            registered: AtomicBool::new(false),
            cards: Mutex::new(Vec::new()),
        }
    }
}

impl SoundCore for MockCore {
    type Card = MockCard;

    fn new_card(&self, identity: &CardIdentity) -> Result<MockCard, AllocError> {
        let allocation = self.allocator.step("card")?;
        self.cards.lock().unwrap().push(identity.clone());
        Ok(MockCard {
            identity: identity.clone(),
            pcm: None,
            _card: allocation,
            _pcm: None,
        })
    }

    fn new_pcm(&self, card: &mut MockCard, desc: &PcmDesc) -> Result<(), AllocError> {
        card._pcm = Some(self.allocator.step("pcm")?);
        card.pcm = Some(*desc);
        Ok(())
    }

    fn register_card(&self, _card: &MockCard) -> Result<(), RegisterError> {
        if !self.allocator.check() {
            return Err(RegisterError("card registration refused"));
        }
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A PCM substream backed by a plain byte ring. Period notifications are sent over a channel.
pub struct MockSubstream {
    ring: Mutex<Vec<u8>>,
    periods: AtomicUsize,
    events: Sender<()>,
}

impl MockSubstream {
    pub fn new(ring_bytes: usize) -> (Arc<Self>, Receiver<()>) {
        let (events, receiver) = crossbeam_channel::unbounded();
        let substream = Arc::new(Self {
            ring: Mutex::new(vec![0; ring_bytes]),
            periods: AtomicUsize::new(0),
            events,
        });
        (substream, receiver)
    }

    pub fn periods(&self) -> usize {
        self.periods.load(Ordering::SeqCst)
    }

    pub fn fill_ring(&self, f: impl Fn(usize) -> u8) {
        let mut ring = self.ring.lock().unwrap();
        for (i, byte) in ring.iter_mut().enumerate() {
            *byte = f(i);
        }
    }

    pub fn ring(&self) -> Vec<u8> {
        self.ring.lock().unwrap().clone()
    }
}

impl PcmSubstream for MockSubstream {
    fn period_elapsed(&self) {
        self.periods.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.try_send(());
    }
    fn copy_from_ring(&self, offset: usize, dst: &mut [u8]) {
        let ring = self.ring.lock().unwrap();
        dst.copy_from_slice(&ring[offset..offset + dst.len()]);
    }
    fn copy_to_ring(&self, offset: usize, src: &[u8]) {
        let mut ring = self.ring.lock().unwrap();
        ring[offset..offset + src.len()].copy_from_slice(src);
    }
}

pub type MockSession = Session<MockDevice, MockCore>;

pub struct Rig {
    pub allocator: Arc<Allocator>,
    pub device: Arc<MockDevice>,
    pub core: MockCore,
    pub session: Arc<MockSession>,
}

impl Rig {
    pub fn new() -> Self {
        let allocator = Allocator::new();
        let device = MockDevice::new(&allocator);
        let core = MockCore::new(&allocator);
        let session = Session::attach(Arc::clone(&device), &core).expect("attach failed");
        Self {
            allocator,
            device,
            core,
            session,
        }
    }
}

/// S16_LE stereo at 44.1 kHz, `periods` periods of `period_bytes`.
pub fn s16_stereo(period_bytes: usize, periods: usize) -> HwParams {
    HwParams {
        format: SampleFormat::S16Le,
        rate: 44100,
        channels: 2,
        period_bytes,
        periods,
    }
}
