use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Hardware pointer bookkeeping for one direction.
///
/// `advance` runs in completion context while `position` may be queried concurrently from the
/// audio subsystem, so the counter is a plain atomic rather than lock protected. The geometry
/// only changes in `reset`, which happens while no transfer is in flight.
#[derive(Debug, Default)]
pub struct RingPosition {
    transferred: AtomicU64,
    ring_bytes: AtomicUsize,
    period_bytes: AtomicUsize,
}

impl RingPosition {
    pub const fn new() -> Self {
        Self {
            transferred: AtomicU64::new(0),
            ring_bytes: AtomicUsize::new(0),
            period_bytes: AtomicUsize::new(0),
        }
    }

    pub fn reset(&self, ring_bytes: usize, period_bytes: usize) {
        assert!(ring_bytes > 0 && period_bytes > 0);
        self.ring_bytes.store(ring_bytes, Ordering::Release);
        self.period_bytes.store(period_bytes, Ordering::Release);
        self.transferred.store(0, Ordering::Release);
    }

    /// Adds `n` bytes and returns how many period boundaries were crossed.
    pub fn advance(&self, n: usize) -> u64 {
        let before = self.transferred.fetch_add(n as u64, Ordering::AcqRel);
        self.periods_crossed(before, before + n as u64)
    }

    /// Total bytes moved since the last reset.
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    /// Byte offset into the ring, in `[0, ring_bytes)`.
    pub fn position(&self) -> usize {
        let ring_bytes = self.ring_bytes.load(Ordering::Acquire);
        if ring_bytes == 0 {
            return 0;
        }
        (self.transferred() % ring_bytes as u64) as usize
    }

    /// Number of multiples of the period size in `(before, after]`.
    pub fn periods_crossed(&self, before: u64, after: u64) -> u64 {
        let period_bytes = self.period_bytes.load(Ordering::Acquire) as u64;
        if period_bytes == 0 || after <= before {
            return 0;
        }
        after / period_bytes - before / period_bytes
    }
}
