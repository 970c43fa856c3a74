use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::debug;

use crate::traits::Transport;

/// Default outbound queue capacity per direction, in bytes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Connected in-memory transport pair.
///
/// Bytes written on one side become readable on the other immediately.
/// Each direction has a bounded queue so tests can exercise the engine's
/// transmit-headroom wait by shrinking the capacity.
pub struct Loopback {
    outbound: Arc<Mutex<VecDeque<u8>>>,
    inbound: Arc<Mutex<VecDeque<u8>>>,
    capacity: usize,
    epoch: Instant,
}

impl Loopback {
    /// Create a connected pair with the default queue capacity.
    pub fn pair() -> (Loopback, Loopback) {
        Self::pair_with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a connected pair with an explicit per-direction capacity.
    pub fn pair_with_capacity(capacity: usize) -> (Loopback, Loopback) {
        let a_to_b = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let b_to_a = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let epoch = Instant::now();

        let a = Loopback {
            outbound: Arc::clone(&a_to_b),
            inbound: Arc::clone(&b_to_a),
            capacity,
            epoch,
        };
        let b = Loopback {
            outbound: b_to_a,
            inbound: a_to_b,
            capacity,
            epoch,
        };
        (a, b)
    }
}

fn lock(queue: &Mutex<VecDeque<u8>>) -> MutexGuard<'_, VecDeque<u8>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for Loopback {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut queue = lock(&self.outbound);
        let free = self.capacity.saturating_sub(queue.len());
        if bytes.len() > free {
            debug!(
                dropped = bytes.len() - free,
                "loopback outbound queue full, dropping bytes"
            );
        }
        queue.extend(bytes.iter().take(free).copied());
    }

    fn read_byte(&mut self) -> u8 {
        lock(&self.inbound).pop_front().unwrap_or(0)
    }

    fn bytes_available(&mut self) -> usize {
        lock(&self.inbound).len()
    }

    fn tx_headroom(&mut self) -> usize {
        self.capacity.saturating_sub(lock(&self.outbound).len())
    }

    fn flush_tx(&mut self) {
        // Delivery is immediate; nothing is in flight.
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
