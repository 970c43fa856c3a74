/// Point-to-point byte link consumed by the protocol engine.
///
/// Implementations model a serial-style peripheral: reads and writes are
/// buffered and non-blocking, and failures are handled inside the adapter
/// rather than surfaced to the engine. The engine drives the link by
/// polling [`bytes_available`](Transport::bytes_available) and pulling one
/// byte at a time.
pub trait Transport {
    /// Queue raw bytes for transmission.
    ///
    /// Callers are expected to check [`tx_headroom`](Transport::tx_headroom)
    /// first; an adapter may drop bytes that exceed its outbound capacity.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Take the next received byte.
    ///
    /// Only valid when [`bytes_available`](Transport::bytes_available)
    /// returned a non-zero count immediately before.
    fn read_byte(&mut self) -> u8;

    /// Number of received bytes ready to be read.
    fn bytes_available(&mut self) -> usize;

    /// Free space in the outbound queue, in bytes.
    fn tx_headroom(&mut self) -> usize;

    /// Block until all queued outbound bytes have left the device.
    fn flush_tx(&mut self);

    /// Monotonic milliseconds. The engine only compares differences, so the
    /// epoch is arbitrary but must be shared with nothing outside this link.
    fn now_millis(&self) -> u64;

    /// Enter a critical section guarding transmissions and linked memory
    /// against the concurrent execution context driving this link.
    ///
    /// Must nest safely. The default is a no-op for transports that are not
    /// shared across contexts.
    fn enter_critical(&mut self) {}

    /// Leave the critical section opened by
    /// [`enter_critical`](Transport::enter_critical).
    fn exit_critical(&mut self) {}
}
