use std::time::Duration;

use tracing::debug;

use bitlink_frame::{
    encode_frame, encode_read_request, Event, FrameKind, FrameReceiver, MAX_PAYLOAD, MAX_RAW,
};
use bitlink_transport::Transport;

use crate::error::{PeerError, Result};
use crate::guard::CriticalSection;
use crate::table::{FnTable, VarTable};
use crate::var::{LinkedVar, Scalar, TypeTag};

/// Response timeout applied until [`Peer::set_timeout`] is called.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Smallest accepted timeout; shorter values are floored to this.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(2);

/// Outbound headroom demanded before any transmission: two maximum frames,
/// margin enough that our frame cannot collide with an in-flight response
/// still being drained on the same queue.
const TX_HEADROOM_MARGIN: usize = 2 * MAX_RAW;

/// Construction-time parameters for a [`Peer`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Variable table capacity; valid indices are `0..max_variables`.
    pub max_variables: u8,
    /// Function table capacity; valid indices are `0..max_functions`.
    pub max_functions: u8,
    /// Initial response/headroom timeout (floored to [`MIN_TIMEOUT`]).
    pub timeout: Duration,
    /// Bracket transmissions with the transport's critical section and the
    /// headroom wait. Disable only on links never touched from a second
    /// execution context.
    pub transmit_guard: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            max_variables: 32,
            max_functions: 16,
            timeout: DEFAULT_TIMEOUT,
            transmit_guard: true,
        }
    }
}

struct Response {
    index: u8,
    data: [u8; MAX_PAYLOAD],
    len: u8,
}

/// One end of a bitlink connection.
///
/// Owns the transport and the link tables. The host drives the engine by
/// calling [`poll`](Peer::poll) from its loop; inbound read, write, and
/// execute requests are served against the tables from inside that call.
/// Outbound operations ([`read`](Peer::read), [`write`](Peer::write),
/// [`invoke`](Peer::invoke)) act on the remote peer's tables.
///
/// No memory is allocated after construction and no threads are spawned;
/// the only blocking is the timeout-bounded busy-wait inside `read`.
pub struct Peer<T: Transport> {
    transport: T,
    receiver: FrameReceiver,
    vars: VarTable,
    funcs: FnTable,
    timeout_ms: u64,
    transmit_guard: bool,
    last_comm_at: u64,
    response: Option<Response>,
}

impl<T: Transport> Peer<T> {
    /// Engine with the given table capacities and default configuration.
    pub fn new(transport: T, max_variables: u8, max_functions: u8) -> Self {
        Self::with_config(
            transport,
            PeerConfig {
                max_variables,
                max_functions,
                ..PeerConfig::default()
            },
        )
    }

    pub fn with_config(transport: T, config: PeerConfig) -> Self {
        let last_comm_at = transport.now_millis();
        Self {
            transport,
            receiver: FrameReceiver::new(),
            vars: VarTable::new(config.max_variables),
            funcs: FnTable::new(config.max_functions),
            timeout_ms: clamp_timeout(config.timeout),
            transmit_guard: config.transmit_guard,
            last_comm_at,
            response: None,
        }
    }

    /// Set the response and headroom timeout, floored to [`MIN_TIMEOUT`].
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout_ms = clamp_timeout(timeout);
    }

    /// The currently configured timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Register `var` under `index` so the remote peer can read and write
    /// it. Fails when `index` is at or past the configured capacity.
    pub fn link_variable(&mut self, index: u8, var: &LinkedVar) -> Result<()> {
        self.vars.link(index, var.clone())
    }

    /// Register a callback the remote peer can invoke. The callback runs
    /// synchronously on whatever context drives [`poll`](Peer::poll).
    pub fn link_function(
        &mut self,
        index: u8,
        callback: impl FnMut(&[u8]) + Send + 'static,
    ) -> Result<()> {
        self.funcs.link(index, Box::new(callback))
    }

    /// Discovery: the type tag of the variable linked at `index`.
    pub fn var_type(&self, index: u8) -> Option<TypeTag> {
        self.vars.get(index)?.type_tag()
    }

    /// Discovery: the byte size of the variable linked at `index`.
    pub fn var_size(&self, index: u8) -> Option<usize> {
        Some(self.vars.get(index)?.size())
    }

    /// Time since the last fully decoded inbound frame (or construction).
    pub fn last_comm_age(&self) -> Duration {
        let elapsed = self.transport.now_millis().saturating_sub(self.last_comm_at);
        Duration::from_millis(elapsed)
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the engine and return the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Drive the receive state machine over all currently available bytes,
    /// serving any inbound requests.
    ///
    /// Returns `true` exactly when a read response completed during this
    /// call; processing stops there so the response is handed to the
    /// enclosing [`read`](Peer::read) before anything else is consumed.
    pub fn poll(&mut self) -> bool {
        while self.transport.bytes_available() > 0 {
            let byte = self.transport.read_byte();
            let Some(event) = self.receiver.push(byte) else {
                continue;
            };
            self.last_comm_at = self.transport.now_millis();

            match event {
                Event::ReadResponse { index, data, len } => {
                    self.response = Some(Response { index, data, len });
                    return true;
                }
                Event::ReadRequest { index, size } => self.answer_read(index, size),
                Event::WriteRequest { index, data, len } => {
                    self.apply_write(index, &data[..len as usize])
                }
                Event::ExecuteRequest { index, data, len } => {
                    self.dispatch_execute(index, &data[..len as usize])
                }
            }
        }
        false
    }

    /// Read `out.len()` bytes (1..=8) of the remote variable at `index`.
    ///
    /// Blocks until the matching response arrives or the timeout elapses,
    /// re-entering [`poll`](Peer::poll) throughout so inbound requests keep
    /// being served while we wait.
    pub fn read(&mut self, index: u8, out: &mut [u8]) -> Result<()> {
        let size = out.len();
        if size == 0 || size > MAX_PAYLOAD {
            return Err(PeerError::InvalidSize { size });
        }

        // One poll step discards anything stale in the receive path, so a
        // leftover frame cannot be taken for this request's answer.
        self.poll();
        self.response = None;

        let request = encode_read_request(index, size as u8)?;
        if !self.wait_tx_headroom() {
            return Err(PeerError::Timeout);
        }
        {
            let mut link = CriticalSection::enter(&mut self.transport, self.transmit_guard);
            link.write_bytes(request.as_bytes());
        }
        // Flush before arming the timer: the wait should measure the peer,
        // not our own outbound latency.
        self.transport.flush_tx();

        let start = self.transport.now_millis();
        while !self.poll() {
            if self.transport.now_millis().saturating_sub(start) >= self.timeout_ms {
                self.receiver.reset();
                return Err(PeerError::Timeout);
            }
        }

        let Some(response) = self.response.take() else {
            return Err(PeerError::Desync);
        };
        if response.index != index || response.len as usize != size {
            debug!(
                requested = index,
                got = response.index,
                len = response.len,
                "mismatched read response"
            );
            return Err(PeerError::Desync);
        }
        out.copy_from_slice(&response.data[..size]);
        Ok(())
    }

    /// Read a scalar from the remote variable at `index`.
    pub fn read_value<V: Scalar>(&mut self, index: u8) -> Result<V> {
        let mut buf = [0u8; MAX_PAYLOAD];
        self.read(index, &mut buf[..V::SIZE])?;
        Ok(V::from_le(&buf[..V::SIZE]))
    }

    /// Fire-and-forget: store `data` (1..=8 bytes) into the remote variable
    /// at `index`. Delivery is not acknowledged; only argument errors are
    /// reported.
    pub fn write(&mut self, index: u8, data: &[u8]) -> Result<()> {
        let frame = encode_frame(FrameKind::WriteRequest, index, data)?;
        self.transmit(frame.as_bytes());
        Ok(())
    }

    /// Fire-and-forget scalar write.
    pub fn write_value<V: Scalar>(&mut self, index: u8, value: V) -> Result<()> {
        let mut buf = [0u8; MAX_PAYLOAD];
        value.to_le(&mut buf[..V::SIZE]);
        self.write(index, &buf[..V::SIZE])
    }

    /// Fire-and-forget: invoke the remote function at `index` with `args`
    /// (1..=8 bytes).
    pub fn invoke(&mut self, index: u8, args: &[u8]) -> Result<()> {
        let frame = encode_frame(FrameKind::ExecuteRequest, index, args)?;
        self.transmit(frame.as_bytes());
        Ok(())
    }

    /// Invoke the remote function at `index` with no meaningful arguments.
    ///
    /// The wire format has no zero-payload frames, so a single filler byte
    /// is transmitted.
    pub fn invoke_bare(&mut self, index: u8) -> Result<()> {
        self.invoke(index, &[0])
    }

    fn answer_read(&mut self, index: u8, size: u8) {
        let size = size as usize;
        let mut buf = [0u8; MAX_PAYLOAD];
        match self.vars.get(index) {
            Some(var) if size <= var.size() => {
                var.read(&mut buf[..size]);
            }
            Some(var) => {
                debug!(index, size, linked = var.size(), "read request exceeds linked size, ignored");
                return;
            }
            None => {
                debug!(index, "read request for unlinked index, ignored");
                return;
            }
        }
        if let Ok(frame) = encode_frame(FrameKind::ReadResponse, index, &buf[..size]) {
            self.transmit(frame.as_bytes());
        }
    }

    fn apply_write(&mut self, index: u8, data: &[u8]) {
        match self.vars.get(index) {
            // The cell's lock is the critical section here: the other
            // context can never observe a half-written value.
            Some(var) if data.len() <= var.size() => {
                var.write(data);
            }
            Some(var) => {
                debug!(index, len = data.len(), linked = var.size(), "write request exceeds linked size, ignored");
            }
            None => {
                debug!(index, "write request for unlinked index, ignored");
            }
        }
    }

    fn dispatch_execute(&mut self, index: u8, args: &[u8]) {
        match self.funcs.get_mut(index) {
            Some(callback) => callback(args),
            None => debug!(index, "execute request for unlinked function, ignored"),
        }
    }

    /// Wait (bounded by the timeout) for outbound space of at least
    /// [`TX_HEADROOM_MARGIN`]. Skipped entirely when the transmit guard is
    /// disabled.
    fn wait_tx_headroom(&mut self) -> bool {
        if !self.transmit_guard {
            return true;
        }
        if self.transport.tx_headroom() >= TX_HEADROOM_MARGIN {
            return true;
        }
        let start = self.transport.now_millis();
        loop {
            if self.transport.tx_headroom() >= TX_HEADROOM_MARGIN {
                return true;
            }
            if self.transport.now_millis().saturating_sub(start) >= self.timeout_ms {
                return false;
            }
        }
    }

    /// Best-effort transmission of a prepared frame under the guard.
    fn transmit(&mut self, raw: &[u8]) -> bool {
        if !self.wait_tx_headroom() {
            debug!("no transmit headroom within timeout, frame dropped");
            return false;
        }
        let mut link = CriticalSection::enter(&mut self.transport, self.transmit_guard);
        link.write_bytes(raw);
        true
    }
}

fn clamp_timeout(timeout: Duration) -> u64 {
    timeout.max(MIN_TIMEOUT).as_millis() as u64
}
