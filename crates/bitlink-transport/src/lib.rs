//! Byte-stream transport capability for the bitlink protocol.
//!
//! The protocol engine in `bitlink-peer` is generic over the [`Transport`]
//! trait defined here. A transport is a point-to-point raw byte link plus a
//! monotonic clock and an optional critical-section hook — the full set of
//! platform capabilities the engine needs, and nothing else.
//!
//! Two adapters ship with the crate:
//! - [`Loopback`] — a connected in-memory pair with bounded outbound queues,
//!   used by tests and demos.
//! - [`StreamTransport`] — wraps any nonblocking `Read + Write` stream
//!   (Unix domain socket, TCP) behind the capability surface.

pub mod error;
pub mod loopback;
pub mod stream;
pub mod traits;

pub use error::{Result, TransportError};
pub use loopback::Loopback;
pub use stream::{connect_unix, StreamTransport};
pub use traits::Transport;
