//! Protocol engine for bitlink: expose in-memory variables and callable
//! functions to the peer on the other end of a raw byte link.
//!
//! A [`Peer`] owns a [`Transport`](bitlink_transport::Transport) and two
//! fixed-capacity tables populated at setup: variables
//! ([`LinkedVar`]) and functions. Driving [`Peer::poll`] from the host's
//! loop serves inbound requests; [`Peer::read`], [`Peer::write`], and
//! [`Peer::invoke`] act on the remote side's tables.
//!
//! The engine never spawns tasks, never blocks outside the explicit
//! timeout-bounded waits in `read`, and allocates nothing after
//! construction.

pub mod error;
pub mod peer;
pub mod var;

mod guard;
mod table;

pub use bitlink_frame::MAX_PAYLOAD;
pub use error::{PeerError, Result};
pub use peer::{Peer, PeerConfig, DEFAULT_TIMEOUT, MIN_TIMEOUT};
pub use var::{LinkedVar, Scalar, TypeTag};
