use bitlink_frame::FrameError;

/// Errors reported by the protocol engine.
///
/// Argument and link errors are detected synchronously with no I/O.
/// `Timeout` and `Desync` can only come out of [`read`](crate::Peer::read);
/// `write` and `invoke` are fire-and-forget and never report delivery
/// failures.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// A transfer size outside 1..=8 bytes.
    #[error("transfer size {size} out of range 1..=8")]
    InvalidSize { size: usize },

    /// A linked-variable size outside 1..=255 bytes.
    #[error("linked variable size {size} out of range 1..=255")]
    VariableSize { size: usize },

    /// A link index at or past the table capacity chosen at construction.
    #[error("index {index} out of table range (capacity {capacity})")]
    IndexOutOfRange { index: u8, capacity: u8 },

    /// No transmit headroom or no matching response within the configured
    /// timeout.
    #[error("timed out waiting for the peer")]
    Timeout,

    /// A response arrived but its index or length does not match the
    /// outstanding request — the link is desynchronized or shared with a
    /// foreign exchange.
    #[error("response does not match the outstanding request")]
    Desync,
}

impl From<FrameError> for PeerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::SizeOutOfRange { size } => PeerError::InvalidSize { size },
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
