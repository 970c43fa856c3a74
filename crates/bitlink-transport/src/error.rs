use std::path::PathBuf;

/// Errors that can occur while constructing a transport adapter.
///
/// The [`Transport`](crate::Transport) trait itself is infallible: once a
/// link is up, the engine treats it like a serial peripheral. Adapters
/// report runtime I/O problems through `tracing` instead of the call chain.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred while setting up the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
