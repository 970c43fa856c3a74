/// Errors that can occur during frame encoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A payload or requested transfer size outside 1..=8.
    #[error("transfer size {size} out of range 1..=8")]
    SizeOutOfRange { size: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
