/// Errors an [`crate::surface::ImageEncoder`] implementation may report.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encoder rejected image: {0}")]
    Rejected(String),
    #[error("i/o error while encoding: {0}")]
    Io(String),
}

/// Errors surfaced by [`crate::display::Display`] pool allocation.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("layer/buffer index {0} is not allocated")]
    UnknownIndex(i32),
}
