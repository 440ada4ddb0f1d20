pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Image error: {0}")]
    Image(#[from] ::image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::RuntimeError(msg.into())
    }
}
