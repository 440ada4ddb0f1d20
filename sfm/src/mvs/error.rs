/// Error type for multi-view stereo
#[derive(Debug, thiserror::Error)]
pub enum MvsError {
    /// Missing or inconsistent setup, raised before any processing starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load image '{id}': {source}")]
    Resource {
        id: String,
        #[source]
        source: cv_core::Error,
    },

    #[error("Fused disparity failed for view '{center}': {reason}")]
    Computation { center: String, reason: String },

    /// Recoverable, a candidate center without usable neighbors
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Core error: {0}")]
    Core(#[from] cv_core::Error),
}

impl MvsError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors that abort a run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InsufficientData(_))
    }
}

pub type Result<T> = std::result::Result<T, MvsError>;
