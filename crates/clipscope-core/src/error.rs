//! Error types for Clipscope

/// Result type alias using Clipscope's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Clipscope operations
///
/// The first four variants carry a message meant to be shown to the operator
/// as-is, so their `Display` output is the bare message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing input (no image, empty selection, bad length, bad enum value)
    #[error("{0}")]
    Validation(String),

    /// No checkpoint file matches a dataset/method combination
    #[error("{0}")]
    NotFound(String),

    /// Checkpoint file unreadable or undeserializable
    #[error("{0}")]
    Load(String),

    /// Failure during the scoring pass
    #[error("{0}")]
    Prediction(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], used for metrics labels and HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Load,
    Prediction,
    Config,
    Internal,
}

impl ErrorKind {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Load => "load",
            Self::Prediction => "prediction",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new load error
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a new prediction error
    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Load(_) => ErrorKind::Load,
            Self::Prediction(_) => ErrorKind::Prediction,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_messages_are_bare() {
        assert_eq!(
            Error::validation("No image uploaded yet").to_string(),
            "No image uploaded yet"
        );
        assert_eq!(Error::load("bad file").to_string(), "bad file");
        assert_eq!(
            Error::config("missing registry").to_string(),
            "configuration error: missing registry"
        );
    }

    #[test]
    fn test_kind() {
        assert_eq!(Error::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::prediction("x").kind(), ErrorKind::Prediction);
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.kind(), ErrorKind::Internal);
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
    }
}
