/// Convenience result type used across the customizer.
pub type CustomizerResult<T> = Result<T, CustomizerError>;

/// Top-level error taxonomy used by pipeline, storage and reclaim APIs.
#[derive(thiserror::Error, Debug)]
pub enum CustomizerError {
    /// Missing or malformed caller input (session id, product id, numeric fields).
    #[error("validation error: {0}")]
    Validation(String),

    /// Shape name outside the supported set.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// No matching asset for a lookup.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store or ledger is misconfigured or unreachable.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Unexpected failure inside compositing or masking.
    #[error("image processing failed for shape '{shape}': {source}")]
    ImageProcessingFailed {
        /// Shape that was being rendered.
        shape: String,
        /// Underlying decode/resize/encode error.
        #[source]
        source: anyhow::Error,
    },

    /// An object store call failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An order ledger or record registry call failed.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// A reclaim batch completed but some folders or records could not be processed.
    #[error("reclaim finished with {failed} failure(s)")]
    PartialReclaimFailure {
        /// Number of collected per-scope failures.
        failed: usize,
    },

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CustomizerError {
    /// Build a [`CustomizerError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`CustomizerError::InvalidShape`] value.
    pub fn invalid_shape(name: impl Into<String>) -> Self {
        Self::InvalidShape(name.into())
    }

    /// Build a [`CustomizerError::NotFound`] value.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`CustomizerError::BackendUnavailable`] value.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Wrap a lower-level failure with the shape being rendered.
    pub fn image_processing(shape: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::ImageProcessingFailed {
            shape: shape.into(),
            source: source.into(),
        }
    }

    /// Build a [`CustomizerError::Storage`] value.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Build a [`CustomizerError::Ledger`] value.
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Build a [`CustomizerError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for errors caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidShape(_) | Self::NotFound(_)
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
