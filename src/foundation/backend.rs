use std::{fmt, sync::Arc};

use crate::foundation::error::{CustomizerError, CustomizerResult};

/// A collaborator handle built once at startup.
///
/// Failed initialization is recorded as [`Backend::Degraded`] and reported on every use;
/// the handle is never re-initialized.
pub enum Backend<T: ?Sized> {
    Ready(Arc<T>),
    Degraded { name: String, reason: String },
}

impl<T: ?Sized> Backend<T> {
    pub fn ready(inner: Arc<T>) -> Self {
        Self::Ready(inner)
    }

    pub fn degraded(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Degraded {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Build from an initialization result, degrading on error.
    pub fn from_init<E: fmt::Display>(name: &str, init: Result<Arc<T>, E>) -> Self {
        match init {
            Ok(inner) => Self::Ready(inner),
            Err(e) => {
                tracing::warn!(backend = name, error = %e, "backend initialization failed");
                Self::degraded(name, e.to_string())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn get(&self) -> CustomizerResult<&Arc<T>> {
        match self {
            Self::Ready(inner) => Ok(inner),
            Self::Degraded { name, reason } => Err(CustomizerError::backend_unavailable(format!(
                "{name} is not configured: {reason}"
            ))),
        }
    }
}

impl<T: ?Sized> Clone for Backend<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Ready(inner) => Self::Ready(Arc::clone(inner)),
            Self::Degraded { name, reason } => Self::Degraded {
                name: name.clone(),
                reason: reason.clone(),
            },
        }
    }
}

impl<T: ?Sized> fmt::Debug for Backend<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(inner) => f
                .debug_tuple("Ready")
                .field(&Arc::as_ptr(inner).cast::<()>())
                .finish(),
            Self::Degraded { name, reason } => f
                .debug_struct("Degraded")
                .field("name", name)
                .field("reason", reason)
                .finish(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/backend.rs"]
mod tests;
