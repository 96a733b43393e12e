//! Error types for database provisioning.
//!
//! Opening the backing database and creating a context each fail with a
//! single dedicated kind. Everything that goes wrong inside context
//! creation is wrapped into [`CreateDatabaseError`] with the original
//! cause attached; failures from queries the caller runs afterward
//! surface as [`memdb_core::StoreError`] and are never wrapped.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// The in-memory database could not be opened. Fatal; not retried.
#[derive(Debug, Error)]
#[error("failed to open in-memory sqlite database")]
pub struct OpenDatabaseError(#[source] pub sqlx::Error);

/// A context could not be created.
///
/// This is the one failure kind the create path reports, whatever went
/// wrong underneath: model construction, the context's own constructor,
/// schema realization, the caller's after-create callback, or the
/// persist that follows it. Inspect [`CreateDatabaseError::cause`] to
/// tell those apart.
#[derive(Debug)]
pub struct CreateDatabaseError {
    source: anyhow::Error,
}

impl CreateDatabaseError {
    pub(crate) fn wrap(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            source: cause.into(),
        }
    }

    /// The original cause, downcastable to the failing component's error
    /// type (for example a constructor's own error, or
    /// [`PersistCancelled`]).
    pub fn cause(&self) -> &anyhow::Error {
        &self.source
    }
}

impl fmt::Display for CreateDatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to create in-memory database")
    }
}

// Manual impl: anyhow::Error does not implement std::error::Error itself,
// so thiserror cannot derive the source link.
impl StdError for CreateDatabaseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Marker cause used when the persist step was cancelled cooperatively.
#[derive(Debug, Clone, Copy, Error)]
#[error("database persist was cancelled")]
pub struct PersistCancelled;
