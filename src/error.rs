//! # Errors
//!
//! Error types surfaced by the derived-object manager and its remote store.

use crate::manager::LifecycleState;
use thiserror::Error;

/// Result alias for manager operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure reported by an [`ObjectStore`](crate::store::ObjectStore).
///
/// `NotFound` is kept distinct so callers can treat absence as success
/// where deletion is the desired outcome.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {name} not found")]
    NotFound { name: String },

    #[error("object {name} already exists")]
    AlreadyExists { name: String },

    #[error("conflicting write to object {name}")]
    Conflict { name: String },

    #[error("object has neither a name nor a generateName")]
    MissingName,

    #[error("Kubernetes API request failed: {0}")]
    Api(#[source] kube::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Classify a kube client error for the object `name`.
    pub fn from_kube(err: kube::Error, name: &str) -> Self {
        match err {
            kube::Error::Api(ref api_err) if api_err.code == 404 => StoreError::NotFound {
                name: name.to_string(),
            },
            kube::Error::Api(ref api_err) if api_err.code == 409 => {
                if api_err.reason == "AlreadyExists" {
                    StoreError::AlreadyExists {
                        name: name.to_string(),
                    }
                } else {
                    StoreError::Conflict {
                        name: name.to_string(),
                    }
                }
            }
            other => StoreError::Api(other),
        }
    }
}

/// Errors returned by [`DerivedObjectManager`](crate::manager::DerivedObjectManager)
#[derive(Debug, Error)]
pub enum Error {
    /// More than one derived object carries the same owner label.
    /// Indicates external interference; never retried automatically.
    #[error("found {count} derived objects bound to owner {owner}, expected at most one")]
    InvariantViolation { owner: String, count: usize },

    /// The finalizer was asked to be released before deletion was requested.
    #[error("refusing to remove finalizer from {name} before it is marked for deletion")]
    PrematureFinalizerRemoval { name: String },

    #[error("initial cache sync did not complete before cancellation")]
    SyncTimeout,

    #[error("remote store request failed: {0}")]
    RemoteStore(#[from] StoreError),

    #[error("cannot {operation} manager in state {state}")]
    InvalidLifecycle {
        operation: &'static str,
        state: LifecycleState,
    },
}

impl Error {
    /// Short label used for metrics and log fields
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvariantViolation { .. } => "invariant_violation",
            Error::PrematureFinalizerRemoval { .. } => "premature_finalizer_removal",
            Error::SyncTimeout => "sync_timeout",
            Error::RemoteStore(_) => "remote_store",
            Error::InvalidLifecycle { .. } => "invalid_lifecycle",
        }
    }
}
