//! Error types for Tortoise VPA management
//!
//! Errors are structured with fields to aid debugging in production.
//! Store errors carry the operation and the namespace/name they were issued
//! against, and orchestration errors wrap them with the step that failed.
//! Classification (`is_not_found`, `is_conflict`) looks through every layer
//! of wrapping so callers never need to unwrap manually.

use thiserror::Error;

/// Main error type for Tortoise operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error for a specific object
    #[error("failed to {operation} {namespace}/{name}: {source}")]
    Api {
        /// Store operation that failed (get, create, update, update status, delete)
        operation: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// A higher-level step failed
    #[error("{operation}: {source}")]
    Operation {
        /// Description of the step (e.g. "update VPA status")
        operation: String,
        /// The error that caused the step to fail
        #[source]
        source: Box<Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Wrap a store error with the operation and object it was issued against
    pub fn api(
        operation: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: kube::Error,
    ) -> Self {
        Self::Api {
            operation: operation.into(),
            namespace: namespace.into(),
            name: name.into(),
            source,
        }
    }

    /// Wrap an error with the orchestration step that failed
    pub fn operation(operation: impl Into<String>, source: Error) -> Self {
        Self::Operation {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// HTTP status code reported by the API server, if this is an API error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api {
                source: kube::Error::Api(ae),
                ..
            } => Some(ae.code),
            Error::Operation { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// The object does not exist
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// The write was rejected because the object's resourceVersion moved on
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }
}
