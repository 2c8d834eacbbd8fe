//! Common types for Tortoise: CRDs, errors, retry, and observability

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Annotation marking a resource as created (and therefore deletable) by Tortoise
pub const MANAGED_BY_TORTOISE_ANNOTATION: &str =
    "tortoise.autoscaling.mercari.com/managed-by-tortoise";

/// Annotation recording the name of the Tortoise that owns a resource
pub const TORTOISE_NAME_ANNOTATION: &str = "tortoise.autoscaling.mercari.com/tortoise-name";

/// Default controller name used as the event reporter
pub const DEFAULT_CONTROLLER_NAME: &str = "tortoise-controller";
