//! Infrastructure Layer
//!
//! Cross-cutting concerns shared by the resolution pipeline.

pub mod admission;
pub mod retry;

pub use admission::AdmissionGate;
pub use retry::{BackoffKind, RetryPolicy};
