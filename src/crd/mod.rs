//! # Custom Resource Definitions
//!
//! CRD types owned by this controller.
//!
//! - `spec.rs` - `ComputeDomain` specification

mod spec;

pub use spec::{ComputeDomain, ComputeDomainSpec};
