//! ComputeDomain Controller Library
//!
//! Keeps one cluster-scoped DeviceClass per ComputeDomain. The generic
//! [`manager::DerivedObjectManager`] owns the derived-object lifecycle: an
//! owner-label index fed by a watch, idempotent create/delete, and a
//! cooperative finalizer for two-phase teardown.
//!
//! ## Quick Start
//!
//! ```rust
//! use compute_domain_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod device_class;
pub mod error;
pub mod index;
pub mod manager;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod source;
pub mod store;
