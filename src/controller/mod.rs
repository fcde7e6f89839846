//! # Controller
//!
//! ComputeDomain controller modules.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `reconciler`: ComputeDomain reconciliation and error policy

pub mod backoff;
pub mod reconciler;
