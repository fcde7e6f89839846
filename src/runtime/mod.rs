//! # Runtime
//!
//! Process wiring shared by the controller binary.
//!
//! - `initialization`: crypto provider, tracing, metrics, HTTP server, client and manager setup

pub mod initialization;
