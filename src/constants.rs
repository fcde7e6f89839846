//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config`]).

/// DRA driver name the generated DeviceClass selectors match against
pub const DEFAULT_DRIVER_NAME: &str = "compute-domain.nvidia.com";

/// Label carried by every DeviceClass that belongs to a ComputeDomain.
/// The value is the owning ComputeDomain's UID.
pub const DEFAULT_OWNER_LABEL_KEY: &str = "resource.nvidia.com/computeDomain";

/// Cooperative finalizer placed on derived DeviceClasses
pub const DEFAULT_DEVICE_CLASS_FINALIZER: &str = "resource.nvidia.com/computeDomain";

/// Finalizer the controller holds on ComputeDomains until their DeviceClass is gone
pub const COMPUTE_DOMAIN_FINALIZER: &str = "resource.nvidia.com/computeDomain";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default upper bound on the initial DeviceClass cache sync (seconds)
pub const DEFAULT_INITIAL_SYNC_TIMEOUT_SECS: u64 = 60;

/// Default periodic reconcile interval for healthy ComputeDomains (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default requeue interval while a DeviceClass is still being torn down (seconds)
pub const DEFAULT_CLEANUP_REQUEUE_SECS: u64 = 2;

/// Default Fibonacci backoff floor for reconciliation errors (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci backoff ceiling for reconciliation errors (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
