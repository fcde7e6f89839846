//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// DRA driver name embedded in the DeviceClass CEL selectors
    pub driver_name: String,
    /// Label key that binds a DeviceClass to its ComputeDomain UID
    pub owner_label_key: String,
    /// Cooperative finalizer placed on every DeviceClass the controller creates
    pub device_class_finalizer: String,
    /// Upper bound on the initial DeviceClass cache sync (seconds)
    pub initial_sync_timeout_secs: u64,
    /// Requeue interval after a successful reconciliation (seconds)
    pub reconcile_interval_secs: u64,
    /// Requeue interval while a DeviceClass is still being torn down (seconds)
    pub cleanup_requeue_secs: u64,
    /// Fibonacci backoff floor for failed reconciliations (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling for failed reconciliations (seconds)
    pub backoff_max_secs: u64,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Restrict the ComputeDomain watch to one namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            driver_name: DEFAULT_DRIVER_NAME.to_string(),
            owner_label_key: DEFAULT_OWNER_LABEL_KEY.to_string(),
            device_class_finalizer: DEFAULT_DEVICE_CLASS_FINALIZER.to_string(),
            initial_sync_timeout_secs: DEFAULT_INITIAL_SYNC_TIMEOUT_SECS,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            cleanup_requeue_secs: DEFAULT_CLEANUP_REQUEUE_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: LogFormat::Json,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            driver_name: lookup("DRIVER_NAME").unwrap_or(defaults.driver_name),
            owner_label_key: lookup("OWNER_LABEL_KEY").unwrap_or(defaults.owner_label_key),
            device_class_finalizer: lookup("DEVICE_CLASS_FINALIZER")
                .unwrap_or(defaults.device_class_finalizer),
            initial_sync_timeout_secs: parsed(
                "INITIAL_SYNC_TIMEOUT_SECS",
                defaults.initial_sync_timeout_secs,
            ),
            reconcile_interval_secs: parsed(
                "RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            ),
            cleanup_requeue_secs: parsed("CLEANUP_REQUEUE_SECS", defaults.cleanup_requeue_secs),
            backoff_min_secs: parsed("BACKOFF_MIN_SECS", defaults.backoff_min_secs),
            backoff_max_secs: parsed("BACKOFF_MAX_SECS", defaults.backoff_max_secs),
            metrics_port: lookup("METRICS_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.metrics_port),
            log_format: lookup("LOG_FORMAT").map_or(defaults.log_format, |v| LogFormat::parse(&v)),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
        }
    }

    /// Get initial sync timeout duration
    pub fn initial_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.initial_sync_timeout_secs)
    }

    /// Get reconcile interval duration
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Get cleanup requeue duration
    pub fn cleanup_requeue(&self) -> Duration {
        Duration::from_secs(self.cleanup_requeue_secs)
    }
}
