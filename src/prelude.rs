//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use compute_domain_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::manager::{DerivedObjectManager, DerivedTemplate, LifecycleState, ManagerConfig, Owner};

pub use crate::device_class::{DeviceClassManager, DeviceClassTemplate};

pub use crate::source::{KubeWatchSource, LabelFilter, WatchSource};
pub use crate::store::{KubeObjectStore, ObjectStore};

pub use crate::controller::reconciler::{reconcile, Context, ReconcilerError};

pub use crate::config::ControllerConfig;

pub use crate::error::{Error, Result, StoreError};
