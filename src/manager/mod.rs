//! # Derived Object Manager
//!
//! Maintains exactly one derived object per owner. Reads go through the
//! [`OwnerIndex`], which a background watch pump keeps in sync with the
//! cluster; writes go straight to the [`ObjectStore`] and are observed back
//! only when the watch delivers them.
//!
//! Deletion is two-phase. [`delete`](DerivedObjectManager::delete) asks the
//! store to delete, which only sets `deletionTimestamp` because the
//! cooperative finalizer is present; [`remove_finalizer`](DerivedObjectManager::remove_finalizer)
//! then releases the finalizer and the store purges the object.
//!
//! The manager performs no retries and no per-owner locking. Callers
//! serialize work per owner and retry by calling again; every operation is
//! safe to repeat.

mod lifecycle;
mod reconcile;

pub use lifecycle::LifecycleState;

use crate::config::ControllerConfig;
use crate::index::OwnerIndex;
use crate::source::{LabelFilter, WatchSource};
use crate::store::ObjectStore;
use kube::Resource;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

/// Identity of the object a derived object is created for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    /// Opaque unique identifier, stored as the owner label value
    pub uid: String,
    /// `generateName` prefix used when no literal name is requested
    pub name_prefix: String,
}

impl Owner {
    pub fn new(uid: impl Into<String>, name_prefix: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name_prefix: name_prefix.into(),
        }
    }
}

/// Builds the caller-specific part of a derived object.
///
/// The manager stamps name, owner label and finalizer on top of whatever
/// the template returns.
pub trait DerivedTemplate<K>: Send + Sync {
    fn build(&self, owner: &Owner) -> K;
}

impl<K, F> DerivedTemplate<K> for F
where
    F: Fn(&Owner) -> K + Send + Sync,
{
    fn build(&self, owner: &Owner) -> K {
        self(owner)
    }
}

/// Settings for a [`DerivedObjectManager`]
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Label key whose value is the owner UID
    pub owner_label_key: String,
    /// Cooperative finalizer token placed on every derived object
    pub finalizer: String,
    /// Upper bound on the wait for the first full snapshot during `start`
    pub initial_sync_timeout: Duration,
}

impl From<&ControllerConfig> for ManagerConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            owner_label_key: config.owner_label_key.clone(),
            finalizer: config.device_class_finalizer.clone(),
            initial_sync_timeout: config.initial_sync_timeout(),
        }
    }
}

/// Reconciler and lifecycle for one kind of derived object
pub struct DerivedObjectManager<K> {
    config: ManagerConfig,
    filter: LabelFilter,
    index: Arc<OwnerIndex<K>>,
    source: Arc<dyn WatchSource<K>>,
    store: Arc<dyn ObjectStore<K>>,
    template: Arc<dyn DerivedTemplate<K>>,
    state: watch::Sender<LifecycleState>,
    pump: AsyncMutex<lifecycle::PumpHandle>,
    /// Cancelled by `stop`; reachable without the `pump` lock
    stopping: CancellationToken,
    /// Cancelled once the watch pump has returned
    pump_exited: CancellationToken,
}

impl<K> fmt::Debug for DerivedObjectManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedObjectManager")
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<K> DerivedObjectManager<K>
where
    K: Resource + Clone + fmt::Debug + Send + Sync + 'static,
{
    pub fn new(
        config: ManagerConfig,
        source: Arc<dyn WatchSource<K>>,
        store: Arc<dyn ObjectStore<K>>,
        template: Arc<dyn DerivedTemplate<K>>,
    ) -> Self {
        let filter = LabelFilter::Exists(config.owner_label_key.clone());
        let index = Arc::new(OwnerIndex::new(config.owner_label_key.clone()));
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            config,
            filter,
            index,
            source,
            store,
            template,
            state,
            pump: AsyncMutex::new(lifecycle::PumpHandle::default()),
            stopping: CancellationToken::new(),
            pump_exited: CancellationToken::new(),
        }
    }

    /// The read cache backing every lookup
    pub fn index(&self) -> &Arc<OwnerIndex<K>> {
        &self.index
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl<K> Drop for DerivedObjectManager<K> {
    fn drop(&mut self) {
        self.stopping.cancel();
        if let Some(cancel) = self.pump.get_mut().cancel.take() {
            cancel.cancel();
        }
    }
}
