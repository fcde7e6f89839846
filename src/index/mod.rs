//! # Owner Index
//!
//! Eventually-consistent read cache of derived objects, keyed by the owner
//! label. Objects live in an arena keyed by their own identity; a secondary
//! map from owner UID to object keys is maintained alongside it. Both maps
//! are updated under one write guard so readers never see half an event.
//!
//! The index reflects only what the watch stream has delivered. A write just
//! issued to the store is not visible here until its event arrives.

use crate::observability::metrics;
use kube::{Resource, ResourceExt};
use kube_runtime::watcher::Event;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Identity of a derived object within the index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Key for `obj`, or `None` when the object has no name yet
    pub fn from_obj<K: Resource>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        meta.name.as_ref().map(|name| ObjectKey {
            namespace: meta.namespace.clone(),
            name: name.clone(),
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

struct IndexState<K> {
    objects: HashMap<ObjectKey, Arc<K>>,
    by_owner: HashMap<String, BTreeSet<ObjectKey>>,
    /// Snapshot being assembled between `Init` and `InitDone`
    pending: Option<HashMap<ObjectKey, Arc<K>>>,
}

impl<K> Default for IndexState<K> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            by_owner: HashMap::new(),
            pending: None,
        }
    }
}

/// Secondary index from owner UID to the derived objects labelled with it
pub struct OwnerIndex<K> {
    owner_label_key: String,
    state: RwLock<IndexState<K>>,
    synced: watch::Sender<bool>,
}

impl<K> fmt::Debug for OwnerIndex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerIndex")
            .field("owner_label_key", &self.owner_label_key)
            .field("synced", &*self.synced.borrow())
            .finish_non_exhaustive()
    }
}

impl<K> OwnerIndex<K>
where
    K: Resource + Send + Sync,
{
    pub fn new(owner_label_key: impl Into<String>) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            owner_label_key: owner_label_key.into(),
            state: RwLock::new(IndexState::default()),
            synced,
        }
    }

    /// Label key whose value is indexed
    pub fn owner_label_key(&self) -> &str {
        &self.owner_label_key
    }

    /// Apply one watch event. Returns `true` if the visible index changed.
    ///
    /// Safe under at-least-once delivery: an object whose `resourceVersion`
    /// matches the cached copy is ignored.
    pub fn apply(&self, event: Event<K>) -> bool {
        let mut state = self.write_state();
        let mut snapshot_done = false;
        let changed = match event {
            Event::Init => {
                debug!("index snapshot started");
                state.pending = Some(HashMap::new());
                metrics::increment_index_events("init");
                false
            }
            Event::InitApply(obj) => {
                metrics::increment_index_events("init_apply");
                let Some(key) = ObjectKey::from_obj(&obj) else {
                    warn!("ignoring unnamed object in snapshot");
                    return false;
                };
                state
                    .pending
                    .get_or_insert_with(HashMap::new)
                    .insert(key, Arc::new(obj));
                false
            }
            Event::InitDone => {
                metrics::increment_index_events("init_done");
                let snapshot = state.pending.take().unwrap_or_default();
                self.replace_all(&mut state, snapshot);
                debug!(objects = state.objects.len(), "index snapshot applied");
                snapshot_done = true;
                true
            }
            Event::Apply(obj) => {
                metrics::increment_index_events("apply");
                self.upsert(&mut state, obj)
            }
            Event::Delete(obj) => {
                metrics::increment_index_events("delete");
                self.remove(&mut state, &obj)
            }
        };
        metrics::set_indexed_objects(state.objects.len());
        drop(state);

        if snapshot_done && !self.is_synced() {
            self.synced.send_replace(true);
        }
        changed
    }

    /// Objects currently labelled with `owner_uid`, ordered by key.
    ///
    /// The caller decides what 0, 1 or many matches mean.
    pub fn lookup(&self, owner_uid: &str) -> Vec<Arc<K>> {
        let state = self.read_state();
        state
            .by_owner
            .get(owner_uid)
            .into_iter()
            .flatten()
            .filter_map(|key| state.objects.get(key).map(Arc::clone))
            .collect()
    }

    /// Whether the first full snapshot has been applied
    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait for the first full snapshot, or fail with [`Error::SyncTimeout`]
    /// if `cancel` fires first.
    pub async fn wait_for_initial_sync(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.synced.subscribe();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::SyncTimeout),
            res = rx.wait_for(|synced| *synced) => res.map(|_| ()).map_err(|_closed| Error::SyncTimeout),
        }
    }

    pub fn len(&self) -> usize {
        self.read_state().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn owner_of(&self, obj: &K) -> Option<String> {
        obj.labels().get(&self.owner_label_key).cloned()
    }

    fn upsert(&self, state: &mut IndexState<K>, obj: K) -> bool {
        let Some(key) = ObjectKey::from_obj(&obj) else {
            warn!("ignoring unnamed object");
            return false;
        };

        if let Some(existing) = state.objects.get(&key) {
            let version = obj.resource_version();
            if version.is_some() && existing.resource_version() == version {
                trace!(object = %key, "duplicate event ignored");
                return false;
            }
            if let Some(old_owner) = self.owner_of(existing) {
                detach(state, &old_owner, &key);
            }
        }

        if let Some(owner) = self.owner_of(&obj) {
            state.by_owner.entry(owner).or_default().insert(key.clone());
        } else {
            warn!(object = %key, label = %self.owner_label_key, "object has no owner label");
        }
        state.objects.insert(key, Arc::new(obj));
        true
    }

    fn remove(&self, state: &mut IndexState<K>, obj: &K) -> bool {
        let Some(key) = ObjectKey::from_obj(obj) else {
            return false;
        };
        let Some(existing) = state.objects.remove(&key) else {
            trace!(object = %key, "delete for unknown object ignored");
            return false;
        };
        if let Some(owner) = self.owner_of(&existing) {
            detach(state, &owner, &key);
        }
        true
    }

    fn replace_all(&self, state: &mut IndexState<K>, snapshot: HashMap<ObjectKey, Arc<K>>) {
        let mut by_owner: HashMap<String, BTreeSet<ObjectKey>> = HashMap::new();
        for (key, obj) in &snapshot {
            if let Some(owner) = self.owner_of(obj) {
                by_owner.entry(owner).or_default().insert(key.clone());
            }
        }
        state.objects = snapshot;
        state.by_owner = by_owner;
    }

    fn read_state(&self) -> RwLockReadGuard<'_, IndexState<K>> {
        // A panicking writer cannot leave the maps half-updated: every
        // mutation completes before the guard is released.
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState<K>> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn detach<K>(state: &mut IndexState<K>, owner: &str, key: &ObjectKey) {
    if let Some(keys) = state.by_owner.get_mut(owner) {
        keys.remove(key);
        if keys.is_empty() {
            state.by_owner.remove(owner);
        }
    }
}
