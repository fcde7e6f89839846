//! # Reconcile Operations
//!
//! `create`, `delete` and `remove_finalizer`. Each consults the owner index
//! first and enforces the at-most-one-per-owner invariant before touching
//! the store. None of them mutate the index.

use super::{DerivedObjectManager, Owner};
use crate::error::{Error, Result};
use crate::observability::metrics;
use kube::{Resource, ResourceExt};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

impl<K> DerivedObjectManager<K>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
{
    /// Snapshot of the derived objects the index holds for `owner_uid`
    pub fn lookup(&self, owner_uid: &str) -> Vec<Arc<K>> {
        self.index.lookup(owner_uid)
    }

    /// Ensure a derived object exists for `owner`.
    ///
    /// Returns the cached object when one is already indexed. Otherwise
    /// submits a new object named `name` (or generated from the owner's
    /// prefix when `name` is empty) and returns what the store created.
    #[instrument(skip(self, owner), fields(owner = %owner.uid))]
    pub async fn create(&self, owner: &Owner, name: Option<&str>) -> Result<K> {
        let result = self.create_inner(owner, name).await;
        if let Err(err) = &result {
            metrics::record_manager_operation("create", err.kind());
        }
        result
    }

    async fn create_inner(&self, owner: &Owner, name: Option<&str>) -> Result<K> {
        if let Some(existing) = self.lookup_unique(&owner.uid, "create")? {
            debug!(object = %existing.name_any(), "derived object already exists");
            metrics::record_manager_operation("create", "exists");
            return Ok(K::clone(&existing));
        }

        let obj = self.build(owner, name);
        let created = self.store.create(&obj).await?;
        info!(object = %created.name_any(), "created derived object");
        metrics::record_manager_operation("create", "created");
        Ok(created)
    }

    /// Request deletion of the owner's derived object.
    ///
    /// Absent objects and objects already marked for deletion are left alone.
    #[instrument(skip(self))]
    pub async fn delete(&self, owner_uid: &str) -> Result<()> {
        let result = self.delete_inner(owner_uid).await;
        if let Err(err) = &result {
            metrics::record_manager_operation("delete", err.kind());
        }
        result
    }

    async fn delete_inner(&self, owner_uid: &str) -> Result<()> {
        let Some(existing) = self.lookup_unique(owner_uid, "delete")? else {
            debug!("no derived object to delete");
            metrics::record_manager_operation("delete", "absent");
            return Ok(());
        };

        let name = existing.name_any();
        if existing.meta().deletion_timestamp.is_some() {
            debug!(object = %name, "deletion already in progress");
            metrics::record_manager_operation("delete", "pending");
            return Ok(());
        }

        match self.store.delete(&name).await {
            Ok(()) => {
                info!(object = %name, "requested deletion of derived object");
                metrics::record_manager_operation("delete", "requested");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(object = %name, "derived object already gone");
                metrics::record_manager_operation("delete", "absent");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Release the cooperative finalizer from the owner's derived object.
    ///
    /// Fails with [`Error::PrematureFinalizerRemoval`] unless the object is
    /// already marked for deletion.
    #[instrument(skip(self))]
    pub async fn remove_finalizer(&self, owner_uid: &str) -> Result<()> {
        let result = self.remove_finalizer_inner(owner_uid).await;
        if let Err(err) = &result {
            metrics::record_manager_operation("remove_finalizer", err.kind());
        }
        result
    }

    async fn remove_finalizer_inner(&self, owner_uid: &str) -> Result<()> {
        let Some(existing) = self.lookup_unique(owner_uid, "remove_finalizer")? else {
            metrics::record_manager_operation("remove_finalizer", "absent");
            return Ok(());
        };

        let name = existing.name_any();
        if existing.meta().deletion_timestamp.is_none() {
            warn!(object = %name, "finalizer removal requested before deletion");
            return Err(Error::PrematureFinalizerRemoval { name });
        }

        let remaining: Vec<String> = existing
            .finalizers()
            .iter()
            .filter(|f| **f != self.config.finalizer)
            .cloned()
            .collect();
        if remaining.len() == existing.finalizers().len() {
            debug!(object = %name, "finalizer already released");
            metrics::record_manager_operation("remove_finalizer", "absent");
            return Ok(());
        }

        let mut updated = K::clone(&existing);
        updated.meta_mut().finalizers = Some(remaining);
        match self.store.update(&updated).await {
            Ok(_) => {
                info!(object = %name, "released finalizer from derived object");
                metrics::record_manager_operation("remove_finalizer", "released");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(object = %name, "derived object purged before finalizer update");
                metrics::record_manager_operation("remove_finalizer", "absent");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The single indexed object for `owner_uid`, if any.
    fn lookup_unique(&self, owner_uid: &str, operation: &'static str) -> Result<Option<Arc<K>>> {
        let mut matches = self.index.lookup(owner_uid);
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            count => {
                let names: Vec<String> = matches.iter().map(|o| o.name_any()).collect();
                error!(
                    owner = owner_uid,
                    operation,
                    count,
                    objects = ?names,
                    "more than one derived object bound to owner"
                );
                metrics::increment_invariant_violations();
                Err(Error::InvariantViolation {
                    owner: owner_uid.to_string(),
                    count,
                })
            }
        }
    }

    fn build(&self, owner: &Owner, name: Option<&str>) -> K {
        let mut obj = self.template.build(owner);
        obj.labels_mut()
            .insert(self.config.owner_label_key.clone(), owner.uid.clone());

        let finalizers = obj.finalizers_mut();
        if !finalizers.contains(&self.config.finalizer) {
            finalizers.push(self.config.finalizer.clone());
        }

        let meta = obj.meta_mut();
        match name.filter(|n| !n.is_empty()) {
            Some(name) => {
                meta.name = Some(name.to_string());
                meta.generate_name = None;
            }
            None => {
                meta.name = None;
                meta.generate_name = Some(owner.name_prefix.clone());
            }
        }
        obj
    }
}
