//! # Reconciler
//!
//! ComputeDomain reconciliation. Each ComputeDomain owns exactly one
//! DeviceClass through the [`DeviceClassManager`]; the ComputeDomain itself
//! carries a finalizer so the DeviceClass is torn down before the domain
//! disappears.
//!
//! Teardown spans several reconciles: request deletion, wait for the
//! DeviceClass watch to show the deletion timestamp, release the
//! DeviceClass finalizer, wait for it to vanish from the index, and only
//! then let the ComputeDomain finalizer go.

use crate::config::ControllerConfig;
use crate::constants::COMPUTE_DOMAIN_FINALIZER;
use crate::controller::backoff::BackoffStates;
use crate::crd::ComputeDomain;
use crate::device_class::DeviceClassManager;
use crate::error::Error as ManagerError;
use crate::manager::Owner;
use crate::observability::metrics;
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{self as kube_finalizer, finalizer, Event as FinalizerEvent};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("DeviceClass manager failed: {0}")]
    Manager(#[from] ManagerError),

    /// DeviceClass for the owner still exists; checked again after a short delay
    #[error("waiting for DeviceClass of owner {owner} to be removed")]
    CleanupPending { owner: String },

    #[error("ComputeDomain {name} is missing metadata.{field}")]
    MissingMetadata { name: String, field: &'static str },

    #[error("finalizer handling failed: {0}")]
    Finalizer(#[source] Box<kube_finalizer::Error<ReconcilerError>>),
}

impl ReconcilerError {
    /// Whether this error only signals an unfinished teardown
    #[must_use]
    pub fn is_cleanup_pending(&self) -> bool {
        match self {
            ReconcilerError::CleanupPending { .. } => true,
            ReconcilerError::Finalizer(err) => matches!(
                err.as_ref(),
                kube_finalizer::Error::CleanupFailed(ReconcilerError::CleanupPending { .. })
            ),
            _ => false,
        }
    }
}

/// Shared state handed to every reconcile
pub struct Context {
    pub client: Client,
    pub manager: Arc<DeviceClassManager>,
    pub config: ControllerConfig,
    /// Per-ComputeDomain error backoff, keyed by `namespace/name`
    backoffs: BackoffStates,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(client: Client, manager: Arc<DeviceClassManager>, config: ControllerConfig) -> Self {
        Self {
            client,
            manager,
            backoffs: BackoffStates::new(config.backoff_min_secs, config.backoff_max_secs),
            config,
        }
    }
}

fn resource_key(cd: &ComputeDomain) -> String {
    format!(
        "{}/{}",
        cd.namespace().unwrap_or_default(),
        cd.name_any()
    )
}

/// Owner identity of a ComputeDomain: its UID plus a name-derived prefix
pub fn owner_of(cd: &ComputeDomain) -> Result<Owner, ReconcilerError> {
    let name = cd.name_any();
    let uid = cd.uid().ok_or_else(|| ReconcilerError::MissingMetadata {
        name: name.clone(),
        field: "uid",
    })?;
    Ok(Owner::new(uid, format!("{name}-")))
}

pub async fn reconcile(cd: Arc<ComputeDomain>, ctx: Arc<Context>) -> Result<Action, ReconcilerError> {
    let name = cd.name_any();
    let namespace = cd
        .namespace()
        .ok_or_else(|| ReconcilerError::MissingMetadata {
            name: name.clone(),
            field: "namespace",
        })?;
    let span = info_span!("reconcile", resource.name = %name, resource.namespace = %namespace);

    async move {
        let started = Instant::now();
        metrics::increment_reconciliations();

        let api: Api<ComputeDomain> = Api::namespaced(ctx.client.clone(), &namespace);
        let key = resource_key(&cd);
        let (manager, config) = (ctx.manager.as_ref(), &ctx.config);
        let result = finalizer(&api, COMPUTE_DOMAIN_FINALIZER, cd, |event| async move {
            match event {
                FinalizerEvent::Apply(cd) => apply(&cd, manager, config).await,
                FinalizerEvent::Cleanup(cd) => cleanup(&cd, manager).await,
            }
        })
        .await
        .map_err(|e| ReconcilerError::Finalizer(Box::new(e)));

        metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());
        if result.is_ok() {
            ctx.backoffs.reset(&key);
        }
        result
    }
    .instrument(span)
    .await
}

/// Ensure the DeviceClass exists, then schedule the periodic resync.
pub async fn apply(
    cd: &ComputeDomain,
    manager: &DeviceClassManager,
    config: &ControllerConfig,
) -> Result<Action, ReconcilerError> {
    let owner = owner_of(cd)?;
    let device_class = manager
        .create(&owner, cd.spec.device_class_name.as_deref())
        .await?;
    debug!(
        device_class = %device_class.name_any(),
        num_nodes = cd.spec.num_nodes,
        "ComputeDomain reconciled"
    );
    metrics::increment_requeues_total("periodic");
    Ok(Action::requeue(config.reconcile_interval()))
}

/// Drive DeviceClass teardown one step.
///
/// Returns `Ok` only once the index no longer holds a DeviceClass for the
/// owner, which releases the ComputeDomain finalizer.
pub async fn cleanup(cd: &ComputeDomain, manager: &DeviceClassManager) -> Result<Action, ReconcilerError> {
    let owner = owner_of(cd)?;
    manager.delete(&owner.uid).await?;

    let remaining = manager.lookup(&owner.uid);
    let Some(device_class) = remaining.first() else {
        info!(owner = %owner.uid, "DeviceClass removed, releasing ComputeDomain");
        return Ok(Action::await_change());
    };

    if device_class.metadata.deletion_timestamp.is_some() {
        manager.remove_finalizer(&owner.uid).await?;
    }
    Err(ReconcilerError::CleanupPending { owner: owner.uid })
}

pub fn error_policy(cd: Arc<ComputeDomain>, error: &ReconcilerError, ctx: Arc<Context>) -> Action {
    if error.is_cleanup_pending() {
        debug!(resource = %resource_key(&cd), "DeviceClass teardown in progress");
        metrics::increment_requeues_total("cleanup-pending");
        return Action::requeue(ctx.config.cleanup_requeue());
    }

    let key = resource_key(&cd);
    error!(resource = %key, error = %error, "reconciliation failed");
    metrics::increment_reconciliation_errors();

    let delay = ctx.backoffs.next_backoff(&key);
    let next_retry = chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| chrono::Utc::now().checked_add_signed(d))
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    info!(
        resource = %key,
        backoff_secs = delay.as_secs(),
        next_retry = %next_retry,
        "retrying with Fibonacci backoff"
    );
    metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Run the ComputeDomain controller until a termination signal arrives.
pub async fn run_controller(ctx: Arc<Context>) {
    let api: Api<ComputeDomain> = match &ctx.config.watch_namespace {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    };

    info!("starting ComputeDomain controller");
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(object = %obj, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile loop error"),
            }
        })
        .await;
    info!("ComputeDomain controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ComputeDomainSpec;
    use kube::api::ObjectMeta;

    fn compute_domain(uid: Option<&str>) -> ComputeDomain {
        ComputeDomain {
            metadata: ObjectMeta {
                name: Some("training".to_string()),
                namespace: Some("default".to_string()),
                uid: uid.map(str::to_string),
                ..Default::default()
            },
            spec: ComputeDomainSpec {
                num_nodes: 2,
                device_class_name: None,
            },
        }
    }

    #[test]
    fn test_owner_of_uses_uid_and_name_prefix() {
        let owner = owner_of(&compute_domain(Some("uid-1"))).expect("owner");
        assert_eq!(owner, Owner::new("uid-1", "training-"));
    }

    #[test]
    fn test_owner_of_requires_uid() {
        let err = owner_of(&compute_domain(None)).unwrap_err();
        assert!(matches!(
            err,
            ReconcilerError::MissingMetadata { field: "uid", .. }
        ));
    }

    #[test]
    fn test_cleanup_pending_is_detected_through_finalizer_wrapper() {
        let pending = ReconcilerError::CleanupPending {
            owner: "uid-1".to_string(),
        };
        assert!(pending.is_cleanup_pending());

        let wrapped = ReconcilerError::Finalizer(Box::new(kube_finalizer::Error::CleanupFailed(
            ReconcilerError::CleanupPending {
                owner: "uid-1".to_string(),
            },
        )));
        assert!(wrapped.is_cleanup_pending());

        let other = ReconcilerError::Manager(ManagerError::SyncTimeout);
        assert!(!other.is_cleanup_pending());
    }
}
