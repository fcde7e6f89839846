//! # Lifecycle
//!
//! `Created -> Starting -> Running -> Stopping -> Stopped`. A failed start
//! unwinds straight to `Stopped`. A manager is started at most once.

use super::DerivedObjectManager;
use crate::error::{Error, Result};
use crate::index::OwnerIndex;
use crate::observability::metrics;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::Resource;
use kube_runtime::watcher::{self, Event};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Handles owned by a started manager
#[derive(Debug, Default)]
pub(super) struct PumpHandle {
    pub(super) cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl PumpHandle {
    /// Cancel the pump and wait for it to exit
    async fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "watch pump task failed");
            }
        }
    }
}

impl<K> DerivedObjectManager<K>
where
    K: Resource + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Start the watch pump and block until the index holds a full snapshot.
    ///
    /// The pump runs until [`stop`](Self::stop) is called or `parent` is
    /// cancelled. Fails with [`Error::SyncTimeout`] if the first snapshot
    /// does not arrive within the configured timeout, or if `parent` is
    /// cancelled, `stop` is called or the watch stream ends first; the pump
    /// is torn down before returning.
    pub async fn start(&self, parent: &CancellationToken) -> Result<()> {
        let mut pump = self.pump.lock().await;
        let current = self.state();
        if current != LifecycleState::Created {
            return Err(Error::InvalidLifecycle {
                operation: "start",
                state: current,
            });
        }
        self.state.send_replace(LifecycleState::Starting);

        info!(
            filter = %self.filter,
            label = %self.index.owner_label_key(),
            "registering owner index and starting watch pump"
        );
        let cancel = parent.child_token();
        let events = self.source.watch(&self.filter);
        let span = info_span!("watch_pump", filter = %self.filter);
        pump.task = Some(tokio::spawn(
            run_watch_pump(
                events,
                Arc::clone(&self.index),
                cancel.clone(),
                self.pump_exited.clone(),
            )
            .instrument(span),
        ));
        pump.cancel = Some(cancel.clone());

        let synced = tokio::select! {
            biased;
            () = self.stopping.cancelled() => {
                info!("stop requested while waiting for initial sync");
                Err(Error::SyncTimeout)
            }
            () = self.pump_exited.cancelled() => {
                warn!("watch pump exited before initial sync");
                Err(Error::SyncTimeout)
            }
            synced = tokio::time::timeout(
                self.config.initial_sync_timeout,
                self.index.wait_for_initial_sync(&cancel),
            ) => synced.unwrap_or(Err(Error::SyncTimeout)),
        };

        match synced {
            Ok(()) => {
                self.state.send_replace(LifecycleState::Running);
                info!(objects = self.index.len(), "owner index synced");
                Ok(())
            }
            Err(err) => {
                error!(
                    error = %err,
                    timeout_secs = self.config.initial_sync_timeout.as_secs(),
                    "owner index failed to sync"
                );
                pump.shutdown().await;
                self.state.send_replace(LifecycleState::Stopped);
                Err(err)
            }
        }
    }

    /// Cancel the watch pump and wait for it to exit. Idempotent.
    ///
    /// A `start` still waiting for its first snapshot is interrupted and
    /// unwinds on its own; `stop` then returns once it has.
    pub async fn stop(&self) {
        // Must fire before taking the lock, which a syncing start holds
        self.stopping.cancel();
        let mut pump = self.pump.lock().await;
        match self.state() {
            LifecycleState::Stopped => return,
            LifecycleState::Created => {
                self.state.send_replace(LifecycleState::Stopped);
                return;
            }
            _ => {}
        }

        self.state.send_replace(LifecycleState::Stopping);
        info!("stopping derived object manager");
        pump.shutdown().await;
        self.state.send_replace(LifecycleState::Stopped);
        info!("derived object manager stopped");
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Running with a synced index and a live watch pump
    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Running
            && self.index.is_synced()
            && !self.pump_exited.is_cancelled()
    }
}

/// Feed watch events into the index until cancelled or the stream ends.
///
/// `exited` is cancelled when the pump returns, however it returns.
async fn run_watch_pump<K>(
    mut events: BoxStream<'static, watcher::Result<Event<K>>>,
    index: Arc<OwnerIndex<K>>,
    cancel: CancellationToken,
    exited: CancellationToken,
) where
    K: Resource + Send + Sync,
{
    let _exited = exited.drop_guard();
    debug!("watch pump started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = events.next() => match next {
                Some(Ok(event)) => {
                    index.apply(event);
                }
                Some(Err(e)) => {
                    metrics::increment_watch_errors();
                    warn!(error = %e, "watch stream error, waiting for backoff");
                }
                None => {
                    warn!("watch stream ended, owner index no longer updates");
                    break;
                }
            },
        }
    }
    debug!("watch pump exited");
}
