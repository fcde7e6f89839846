//! # ComputeDomain Controller
//!
//! Kubernetes controller that keeps one DRA `DeviceClass` per `ComputeDomain`.
//!
//! ## Overview
//!
//! 1. **Watching DeviceClasses** - an owner-label index over every DeviceClass the controller created
//! 2. **Reconciling ComputeDomains** - creates the domain's DeviceClass, selecting its IMEX channels
//! 3. **Two-phase teardown** - deletes the DeviceClass and releases its finalizer before the
//!    ComputeDomain finalizer is removed
//!
//! Configuration comes from environment variables; see `config::ControllerConfig`.

use anyhow::{Context, Result};
use compute_domain_controller::controller::reconciler::run_controller;
use compute_domain_controller::runtime::initialization::initialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let shutdown = CancellationToken::new();
    init.manager
        .start(&shutdown)
        .await
        .context("DeviceClass cache failed to sync")?;
    init.server_state.set_ready(true);

    run_controller(init.reconciler_context()).await;

    init.server_state.set_ready(false);
    shutdown.cancel();
    init.manager.stop().await;
    info!("ComputeDomain controller exited");
    Ok(())
}
