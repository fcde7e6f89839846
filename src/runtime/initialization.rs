//! # Initialization
//!
//! Controller startup: rustls provider, tracing, metrics, HTTP server,
//! Kubernetes client and the DeviceClass manager.

use crate::config::ControllerConfig;
use crate::controller::reconciler::Context as ReconcilerContext;
use crate::device_class::{DeviceClassManager, DeviceClassTemplate};
use crate::manager::ManagerConfig;
use crate::observability;
use crate::server::{start_server, ReadinessCheck, ServerState};
use crate::source::KubeWatchSource;
use crate::store::KubeObjectStore;
use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::resource::v1beta1::DeviceClass;
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{error, info};

/// Everything `main` needs to run the controller
pub struct InitializationResult {
    pub client: Client,
    pub config: ControllerConfig,
    pub manager: Arc<DeviceClassManager>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl InitializationResult {
    pub fn reconciler_context(&self) -> Arc<ReconcilerContext> {
        Arc::new(ReconcilerContext::new(
            self.client.clone(),
            Arc::clone(&self.manager),
            self.config.clone(),
        ))
    }
}

pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_provider| anyhow!("failed to install rustls crypto provider"))?;

    let config = ControllerConfig::from_env();
    observability::logging::init_tracing(config.log_format)?;

    info!("Starting ComputeDomain controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        driver = %config.driver_name,
        owner_label = %config.owner_label_key,
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, state).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let api: Api<DeviceClass> = Api::all(client.clone());
    let manager = Arc::new(DeviceClassManager::new(
        ManagerConfig::from(&config),
        Arc::new(KubeWatchSource::new(api.clone())),
        Arc::new(KubeObjectStore::new(api)),
        Arc::new(DeviceClassTemplate::new(config.driver_name.clone())),
    ));
    server_state.watch_readiness(Arc::clone(&manager) as Arc<dyn ReadinessCheck>);

    Ok(InitializationResult {
        client,
        config,
        manager,
        server_state,
    })
}
