//! Wires configuration into live clients and serves the API.

use crate::api::{build_router, AppState, HealthStatus};
use crate::broker::TaskBroker;
use crate::config::NodeConfig;
use crate::coordinator::TaskCoordinator;
use crate::metrics::Metrics;
use agora_payment::{LocalSigner, PaymentClient, PaymentSigner};
use agora_registry::{HttpRegistryClient, RegistryClient, RegistryEndpoints};
use agora_storage::{HttpStorageClient, StorageClient};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct AgoraNode {
    config: NodeConfig,
    state: AppState,
}

impl AgoraNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.http.timeout_secs);

        let signer: Arc<dyn PaymentSigner> = match config.payment.signer_seed_hex.as_deref() {
            Some(seed) => Arc::new(
                LocalSigner::from_seed_hex(seed).context("invalid payment signer seed")?,
            ),
            None => {
                warn!("No payment signer key configured, generating an ephemeral key");
                Arc::new(LocalSigner::generate())
            }
        };
        info!(address = %signer.address(), "Payment signer ready");

        let registry: Arc<dyn RegistryClient> = Arc::new(HttpRegistryClient::new(
            RegistryEndpoints {
                gateway_url: config.registry.gateway_url.clone(),
                identity_registry: config.registry.identity_registry.clone(),
                reputation_registry: config.registry.reputation_registry.clone(),
            },
            timeout,
        )?);
        let storage: Arc<dyn StorageClient> = Arc::new(HttpStorageClient::new(
            config.storage.bridge_url.clone(),
            config.storage.gateway_url.clone(),
            timeout,
        )?);
        let payment = PaymentClient::new(timeout, config.payment.facilitator_url.clone())?;

        let broker = TaskBroker::new();
        let metrics = Metrics::new();
        let coordinator = Arc::new(TaskCoordinator::new(
            registry,
            storage,
            payment,
            signer,
            broker.clone(),
            metrics.clone(),
        ));

        let health = HealthStatus {
            registry: !config.registry.gateway_url.is_empty(),
            storage: !config.storage.bridge_url.is_empty(),
            payment: true,
        };

        Ok(Self {
            state: AppState {
                coordinator,
                broker,
                metrics,
                health,
            },
            config,
        })
    }

    pub async fn serve(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        let router = build_router(self.state, self.config.http.max_upload_bytes);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!(
            name = %self.config.node.name,
            %addr,
            "Agora node listening"
        );

        axum::serve(listener, router)
            .await
            .context("API server failed")?;
        Ok(())
    }
}
