//! Controller runtime for managed service resources
//!
//! Runs one kube-rs `Controller` per kind. Watch events only identify the
//! object; the engine re-reads it when it runs.

use std::sync::Arc;

use futures::StreamExt;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{self, Controller},
        watcher,
    },
};
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::{KafkaConnect, PG};
use crate::error::{Error, Result};
use crate::remote::{AivenClient, ClientFactory, ServiceClient};

use super::dispatcher::{error_policy, reconcile, Context};
use super::engine::Engine;
use super::kind::ServiceKind;
use super::store::{KubeStore, ObjectStore, SecretStore};

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub config: OperatorConfig,
}

/// Main entry point to start the controller
///
/// Runs until interrupted.
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let config = &state.config;
    let aiven = Arc::new(AivenClient::new(
        config.api_url.clone(),
        config.api_token.clone(),
        config.request_timeout,
    )?);
    let store = Arc::new(KubeStore::new(state.client.clone()));

    info!(
        "Starting controllers with {} workers per kind (namespace: {})",
        config.workers,
        config.watch_namespace.as_deref().unwrap_or("all")
    );

    tokio::try_join!(
        run_kind::<PG>(state.clone(), store.clone(), aiven.clone()),
        run_kind::<KafkaConnect>(state.clone(), store, aiven),
    )?;

    Ok(())
}

fn scoped_api<K: ServiceKind>(client: Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

async fn run_kind<K: ServiceKind>(
    state: Arc<ControllerState>,
    store: Arc<KubeStore>,
    aiven: Arc<AivenClient>,
) -> Result<()> {
    let kind = K::kind(&()).to_string();
    let config = &state.config;
    let api: Api<K> = scoped_api(state.client.clone(), config.watch_namespace.as_deref());

    // Verify CRD exists
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("{} CRD not found. Please install the CRD first: {:?}", kind, e);
        return Err(Error::ConfigError(format!("{kind} CRD not installed")));
    }
    info!("{} CRD is available", kind);

    let engine = Engine::new(
        store.clone() as Arc<dyn ObjectStore<K>>,
        store as Arc<dyn SecretStore>,
        aiven.clone() as Arc<dyn ServiceClient>,
        config.requeue,
    )
    .with_client_factory(aiven as Arc<dyn ClientFactory>);
    let ctx = Arc::new(Context::new(engine));

    let concurrency = u16::try_from(config.workers).unwrap_or(u16::MAX);
    let kind = kind.as_str();

    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled {}", obj),
                Err(e) => warn!("{} reconcile failed: {}", kind, e),
            }
        })
        .await;

    info!("{} controller stopped", kind);
    Ok(())
}
