//! Assembles the storage tiers from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppResult;
use crate::infra::{BackendKind, Database, LocalStore, RestStore, SqlStore, Store};
use crate::services::DataService;

const BOOTSTRAP_ADMIN_NAME: &str = "Administrator";

/// SQL tiers are built lazily: an unreachable server still yields a tier,
/// which starts out down and is re-promoted by the health monitor.
async fn sql_tier(kind: BackendKind, url: Option<&str>, timeout: Duration) -> Option<Arc<dyn Store>> {
    let url = url?;
    match Database::connect_lazy(url, timeout).await {
        Ok(db) => Some(Arc::new(SqlStore::new(kind, db))),
        Err(e) => {
            tracing::error!(tier = %kind, error = %e, "Invalid SQL tier configuration, tier disabled");
            None
        }
    }
}

/// Open every configured tier, seed the local store, replay pending
/// offline changes and pick the active backend.
pub async fn build_data_service(config: &Config) -> AppResult<Arc<DataService>> {
    let data = open_data_service(config).await?;
    let active = data.initialize().await;
    tracing::info!(backend = %active, "Storage initialised");
    Ok(data)
}

/// Open every configured tier and seed the local store. No tier is
/// contacted yet.
pub async fn open_data_service(config: &Config) -> AppResult<Arc<DataService>> {
    let timeout = Duration::from_secs(config.http_timeout_seconds);

    let mut remotes: Vec<Arc<dyn Store>> = Vec::new();
    if let Some(store) = sql_tier(BackendKind::MySql, config.mysql_url.as_deref(), timeout).await {
        remotes.push(store);
    }
    if let Some(store) =
        sql_tier(BackendKind::Hosted, config.hosted_database_url.as_deref(), timeout).await
    {
        remotes.push(store);
    }
    if let Some(url) = config.rest_api_url.as_deref() {
        let token = config.rest_api_token().map(str::to_string);
        remotes.push(Arc::new(RestStore::new(url, token, timeout)?));
    }

    let local = Arc::new(LocalStore::open(config.local_store_path.clone()).await?);
    if let Some((email, password)) = config.bootstrap_admin() {
        if local.seed_admin(email, password, BOOTSTRAP_ADMIN_NAME).await? {
            tracing::info!(email, "Seeded bootstrap admin into the local store");
        }
    }
    if local.gateway_settings().await.is_none() && config.gateways != Default::default() {
        local.save_gateway_settings(config.gateways.clone()).await?;
        tracing::info!("Gateway settings initialised from the environment");
    }

    Ok(Arc::new(DataService::new(
        remotes,
        local,
        config.backend_failure_threshold,
    )))
}
