//! Application state - Dependency injection container.

use std::sync::Arc;

use crate::config::Config;
use crate::errors::AppResult;
use crate::infra::Cache;
use crate::services::{
    AuthService, CurrencyService, DataService, InvoiceService, ResetService, Services, UserService,
};

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<dyn AuthService>,
    pub user_service: Arc<dyn UserService>,
    pub invoice_service: Arc<dyn InvoiceService>,
    pub currency_service: Arc<dyn CurrencyService>,
    pub reset_service: Arc<dyn ResetService>,
    /// Storage tiers, for health and sync endpoints
    pub data: Arc<DataService>,
    /// Redis, when configured; rate limiting is skipped without it
    pub cache: Option<Arc<Cache>>,
}

impl AppState {
    /// Create application state with the production adapters.
    pub fn from_config(data: Arc<DataService>, cache: Option<Arc<Cache>>, config: &Config) -> AppResult<Self> {
        let services = Services::build(data, config, cache.clone())?;
        Ok(Self::from_services(services, cache))
    }

    pub fn from_services(services: Services, cache: Option<Arc<Cache>>) -> Self {
        Self {
            auth_service: services.auth,
            user_service: services.users,
            invoice_service: services.invoices,
            currency_service: services.currency,
            reset_service: services.reset,
            data: services.data,
            cache,
        }
    }
}
