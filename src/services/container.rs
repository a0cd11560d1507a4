//! Service container - wires every service onto one data service.

use std::sync::Arc;
use std::time::Duration;

use super::{
    AuthService, Authenticator, CurrencyService, HttpRateFetcher, InvoiceManager, InvoiceService,
    RateFetcher, RatesCache, ResetManager, ResetService, UserManager, UserService,
};
use crate::config::Config;
use crate::errors::AppResult;
use crate::infra::{Cache, EmailNotifier, Notifier, WhatsAppNotifier};
use crate::services::DataService;

/// All application services, sharing one [`DataService`].
#[derive(Clone)]
pub struct Services {
    pub data: Arc<DataService>,
    pub auth: Arc<dyn AuthService>,
    pub users: Arc<dyn UserService>,
    pub invoices: Arc<dyn InvoiceService>,
    pub currency: Arc<dyn CurrencyService>,
    pub reset: Arc<dyn ResetService>,
}

impl Services {
    /// Build the production services: HTTP rate source, SMTP and WhatsApp
    /// notifiers.
    pub fn build(data: Arc<DataService>, config: &Config, cache: Option<Arc<Cache>>) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.http_timeout_seconds);
        let fetcher: Arc<dyn RateFetcher> =
            Arc::new(HttpRateFetcher::new(config.exchange_rates_url.clone(), timeout)?);
        let email: Arc<dyn Notifier> = Arc::new(EmailNotifier::new(timeout));
        let whatsapp: Arc<dyn Notifier> = Arc::new(WhatsAppNotifier::new(timeout)?);

        Ok(Self::with_adapters(data, config, cache, fetcher, email, whatsapp))
    }

    /// Build with injected outbound adapters.
    pub fn with_adapters(
        data: Arc<DataService>,
        config: &Config,
        cache: Option<Arc<Cache>>,
        fetcher: Arc<dyn RateFetcher>,
        email: Arc<dyn Notifier>,
        whatsapp: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            auth: Arc::new(Authenticator::new(data.clone(), config.clone())),
            users: Arc::new(UserManager::new(data.clone())),
            invoices: Arc::new(InvoiceManager::new(data.clone())),
            currency: Arc::new(RatesCache::new(fetcher, cache, config.exchange_rates_ttl_seconds)),
            reset: Arc::new(ResetManager::new(
                data.clone(),
                email,
                whatsapp,
                config.gateways.clone(),
            )),
            data,
        }
    }
}
