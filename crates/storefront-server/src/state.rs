use storefront_core::catalog::CatalogStore;
use storefront_core::config::Config;
use storefront_core::kv;
use storefront_core::publish::{BackgroundTasks, Scheduler};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogStore,
    pub scheduler: Scheduler,
    /// Bearer token for the admin API. `None` refuses every admin request.
    pub admin_token: Option<String>,
    pub debug_errors: bool,
}

impl AppState {
    /// Open the configured store and wire the publish scheduler to it.
    pub fn from_config(config: &Config) -> storefront_core::Result<Self> {
        let store = kv::open(&config.store)?;
        let scheduler = Scheduler::from_config(store.clone(), &config.publish, BackgroundTasks::new())?;
        Ok(Self {
            catalog: CatalogStore::new(store),
            scheduler,
            admin_token: config.server.admin_token.clone(),
            debug_errors: config.server.debug_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::config::StoreConfig;

    #[tokio::test]
    async fn from_config_shares_one_store() {
        let mut config = Config::default();
        config.store = StoreConfig::Memory;
        config.server.admin_token = Some("t".into());
        let state = AppState::from_config(&config).unwrap();

        assert!(std::sync::Arc::ptr_eq(state.catalog.kv(), state.scheduler.store()));
        assert_eq!(state.admin_token.as_deref(), Some("t"));
        assert!(!state.scheduler.is_enabled());
    }
}
