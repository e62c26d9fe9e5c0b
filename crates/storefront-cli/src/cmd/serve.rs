use anyhow::Result;
use storefront_core::config::Config;
use storefront_server::AppState;

pub fn run(config: &Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let state = AppState::from_config(config)?;
        let settings = state.scheduler.settings();
        if state.scheduler.is_enabled() {
            tracing::info!(
                debounce_ms = settings.debounce.as_millis() as u64,
                max_sleep_ms = settings.max_single_sleep.as_millis() as u64,
                "publishing enabled"
            );
        } else {
            tracing::info!("publishing disabled: no deploy hook configured");
        }
        storefront_server::serve(state, port).await
    })
}
