use crate::config::AppConfig;
use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// `RUST_LOG` wins over the configured `log_level` when both are set.
pub fn init_tracing(config: &AppConfig, service: &'static str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.is_production() {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_target(false)
            .try_init()
            .map_err(|err| anyhow::anyhow!("tracing init failed: {err}"))?;
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("tracing init failed: {err}"))?;
    }

    tracing::info!(
        service,
        app_env = %config.app_env,
        data_backend = %config.data_backend,
        "tracing initialised"
    );
    Ok(())
}
