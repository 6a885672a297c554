use sportsbuddies_domain::ports::BoxFuture;
use sportsbuddies_domain::ports::db::{DbAdapter, DbError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

/// Reachability probe for the SurrealDB endpoint. It only opens a TCP
/// connection; it does not authenticate.
#[derive(Debug, Clone)]
pub struct SurrealHealth {
    config: DbConfig,
}

impl SurrealHealth {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

impl DbAdapter for SurrealHealth {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        let endpoint = self.config.endpoint.clone();
        Box::pin(async move {
            let address = parse_socket_address(&endpoint)?;
            timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
                .await
                .map_err(|_| DbError::Unavailable("surreal endpoint connect timed out".into()))?
                .map_err(|err| {
                    DbError::Unavailable(format!("surreal endpoint connect failed: {err}"))
                })?;
            tracing::debug!(endpoint, "surreal health check succeeded");
            Ok(())
        })
    }
}

fn parse_socket_address(endpoint: &str) -> Result<String, DbError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized).map_err(|err| {
        DbError::Unavailable(format!("invalid surreal endpoint '{endpoint}': {err}"))
    })?;

    let host = parsed.host_str().ok_or_else(|| {
        DbError::Unavailable(format!("missing surreal host in endpoint '{endpoint}'"))
    })?;
    let port = match (parsed.port(), parsed.scheme()) {
        (Some(port), _) => port,
        (None, "wss" | "https") => 443,
        (None, _) => 8000,
    };
    Ok(format!("{host}:{port}"))
}
