use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use wfh_core::config::{AppConfig, ConfigError, LoadOptions};
use wfh_db::{
    connect_with_settings, migrations, DbPool, SqlApplicationRepository, SqlUserRepository,
};

use crate::api::ApiState;
use crate::auth::TokenIssuer;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, applies migrations before any request can be served, and wires repositories.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    if config.auth.ephemeral_secret {
        warn!(
            event_name = "system.bootstrap.ephemeral_jwt_secret",
            correlation_id = "bootstrap",
            "no auth.jwt_secret configured; generated one for this process, tokens will not \
             survive a restart (set WFH_AUTH_JWT_SECRET to keep them)"
        );
    }

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let state = ApiState {
        applications: Arc::new(SqlApplicationRepository::new(db_pool.clone())),
        users: Arc::new(SqlUserRepository::new(db_pool.clone())),
        tokens: Arc::new(TokenIssuer::new(&config.auth.jwt_secret, config.auth.token_ttl_minutes)),
    };

    Ok(Application { config, db_pool, state })
}
