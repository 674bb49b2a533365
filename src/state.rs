//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    db::DbPool,
    services::{
        file_service::UploadLimits, storage::ObjectStorage, svix::WebhookVerifier,
        webhook_processor::RetryPolicy,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub storage: Arc<ObjectStorage>,
    pub verifier: Arc<WebhookVerifier>,
    pub upload_limits: UploadLimits,
    pub retry_policy: RetryPolicy,
}

impl AppState {
    /// Build state from configuration and an existing pool.
    ///
    /// # Errors
    ///
    /// Fails when `CLERK_WEBHOOK_SECRET` is not valid base64.
    pub fn new(config: &Config, pool: DbPool) -> Result<Self, base64::DecodeError> {
        let verifier =
            WebhookVerifier::new(&config.clerk_webhook_secret, config.webhook_tolerance_secs)?;

        Ok(Self {
            pool,
            storage: Arc::new(ObjectStorage::new(config)),
            verifier: Arc::new(verifier),
            upload_limits: UploadLimits::from_config(config),
            retry_policy: RetryPolicy::from_config(config),
        })
    }
}

/// Lets handlers and middleware that only need the database extract `State<DbPool>`.
impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let config = crate::config::test_config();
    // Never connects unless a query actually runs
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy(&config.database_url)
        .expect("valid database url");
    AppState::new(&config, pool).expect("valid webhook secret")
}
