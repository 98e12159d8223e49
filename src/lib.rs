pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub gateway_webhook_secret: Arc<str>,
    pub report_signing_secret: Arc<str>,
}
