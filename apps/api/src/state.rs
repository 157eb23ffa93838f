use sqlx::SqlitePool;

use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
/// The analysis worker owns its own model client; handlers never call the model.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
}
