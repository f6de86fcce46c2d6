use std::sync::Arc;

use meddle_db::Database;
use meddle_scheduler::{Clock, DosageClock};
use tracing::error;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dosage: DosageClock,
    pub clock: Arc<dyn Clock>,
}

impl AppStateInner {
    /// Run a database call off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!("database task aborted"))
            })?
            .map_err(ApiError::Internal)
    }
}
