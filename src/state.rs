use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool},
};
use tokio::task::spawn_blocking;

use crate::{
    backend::BackendRegistry,
    config::AppConfig,
    error::{AppError, AppResult},
};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub backends: Arc<BackendRegistry>,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}

impl AppState {
    /// Run `f` inside one IMMEDIATE transaction on a pooled connection,
    /// off the async executor. The transaction commits iff `f` returns Ok;
    /// any error rolls it back, so a failed request leaves no partial state.
    pub async fn tx<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> AppResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| AppError::integrity(format!("db pool: {e}")))?;
            run_in_transaction(&mut conn, f)
        })
        .await
        .map_err(|e| AppError::integrity(format!("join: {e}")))?
    }
}

pub fn run_in_transaction<T, F>(
    conn: &mut SqliteConnection,
    f: F,
) -> AppResult<T>
where
    F: FnOnce(&mut SqliteConnection) -> AppResult<T>,
{
    // BEGIN IMMEDIATE takes the write lock up front, so the read-then-write
    // pairs inside the model (ordinal allocation, best-score updates, current
    // attempt transitions) are serialized against concurrent teammates.
    conn.immediate_transaction(f)
}
