use std::sync::Arc;

use alkindi::{
    MIGRATIONS,
    backend::BackendRegistry,
    config::{AppConfig, create_app},
    state::{AppState, DbPool},
};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::MigrationHarness;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("ALKINDI_CONFIG")
        .unwrap_or_else(|_| "alkindi.toml".to_owned());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(%config_path, error = %e, "cannot load config");
            std::process::exit(1);
        }
    };

    let pool: DbPool = Pool::builder()
        .build(ConnectionManager::new(&config.database_url))
        .expect("database pool");
    {
        let mut conn = pool.get().expect("database connection");
        conn.run_pending_migrations(MIGRATIONS)
            .expect("run migrations");
    }

    let cookie_key = config.cookie_key();
    let listen_addr = config.listen_addr.clone();
    let state = AppState {
        pool,
        config: Arc::new(config),
        backends: Arc::new(BackendRegistry::with_defaults()),
        cookie_key,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .expect("bind listen address");
    tracing::info!(%listen_addr, "listening");
    axum::serve(listener, app).await.expect("server");
}
