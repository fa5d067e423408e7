use std::path::Path;

use axum::{Router, middleware};
use axum_extra::extract::cookie::Key;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{
    api,
    auth::{self, oauth},
    state::AppState,
};
use axum::routing::{get, post};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Master key for the session cookie, at least 32 bytes.
    pub secret_key: String,
    /// Minimum seconds between creating timed attempts for one slot.
    #[serde(default = "default_attempt_cooldown")]
    pub attempt_cooldown_secs: i64,
    /// Minimum seconds since the second most recent answer of an attempt.
    #[serde(default = "default_answer_cooldown")]
    pub answer_cooldown_secs: i64,
    pub oauth: OauthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OauthConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8001".to_owned()
}

fn default_attempt_cooldown() -> i64 {
    300
}

fn default_answer_cooldown() -> i64 {
    60
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.len() < 32 {
            return Err(ConfigError::Invalid(
                "secret_key must be at least 32 bytes".into(),
            ));
        }
        if self.attempt_cooldown_secs < 0 || self.answer_cooldown_secs < 0 {
            return Err(ConfigError::Invalid(
                "cooldowns must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn cookie_key(&self) -> Key {
        Key::derive_from(self.secret_key.as_bytes())
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", get(oauth::login))
        .route("/auth/callback", get(oauth::callback))
        .route("/auth/logout", post(oauth::logout))
        .nest(
            "/api",
            api::router().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_csrf,
            )),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::log_server_errors,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(extra: &str) -> String {
        format!(
            r#"
            database_url = "alkindi.sqlite3"
            secret_key = "0123456789abcdef0123456789abcdef"
            {extra}

            [oauth]
            authorize_url = "https://provider.example/oauth/authorize"
            token_url = "https://provider.example/oauth/token"
            profile_url = "https://provider.example/profile"
            client_id = "alkindi"
            client_secret = "secret"
            redirect_uri = "https://contest.example/auth/callback"
            "#
        )
    }

    #[test]
    fn cooldowns_default_when_absent() {
        let config: AppConfig = toml::from_str(&sample("")).unwrap();
        assert_eq!(config.attempt_cooldown_secs, 300);
        assert_eq!(config.answer_cooldown_secs, 60);
        assert_eq!(config.listen_addr, "127.0.0.1:8001");
    }

    #[test]
    fn cooldowns_can_be_overridden() {
        let config: AppConfig =
            toml::from_str(&sample("attempt_cooldown_secs = 5")).unwrap();
        assert_eq!(config.attempt_cooldown_secs, 5);
    }

    #[test]
    fn short_secret_key_is_rejected() {
        let text = sample("").replace(
            "0123456789abcdef0123456789abcdef",
            "too-short",
        );
        let config: AppConfig = toml::from_str(&text).unwrap();
        assert!(config.validate().is_err());
    }
}
