//! JSON API surface. All responses carry a `success` flag; domain
//! rejections come back as `{"success": false, "error": "..."}` with
//! status 200 so the frontend can match on the stable error strings.

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;

use crate::{
    auth::{SESSION_COOKIE, Session},
    model::error_log::record_error,
    state::AppState,
};

pub mod attempt;
pub mod team;
pub mod workspace;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(team::me))
        .route("/team/create", post(team::create_team))
        .route("/team/join", post(team::join_team_by_code))
        .route("/team/leave", post(team::leave_current_team))
        .route("/teams/:team_id/settings", post(team::update_team_settings))
        .route("/teams/:team_id/register", post(team::register_team))
        .route(
            "/participations/:participation_id/access_code",
            post(team::enter_access_code),
        )
        .route(
            "/participations/:participation_id/attempts",
            get(attempt::list),
        )
        .route(
            "/participations/:participation_id/round_tasks/:round_task_id/task",
            get(attempt::current_task),
        )
        .route("/attempts", post(attempt::create))
        .route(
            "/attempts/reset_to_training",
            post(attempt::reset_to_training),
        )
        .route("/attempts/:attempt_id/cancel", post(attempt::cancel))
        .route(
            "/attempts/:attempt_id/task",
            post(attempt::assign_task).get(attempt::view_task),
        )
        .route(
            "/attempts/:attempt_id/access_code",
            post(attempt::unlock).get(attempt::access_codes),
        )
        .route("/attempts/:attempt_id/hint", post(attempt::hint))
        .route(
            "/attempts/:attempt_id/hint/reset",
            post(attempt::reset_hints),
        )
        .route(
            "/attempts/:attempt_id/answers",
            post(attempt::submit_answer).get(attempt::list_answers),
        )
        .route("/attempts/:attempt_id/revisions", get(workspace::list))
        .route("/revisions", post(workspace::store))
        .route("/revisions/:revision_id", get(workspace::view))
        .route(
            "/revisions/:revision_id/activate",
            post(workspace::activate),
        )
        .route(
            "/revisions/:revision_id/precious",
            post(workspace::set_precious),
        )
}

/// Matches axum's default request size cap.
const LOGGED_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Record server-side failures in the error log with their request context.
/// Uses a fresh connection, so the entry survives the failed request's
/// rollback.
pub async fn log_server_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let url = parts.uri.to_string();
    let user_id = session_user_id(&state, &parts.headers);
    let headers = render_headers(&parts.headers);
    let bytes = match to_bytes(body, LOGGED_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };
    let body_text = String::from_utf8_lossy(&bytes).into_owned();
    let request = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(request).await;
    let status = response.status();
    if status.is_server_error() {
        tracing::error!(%method, %url, %status, "request failed");
        let pool = state.pool.clone();
        let message = format!("{method} {url} -> {status}");
        let _ = tokio::task::spawn_blocking(move || {
            if let Ok(mut conn) = pool.get() {
                let _ = record_error(
                    &mut conn,
                    Utc::now().naive_utc(),
                    user_id.as_deref(),
                    &url,
                    Some(&body_text),
                    Some(&headers),
                    &message,
                );
            }
        })
        .await;
    }
    response
}

/// Decrypt the session cookie directly; an absent or unreadable session
/// records as anonymous rather than failing the request.
fn session_user_id(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let jar =
        PrivateCookieJar::from_headers(headers, state.cookie_key.clone());
    let cookie = jar.get(SESSION_COOKIE)?;
    serde_json::from_str::<Session>(cookie.value())
        .ok()
        .map(|session| session.user_id)
}

/// One `name: value` line per header. The cookie header carries the session
/// and is left out.
fn render_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| **name != COOKIE)
        .map(|(name, value)| {
            format!("{name}: {}", value.to_str().unwrap_or("<binary>"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
