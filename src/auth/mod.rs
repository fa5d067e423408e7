//! Session handling.
//!
//! The session travels in an encrypted cookie: user id, expiry, a CSRF
//! token and the principal strings authorization checks match against.
//! Principals are refreshed whenever team membership changes, so ownership
//! checks never need a database round trip.

use axum::{
    Json,
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{Method, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use chrono::{Days, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{codes::generate_code, state::AppState};

pub mod oauth;

pub const SESSION_COOKIE: &str = "alkindi_session";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Principal prefixes:
/// `u:<user>`, `g:admin`, `t:<team>` (member), `ts:<team>` (qualified
/// member), `tc:<team>` (creator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub expiry: NaiveDateTime,
    pub csrf_token: String,
    pub principals: Vec<String>,
}

impl Session {
    pub fn new(user_id: String, principals: Vec<String>) -> Self {
        Self::with_csrf_token(user_id, principals, generate_code())
    }

    /// Used when the session is re-issued with fresh principals: the token
    /// survives, so clients that already fetched it keep working.
    pub fn with_csrf_token(
        user_id: String,
        principals: Vec<String>,
        csrf_token: String,
    ) -> Self {
        Session {
            user_id,
            expiry: Utc::now()
                .naive_utc()
                .checked_add_days(Days::new(7))
                .unwrap_or_else(|| Utc::now().naive_utc()),
            csrf_token,
            principals,
        }
    }

    pub fn has(&self, principal: &str) -> bool {
        self.principals.iter().any(|p| p == principal)
    }

    pub fn is_admin(&self) -> bool {
        self.has("g:admin")
    }

    /// Member of the team, or admin.
    pub fn owns_team(&self, team_id: &str) -> bool {
        self.is_admin() || self.has(&format!("t:{team_id}"))
    }

    /// May change the team's settings: its creator, or admin.
    pub fn manages_team(&self, team_id: &str) -> bool {
        self.is_admin() || self.has(&format!("tc:{team_id}"))
    }
}

#[derive(Debug)]
pub enum AuthError {
    Unauthenticated,
    BadCsrfToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
            }
            AuthError::BadCsrfToken => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "success": false,
                    "error": "bad csrf token",
                })),
            )
                .into_response(),
        }
    }
}

/// Mutating API calls must echo the session's CSRF token in the
/// `X-Csrf-Token` header.
pub async fn require_csrf(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if *request.method() != Method::POST {
        return next.run(request).await;
    }
    let (mut parts, body) = request.into_parts();
    let session = match Session::from_request_parts(&mut parts, &state).await {
        Ok(session) => session,
        Err(rejection) => return rejection.into_response(),
    };
    let presented = parts
        .headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented != Some(session.csrf_token.as_str()) {
        return AuthError::BadCsrfToken.into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> =
            PrivateCookieJar::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::Unauthenticated)?;
        let cookie =
            jar.get(SESSION_COOKIE).ok_or(AuthError::Unauthenticated)?;
        match serde_json::from_str::<Session>(cookie.value()) {
            Ok(session) if Utc::now().naive_utc() < session.expiry => {
                Ok(session)
            }
            _ => Err(AuthError::Unauthenticated),
        }
    }
}

pub fn set_session_cookie(
    jar: PrivateCookieJar,
    session: &Session,
) -> PrivateCookieJar {
    let mut cookie = Cookie::new(
        SESSION_COOKIE,
        serde_json::to_string(session).unwrap_or_default(),
    );
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::from(SESSION_COOKIE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_checks() {
        let session = Session::new(
            "u1".into(),
            vec!["u:u1".into(), "t:team1".into(), "tc:team1".into()],
        );
        assert!(session.owns_team("team1"));
        assert!(session.manages_team("team1"));
        assert!(!session.owns_team("team2"));
        assert!(!session.is_admin());
    }

    #[test]
    fn admin_owns_everything() {
        let session = Session::new("u1".into(), vec!["g:admin".into()]);
        assert!(session.owns_team("any"));
        assert!(session.manages_team("any"));
    }
}
