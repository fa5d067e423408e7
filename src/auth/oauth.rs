//! OAuth2 authorization-code flow against the contest identity provider.
//!
//! Login redirects to the provider; the callback exchanges the code for a
//! token, fetches the participant profile, upserts the local user row and
//! establishes the session cookie.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, SameSite},
};
use chrono::Utc;
use serde::Deserialize;
use url::Url;

use crate::{
    auth::{Session, clear_session_cookie, set_session_cookie},
    codes::generate_code,
    error::AppError,
    model::users::{
        Profile, find_user_by_foreign_id, get_user_principals, import_user,
        update_user,
    },
    state::AppState,
};

const STATE_COOKIE: &str = "oauth_state";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Redirect the browser to the provider's authorization page, pinning a
/// random state value in a cookie for the callback to verify.
pub async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), Response> {
    let oauth = &state.config.oauth;
    let nonce = generate_code();
    let mut url = Url::parse(&oauth.authorize_url).map_err(|e| {
        AppError::integrity(format!("bad authorize_url: {e}")).into_response()
    })?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &oauth.client_id)
        .append_pair("redirect_uri", &oauth.redirect_uri)
        .append_pair("state", &nonce);

    let mut cookie = Cookie::new(STATE_COOKIE, nonce);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    Ok((jar.add(cookie), Redirect::to(url.as_str())))
}

#[tracing::instrument(skip(state, jar, params))]
pub async fn callback(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(PrivateCookieJar, Redirect), Response> {
    let expected = jar.get(STATE_COOKIE).map(|c| c.value().to_owned());
    if expected.as_deref() != Some(params.state.as_str()) {
        return Err(super::AuthError::Unauthenticated.into_response());
    }
    let jar = jar.remove(Cookie::from(STATE_COOKIE));

    let oauth = &state.config.oauth;
    let client = reqwest::Client::new();
    let token: TokenResponse = client
        .post(&oauth.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", &params.code),
            ("client_id", &oauth.client_id),
            ("client_secret", &oauth.client_secret),
            ("redirect_uri", &oauth.redirect_uri),
        ])
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| upstream(format!("token exchange: {e}")))?
        .json()
        .await
        .map_err(|e| upstream(format!("token response: {e}")))?;

    let profile: Profile = client
        .get(&oauth.profile_url)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| upstream(format!("profile fetch: {e}")))?
        .json()
        .await
        .map_err(|e| upstream(format!("profile response: {e}")))?;

    let session = state
        .tx(move |conn| {
            let now = Utc::now().naive_utc();
            let user_id =
                match find_user_by_foreign_id(conn, &profile.foreign_id)? {
                    Some(user_id) => {
                        update_user(conn, &user_id, &profile)?;
                        user_id
                    }
                    None => import_user(conn, &profile, now)?,
                };
            let principals = get_user_principals(conn, &user_id)?;
            Ok(Session::new(user_id, principals))
        })
        .await
        .map_err(IntoResponse::into_response)?;

    Ok((set_session_cookie(jar, &session), Redirect::to("/")))
}

pub async fn logout(
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    (clear_session_cookie(jar), Redirect::to("/"))
}

/// Re-derive the session's principals after a membership change, so checks
/// against the refreshed cookie see the new team. The CSRF token is kept.
pub async fn refresh_principals(
    state: &AppState,
    jar: PrivateCookieJar,
    session: &Session,
) -> Result<PrivateCookieJar, AppError> {
    let user_id = session.user_id.clone();
    let csrf_token = session.csrf_token.clone();
    let session = state
        .tx(move |conn| {
            let principals = get_user_principals(conn, &user_id)?;
            Ok(Session::with_csrf_token(user_id, principals, csrf_token))
        })
        .await?;
    Ok(set_session_cookie(jar, &session))
}

fn upstream(msg: String) -> Response {
    AppError::Upstream(msg).into_response()
}
