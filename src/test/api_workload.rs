//! HTTP-level checks: session enforcement, the response envelope and the
//! team formation flow through the JSON API.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestServer, TestServerConfig, Transport};
use cookie::{Cookie, CookieJar};
use diesel::prelude::*;
use serde_json::{Value, json};

use crate::{
    auth::{CSRF_HEADER, SESSION_COOKIE, Session},
    backend::BackendRegistry,
    config::{AppConfig, OauthConfig, create_app},
    model::{
        attempts::create_attempt, participations::create_participation,
        task_instances::assign_task_instance,
        team_members::create_user_team, users::get_user_principals,
    },
    schema::error_log,
    state::{AppState, DbPool},
    test::fixtures::{BADGE, now, pool, seed_contest, seed_user},
};

const CSRF_TOKEN: &str = "csrf-test-token";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: ":memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        secret_key: "0123456789abcdef0123456789abcdef".into(),
        attempt_cooldown_secs: 300,
        answer_cooldown_secs: 60,
        oauth: OauthConfig {
            authorize_url: "https://provider.test/oauth/authorize".into(),
            token_url: "https://provider.test/oauth/token".into(),
            profile_url: "https://provider.test/profile".into(),
            client_id: "alkindi".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://contest.test/auth/callback".into(),
        },
    }
}

fn test_state(pool: DbPool) -> AppState {
    let config = test_config();
    let cookie_key = config.cookie_key();
    AppState {
        pool,
        config: Arc::new(config),
        backends: Arc::new(BackendRegistry::with_defaults()),
        cookie_key,
    }
}

/// A server logged in as the given user, with a session cookie encrypted
/// under the application key. No CSRF header yet.
fn logged_in_server(state: &AppState, user_id: &str) -> TestServer {
    let principals = {
        let mut conn = state.pool.get().unwrap();
        get_user_principals(&mut conn, user_id).unwrap()
    };
    let session = Session::with_csrf_token(
        user_id.to_owned(),
        principals,
        CSRF_TOKEN.to_owned(),
    );
    let mut jar = CookieJar::new();
    jar.private_mut(&state.cookie_key).add(Cookie::new(
        SESSION_COOKIE,
        serde_json::to_string(&session).unwrap(),
    ));
    let sealed = jar.get(SESSION_COOKIE).unwrap().clone().into_owned();

    let mut server = TestServer::new_with_config(
        create_app(state.clone()),
        TestServerConfig {
            save_cookies: true,
            // A real HTTP listener delivers origin-form URIs ("/api/...")
            // like production hyper does; the mock transport passes the
            // absolute URL through to the service instead.
            transport: Some(Transport::HttpRandomPort),
            ..Default::default()
        },
    )
    .unwrap();
    server.add_cookie(sealed);
    server
}

/// A logged-in server that also sends the session's CSRF token on every
/// request.
fn server_as(state: &AppState, user_id: &str) -> TestServer {
    let mut server = logged_in_server(state, user_id);
    server.add_header(
        HeaderName::from_static(CSRF_HEADER),
        HeaderValue::from_static(CSRF_TOKEN),
    );
    server
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let pool = pool();
    let state = test_state(pool);
    let server = TestServer::new(create_app(state)).unwrap();

    let response = server.get("/api/me").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn team_formation_over_http() {
    let pool = pool();
    let (alice, bob, round_id) = {
        let mut conn = pool.get().unwrap();
        let contest = seed_contest(&mut conn);
        (
            seed_user(&mut conn, "alice", BADGE),
            seed_user(&mut conn, "bob", BADGE),
            contest.round_id,
        )
    };
    let state = test_state(pool);

    let alice_server = server_as(&state, &alice);
    let response = alice_server.post("/api/team/create").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    let team_id = body["team_id"].as_str().unwrap().to_owned();

    // Creating the team refreshed the cookie, so the creator principal is
    // present for registration.
    let response = alice_server
        .post(&format!("/api/teams/{team_id}/register"))
        .json(&json!({ "round_id": round_id }))
        .await;
    assert_eq!(response.json::<Value>()["success"], json!(true));

    let response = alice_server.get("/api/me").await;
    let body: Value = response.json();
    assert_eq!(body["csrf_token"], json!(CSRF_TOKEN));
    let code = body["team"]["code"].as_str().unwrap().to_owned();
    assert_eq!(body["team"]["members"].as_array().unwrap().len(), 1);

    let bob_server = server_as(&state, &bob);
    let response = bob_server
        .post("/api/team/join")
        .json(&json!({ "code": code }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["team_id"], json!(team_id));

    let response = alice_server.get("/api/me").await;
    let body: Value = response.json();
    assert_eq!(body["team"]["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn mutations_require_the_csrf_token() {
    let pool = pool();
    let alice = {
        let mut conn = pool.get().unwrap();
        seed_contest(&mut conn);
        seed_user(&mut conn, "alice", BADGE)
    };
    let state = test_state(pool);

    // Logged in, but the token header is missing.
    let server = logged_in_server(&state, &alice);
    let response = server.post("/api/team/create").await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"], json!("bad csrf token"));

    // Reads are unaffected.
    let response = server.get("/api/me").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .post("/api/team/create")
        .add_header(
            HeaderName::from_static(CSRF_HEADER),
            HeaderValue::from_static("not-the-token"),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn server_errors_are_recorded_with_request_context() {
    let pool = pool();
    let alice = {
        let mut conn = pool.get().unwrap();
        seed_contest(&mut conn);
        seed_user(&mut conn, "alice", BADGE)
    };
    let state = test_state(pool.clone());

    let server = server_as(&state, &alice);
    let response = server
        .post("/api/attempts")
        .json(&json!({
            "participation_id": "no-such-participation",
            "round_task_id": "no-such-round-task",
        }))
        .await;
    assert_eq!(
        response.status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );

    let mut conn = pool.get().unwrap();
    let entries = error_log::table
        .select((error_log::user_id, error_log::url, error_log::body))
        .load::<(Option<String>, String, Option<String>)>(&mut conn)
        .unwrap();
    assert_eq!(entries.len(), 1);
    let (user_id, url, body) = &entries[0];
    assert_eq!(user_id.as_deref(), Some(alice.as_str()));
    assert_eq!(url, "/api/attempts");
    assert!(body.as_deref().unwrap().contains("no-such-participation"));
}

#[tokio::test]
async fn domain_errors_use_the_failure_envelope() {
    let pool = pool();
    let alice = {
        let mut conn = pool.get().unwrap();
        seed_contest(&mut conn);
        seed_user(&mut conn, "alice", BADGE)
    };
    let state = test_state(pool);

    let server = server_as(&state, &alice);
    let response = server
        .post("/api/team/join")
        .json(&json!({ "code": "zzzzzzzz" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("unknown team code"));
}

#[tokio::test]
async fn task_views_resolve_the_current_attempt() {
    let pool = pool();
    let (alice, participation_id, round_task_id) = {
        let mut conn = pool.get().unwrap();
        let contest = seed_contest(&mut conn);
        let alice = seed_user(&mut conn, "alice", BADGE);
        let t0 = now();
        let team_id = create_user_team(&mut conn, &alice, t0).unwrap();
        let participation_id =
            create_participation(&mut conn, &team_id, &contest.round_id, None, t0)
                .unwrap();
        (alice, participation_id, contest.round_task_id)
    };
    let state = test_state(pool.clone());
    let server = server_as(&state, &alice);

    let listing_url =
        format!("/api/participations/{participation_id}/attempts");
    let response = server.get(&listing_url).await;
    let body: Value = response.json();
    assert_eq!(body["round_tasks"][0]["max_score"], json!("500"));
    assert_eq!(body["attempts"].as_array().unwrap().len(), 0);

    // No attempt open for the slot yet.
    let slot_url = format!(
        "/api/participations/{participation_id}/round_tasks/{round_task_id}/task"
    );
    let response = server.get(&slot_url).await;
    let body: Value = response.json();
    assert_eq!(body["error"], json!("no current attempt"));

    let attempt_id = {
        let mut conn = pool.get().unwrap();
        create_attempt(
            &mut conn,
            &participation_id,
            &round_task_id,
            now(),
            chrono::Duration::minutes(5),
        )
        .unwrap()
    };

    // An attempt without a task instance is not viewable either.
    let response = server.get(&slot_url).await;
    let body: Value = response.json();
    assert_eq!(body["error"], json!("no task instance"));

    {
        let mut conn = pool.get().unwrap();
        let backends = BackendRegistry::with_defaults();
        assign_task_instance(&mut conn, &backends, &attempt_id, now())
            .unwrap();
    }

    let response = server.get(&slot_url).await;
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["attempt_id"], json!(attempt_id));
    assert!(body["task"]["cipher_text"].is_string());

    let response = server
        .get(&format!("/api/attempts/{attempt_id}/task"))
        .await;
    let body: Value = response.json();
    assert_eq!(body["title"], json!("Playfair"));
}
