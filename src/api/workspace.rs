//! Workspace revision endpoints. Revisions are the teams' shared solving
//! state; answers may reference the revision they were produced from.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    auth::Session,
    error::{AppResult, ModelError},
    model::workspace_revisions::{
        WorkspaceRevision, get_revision_attempt_id, load_attempt_revisions,
        load_revision, mark_revision_precious, set_active_revision,
        store_revision,
    },
    state::AppState,
};

use super::attempt::require_ownership;

#[derive(Debug, Deserialize)]
pub struct StoreRevisionBody {
    attempt_id: String,
    parent_id: Option<String>,
    title: Option<String>,
    state: String,
}

pub async fn store(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<StoreRevisionBody>,
) -> AppResult<Json<Value>> {
    let revision_id = state
        .tx(move |conn| {
            require_ownership(conn, &session, &body.attempt_id)?;
            store_revision(
                conn,
                &body.attempt_id,
                &session.user_id,
                body.parent_id.as_deref(),
                body.title.as_deref(),
                &body.state,
                Utc::now().naive_utc(),
            )
        })
        .await?;
    Ok(Json(json!({ "success": true, "revision_id": revision_id })))
}

pub async fn list(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
) -> AppResult<Json<Value>> {
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            let revisions = load_attempt_revisions(conn, &attempt_id)?
                .into_iter()
                .map(|r| revision_summary(&r))
                .collect::<Vec<_>>();
            Ok(json!({ "success": true, "revisions": revisions }))
        })
        .await?;
    Ok(Json(body))
}

pub async fn view(
    State(state): State<AppState>,
    session: Session,
    Path(revision_id): Path<String>,
) -> AppResult<Json<Value>> {
    let body = state
        .tx(move |conn| {
            let revision = require_revision(conn, &session, &revision_id)?;
            let mut summary = revision_summary(&revision);
            summary["state"] = Value::String(revision.state);
            Ok(json!({ "success": true, "revision": summary }))
        })
        .await?;
    Ok(Json(body))
}

pub async fn activate(
    State(state): State<AppState>,
    session: Session,
    Path(revision_id): Path<String>,
) -> AppResult<Json<Value>> {
    state
        .tx(move |conn| {
            require_revision(conn, &session, &revision_id)?;
            set_active_revision(conn, &revision_id)
        })
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct PreciousBody {
    is_precious: bool,
}

pub async fn set_precious(
    State(state): State<AppState>,
    session: Session,
    Path(revision_id): Path<String>,
    Json(body): Json<PreciousBody>,
) -> AppResult<Json<Value>> {
    state
        .tx(move |conn| {
            require_revision(conn, &session, &revision_id)?;
            mark_revision_precious(conn, &revision_id, body.is_precious)
        })
        .await?;
    Ok(Json(json!({ "success": true })))
}

fn revision_summary(revision: &WorkspaceRevision) -> Value {
    json!({
        "id": revision.id,
        "workspace_id": revision.workspace_id,
        "creator_id": revision.creator_id,
        "parent_id": revision.parent_id,
        "title": revision.title,
        "created_at": revision.created_at,
        "is_active": revision.is_active,
        "is_precious": revision.is_precious,
    })
}

fn require_revision(
    conn: &mut diesel::SqliteConnection,
    session: &Session,
    revision_id: &str,
) -> AppResult<WorkspaceRevision> {
    let attempt_id = get_revision_attempt_id(conn, revision_id)?
        .ok_or(ModelError::InvalidInput)?;
    require_ownership(conn, session, &attempt_id)?;
    load_revision(conn, revision_id)?
        .ok_or_else(|| ModelError::InvalidInput.into())
}
