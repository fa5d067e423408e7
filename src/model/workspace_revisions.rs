//! Workspace revision history. Revisions are immutable snapshots of the
//! team's shared solving state, forming a tree through `parent_id`.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    error::{AppResult, ModelError},
    model::workspaces::{get_attempt_workspace_id, touch_workspace},
    schema::{workspace_revisions, workspaces},
};

#[derive(Debug, Clone, Queryable)]
pub struct WorkspaceRevision {
    pub id: String,
    pub workspace_id: String,
    pub creator_id: String,
    pub parent_id: Option<String>,
    pub title: Option<String>,
    pub created_at: NaiveDateTime,
    pub is_active: bool,
    pub is_precious: bool,
    /// Opaque frontend state, stored verbatim.
    pub state: String,
}

/// Snapshot the attempt's workspace. The parent, when given, must belong to
/// the same workspace.
#[tracing::instrument(skip(conn, state))]
pub fn store_revision(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    creator_id: &str,
    parent_id: Option<&str>,
    title: Option<&str>,
    state: &str,
    now: NaiveDateTime,
) -> AppResult<String> {
    let workspace_id = get_attempt_workspace_id(conn, attempt_id)?;
    if let Some(parent_id) = parent_id {
        let parent_workspace = workspace_revisions::table
            .find(parent_id)
            .select(workspace_revisions::workspace_id)
            .first::<String>(conn)
            .optional()?;
        if parent_workspace.as_deref() != Some(&workspace_id) {
            return Err(ModelError::InvalidInput.into());
        }
    }
    let revision_id = Uuid::now_v7().to_string();
    diesel::insert_into(workspace_revisions::table)
        .values((
            workspace_revisions::id.eq(&revision_id),
            workspace_revisions::workspace_id.eq(&workspace_id),
            workspace_revisions::creator_id.eq(creator_id),
            workspace_revisions::parent_id.eq(parent_id),
            workspace_revisions::title.eq(title),
            workspace_revisions::created_at.eq(now),
            workspace_revisions::is_active.eq(false),
            workspace_revisions::is_precious.eq(false),
            workspace_revisions::state.eq(state),
        ))
        .execute(conn)?;
    touch_workspace(conn, &workspace_id, now)?;
    Ok(revision_id)
}

pub fn load_revision(
    conn: &mut SqliteConnection,
    revision_id: &str,
) -> AppResult<Option<WorkspaceRevision>> {
    Ok(workspace_revisions::table
        .find(revision_id)
        .first::<WorkspaceRevision>(conn)
        .optional()?)
}

/// The attempt a revision belongs to, for ownership checks.
pub fn get_revision_attempt_id(
    conn: &mut SqliteConnection,
    revision_id: &str,
) -> AppResult<Option<String>> {
    Ok(workspace_revisions::table
        .inner_join(workspaces::table)
        .filter(workspace_revisions::id.eq(revision_id))
        .select(workspaces::attempt_id)
        .first::<String>(conn)
        .optional()?)
}

pub fn load_attempt_revisions(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<Vec<WorkspaceRevision>> {
    Ok(workspace_revisions::table
        .inner_join(workspaces::table)
        .filter(workspaces::attempt_id.eq(attempt_id))
        .order_by(workspace_revisions::created_at)
        .select(workspace_revisions::all_columns)
        .load::<WorkspaceRevision>(conn)?)
}

/// Flip which revision the team's frontends follow. Only one revision per
/// workspace is active.
pub fn set_active_revision(
    conn: &mut SqliteConnection,
    revision_id: &str,
) -> AppResult<()> {
    let workspace_id = workspace_revisions::table
        .find(revision_id)
        .select(workspace_revisions::workspace_id)
        .first::<String>(conn)
        .optional()?
        .ok_or(ModelError::InvalidInput)?;
    diesel::update(
        workspace_revisions::table
            .filter(workspace_revisions::workspace_id.eq(&workspace_id)),
    )
    .set(workspace_revisions::is_active.eq(false))
    .execute(conn)?;
    diesel::update(workspace_revisions::table.find(revision_id))
        .set(workspace_revisions::is_active.eq(true))
        .execute(conn)?;
    Ok(())
}

/// Precious revisions are kept when old history is pruned.
pub fn mark_revision_precious(
    conn: &mut SqliteConnection,
    revision_id: &str,
    is_precious: bool,
) -> AppResult<()> {
    diesel::update(workspace_revisions::table.find(revision_id))
        .set(workspace_revisions::is_precious.eq(is_precious))
        .execute(conn)?;
    Ok(())
}
