use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    error::{AppResult, ModelError},
    schema::workspaces,
};

/// Shared scratch area for an attempt, created when the task is assigned.
#[derive(Debug, Clone, Queryable)]
pub struct Workspace {
    pub id: String,
    pub attempt_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub title: String,
}

pub fn create_attempt_workspace(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    now: NaiveDateTime,
) -> AppResult<String> {
    let workspace_id = Uuid::now_v7().to_string();
    diesel::insert_into(workspaces::table)
        .values((
            workspaces::id.eq(&workspace_id),
            workspaces::attempt_id.eq(attempt_id),
            workspaces::created_at.eq(now),
            workspaces::updated_at.eq(now),
            workspaces::title.eq("Workspace"),
        ))
        .execute(conn)?;
    Ok(workspace_id)
}

pub fn get_attempt_workspace_id(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<String> {
    workspaces::table
        .filter(workspaces::attempt_id.eq(attempt_id))
        .select(workspaces::id)
        .first::<String>(conn)
        .optional()?
        .ok_or_else(|| ModelError::NoWorkspace.into())
}

pub fn touch_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &str,
    now: NaiveDateTime,
) -> AppResult<()> {
    diesel::update(workspaces::table.find(workspace_id))
        .set(workspaces::updated_at.eq(now))
        .execute(conn)?;
    Ok(())
}
