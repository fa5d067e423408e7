use diesel::prelude::*;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    schema::tasks,
};

/// A task definition: which backend materializes it and how to reach it.
/// `backend` is the registry key resolved at startup; `backend_url` and
/// `backend_auth` only matter to the HTTP backend.
#[derive(Debug, Clone, Queryable)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub backend: String,
    pub backend_url: Option<String>,
    pub backend_auth: Option<String>,
    pub frontend_url: Option<String>,
    pub params: String,
}

impl Task {
    pub fn params(&self) -> AppResult<Value> {
        serde_json::from_str(&self.params).map_err(|e| {
            AppError::integrity(format!("task {} has bad params: {e}", self.id))
        })
    }
}

pub fn load_task(conn: &mut SqliteConnection, task_id: &str) -> AppResult<Task> {
    tasks::table
        .find(task_id)
        .first::<Task>(conn)
        .optional()?
        .ok_or_else(|| AppError::integrity(format!("no such task {task_id}")))
}
