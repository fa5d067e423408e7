//! Hint granting. Whether a query is valid and what it costs is the
//! backend's call; this module enforces when hints may be requested at all
//! and persists the updated payloads.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde_json::Value;

use crate::{
    backend::BackendRegistry,
    error::{AppError, AppResult, ModelError},
    model::{
        attempts::load_attempt,
        participations::load_participation,
        round_tasks::load_round_task,
        rounds::load_round,
        task_instances::{load_task_instance, update_task_instance},
        tasks::load_task,
    },
};

/// Ask the backend to reveal part of the task. Returns whether the hint was
/// granted; a refusal (unaffordable, already revealed, malformed query) is
/// not an error and leaves the instance untouched.
#[tracing::instrument(skip(conn, backends, query))]
pub fn get_task_instance_hint(
    conn: &mut SqliteConnection,
    backends: &BackendRegistry,
    attempt_id: &str,
    query: &Value,
    now: NaiveDateTime,
) -> AppResult<bool> {
    let attempt = load_attempt(conn, attempt_id)?;
    if attempt.is_closed(now) {
        return Err(ModelError::AttemptClosed.into());
    }
    let participation = load_participation(conn, &attempt.participation_id)?;
    let round = load_round(conn, &participation.round_id)?;
    if !round.is_open()? {
        return Err(ModelError::RoundNotOpen.into());
    }

    let instance = load_task_instance(conn, attempt_id)?;
    let round_task = load_round_task(conn, &attempt.round_task_id)?;
    let task = load_task(conn, &round_task.task_id)?;
    let backend = backends.get(&task.backend).ok_or_else(|| {
        AppError::integrity(format!(
            "no backend registered for {:?}",
            task.backend
        ))
    })?;

    let outcome = backend
        .grant_hint(&task, &instance.full_data()?, &instance.team_data()?, query)
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    if outcome.success {
        update_task_instance(
            conn,
            attempt_id,
            &outcome.team_data,
            &outcome.full_data,
            now,
        )?;
    }
    Ok(outcome.success)
}

/// Restore the pristine team payload, returning the hint budget. Reserved
/// for training attempts unless `force` is set (admin override).
#[tracing::instrument(skip(conn, backends))]
pub fn reset_task_instance_hints(
    conn: &mut SqliteConnection,
    backends: &BackendRegistry,
    attempt_id: &str,
    force: bool,
    now: NaiveDateTime,
) -> AppResult<()> {
    let attempt = load_attempt(conn, attempt_id)?;
    if !attempt.is_training && !force {
        return Err(ModelError::Forbidden.into());
    }
    let instance = load_task_instance(conn, attempt_id)?;
    let round_task = load_round_task(conn, &attempt.round_task_id)?;
    let task = load_task(conn, &round_task.task_id)?;
    let backend = backends.get(&task.backend).ok_or_else(|| {
        AppError::integrity(format!(
            "no backend registered for {:?}",
            task.backend
        ))
    })?;

    let full_data = instance.full_data()?;
    let team_data = backend
        .reset_hints(&task, &full_data)
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    update_task_instance(conn, attempt_id, &team_data, &full_data, now)
}
