use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use serde_json::Value;

use crate::{
    backend::BackendRegistry,
    error::{AppError, AppResult, ModelError},
    model::{
        attempts::{load_attempt, mark_attempt_started},
        participations::load_participation,
        round_tasks::load_round_task,
        rounds::load_round,
        tasks::{Task, load_task},
        team_members::{MemberDelta, validate_team},
        teams::lock_team,
        workspaces::create_attempt_workspace,
    },
    schema::task_instances,
};

/// The materialized subject of an attempt. `attempt_id` is the primary key,
/// so the database guarantees at most one instance per attempt; a concurrent
/// duplicate insert surfaces as a unique violation, not a second instance.
#[derive(Debug, Clone, Queryable)]
pub struct TaskInstance {
    pub attempt_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub full_data: String,
    pub team_data: String,
}

impl TaskInstance {
    pub fn team_data(&self) -> AppResult<Value> {
        parse_payload(&self.team_data, &self.attempt_id)
    }

    pub fn full_data(&self) -> AppResult<Value> {
        parse_payload(&self.full_data, &self.attempt_id)
    }
}

fn parse_payload(text: &str, attempt_id: &str) -> AppResult<Value> {
    serde_json::from_str(text).map_err(|e| {
        AppError::integrity(format!(
            "task instance for attempt {attempt_id} has bad payload: {e}"
        ))
    })
}

pub fn get_task_instance(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<Option<TaskInstance>> {
    Ok(task_instances::table
        .find(attempt_id)
        .first::<TaskInstance>(conn)
        .optional()?)
}

pub fn load_task_instance(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<TaskInstance> {
    get_task_instance(conn, attempt_id)?
        .ok_or_else(|| ModelError::NoTaskInstance.into())
}

/// The task backing an attempt, via its round task.
pub fn get_attempt_task(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<Task> {
    let attempt = load_attempt(conn, attempt_id)?;
    let round_task = load_round_task(conn, &attempt.round_task_id)?;
    load_task(conn, &round_task.task_id)
}

/// Materialize the attempt's task, exactly once.
///
/// Assigning the task is the point of no return for the attempt: it stamps
/// `started_at` (arming the closing deadline for timed attempts) and locks
/// the team roster. A second assignment request, including a concurrent one,
/// fails with "already have a task".
#[tracing::instrument(skip(conn, backends))]
pub fn assign_task_instance(
    conn: &mut SqliteConnection,
    backends: &BackendRegistry,
    attempt_id: &str,
    now: NaiveDateTime,
) -> AppResult<()> {
    let attempt = load_attempt(conn, attempt_id)?;
    if get_task_instance(conn, attempt_id)?.is_some() {
        return Err(ModelError::AlreadyHaveTask.into());
    }

    let participation = load_participation(conn, &attempt.participation_id)?;
    let round_task = load_round_task(conn, &attempt.round_task_id)?;
    let round = load_round(conn, &participation.round_id)?;
    if !round.is_open()? {
        return Err(ModelError::RoundNotOpen.into());
    }
    if attempt.is_training && !round.is_training_open(now) {
        return Err(ModelError::TrainingNotOpen.into());
    }
    validate_team(conn, &participation.team_id, &round, MemberDelta::None)?;

    let task = load_task(conn, &round_task.task_id)?;
    let backend = backends.get(&task.backend).ok_or_else(|| {
        AppError::integrity(format!(
            "no backend registered for {:?}",
            task.backend
        ))
    })?;
    let generated = backend
        .generate(&task, seed_for_attempt(attempt_id))
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let inserted = diesel::insert_into(task_instances::table)
        .values((
            task_instances::attempt_id.eq(attempt_id),
            task_instances::created_at.eq(now),
            task_instances::updated_at.eq(now),
            task_instances::full_data.eq(generated.full_data.to_string()),
            task_instances::team_data.eq(generated.team_data.to_string()),
        ))
        .execute(conn)
        .map_err(AppError::from);
    match inserted {
        Ok(_) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(ModelError::AlreadyHaveTask.into());
        }
        Err(e) => return Err(e),
    }

    // Training attempts are untimed; the duration only arms timed ones.
    let duration = if attempt.is_training {
        None
    } else {
        round_task.attempt_duration.map(Duration::minutes)
    };
    mark_attempt_started(conn, attempt_id, now, duration)?;
    lock_team(conn, &participation.team_id)?;
    create_attempt_workspace(conn, attempt_id, now)?;
    Ok(())
}

/// Persist backend-updated payloads (after a granted hint or a reset).
pub fn update_task_instance(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    team_data: &Value,
    full_data: &Value,
    now: NaiveDateTime,
) -> AppResult<()> {
    diesel::update(task_instances::table.find(attempt_id))
        .set((
            task_instances::team_data.eq(team_data.to_string()),
            task_instances::full_data.eq(full_data.to_string()),
            task_instances::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

/// Deterministic generation seed, derived from the attempt id (FNV-1a), so
/// regenerating the same attempt's task yields the same instance.
pub fn seed_for_attempt(attempt_id: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in attempt_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_stable_and_id_sensitive() {
        let a = seed_for_attempt("0191e7a0-0000-7000-8000-000000000001");
        let b = seed_for_attempt("0191e7a0-0000-7000-8000-000000000001");
        let c = seed_for_attempt("0191e7a0-0000-7000-8000-000000000002");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
