//! Attempt lifecycle, task access, hints and answers.
//!
//! Every handler runs one transaction; ownership is checked inside it so the
//! team lookup and the mutation see the same state.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    auth::Session,
    error::{AppResult, ModelError},
    model::{
        access_codes::{get_access_code, load_access_codes, unlock_access_code},
        answers::{grade_answer, load_attempt_answers},
        attempts::{
            cancel_attempt, create_attempt, get_attempt_team_id,
            get_current_attempt, load_attempt, load_participation_attempts,
            reset_to_training_attempt,
        },
        hints::{get_task_instance_hint, reset_task_instance_hints},
        participations::load_participation,
        round_tasks::load_round_tasks,
        task_instances::{
            assign_task_instance, get_attempt_task, load_task_instance,
        },
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateAttemptBody {
    participation_id: String,
    round_task_id: String,
}

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CreateAttemptBody>,
) -> AppResult<Json<Value>> {
    let cooldown = Duration::seconds(state.config.attempt_cooldown_secs);
    let attempt_id = state
        .tx(move |conn| {
            let participation =
                load_participation(conn, &body.participation_id)?;
            if !session.owns_team(&participation.team_id) {
                return Err(ModelError::Forbidden.into());
            }
            create_attempt(
                conn,
                &body.participation_id,
                &body.round_task_id,
                Utc::now().naive_utc(),
                cooldown,
            )
        })
        .await?;
    Ok(Json(json!({ "success": true, "attempt_id": attempt_id })))
}

pub async fn cancel(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
) -> AppResult<Json<Value>> {
    state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            cancel_attempt(conn, &attempt_id)
        })
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct ResetToTrainingBody {
    participation_id: String,
    round_task_id: String,
}

pub async fn reset_to_training(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<ResetToTrainingBody>,
) -> AppResult<Json<Value>> {
    state
        .tx(move |conn| {
            let participation =
                load_participation(conn, &body.participation_id)?;
            if !session.owns_team(&participation.team_id) {
                return Err(ModelError::Forbidden.into());
            }
            reset_to_training_attempt(
                conn,
                &body.participation_id,
                &body.round_task_id,
                Utc::now().naive_utc(),
            )
        })
        .await?;
    Ok(Json(json!({ "success": true })))
}

/// The participation's round tasks and attempts, for the task selection
/// screen.
pub async fn list(
    State(state): State<AppState>,
    session: Session,
    Path(participation_id): Path<String>,
) -> AppResult<Json<Value>> {
    let body = state
        .tx(move |conn| {
            let participation = load_participation(conn, &participation_id)?;
            if !session.owns_team(&participation.team_id) {
                return Err(ModelError::Forbidden.into());
            }
            let round_tasks =
                load_round_tasks(conn, &participation.round_id)?
                    .into_iter()
                    .map(|rt| {
                        Ok(json!({
                            "id": rt.id,
                            "task_id": rt.task_id,
                            "ordinal": rt.ordinal,
                            "have_training_attempt": rt.have_training_attempt,
                            "max_timed_attempts": rt.max_timed_attempts,
                            "attempt_duration": rt.attempt_duration,
                            "max_attempt_answers": rt.max_attempt_answers,
                            "max_score": rt.max_score()?.to_string(),
                        }))
                    })
                    .collect::<AppResult<Vec<_>>>()?;
            let now = Utc::now().naive_utc();
            let attempts = load_participation_attempts(conn, &participation_id)?
                .into_iter()
                .map(|a| {
                    json!({
                        "id": a.id,
                        "round_task_id": a.round_task_id,
                        "ordinal": a.ordinal,
                        "created_at": a.created_at,
                        "started_at": a.started_at,
                        "closes_at": a.closes_at,
                        "is_current": a.is_current,
                        "is_training": a.is_training,
                        "is_unsolved": a.is_unsolved,
                        "is_fully_solved": a.is_fully_solved,
                        "is_closed": a.is_closed(now),
                        "is_completed": a.is_completed(now),
                    })
                })
                .collect::<Vec<_>>();
            Ok(json!({
                "success": true,
                "round_tasks": round_tasks,
                "attempts": attempts,
            }))
        })
        .await?;
    Ok(Json(body))
}

/// The task instance behind the slot's current attempt, for resuming work
/// without knowing the attempt id.
pub async fn current_task(
    State(state): State<AppState>,
    session: Session,
    Path((participation_id, round_task_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let body = state
        .tx(move |conn| {
            let participation = load_participation(conn, &participation_id)?;
            if !session.owns_team(&participation.team_id) {
                return Err(ModelError::Forbidden.into());
            }
            let attempt =
                get_current_attempt(conn, &participation_id, &round_task_id)?
                    .ok_or(ModelError::NoCurrentAttempt)?;
            let instance = load_task_instance(conn, &attempt.id)?;
            Ok(json!({
                "success": true,
                "attempt_id": attempt.id,
                "task": instance.team_data()?,
            }))
        })
        .await?;
    Ok(Json(body))
}

/// Materialize the attempt's task. Point of no return: locks the team and
/// starts the clock on timed attempts.
pub async fn assign_task(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
) -> AppResult<Json<Value>> {
    let backends = state.backends.clone();
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            assign_task_instance(
                conn,
                &backends,
                &attempt_id,
                Utc::now().naive_utc(),
            )?;
            let instance = load_task_instance(conn, &attempt_id)?;
            Ok(json!({ "success": true, "task": instance.team_data()? }))
        })
        .await?;
    Ok(Json(body))
}

pub async fn view_task(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
) -> AppResult<Json<Value>> {
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            let task = get_attempt_task(conn, &attempt_id)?;
            let instance = load_task_instance(conn, &attempt_id)?;
            Ok(json!({
                "success": true,
                "title": task.title,
                "frontend_url": task.frontend_url,
                "task": instance.team_data()?,
            }))
        })
        .await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct UnlockBody {
    code: String,
}

/// Confirm a member's participation in the attempt with their personal code.
pub async fn unlock(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
    Json(body): Json<UnlockBody>,
) -> AppResult<Json<Value>> {
    let unlocked = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            unlock_access_code(conn, &attempt_id, &session.user_id, &body.code)
        })
        .await?;
    if !unlocked {
        return Err(ModelError::UnknownAccessCode.into());
    }
    Ok(Json(json!({ "success": true })))
}

/// The caller's own code plus the unlock state of the whole roster.
pub async fn access_codes(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
) -> AppResult<Json<Value>> {
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            let own = get_access_code(conn, &attempt_id, &session.user_id)?;
            let codes = load_access_codes(conn, &attempt_id)?
                .into_iter()
                .map(|c| {
                    json!({
                        "user_id": c.user_id,
                        "is_unlocked": c.is_unlocked,
                    })
                })
                .collect::<Vec<_>>();
            Ok(json!({ "success": true, "code": own, "codes": codes }))
        })
        .await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct HintBody {
    query: Value,
}

pub async fn hint(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
    Json(body): Json<HintBody>,
) -> AppResult<Json<Value>> {
    let backends = state.backends.clone();
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            let granted = get_task_instance_hint(
                conn,
                &backends,
                &attempt_id,
                &body.query,
                Utc::now().naive_utc(),
            )?;
            let instance = load_task_instance(conn, &attempt_id)?;
            Ok(json!({
                "success": granted,
                "task": instance.team_data()?,
            }))
        })
        .await?;
    Ok(Json(body))
}

pub async fn reset_hints(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
) -> AppResult<Json<Value>> {
    let backends = state.backends.clone();
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            reset_task_instance_hints(
                conn,
                &backends,
                &attempt_id,
                session.is_admin(),
                Utc::now().naive_utc(),
            )?;
            let instance = load_task_instance(conn, &attempt_id)?;
            Ok(json!({ "success": true, "task": instance.team_data()? }))
        })
        .await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
    answer: Value,
    revision_id: Option<String>,
}

pub async fn submit_answer(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
    Json(body): Json<AnswerBody>,
) -> AppResult<Json<Value>> {
    let backends = state.backends.clone();
    let cooldown = Duration::seconds(state.config.answer_cooldown_secs);
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            let (answer_id, grading) = grade_answer(
                conn,
                &backends,
                &attempt_id,
                &session.user_id,
                body.revision_id.as_deref(),
                &body.answer,
                Utc::now().naive_utc(),
                cooldown,
            )?;
            Ok(json!({
                "success": true,
                "answer_id": answer_id,
                "feedback": grading.feedback,
                "score": grading.score.to_string(),
                "is_solution": grading.is_solution,
                "is_full_solution": grading.is_full_solution,
            }))
        })
        .await?;
    Ok(Json(body))
}

pub async fn list_answers(
    State(state): State<AppState>,
    session: Session,
    Path(attempt_id): Path<String>,
) -> AppResult<Json<Value>> {
    let body = state
        .tx(move |conn| {
            require_ownership(conn, &session, &attempt_id)?;
            let attempt = load_attempt(conn, &attempt_id)?;
            let answers = load_attempt_answers(conn, &attempt_id)?
                .into_iter()
                .map(|a| {
                    json!({
                        "id": a.id,
                        "submitter_id": a.submitter_id,
                        "ordinal": a.ordinal,
                        "created_at": a.created_at,
                        "score": a.score,
                        "is_solution": a.is_solution,
                        "is_full_solution": a.is_full_solution,
                        "revision_id": a.revision_id,
                    })
                })
                .collect::<Vec<_>>();
            Ok(json!({
                "success": true,
                "is_training": attempt.is_training,
                "answers": answers,
            }))
        })
        .await?;
    Ok(Json(body))
}

/// The team performing the attempt must be the caller's.
pub(super) fn require_ownership(
    conn: &mut diesel::SqliteConnection,
    session: &Session,
    attempt_id: &str,
) -> AppResult<()> {
    let team_id = get_attempt_team_id(conn, attempt_id)?;
    if !session.owns_team(&team_id) {
        return Err(ModelError::Forbidden.into());
    }
    Ok(())
}
