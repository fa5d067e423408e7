use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    backend::{BackendRegistry, Grading},
    error::{AppError, AppResult, ModelError},
    model::{
        attempts::{load_attempt, update_attempt_with_grading},
        participations::{load_participation, update_participation_score},
        round_tasks::load_round_task,
        rounds::load_round,
        task_instances::load_task_instance,
        tasks::load_task,
    },
    schema::answers,
};

/// A graded submission. Immutable once written; the grading and score are
/// stored alongside the answer so history survives task or backend changes.
#[derive(Debug, Clone, Queryable)]
pub struct Answer {
    pub id: String,
    pub attempt_id: String,
    pub submitter_id: String,
    pub ordinal: i64,
    pub created_at: NaiveDateTime,
    pub answer: String,
    pub grading: String,
    pub score: String,
    pub is_solution: bool,
    pub is_full_solution: bool,
    pub revision_id: Option<String>,
}

impl Answer {
    pub fn score(&self) -> AppResult<Decimal> {
        self.score.parse().map_err(|_| {
            AppError::integrity(format!(
                "answer {} has bad score {:?}",
                self.id, self.score
            ))
        })
    }
}

pub fn load_attempt_answers(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<Vec<Answer>> {
    Ok(answers::table
        .filter(answers::attempt_id.eq(attempt_id))
        .order_by(answers::ordinal)
        .load::<Answer>(conn)?)
}

/// Grade and record a submission against the attempt's task instance.
///
/// Rate limiting pairs submissions: a new answer is allowed once the
/// cooldown has elapsed since the second most recent one, so teams can
/// immediately correct a typo but cannot submit continuously. Non-training
/// attempts also honor the round task's answer cap, and only they can raise
/// the participation's best score.
#[tracing::instrument(skip(conn, backends, answer_data))]
pub fn grade_answer(
    conn: &mut SqliteConnection,
    backends: &BackendRegistry,
    attempt_id: &str,
    submitter_id: &str,
    revision_id: Option<&str>,
    answer_data: &Value,
    now: NaiveDateTime,
    cooldown: Duration,
) -> AppResult<(String, Grading)> {
    let attempt = load_attempt(conn, attempt_id)?;
    if attempt.is_closed(now) {
        return Err(ModelError::AttemptClosed.into());
    }
    let participation = load_participation(conn, &attempt.participation_id)?;
    let round_task = load_round_task(conn, &attempt.round_task_id)?;
    let round = load_round(conn, &participation.round_id)?;
    if !round.is_open()? {
        return Err(ModelError::RoundNotOpen.into());
    }

    let latest: Vec<(i64, NaiveDateTime)> = answers::table
        .filter(answers::attempt_id.eq(attempt_id))
        .order_by(answers::ordinal.desc())
        .select((answers::ordinal, answers::created_at))
        .limit(2)
        .load(conn)?;
    let prev_ordinal = latest.first().map(|(ord, _)| *ord).unwrap_or(0);
    if !attempt.is_training {
        if let Some(max) = round_task.max_attempt_answers {
            if prev_ordinal >= max {
                return Err(ModelError::TooManyAnswers.into());
            }
        }
    }
    if let Some((_, second_created)) = latest.get(1) {
        if now < *second_created + cooldown {
            return Err(ModelError::TooSoon.into());
        }
    }

    let instance = load_task_instance(conn, attempt_id)?;
    let task = load_task(conn, &round_task.task_id)?;
    let backend = backends.get(&task.backend).ok_or_else(|| {
        AppError::integrity(format!(
            "no backend registered for {:?}",
            task.backend
        ))
    })?;
    let grading = backend
        .grade(
            &task,
            &instance.full_data()?,
            &instance.team_data()?,
            answer_data,
        )
        .map_err(|e| AppError::Upstream(e.to_string()))?
        .ok_or(ModelError::InvalidInput)?;

    update_attempt_with_grading(conn, attempt_id, &grading)?;

    let answer_id = Uuid::now_v7().to_string();
    diesel::insert_into(answers::table)
        .values((
            answers::id.eq(&answer_id),
            answers::attempt_id.eq(attempt_id),
            answers::submitter_id.eq(submitter_id),
            answers::ordinal.eq(prev_ordinal + 1),
            answers::created_at.eq(now),
            answers::answer.eq(answer_data.to_string()),
            answers::grading.eq(grading.to_json().to_string()),
            answers::score.eq(grading.score.to_string()),
            answers::is_solution.eq(grading.is_solution),
            answers::is_full_solution.eq(grading.is_full_solution),
            answers::revision_id.eq(revision_id),
        ))
        .execute(conn)?;

    // Training scores never count; otherwise keep the best score only.
    if !attempt.is_training {
        let best = participation.score()?;
        if best.is_none_or(|best| grading.score > best) {
            update_participation_score(conn, &participation.id, grading.score)?;
        }
    }

    Ok((answer_id, grading))
}
