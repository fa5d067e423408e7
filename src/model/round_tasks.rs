use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    schema::round_tasks,
};

#[derive(Debug, Clone, Queryable)]
pub struct RoundTask {
    pub id: String,
    pub round_id: String,
    pub task_id: String,
    pub ordinal: i64,
    pub have_training_attempt: bool,
    /// None means unlimited timed attempts.
    pub max_timed_attempts: Option<i64>,
    /// Attempt duration in minutes; None means untimed.
    pub attempt_duration: Option<i64>,
    /// None means unlimited answers per attempt.
    pub max_attempt_answers: Option<i64>,
    pub max_score: String,
}

impl RoundTask {
    pub fn max_score(&self) -> AppResult<Decimal> {
        self.max_score.parse().map_err(|_| {
            AppError::integrity(format!(
                "round task {} has bad max_score {:?}",
                self.id, self.max_score
            ))
        })
    }
}

pub fn load_round_task(
    conn: &mut SqliteConnection,
    round_task_id: &str,
) -> AppResult<RoundTask> {
    round_tasks::table
        .find(round_task_id)
        .first::<RoundTask>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::integrity(format!("no such round task {round_task_id}"))
        })
}

pub fn load_round_tasks(
    conn: &mut SqliteConnection,
    round_id: &str,
) -> AppResult<Vec<RoundTask>> {
    Ok(round_tasks::table
        .filter(round_tasks::round_id.eq(round_id))
        .order_by(round_tasks::ordinal)
        .load::<RoundTask>(conn)?)
}
