use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    backend::Grading,
    error::{AppError, AppResult, ModelError},
    model::{
        access_codes::{delete_attempt_access_codes, generate_access_codes},
        participations::load_participation,
        round_tasks::load_round_task,
        rounds::load_round,
    },
    schema::{attempts, participations},
};

/// One slot in a team's attempt lineage for a round task.
///
/// Lifecycle per (participation, round task):
/// `TRAINING(unsolved) -> TRAINING(solved) -> TIMED#1 -> TIMED#2 -> ...`
/// Exactly one attempt is current at a time; older attempts are kept for
/// answer history.
#[derive(Debug, Clone, Queryable)]
pub struct Attempt {
    pub id: String,
    pub participation_id: String,
    pub round_task_id: String,
    pub ordinal: i64,
    pub created_at: NaiveDateTime,
    /// Set exactly once, when a task instance is assigned.
    pub started_at: Option<NaiveDateTime>,
    pub closes_at: Option<NaiveDateTime>,
    pub is_current: bool,
    pub is_training: bool,
    pub is_unsolved: bool,
    pub is_fully_solved: bool,
}

impl Attempt {
    pub fn is_closed(&self, now: NaiveDateTime) -> bool {
        self.closes_at.is_some_and(|t| t < now)
    }

    /// A training attempt is completed by any amount of solving; a timed
    /// attempt when fully solved or closed.
    pub fn is_completed(&self, now: NaiveDateTime) -> bool {
        if self.is_training {
            !self.is_unsolved
        } else {
            self.is_fully_solved || self.is_closed(now)
        }
    }
}

pub fn load_attempt(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<Attempt> {
    attempts::table
        .find(attempt_id)
        .first::<Attempt>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::integrity(format!("no such attempt {attempt_id}"))
        })
}

pub fn get_current_attempt(
    conn: &mut SqliteConnection,
    participation_id: &str,
    round_task_id: &str,
) -> AppResult<Option<Attempt>> {
    Ok(attempts::table
        .filter(attempts::participation_id.eq(participation_id))
        .filter(attempts::round_task_id.eq(round_task_id))
        .filter(attempts::is_current)
        .first::<Attempt>(conn)
        .optional()?)
}

pub fn load_participation_attempts(
    conn: &mut SqliteConnection,
    participation_id: &str,
) -> AppResult<Vec<Attempt>> {
    Ok(attempts::table
        .filter(attempts::participation_id.eq(participation_id))
        .order_by((attempts::round_task_id, attempts::ordinal))
        .load::<Attempt>(conn)?)
}

/// The id of the team performing the attempt, for ownership checks.
pub fn get_attempt_team_id(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<String> {
    attempts::table
        .inner_join(participations::table)
        .filter(attempts::id.eq(attempt_id))
        .select(participations::team_id)
        .first::<String>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::integrity(format!("no such attempt {attempt_id}"))
        })
}

/// Open the next attempt in the lineage and make it current.
///
/// The first attempt of a slot is a training attempt when the round task has
/// one. After that: the training attempt must be solved, the creation
/// cooldown must have elapsed, and the timed-attempt limit (which does not
/// count training) must not be reached.
#[tracing::instrument(skip(conn))]
pub fn create_attempt(
    conn: &mut SqliteConnection,
    participation_id: &str,
    round_task_id: &str,
    now: NaiveDateTime,
    cooldown: Duration,
) -> AppResult<String> {
    let participation = load_participation(conn, participation_id)?;
    let round_task = load_round_task(conn, round_task_id)?;
    if participation.round_id != round_task.round_id {
        return Err(AppError::integrity(format!(
            "participation {participation_id} and round task {round_task_id} \
             belong to different rounds"
        )));
    }
    let round = load_round(conn, &participation.round_id)?;
    if !round.is_open()? {
        return Err(ModelError::RoundNotOpen.into());
    }

    let current = get_current_attempt(conn, participation_id, round_task_id)?;
    let is_training = match &current {
        None => round_task.have_training_attempt,
        Some(current) => {
            if current.is_training && current.is_unsolved {
                return Err(ModelError::MustPassTraining.into());
            }
            if !current.is_training {
                // The current attempt is the most recently created one.
                if now < current.created_at + cooldown {
                    return Err(ModelError::AttemptTooSoon.into());
                }
            }
            if let Some(max) = round_task.max_timed_attempts {
                if count_timed_attempts(conn, participation_id, round_task_id)?
                    >= max
                {
                    return Err(ModelError::TooManyAttempts.into());
                }
            }
            set_attempt_current(conn, &current.id, false)?;
            false
        }
    };

    let ordinal = next_ordinal(conn, participation_id, round_task_id)?;
    let attempt_id = Uuid::now_v7().to_string();
    diesel::insert_into(attempts::table)
        .values((
            attempts::id.eq(&attempt_id),
            attempts::participation_id.eq(participation_id),
            attempts::round_task_id.eq(round_task_id),
            attempts::ordinal.eq(ordinal),
            attempts::created_at.eq(now),
            attempts::started_at.eq(None::<NaiveDateTime>),
            attempts::closes_at.eq(None::<NaiveDateTime>),
            attempts::is_current.eq(true),
            attempts::is_training.eq(is_training),
            attempts::is_unsolved.eq(true),
            attempts::is_fully_solved.eq(false),
        ))
        .execute(conn)?;

    // One confirmation code per current team member.
    generate_access_codes(conn, &participation.team_id, &attempt_id)?;

    Ok(attempt_id)
}

/// Delete an attempt that has not been assigned a task yet.
pub fn cancel_attempt(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<()> {
    let attempt = load_attempt(conn, attempt_id)?;
    if attempt.started_at.is_some() {
        return Err(ModelError::CannotCancelStartedAttempt.into());
    }
    delete_attempt_access_codes(conn, attempt_id)?;
    diesel::delete(attempts::table.find(attempt_id)).execute(conn)?;
    Ok(())
}

/// Make the most recent training attempt current again, once the current
/// timed attempt is completed. A no-op when the current attempt is already
/// the training one, so concurrent double-clicks do not surface an error.
#[tracing::instrument(skip(conn))]
pub fn reset_to_training_attempt(
    conn: &mut SqliteConnection,
    participation_id: &str,
    round_task_id: &str,
    now: NaiveDateTime,
) -> AppResult<()> {
    if let Some(current) =
        get_current_attempt(conn, participation_id, round_task_id)?
    {
        if !current.is_completed(now) {
            if current.is_training {
                return Ok(());
            }
            return Err(ModelError::TimedAttemptNotCompleted.into());
        }
        set_attempt_current(conn, &current.id, false)?;
    }
    let latest_training = attempts::table
        .filter(attempts::participation_id.eq(participation_id))
        .filter(attempts::round_task_id.eq(round_task_id))
        .filter(attempts::is_training)
        .order_by(attempts::created_at.desc())
        .select(attempts::id)
        .first::<String>(conn)
        .optional()?;
    if let Some(attempt_id) = latest_training {
        set_attempt_current(conn, &attempt_id, true)?;
    }
    Ok(())
}

/// Fold a grading into the attempt's solved flags. Monotonic: flags are set,
/// never cleared.
pub fn update_attempt_with_grading(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    grading: &Grading,
) -> AppResult<()> {
    if grading.is_solution {
        diesel::update(attempts::table.find(attempt_id))
            .set(attempts::is_unsolved.eq(false))
            .execute(conn)?;
    }
    if grading.is_full_solution {
        diesel::update(attempts::table.find(attempt_id))
            .set(attempts::is_fully_solved.eq(true))
            .execute(conn)?;
    }
    Ok(())
}

/// Stamp the attempt as started. `started_at` is written exactly once, by
/// the task instance allocator.
pub fn mark_attempt_started(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    now: NaiveDateTime,
    duration: Option<Duration>,
) -> AppResult<()> {
    let closes_at = duration.map(|d| now + d);
    diesel::update(attempts::table.find(attempt_id))
        .set((
            attempts::started_at.eq(now),
            attempts::closes_at.eq(closes_at),
        ))
        .execute(conn)?;
    Ok(())
}

fn set_attempt_current(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    is_current: bool,
) -> AppResult<()> {
    diesel::update(attempts::table.find(attempt_id))
        .set(attempts::is_current.eq(is_current))
        .execute(conn)?;
    Ok(())
}

fn count_timed_attempts(
    conn: &mut SqliteConnection,
    participation_id: &str,
    round_task_id: &str,
) -> AppResult<i64> {
    Ok(attempts::table
        .filter(attempts::participation_id.eq(participation_id))
        .filter(attempts::round_task_id.eq(round_task_id))
        .filter(attempts::is_training.eq(false))
        .count()
        .get_result::<i64>(conn)?)
}

/// Ordinals are gap-free per slot: max + 1, read and written inside the same
/// transaction as the insert.
fn next_ordinal(
    conn: &mut SqliteConnection,
    participation_id: &str,
    round_task_id: &str,
) -> AppResult<i64> {
    let latest = attempts::table
        .filter(attempts::participation_id.eq(participation_id))
        .filter(attempts::round_task_id.eq(round_task_id))
        .order_by(attempts::ordinal.desc())
        .select(attempts::ordinal)
        .first::<i64>(conn)
        .optional()?;
    Ok(latest.unwrap_or(0) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn attempt(
        is_training: bool,
        is_unsolved: bool,
        is_fully_solved: bool,
        closes_at: Option<NaiveDateTime>,
    ) -> Attempt {
        Attempt {
            id: "a".into(),
            participation_id: "p".into(),
            round_task_id: "rt".into(),
            ordinal: 1,
            created_at: t(10, 0),
            started_at: None,
            closes_at,
            is_current: true,
            is_training,
            is_unsolved,
            is_fully_solved,
        }
    }

    fn t(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn training_attempt_completed_by_solving() {
        let now = t(12, 0);
        assert!(!attempt(true, true, false, None).is_completed(now));
        assert!(attempt(true, false, false, None).is_completed(now));
    }

    #[test]
    fn timed_attempt_completed_when_closed_or_fully_solved() {
        let now = t(12, 0);
        assert!(!attempt(false, true, false, None).is_completed(now));
        assert!(attempt(false, true, true, None).is_completed(now));
        assert!(attempt(false, true, false, Some(t(11, 0))).is_completed(now));
        assert!(!attempt(false, true, false, Some(t(13, 0))).is_completed(now));
    }

    #[test]
    fn closing_time_is_exclusive() {
        let now = t(12, 0);
        let at_deadline = attempt(false, true, false, Some(now));
        assert!(!at_deadline.is_closed(now));
    }
}
