use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ModelError},
    model::rounds::load_round,
    schema::participations,
};

#[derive(Debug, Clone, Queryable)]
pub struct Participation {
    pub id: String,
    pub team_id: String,
    pub round_id: String,
    pub created_at: NaiveDateTime,
    /// Best score achieved across timed attempts, as a decimal string.
    pub score: Option<String>,
    pub access_code: Option<String>,
    pub access_code_entered: bool,
}

impl Participation {
    pub fn score(&self) -> AppResult<Option<Decimal>> {
        match &self.score {
            None => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|_| {
                AppError::integrity(format!(
                    "participation {} has bad score {:?}",
                    self.id, text
                ))
            }),
        }
    }
}

pub fn load_participation(
    conn: &mut SqliteConnection,
    participation_id: &str,
) -> AppResult<Participation> {
    participations::table
        .find(participation_id)
        .first::<Participation>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::integrity(format!(
                "no such participation {participation_id}"
            ))
        })
}

/// Bind a team to a round. Registration must be open.
pub fn create_participation(
    conn: &mut SqliteConnection,
    team_id: &str,
    round_id: &str,
    access_code: Option<&str>,
    now: NaiveDateTime,
) -> AppResult<String> {
    let round = load_round(conn, round_id)?;
    if !round.is_registration_open(now) {
        return Err(ModelError::RegistrationClosed.into());
    }
    let participation_id = Uuid::now_v7().to_string();
    diesel::insert_into(participations::table)
        .values((
            participations::id.eq(&participation_id),
            participations::team_id.eq(team_id),
            participations::round_id.eq(round_id),
            participations::created_at.eq(now),
            participations::score.eq(None::<String>),
            participations::access_code.eq(access_code),
            participations::access_code_entered.eq(false),
        ))
        .execute(conn)?;
    Ok(participation_id)
}

/// The team's current participation is the latest one by creation time.
pub fn get_team_latest_participation(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> AppResult<Option<Participation>> {
    Ok(participations::table
        .filter(participations::team_id.eq(team_id))
        .order_by(participations::created_at.desc())
        .first::<Participation>(conn)
        .optional()?)
}

pub fn load_team_participations(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> AppResult<Vec<Participation>> {
    Ok(participations::table
        .filter(participations::team_id.eq(team_id))
        .order_by(participations::created_at)
        .load::<Participation>(conn)?)
}

/// Record a new best score. Callers only invoke this for non-training
/// attempts whose grading strictly beats the previous best.
pub fn update_participation_score(
    conn: &mut SqliteConnection,
    participation_id: &str,
    score: Decimal,
) -> AppResult<()> {
    diesel::update(participations::table.find(participation_id))
        .set(participations::score.eq(score.to_string()))
        .execute(conn)?;
    Ok(())
}

/// Round-specific access gate: mark the code as entered if it matches.
pub fn enter_participation_access_code(
    conn: &mut SqliteConnection,
    participation_id: &str,
    code: &str,
) -> AppResult<()> {
    let participation = load_participation(conn, participation_id)?;
    match &participation.access_code {
        Some(expected) if expected == code => {
            diesel::update(participations::table.find(participation_id))
                .set(participations::access_code_entered.eq(true))
                .execute(conn)?;
            Ok(())
        }
        _ => Err(ModelError::UnknownAccessCode.into()),
    }
}
