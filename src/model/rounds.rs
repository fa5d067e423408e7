use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    schema::rounds,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    NotYetOpen,
    Open,
    Closed,
}

impl RoundStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::NotYetOpen => "not_yet_open",
            RoundStatus::Open => "open",
            RoundStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Queryable)]
pub struct Round {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub title: String,
    pub status: String,
    pub registration_opens_at: NaiveDateTime,
    pub registration_closes_at: NaiveDateTime,
    pub training_opens_at: NaiveDateTime,
    pub min_team_size: i64,
    pub max_team_size: i64,
    pub min_team_ratio: String,
    pub allow_team_changes: bool,
}

impl Round {
    pub fn status(&self) -> AppResult<RoundStatus> {
        match self.status.as_str() {
            "not_yet_open" => Ok(RoundStatus::NotYetOpen),
            "open" => Ok(RoundStatus::Open),
            "closed" => Ok(RoundStatus::Closed),
            other => Err(AppError::integrity(format!(
                "round {} has unknown status {:?}",
                self.id, other
            ))),
        }
    }

    pub fn is_open(&self) -> AppResult<bool> {
        Ok(self.status()? == RoundStatus::Open)
    }

    pub fn is_registration_open(&self, now: NaiveDateTime) -> bool {
        self.registration_opens_at <= now && now < self.registration_closes_at
    }

    pub fn is_training_open(&self, now: NaiveDateTime) -> bool {
        self.training_opens_at <= now
    }

    /// Minimum ratio of qualified members, e.g. "0.5".
    pub fn min_team_ratio(&self) -> AppResult<Decimal> {
        self.min_team_ratio.parse().map_err(|_| {
            AppError::integrity(format!(
                "round {} has bad min_team_ratio {:?}",
                self.id, self.min_team_ratio
            ))
        })
    }
}

pub fn load_round(conn: &mut SqliteConnection, round_id: &str) -> AppResult<Round> {
    rounds::table
        .find(round_id)
        .first::<Round>(conn)
        .optional()?
        .ok_or_else(|| AppError::integrity(format!("no such round {round_id}")))
}
