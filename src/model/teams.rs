use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    codes::generate_code,
    error::{AppError, AppResult},
    schema::teams,
};

#[derive(Debug, Clone, Queryable)]
pub struct Team {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub code: String,
    pub is_open: bool,
    pub is_locked: bool,
    pub region: Option<String>,
}

pub fn load_team(conn: &mut SqliteConnection, team_id: &str) -> AppResult<Team> {
    teams::table
        .find(team_id)
        .first::<Team>(conn)
        .optional()?
        .ok_or_else(|| AppError::integrity(format!("no such team {team_id}")))
}

pub fn find_team_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> AppResult<Option<String>> {
    Ok(teams::table
        .filter(teams::code.eq(code))
        .select(teams::id)
        .first::<String>(conn)
        .optional()?)
}

/// Create an empty team with a fresh join code and return its id.
pub fn create_empty_team(
    conn: &mut SqliteConnection,
    now: NaiveDateTime,
) -> AppResult<String> {
    // The column has a unique index; retry on the (unlikely) collision.
    let mut code = generate_code();
    while find_team_by_code(conn, &code)?.is_some() {
        code = generate_code();
    }
    let team_id = Uuid::now_v7().to_string();
    diesel::insert_into(teams::table)
        .values((
            teams::id.eq(&team_id),
            teams::created_at.eq(now),
            teams::code.eq(&code),
            teams::is_open.eq(true),
            teams::is_locked.eq(false),
            teams::region.eq(None::<String>),
        ))
        .execute(conn)?;
    Ok(team_id)
}

/// Partial update: absent fields are left unchanged. `region` may be set to
/// null explicitly by sending `"region": null` inside a double option.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct TeamSettings {
    pub is_open: Option<bool>,
    #[serde(default, with = "double_option")]
    pub region: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

pub fn update_team(
    conn: &mut SqliteConnection,
    team_id: &str,
    settings: &TeamSettings,
) -> AppResult<()> {
    if let Some(is_open) = settings.is_open {
        diesel::update(teams::table.find(team_id))
            .set(teams::is_open.eq(is_open))
            .execute(conn)?;
    }
    if let Some(region) = &settings.region {
        diesel::update(teams::table.find(team_id))
            .set(teams::region.eq(region))
            .execute(conn)?;
    }
    Ok(())
}

/// Once a team has accessed a task instance its composition must stay valid;
/// the flag is never cleared.
pub fn lock_team(conn: &mut SqliteConnection, team_id: &str) -> AppResult<()> {
    diesel::update(teams::table.find(team_id))
        .set(teams::is_locked.eq(true))
        .execute(conn)?;
    Ok(())
}

pub fn delete_team(conn: &mut SqliteConnection, team_id: &str) -> AppResult<()> {
    diesel::delete(teams::table.find(team_id)).execute(conn)?;
    Ok(())
}
