use std::collections::HashSet;

use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    codes::generate_code,
    error::AppResult,
    model::team_members::load_team_members,
    schema::{access_codes, attempts},
};

#[derive(Debug, Clone, Queryable)]
pub struct AccessCode {
    pub id: String,
    pub attempt_id: String,
    pub user_id: String,
    pub code: String,
    pub is_unlocked: bool,
}

pub fn load_access_codes(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<Vec<AccessCode>> {
    Ok(access_codes::table
        .filter(access_codes::attempt_id.eq(attempt_id))
        .load::<AccessCode>(conn)?)
}

pub fn get_access_code(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    user_id: &str,
) -> AppResult<Option<String>> {
    Ok(access_codes::table
        .filter(access_codes::attempt_id.eq(attempt_id))
        .filter(access_codes::user_id.eq(user_id))
        .select(access_codes::code)
        .first::<String>(conn)
        .optional()?)
}

/// Generate a distinct code for each member of the team, scoped to the
/// attempt.
pub fn generate_access_codes(
    conn: &mut SqliteConnection,
    team_id: &str,
    attempt_id: &str,
) -> AppResult<()> {
    let mut used = HashSet::new();
    for member in load_team_members(conn, team_id)? {
        insert_access_code(conn, attempt_id, &member.user_id, &mut used)?;
    }
    Ok(())
}

/// Code for a member who joined after the attempt was created.
pub fn generate_user_access_code(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    user_id: &str,
) -> AppResult<()> {
    let mut used = load_access_codes(conn, attempt_id)?
        .into_iter()
        .map(|c| c.code)
        .collect::<HashSet<_>>();
    insert_access_code(conn, attempt_id, user_id, &mut used)
}

/// Mark the member's code as unlocked. Returns false when the code does not
/// match.
pub fn unlock_access_code(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    user_id: &str,
    code: &str,
) -> AppResult<bool> {
    let n = diesel::update(
        access_codes::table
            .filter(access_codes::attempt_id.eq(attempt_id))
            .filter(access_codes::user_id.eq(user_id))
            .filter(access_codes::code.eq(code)),
    )
    .set(access_codes::is_unlocked.eq(true))
    .execute(conn)?;
    Ok(n > 0)
}

/// Delete a departing member's codes across all of the team's attempts.
pub fn clear_user_access_codes(
    conn: &mut SqliteConnection,
    user_id: &str,
    participation_ids: &[String],
) -> AppResult<()> {
    let attempt_ids = attempts::table
        .filter(attempts::participation_id.eq_any(participation_ids))
        .select(attempts::id);
    diesel::delete(
        access_codes::table
            .filter(access_codes::user_id.eq(user_id))
            .filter(access_codes::attempt_id.eq_any(attempt_ids)),
    )
    .execute(conn)?;
    Ok(())
}

pub fn delete_attempt_access_codes(
    conn: &mut SqliteConnection,
    attempt_id: &str,
) -> AppResult<()> {
    diesel::delete(
        access_codes::table.filter(access_codes::attempt_id.eq(attempt_id)),
    )
    .execute(conn)?;
    Ok(())
}

fn insert_access_code(
    conn: &mut SqliteConnection,
    attempt_id: &str,
    user_id: &str,
    used: &mut HashSet<String>,
) -> AppResult<()> {
    let mut code = generate_code();
    while used.contains(&code) {
        code = generate_code();
    }
    used.insert(code.clone());
    diesel::insert_into(access_codes::table)
        .values((
            access_codes::id.eq(Uuid::now_v7().to_string()),
            access_codes::attempt_id.eq(attempt_id),
            access_codes::user_id.eq(user_id),
            access_codes::code.eq(&code),
            access_codes::is_unlocked.eq(false),
        ))
        .execute(conn)?;
    Ok(())
}
