use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    schema::{team_members, users},
};

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct User {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub foreign_id: String,
    pub team_id: Option<String>,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    /// Space-separated badge symbols, as the identity provider hands them out.
    pub badges: String,
    pub is_admin: bool,
}

impl User {
    pub fn badges(&self) -> Vec<&str> {
        self.badges.split_whitespace().collect()
    }
}

/// The profile shape returned by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(alias = "idUser")]
    pub foreign_id: String,
    #[serde(alias = "sLogin")]
    pub login: String,
    #[serde(alias = "sFirstName")]
    pub firstname: String,
    #[serde(alias = "sLastName")]
    pub lastname: String,
    #[serde(alias = "aBadges", default)]
    pub badges: Vec<String>,
}

pub fn load_user(conn: &mut SqliteConnection, user_id: &str) -> AppResult<User> {
    users::table
        .find(user_id)
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| AppError::integrity(format!("no such user {user_id}")))
}

pub fn find_user_by_foreign_id(
    conn: &mut SqliteConnection,
    foreign_id: &str,
) -> AppResult<Option<String>> {
    Ok(users::table
        .filter(users::foreign_id.eq(foreign_id))
        .select(users::id)
        .first::<String>(conn)
        .optional()?)
}

/// Create a user from an identity-provider profile on first login.
pub fn import_user(
    conn: &mut SqliteConnection,
    profile: &Profile,
    now: NaiveDateTime,
) -> AppResult<String> {
    let user_id = Uuid::now_v7().to_string();
    diesel::insert_into(users::table)
        .values((
            users::id.eq(&user_id),
            users::created_at.eq(now),
            users::foreign_id.eq(&profile.foreign_id),
            users::team_id.eq(None::<String>),
            users::username.eq(&profile.login),
            users::firstname.eq(&profile.firstname),
            users::lastname.eq(&profile.lastname),
            users::badges.eq(profile.badges.join(" ")),
            users::is_admin.eq(false),
        ))
        .execute(conn)?;
    Ok(user_id)
}

/// Refresh the mutable profile fields on a later login.
pub fn update_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    profile: &Profile,
) -> AppResult<()> {
    diesel::update(users::table.find(user_id))
        .set((
            users::username.eq(&profile.login),
            users::firstname.eq(&profile.firstname),
            users::lastname.eq(&profile.lastname),
            users::badges.eq(profile.badges.join(" ")),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn get_user_team_id(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Option<String>> {
    users::table
        .find(user_id)
        .select(users::team_id)
        .first::<Option<String>>(conn)
        .optional()?
        .ok_or_else(|| AppError::integrity(format!("no such user {user_id}")))
}

pub fn set_user_team_id(
    conn: &mut SqliteConnection,
    user_id: &str,
    team_id: Option<&str>,
) -> AppResult<()> {
    diesel::update(users::table.find(user_id))
        .set(users::team_id.eq(team_id))
        .execute(conn)?;
    Ok(())
}

/// Capability tags for the session: `u:<id>`, `t:<team>`, `ts:<team>` if
/// qualified, `tc:<team>` if creator, `g:admin`. Cached in the session cookie
/// and recomputed whenever team membership changes.
pub fn get_user_principals(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Vec<String>> {
    let user = load_user(conn, user_id)?;
    let mut principals = vec![format!("u:{}", user.id)];
    if user.is_admin {
        principals.push("g:admin".to_owned());
    }
    let Some(team_id) = user.team_id else {
        return Ok(principals);
    };
    let membership = team_members::table
        .filter(team_members::team_id.eq(&team_id))
        .filter(team_members::user_id.eq(user_id))
        .select((team_members::is_qualified, team_members::is_creator))
        .first::<(bool, bool)>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::integrity(format!(
                "user {user_id} has team_id {team_id} but no team_member row"
            ))
        })?;
    principals.push(format!("t:{team_id}"));
    if membership.0 {
        principals.push(format!("ts:{team_id}"));
    }
    if membership.1 {
        principals.push(format!("tc:{team_id}"));
    }
    Ok(principals)
}
