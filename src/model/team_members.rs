use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ModelError},
    model::{
        participations::get_team_latest_participation,
        rounds::{Round, load_round},
        teams::{create_empty_team, delete_team, load_team},
        users::{load_user, set_user_team_id},
    },
    schema::{badges, team_members},
};

#[derive(Debug, Clone, Queryable)]
pub struct TeamMember {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub joined_at: NaiveDateTime,
    pub is_qualified: bool,
    pub is_creator: bool,
}

/// Create a team owned by the given user, who must not already be in one.
/// The creator counts as qualified.
#[tracing::instrument(skip(conn))]
pub fn create_user_team(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: NaiveDateTime,
) -> AppResult<String> {
    let user = load_user(conn, user_id)?;
    if user.team_id.is_some() {
        return Err(ModelError::AlreadyInTeam.into());
    }
    let team_id = create_empty_team(conn, now)?;
    add_team_member(conn, &team_id, user_id, now, true, true)?;
    Ok(team_id)
}

/// Add a user to an existing team via its join code flow.
#[tracing::instrument(skip(conn))]
pub fn join_team(
    conn: &mut SqliteConnection,
    user_id: &str,
    team_id: &str,
    now: NaiveDateTime,
) -> AppResult<()> {
    let user = load_user(conn, user_id)?;
    if user.team_id.is_some() {
        return Err(ModelError::AlreadyInTeam.into());
    }
    let team = load_team(conn, team_id)?;
    if !team.is_open {
        return Err(ModelError::TeamClosed.into());
    }
    let participation = get_team_latest_participation(conn, team_id)?
        .ok_or_else(|| {
            AppError::integrity(format!("team {team_id} has no participation"))
        })?;
    let round = load_round(conn, &participation.round_id)?;
    if !round.is_registration_open(now) {
        return Err(ModelError::RegistrationClosed.into());
    }
    let is_qualified =
        user_qualifies_for_round(conn, &user.badges(), &round.id)?;
    // A locked team's composition must stay valid; whether it may change at
    // all is a per-round option.
    if team.is_locked {
        if round.allow_team_changes {
            validate_team(
                conn,
                team_id,
                &round,
                MemberDelta::Added { is_qualified },
            )?;
        } else {
            return Err(ModelError::TeamLocked.into());
        }
    }
    add_team_member(conn, team_id, user_id, now, is_qualified, false)?;
    Ok(())
}

/// Remove a user from their team. The earliest remaining member inherits the
/// creator flag; an empty team is deleted.
#[tracing::instrument(skip(conn))]
pub fn leave_team(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<String> {
    let user = load_user(conn, user_id)?;
    let Some(team_id) = user.team_id else {
        return Err(ModelError::NoTeam.into());
    };
    let team = load_team(conn, &team_id)?;
    if team.is_locked {
        let participation = get_team_latest_participation(conn, &team_id)?
            .ok_or_else(|| {
                AppError::integrity(format!(
                    "team {team_id} has no participation"
                ))
            })?;
        let round = load_round(conn, &participation.round_id)?;
        if round.allow_team_changes {
            let membership = load_membership(conn, &team_id, user_id)?;
            validate_team(
                conn,
                &team_id,
                &round,
                MemberDelta::Removed {
                    is_qualified: membership.is_qualified,
                },
            )?;
        } else {
            return Err(ModelError::TeamLocked.into());
        }
    }
    let was_creator = load_membership(conn, &team_id, user_id)?.is_creator;
    diesel::delete(
        team_members::table
            .filter(team_members::team_id.eq(&team_id))
            .filter(team_members::user_id.eq(user_id)),
    )
    .execute(conn)?;
    set_user_team_id(conn, user_id, None)?;
    if was_creator {
        let earliest = team_members::table
            .filter(team_members::team_id.eq(&team_id))
            .order_by(team_members::joined_at)
            .select(team_members::user_id)
            .first::<String>(conn)
            .optional()?;
        match earliest {
            None => delete_team(conn, &team_id)?,
            Some(new_creator) => {
                diesel::update(
                    team_members::table
                        .filter(team_members::team_id.eq(&team_id))
                        .filter(team_members::user_id.eq(&new_creator)),
                )
                .set(team_members::is_creator.eq(true))
                .execute(conn)?;
            }
        }
    } else if count_members(conn, &team_id)? == 0 {
        delete_team(conn, &team_id)?;
    }
    Ok(team_id)
}

pub fn get_team_creator(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> AppResult<String> {
    team_members::table
        .filter(team_members::team_id.eq(team_id))
        .filter(team_members::is_creator)
        .select(team_members::user_id)
        .first::<String>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::integrity(format!("team {team_id} has no creator"))
        })
}

pub fn load_team_members(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> AppResult<Vec<TeamMember>> {
    Ok(team_members::table
        .filter(team_members::team_id.eq(team_id))
        .order_by(team_members::joined_at)
        .load::<TeamMember>(conn)?)
}

/// Composition change under consideration when validating a team.
#[derive(Debug, Clone, Copy)]
pub enum MemberDelta {
    None,
    Added { is_qualified: bool },
    Removed { is_qualified: bool },
}

/// Check the team against the round's size and qualification-ratio rules,
/// optionally with a member about to be added or removed.
pub fn validate_team(
    conn: &mut SqliteConnection,
    team_id: &str,
    round: &Round,
    delta: MemberDelta,
) -> AppResult<()> {
    let members = load_team_members(conn, team_id)?;
    let mut n_members = members.len() as i64;
    let mut n_qualified =
        members.iter().filter(|m| m.is_qualified).count() as i64;
    match delta {
        MemberDelta::None => {}
        MemberDelta::Added { is_qualified } => {
            n_members += 1;
            if is_qualified {
                n_qualified += 1;
            }
        }
        MemberDelta::Removed { is_qualified } => {
            n_members -= 1;
            if is_qualified {
                n_qualified -= 1;
            }
        }
    }
    if n_members < round.min_team_size {
        return Err(ModelError::TeamTooSmall.into());
    }
    if n_members > round.max_team_size {
        return Err(ModelError::TeamTooLarge.into());
    }
    // Exact decimal comparison; a float ratio would drift on thirds.
    if Decimal::from(n_qualified)
        < Decimal::from(n_members) * round.min_team_ratio()?
    {
        return Err(ModelError::NotEnoughQualifiedMembers.into());
    }
    Ok(())
}

/// A user qualifies for a round if they hold any of its active badges.
pub fn user_qualifies_for_round(
    conn: &mut SqliteConnection,
    user_badges: &[&str],
    round_id: &str,
) -> AppResult<bool> {
    if user_badges.is_empty() {
        return Ok(false);
    }
    let found = badges::table
        .filter(badges::round_id.eq(round_id))
        .filter(badges::symbol.eq_any(user_badges))
        .filter(badges::is_active)
        .select(badges::id)
        .first::<String>(conn)
        .optional()?;
    Ok(found.is_some())
}

fn add_team_member(
    conn: &mut SqliteConnection,
    team_id: &str,
    user_id: &str,
    now: NaiveDateTime,
    is_qualified: bool,
    is_creator: bool,
) -> AppResult<()> {
    diesel::insert_into(team_members::table)
        .values((
            team_members::id.eq(Uuid::now_v7().to_string()),
            team_members::team_id.eq(team_id),
            team_members::user_id.eq(user_id),
            team_members::joined_at.eq(now),
            team_members::is_qualified.eq(is_qualified),
            team_members::is_creator.eq(is_creator),
        ))
        .execute(conn)?;
    set_user_team_id(conn, user_id, Some(team_id))?;
    Ok(())
}

fn load_membership(
    conn: &mut SqliteConnection,
    team_id: &str,
    user_id: &str,
) -> AppResult<TeamMember> {
    team_members::table
        .filter(team_members::team_id.eq(team_id))
        .filter(team_members::user_id.eq(user_id))
        .first::<TeamMember>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::integrity(format!(
                "missing team_member row for {user_id} in {team_id}"
            ))
        })
}

fn count_members(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> AppResult<i64> {
    Ok(team_members::table
        .filter(team_members::team_id.eq(team_id))
        .count()
        .get_result::<i64>(conn)?)
}
