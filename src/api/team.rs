//! Team formation and round registration endpoints.
//!
//! Membership changes refresh the session cookie so the new principals take
//! effect on the next request.

use axum::{
    Json,
    extract::{Path, State},
};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    auth::{Session, oauth::refresh_principals},
    error::{AppResult, ModelError},
    model::{
        access_codes::{clear_user_access_codes, generate_user_access_code},
        attempts::load_participation_attempts,
        participations::{
            create_participation, enter_participation_access_code,
            get_team_latest_participation, load_participation,
            load_team_participations,
        },
        team_members::{create_user_team, join_team, leave_team, load_team_members},
        teams::{TeamSettings, find_team_by_code, load_team, update_team},
        users::load_user,
    },
    state::AppState,
};

/// Session introspection: the user, their team and its latest participation.
pub async fn me(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Value>> {
    let principals = session.principals.clone();
    let csrf_token = session.csrf_token.clone();
    let user_id = session.user_id.clone();
    let body = state
        .tx(move |conn| {
            let user = load_user(conn, &user_id)?;
            let team = match &user.team_id {
                None => Value::Null,
                Some(team_id) => {
                    let team = load_team(conn, team_id)?;
                    let members = load_team_members(conn, team_id)?
                        .into_iter()
                        .map(|m| {
                            json!({
                                "user_id": m.user_id,
                                "joined_at": m.joined_at,
                                "is_qualified": m.is_qualified,
                                "is_creator": m.is_creator,
                            })
                        })
                        .collect::<Vec<_>>();
                    let participation =
                        get_team_latest_participation(conn, team_id)?;
                    json!({
                        "id": team.id,
                        "code": team.code,
                        "is_open": team.is_open,
                        "is_locked": team.is_locked,
                        "region": team.region,
                        "members": members,
                        "participation": participation.map(|p| {
                            json!({
                                "id": p.id,
                                "round_id": p.round_id,
                                "score": p.score,
                                "access_code_entered": p.access_code_entered,
                            })
                        }),
                    })
                }
            };
            Ok(json!({
                "success": true,
                "user": user,
                "team": team,
                "principals": principals,
                "csrf_token": csrf_token,
            }))
        })
        .await?;
    Ok(Json(body))
}

pub async fn create_team(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    session: Session,
) -> AppResult<(PrivateCookieJar, Json<Value>)> {
    let user_id = session.user_id.clone();
    let team_id = state
        .tx(move |conn| {
            create_user_team(conn, &user_id, Utc::now().naive_utc())
        })
        .await?;
    let jar = refresh_principals(&state, jar, &session).await?;
    Ok((jar, Json(json!({ "success": true, "team_id": team_id }))))
}

#[derive(Debug, Deserialize)]
pub struct JoinTeamBody {
    code: String,
}

pub async fn join_team_by_code(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    session: Session,
    Json(body): Json<JoinTeamBody>,
) -> AppResult<(PrivateCookieJar, Json<Value>)> {
    let user_id = session.user_id.clone();
    let team_id = state
        .tx(move |conn| {
            let team_id = find_team_by_code(conn, &body.code)?
                .ok_or(ModelError::UnknownTeamCode)?;
            join_team(conn, &user_id, &team_id, Utc::now().naive_utc())?;
            // A late joiner needs their own code for existing attempts.
            if let Some(participation) =
                get_team_latest_participation(conn, &team_id)?
            {
                for attempt in
                    load_participation_attempts(conn, &participation.id)?
                {
                    generate_user_access_code(conn, &attempt.id, &user_id)?;
                }
            }
            Ok(team_id)
        })
        .await?;
    let jar = refresh_principals(&state, jar, &session).await?;
    Ok((jar, Json(json!({ "success": true, "team_id": team_id }))))
}

pub async fn leave_current_team(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    session: Session,
) -> AppResult<(PrivateCookieJar, Json<Value>)> {
    let user_id = session.user_id.clone();
    state
        .tx(move |conn| {
            let team_id = leave_team(conn, &user_id)?;
            // The departing member's attempt codes are void.
            let participation_ids = load_team_participations(conn, &team_id)?
                .into_iter()
                .map(|p| p.id)
                .collect::<Vec<_>>();
            clear_user_access_codes(conn, &user_id, &participation_ids)
        })
        .await?;
    let jar = refresh_principals(&state, jar, &session).await?;
    Ok((jar, Json(json!({ "success": true }))))
}

pub async fn update_team_settings(
    State(state): State<AppState>,
    session: Session,
    Path(team_id): Path<String>,
    Json(settings): Json<TeamSettings>,
) -> AppResult<Json<Value>> {
    if !session.manages_team(&team_id) {
        return Err(ModelError::Forbidden.into());
    }
    state
        .tx(move |conn| update_team(conn, &team_id, &settings))
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    round_id: String,
    access_code: Option<String>,
}

/// Register the team for a round by creating a participation.
pub async fn register_team(
    State(state): State<AppState>,
    session: Session,
    Path(team_id): Path<String>,
    Json(body): Json<RegisterBody>,
) -> AppResult<Json<Value>> {
    if !session.manages_team(&team_id) {
        return Err(ModelError::Forbidden.into());
    }
    let participation_id = state
        .tx(move |conn| {
            create_participation(
                conn,
                &team_id,
                &body.round_id,
                body.access_code.as_deref(),
                Utc::now().naive_utc(),
            )
        })
        .await?;
    Ok(Json(
        json!({ "success": true, "participation_id": participation_id }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AccessCodeBody {
    code: String,
}

pub async fn enter_access_code(
    State(state): State<AppState>,
    session: Session,
    Path(participation_id): Path<String>,
    Json(body): Json<AccessCodeBody>,
) -> AppResult<Json<Value>> {
    state
        .tx(move |conn| {
            let participation = load_participation(conn, &participation_id)?;
            if !session.owns_team(&participation.team_id) {
                return Err(ModelError::Forbidden.into());
            }
            enter_participation_access_code(conn, &participation_id, &body.code)
        })
        .await?;
    Ok(Json(json!({ "success": true })))
}
