//! Team formation lifecycle against a seeded round.

use crate::{
    error::{AppError, ModelError},
    model::{
        participations::create_participation,
        team_members::{
            create_user_team, get_team_creator, join_team, leave_team,
            load_team_members,
        },
        teams::{TeamSettings, find_team_by_code, load_team, update_team},
        users::get_user_team_id,
    },
    test::fixtures::{BADGE, now, pool, seed_contest, seed_user},
};

#[test]
fn team_lifecycle_with_creator_reelection() {
    let pool = pool();
    let mut conn = pool.get().unwrap();
    let contest = seed_contest(&mut conn);
    let alice = seed_user(&mut conn, "alice", BADGE);
    let bob = seed_user(&mut conn, "bob", BADGE);

    let team_id = create_user_team(&mut conn, &alice, now()).unwrap();
    create_participation(&mut conn, &team_id, &contest.round_id, None, now())
        .unwrap();

    let code = load_team(&mut conn, &team_id).unwrap().code;
    let found = find_team_by_code(&mut conn, &code).unwrap();
    assert_eq!(found.as_deref(), Some(team_id.as_str()));

    join_team(&mut conn, &bob, &team_id, now()).unwrap();
    let members = load_team_members(&mut conn, &team_id).unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(get_team_creator(&mut conn, &team_id).unwrap(), alice);

    // The creator leaving hands the team to the earliest remaining member.
    leave_team(&mut conn, &alice).unwrap();
    assert_eq!(get_team_creator(&mut conn, &team_id).unwrap(), bob);
    assert_eq!(get_user_team_id(&mut conn, &alice).unwrap(), None);

    // The last member leaving deletes the team entirely.
    leave_team(&mut conn, &bob).unwrap();
    assert_eq!(find_team_by_code(&mut conn, &code).unwrap(), None);
}

#[test]
fn cannot_join_while_in_a_team() {
    let pool = pool();
    let mut conn = pool.get().unwrap();
    let contest = seed_contest(&mut conn);
    let alice = seed_user(&mut conn, "alice", BADGE);
    let bob = seed_user(&mut conn, "bob", BADGE);

    let team_a = create_user_team(&mut conn, &alice, now()).unwrap();
    create_participation(&mut conn, &team_a, &contest.round_id, None, now())
        .unwrap();
    let team_b = create_user_team(&mut conn, &bob, now()).unwrap();
    create_participation(&mut conn, &team_b, &contest.round_id, None, now())
        .unwrap();

    assert!(matches!(
        join_team(&mut conn, &bob, &team_a, now()),
        Err(AppError::Model(ModelError::AlreadyInTeam))
    ));
    assert!(matches!(
        create_user_team(&mut conn, &alice, now()),
        Err(AppError::Model(ModelError::AlreadyInTeam))
    ));
}

#[test]
fn closed_team_rejects_joiners() {
    let pool = pool();
    let mut conn = pool.get().unwrap();
    let contest = seed_contest(&mut conn);
    let alice = seed_user(&mut conn, "alice", BADGE);
    let bob = seed_user(&mut conn, "bob", BADGE);

    let team_id = create_user_team(&mut conn, &alice, now()).unwrap();
    create_participation(&mut conn, &team_id, &contest.round_id, None, now())
        .unwrap();
    update_team(
        &mut conn,
        &team_id,
        &TeamSettings {
            is_open: Some(false),
            region: None,
        },
    )
    .unwrap();

    assert!(matches!(
        join_team(&mut conn, &bob, &team_id, now()),
        Err(AppError::Model(ModelError::TeamClosed))
    ));
}

#[test]
fn badge_determines_qualification() {
    let pool = pool();
    let mut conn = pool.get().unwrap();
    let contest = seed_contest(&mut conn);
    let alice = seed_user(&mut conn, "alice", BADGE);
    let carol = seed_user(&mut conn, "carol", "");

    let team_id = create_user_team(&mut conn, &alice, now()).unwrap();
    create_participation(&mut conn, &team_id, &contest.round_id, None, now())
        .unwrap();
    join_team(&mut conn, &carol, &team_id, now()).unwrap();

    let members = load_team_members(&mut conn, &team_id).unwrap();
    let qualified: Vec<bool> =
        members.iter().map(|m| m.is_qualified).collect();
    assert_eq!(qualified, vec![true, false]);
}
