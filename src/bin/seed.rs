//! Seed a development database with an open round and a playfair task.
//!
//! Usage: `DATABASE_URL=alkindi.sqlite3 cargo run --bin seed`

use alkindi::MIGRATIONS;
use alkindi::schema::{badges, round_tasks, rounds, tasks, users};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use uuid::Uuid;

fn main() {
    let db_url = std::env::var("DATABASE_URL")
        .expect("please set `DATABASE_URL` to the database to seed");

    let mut conn = SqliteConnection::establish(&db_url).unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();

    let now = Utc::now().naive_utc();

    let round_id = Uuid::now_v7().to_string();
    diesel::insert_into(rounds::table)
        .values((
            rounds::id.eq(&round_id),
            rounds::created_at.eq(now),
            rounds::title.eq("Development round"),
            rounds::status.eq("open"),
            rounds::registration_opens_at.eq(now - Duration::days(1)),
            rounds::registration_closes_at.eq(now + Duration::days(30)),
            rounds::training_opens_at.eq(now - Duration::days(1)),
            rounds::min_team_size.eq(1),
            rounds::max_team_size.eq(4),
            rounds::min_team_ratio.eq("0.5"),
            rounds::allow_team_changes.eq(true),
        ))
        .execute(&mut conn)
        .unwrap();

    diesel::insert_into(badges::table)
        .values((
            badges::id.eq(Uuid::now_v7().to_string()),
            badges::round_id.eq(&round_id),
            badges::symbol.eq("qualified_dev"),
            badges::is_active.eq(true),
        ))
        .execute(&mut conn)
        .unwrap();

    let task_id = Uuid::now_v7().to_string();
    let params = serde_json::json!({
        "cipher_text": "KVTRE ZQLMB OHDNA",
        "firstname": "Marguerite",
        "answer": "14\n449\n134 avenue de Wagram",
        "grid": "B I D G K N X R Q U A L E O Z F C H M P T S V Y J",
    });
    diesel::insert_into(tasks::table)
        .values((
            tasks::id.eq(&task_id),
            tasks::title.eq("Playfair"),
            tasks::backend.eq("playfair"),
            tasks::backend_url.eq(None::<String>),
            tasks::backend_auth.eq(None::<String>),
            tasks::frontend_url.eq(None::<String>),
            tasks::params.eq(params.to_string()),
        ))
        .execute(&mut conn)
        .unwrap();

    diesel::insert_into(round_tasks::table)
        .values((
            round_tasks::id.eq(Uuid::now_v7().to_string()),
            round_tasks::round_id.eq(&round_id),
            round_tasks::task_id.eq(&task_id),
            round_tasks::ordinal.eq(1),
            round_tasks::have_training_attempt.eq(true),
            round_tasks::max_timed_attempts.eq(Some(2)),
            round_tasks::attempt_duration.eq(Some(60)),
            round_tasks::max_attempt_answers.eq(Some(2)),
            round_tasks::max_score.eq("500"),
        ))
        .execute(&mut conn)
        .unwrap();

    // Admin account for forced hint resets and team overrides.
    let admin_exists = users::table
        .filter(users::username.eq("admin"))
        .count()
        .get_result::<i64>(&mut conn)
        .unwrap()
        > 0;
    if !admin_exists {
        diesel::insert_into(users::table)
            .values((
                users::id.eq(Uuid::now_v7().to_string()),
                users::created_at.eq(now),
                users::foreign_id.eq("dev-admin"),
                users::team_id.eq(None::<String>),
                users::username.eq("admin"),
                users::firstname.eq("Admin"),
                users::lastname.eq("Admin"),
                users::badges.eq(""),
                users::is_admin.eq(true),
            ))
            .execute(&mut conn)
            .unwrap();
    }

    println!("seeded round {round_id} with task {task_id}");
}
