use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{error::AppResult, schema::error_log};

/// Record a failed request for later diagnosis. Runs on its own connection,
/// outside the failed transaction, so the entry survives the rollback.
pub fn record_error(
    conn: &mut SqliteConnection,
    now: NaiveDateTime,
    user_id: Option<&str>,
    url: &str,
    body: Option<&str>,
    headers: Option<&str>,
    message: &str,
) -> AppResult<()> {
    diesel::insert_into(error_log::table)
        .values((
            error_log::id.eq(Uuid::now_v7().to_string()),
            error_log::created_at.eq(now),
            error_log::user_id.eq(user_id),
            error_log::url.eq(url),
            error_log::body.eq(body),
            error_log::headers.eq(headers),
            error_log::message.eq(message),
        ))
        .execute(conn)?;
    Ok(())
}
