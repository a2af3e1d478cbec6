// Remote Schedule Gateway: row-level CRUD over the `schedules` table, scoped
// by user and date range. Expected failures come back as structured
// `GatewayError` values so callers can retry, fall back to cache, or surface
// a banner.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::db::models::ScheduleRow;
use crate::schedule::{BlockId, DaySchedule, TimeBlock};
use crate::week::{date_for_day, Day, WeekWindow};

const SCHEDULE_COLUMNS: &str =
    "id, user_id, day, date, start_time, end_time, label, all_day, created_at";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// `replace_week` cleared the old week but failed while inserting the
    /// replacement. The store now holds an empty week; callers must not
    /// present this as a successful save.
    #[error("week {week_key} for user {user_id} was cleared but re-insert failed: {source}")]
    ReplaceIncomplete {
        user_id: i64,
        week_key: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Fetch raw rows for a week window, optionally scoped to one user.
/// Idempotent, no side effects. Ordered by date then id so store insertion
/// order survives into the normalized shape.
pub async fn fetch_week(
    pool: &SqlitePool,
    user_id: Option<i64>,
    window: &WeekWindow,
) -> Result<Vec<ScheduleRow>, GatewayError> {
    let rows = match user_id {
        Some(id) => {
            sqlx::query_as::<_, ScheduleRow>(&format!(
                "SELECT {SCHEDULE_COLUMNS} FROM schedules \
                 WHERE user_id = ? AND date >= ? AND date <= ? \
                 ORDER BY date ASC, id ASC"
            ))
            .bind(id)
            .bind(&window.start_str)
            .bind(&window.end_str)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ScheduleRow>(&format!(
                "SELECT {SCHEDULE_COLUMNS} FROM schedules \
                 WHERE date >= ? AND date <= ? \
                 ORDER BY date ASC, id ASC"
            ))
            .bind(&window.start_str)
            .bind(&window.end_str)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

pub async fn find_block(pool: &SqlitePool, id: i64) -> Result<Option<ScheduleRow>, GatewayError> {
    let row = sqlx::query_as::<_, ScheduleRow>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Update a confirmed block in place, or insert a pending one. Returns the
/// store id in both cases. Inserts are not idempotent: callers must keep the
/// returned id and pass it back on the next save, or repeated calls will
/// create duplicates.
pub async fn upsert_block(
    pool: &SqlitePool,
    user_id: i64,
    date: NaiveDate,
    block: &TimeBlock,
) -> Result<i64, GatewayError> {
    match block.id {
        BlockId::Confirmed { id } => {
            sqlx::query(
                "UPDATE schedules SET day = ?, date = ?, start_time = ?, end_time = ?, \
                 label = ?, all_day = ? WHERE id = ?",
            )
            .bind(Day::from_date(date).name())
            .bind(date.format("%Y-%m-%d").to_string())
            .bind(block.start.format("%H:%M").to_string())
            .bind(block.end.format("%H:%M").to_string())
            .bind(&block.label)
            .bind(block.all_day)
            .bind(id)
            .execute(pool)
            .await?;
            Ok(id)
        }
        BlockId::Pending { .. } => insert_block(pool, user_id, date, block).await,
    }
}

/// Idempotent delete by id; deleting a block that no longer exists is a
/// no-op, not an error.
pub async fn delete_block(pool: &SqlitePool, id: i64) -> Result<(), GatewayError> {
    sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Replace a user's whole week: delete every row in the window's date range,
/// then bulk-insert the given blocks, in that order. A failure after the
/// delete half succeeded surfaces as [`GatewayError::ReplaceIncomplete`] so
/// callers can distinguish "nothing happened" from "the week is now empty".
pub async fn replace_week(
    pool: &SqlitePool,
    user_id: i64,
    window: &WeekWindow,
    days: &DaySchedule,
) -> Result<(), GatewayError> {
    sqlx::query("DELETE FROM schedules WHERE user_id = ? AND date >= ? AND date <= ?")
        .bind(user_id)
        .bind(&window.start_str)
        .bind(&window.end_str)
        .execute(pool)
        .await?;

    for (day, blocks) in days {
        let date = date_for_day(window, *day);
        for block in blocks {
            insert_block(pool, user_id, date, block)
                .await
                .map_err(|err| GatewayError::ReplaceIncomplete {
                    user_id,
                    week_key: window.key().to_string(),
                    source: match err {
                        GatewayError::Store(e) => e,
                        GatewayError::ReplaceIncomplete { source, .. } => source,
                    },
                })?;
        }
    }
    Ok(())
}

async fn insert_block(
    pool: &SqlitePool,
    user_id: i64,
    date: NaiveDate,
    block: &TimeBlock,
) -> Result<i64, GatewayError> {
    let result = sqlx::query(
        "INSERT INTO schedules (user_id, day, date, start_time, end_time, label, all_day, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(Day::from_date(date).name())
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(block.start.format("%H:%M").to_string())
    .bind(block.end.format("%H:%M").to_string())
    .bind(&block.label)
    .bind(block.all_day)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}
