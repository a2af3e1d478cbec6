// The two core operations shared by the HTTP surface and the in-process
// view controllers: fetch-and-normalize a week, and replace-and-announce a
// user's week.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::db::schedules::{self, GatewayError};
use crate::db::users;
use crate::schedule::{normalize, DaySchedule, ScheduleSnapshot};
use crate::services::bus::EventBus;
use crate::services::cache::WeekCache;
use crate::week::week_window;

/// Where a successful read actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh from the store; cache rewritten.
    Remote,
    /// Store unreachable; the last cached snapshot was served instead.
    CacheFallback,
    /// The view navigated away while the fetch was in flight; result dropped.
    Discarded,
}

/// Fetch the week containing `week_date`, normalized, scoped to one user or
/// the whole house. Write-through on success; on a transient store failure
/// the cached snapshot (when present) is served as a non-fatal fallback.
pub async fn fetch_week_schedules(
    pool: &SqlitePool,
    cache: &WeekCache,
    week_date: NaiveDate,
    user_id: Option<i64>,
) -> Result<(ScheduleSnapshot, RefreshOutcome), GatewayError> {
    let window = week_window(week_date);

    let fetched: Result<ScheduleSnapshot, GatewayError> = async {
        let rows = schedules::fetch_week(pool, user_id, &window).await?;
        let user_ids = match user_id {
            Some(id) => vec![id],
            None => users::list(pool).await?.into_iter().map(|u| u.id).collect(),
        };
        Ok(normalize(&rows, &window, &user_ids))
    }
    .await;

    match fetched {
        Ok(snapshot) => {
            cache.put(window.key(), user_id, snapshot.clone()).await;
            Ok((snapshot, RefreshOutcome::Remote))
        }
        Err(err) => match cache.get(window.key(), user_id).await {
            Some(snapshot) => {
                tracing::warn!(
                    week = window.key(),
                    error = %err,
                    "store fetch failed, serving cached snapshot"
                );
                Ok((snapshot, RefreshOutcome::CacheFallback))
            }
            None => Err(err),
        },
    }
}

/// Replace a user's week in the store, refresh the cache, and announce the
/// change on the bus.
///
/// On [`GatewayError::ReplaceIncomplete`] the affected week's cache is
/// invalidated before the error propagates: the store now holds a cleared
/// week, and nothing may keep presenting the old blocks as saved.
pub async fn save_week_for_user(
    pool: &SqlitePool,
    cache: &WeekCache,
    bus: &EventBus,
    user_id: i64,
    week_date: NaiveDate,
    days: &DaySchedule,
    source: &str,
) -> Result<ScheduleSnapshot, GatewayError> {
    let window = week_window(week_date);

    if let Err(err) = schedules::replace_week(pool, user_id, &window, days).await {
        if matches!(err, GatewayError::ReplaceIncomplete { .. }) {
            cache.invalidate_week(window.key()).await;
        }
        return Err(err);
    }

    cache.invalidate_week(window.key()).await;

    // Read back the saved slice so the caller and the cache hold
    // store-assigned ids, not optimistic ones.
    let rows = schedules::fetch_week(pool, Some(user_id), &window).await?;
    let snapshot = normalize(&rows, &window, &[user_id]);
    cache.put(window.key(), Some(user_id), snapshot.clone()).await;

    bus.emit_schedule_update(user_id, window.start_date(), None, source);
    Ok(snapshot)
}
