use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, put},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    db::schedules,
    error::{AppError, Result},
    schedule::{parse_hhmm, BlockId, DaySchedule, ScheduleSnapshot, TimeBlock},
    sync::{self, RefreshOutcome},
    week::{self, date_for_day, format_week_range, week_window, Day},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_week))
        .route("/:user_id/week", put(save_week))
        .route("/:user_id/blocks", axum::routing::post(upsert_block))
        .route("/blocks/:id", delete(delete_block))
}

pub(crate) fn default_source() -> String {
    "api".to_string()
}

/// Reference date for requests that don't name a week: "today" with the
/// late-night rollover applied.
fn current_reference_date() -> NaiveDate {
    week::effective_date(Local::now().naive_local())
}

/// Wire form of a block: plain optional id, `HH:MM` strings. Converted into
/// the tagged in-memory form before it touches the core.
#[derive(Debug, Deserialize)]
pub struct BlockPayload {
    pub id: Option<i64>,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub all_day: bool,
}

impl BlockPayload {
    fn into_block(self) -> Result<TimeBlock> {
        let start = parse_hhmm(&self.start)
            .ok_or_else(|| AppError::Validation(format!("Invalid start time: {}", self.start)))?;
        let end = parse_hhmm(&self.end)
            .ok_or_else(|| AppError::Validation(format!("Invalid end time: {}", self.end)))?;

        Ok(TimeBlock {
            id: match self.id {
                Some(id) => BlockId::Confirmed { id },
                None => BlockId::new_pending(),
            },
            start,
            end,
            label: self.label,
            all_day: self.all_day,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WeekResponse {
    pub week: String,
    pub range: String,
    pub from_cache: bool,
    pub schedules: ScheduleSnapshot,
}

async fn get_week(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<WeekResponse>> {
    let week_date = match query.week {
        Some(raw) => week::parse_week_param(&raw)?,
        None => current_reference_date(),
    };

    let (snapshot, outcome) =
        sync::fetch_week_schedules(&state.db.pool, &state.cache, week_date, query.user_id).await?;

    let window = week_window(week_date);
    Ok(Json(WeekResponse {
        week: window.key().to_string(),
        range: format_week_range(&window),
        from_cache: outcome == RefreshOutcome::CacheFallback,
        schedules: snapshot,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SaveWeekRequest {
    pub week: String,
    pub days: BTreeMap<Day, Vec<BlockPayload>>,
    #[serde(default = "default_source")]
    pub source: String,
}

async fn save_week(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(body): Json<SaveWeekRequest>,
) -> Result<Json<WeekResponse>> {
    let week_date = week::parse_week_param(&body.week)?;

    let mut days: DaySchedule = BTreeMap::new();
    for (day, payloads) in body.days {
        let blocks = payloads
            .into_iter()
            .map(BlockPayload::into_block)
            .collect::<Result<Vec<_>>>()?;
        days.insert(day, blocks);
    }

    let snapshot = sync::save_week_for_user(
        &state.db.pool,
        &state.cache,
        &state.bus,
        user_id,
        week_date,
        &days,
        &body.source,
    )
    .await?;

    let window = week_window(week_date);
    Ok(Json(WeekResponse {
        week: window.key().to_string(),
        range: format_week_range(&window),
        from_cache: false,
        schedules: snapshot,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpsertBlockRequest {
    pub day: Day,
    pub week: Option<String>,
    pub block: BlockPayload,
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct BlockSavedResponse {
    pub id: i64,
}

async fn upsert_block(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(body): Json<UpsertBlockRequest>,
) -> Result<Json<BlockSavedResponse>> {
    let week_date = match &body.week {
        Some(raw) => week::parse_week_param(raw)?,
        None => current_reference_date(),
    };
    let window = week_window(week_date);
    let date = date_for_day(&window, body.day);

    let block = body.block.into_block()?;
    let id = schedules::upsert_block(&state.db.pool, user_id, date, &block).await?;

    state.cache.invalidate_week(window.key()).await;
    state
        .bus
        .emit_schedule_update(user_id, window.start_date(), Some(body.day), &body.source);

    Ok(Json(BlockSavedResponse { id }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteBlockQuery {
    #[serde(default = "default_source")]
    pub source: String,
}

async fn delete_block(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteBlockQuery>,
) -> Result<Json<()>> {
    // Look the row up first so the right week's cache can be invalidated;
    // an already-deleted id stays a silent no-op.
    let Some(row) = schedules::find_block(&state.db.pool, id).await? else {
        return Ok(Json(()));
    };

    schedules::delete_block(&state.db.pool, id).await?;

    if let Ok(date) = week::parse_week_param(&row.date) {
        let window = week_window(date);
        state.cache.invalidate_week(window.key()).await;
        state.bus.emit_schedule_update(
            row.user_id,
            window.start_date(),
            row.day.parse::<Day>().ok(),
            &query.source,
        );
    }

    Ok(Json(()))
}
