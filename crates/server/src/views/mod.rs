// View-controller reconciliation: the in-process clients of the sync core.
//
// Each view owns a reference date, the derived week window, and its own
// snapshot; nothing is shared between views except the store, the cache, and
// the bus. Convergence is re-fetch based: an incoming event from another
// view is a dirty flag that triggers the view's own fetch-normalize cycle,
// never a patch to apply.

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::db::schedules::{self, GatewayError};
use crate::schedule::{BlockId, DaySchedule, ScheduleSnapshot, TimeBlock};
use crate::services::bus::{EventBus, Subscription, SyncEvent};
use crate::services::cache::WeekCache;
use crate::sync::{self, RefreshOutcome};
use crate::week::{date_for_day, is_same_week, week_window, Day, WeekWindow};

pub const SOURCE_DASHBOARD: &str = "dashboard";
pub const SOURCE_OVERVIEW: &str = "overview";
pub const SOURCE_ROOMMATES: &str = "roommates";
pub const SOURCE_EDITOR: &str = "editor";

pub struct ScheduleView {
    source: String,
    scope: Option<i64>,
    week_date: NaiveDate,
    window: WeekWindow,
    snapshot: Option<ScheduleSnapshot>,
    loading: bool,
    fetch_seq: u64,
    pool: SqlitePool,
    cache: WeekCache,
    bus: Arc<EventBus>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    subscription: Subscription,
}

impl ScheduleView {
    /// Mount a view with a fixed source tag. `scope` limits fetches to one
    /// user's slice; `None` watches the whole house.
    pub fn new(
        source: impl Into<String>,
        scope: Option<i64>,
        reference: NaiveDate,
        pool: SqlitePool,
        cache: WeekCache,
        bus: Arc<EventBus>,
    ) -> Self {
        let source = source.into();
        let (tx, events) = mpsc::unbounded_channel();

        // Self-echo suppression happens at the subscription edge: the
        // originating view already holds the data it just wrote.
        let own_source = source.clone();
        let subscription = bus.subscribe(move |event| {
            if event.source() == own_source {
                return;
            }
            let _ = tx.send(event.clone());
        });

        Self {
            window: week_window(reference),
            source,
            scope,
            week_date: reference,
            snapshot: None,
            loading: false,
            fetch_seq: 0,
            pool,
            cache,
            bus,
            events,
            subscription,
        }
    }

    pub fn dashboard(
        user_id: i64,
        reference: NaiveDate,
        pool: SqlitePool,
        cache: WeekCache,
        bus: Arc<EventBus>,
    ) -> Self {
        Self::new(SOURCE_DASHBOARD, Some(user_id), reference, pool, cache, bus)
    }

    pub fn overview(
        reference: NaiveDate,
        pool: SqlitePool,
        cache: WeekCache,
        bus: Arc<EventBus>,
    ) -> Self {
        Self::new(SOURCE_OVERVIEW, None, reference, pool, cache, bus)
    }

    pub fn roommates(
        reference: NaiveDate,
        pool: SqlitePool,
        cache: WeekCache,
        bus: Arc<EventBus>,
    ) -> Self {
        Self::new(SOURCE_ROOMMATES, None, reference, pool, cache, bus)
    }

    pub fn editor(
        user_id: i64,
        reference: NaiveDate,
        pool: SqlitePool,
        cache: WeekCache,
        bus: Arc<EventBus>,
    ) -> Self {
        Self::new(SOURCE_EDITOR, Some(user_id), reference, pool, cache, bus)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn window(&self) -> &WeekWindow {
        &self.window
    }

    pub fn snapshot(&self) -> Option<&ScheduleSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// First render: paint from cache if a snapshot for this week exists,
    /// then always fetch and overwrite.
    pub async fn mount(&mut self) -> Result<RefreshOutcome, GatewayError> {
        if let Some(cached) = self.cache.get(self.window.key(), self.scope).await {
            self.snapshot = Some(cached);
        }
        self.refresh().await
    }

    /// Navigate to the week containing `reference`. The old snapshot is
    /// cleared before fetching: an explicit empty/loading state beats
    /// silently showing last week's data under a spinner.
    pub async fn set_week(&mut self, reference: NaiveDate) -> Result<RefreshOutcome, GatewayError> {
        self.week_date = reference;
        self.window = week_window(reference);
        self.snapshot = None;
        self.refresh().await
    }

    /// Run one fetch-normalize cycle for the current window.
    ///
    /// The result is keyed to the window it was requested for; if the view
    /// has navigated on by the time it lands, it is discarded rather than
    /// allowed to overwrite fresher data.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome, GatewayError> {
        let requested_key = self.window.key().to_string();
        self.fetch_seq += 1;
        let seq = self.fetch_seq;
        self.loading = true;

        let result =
            sync::fetch_week_schedules(&self.pool, &self.cache, self.week_date, self.scope).await;

        if seq != self.fetch_seq || requested_key != self.window.key() {
            return Ok(RefreshOutcome::Discarded);
        }
        self.loading = false;

        let (snapshot, outcome) = result?;
        self.snapshot = Some(snapshot);
        Ok(outcome)
    }

    /// Drain pending bus events and reconcile. Events from this view are
    /// never queued (filtered at subscription), so anything here is another
    /// view's change: re-pull. Multiple queued events coalesce into one
    /// fetch; a week change the view must mirror moves the window first.
    pub async fn process_events(&mut self) -> Result<Option<RefreshOutcome>, GatewayError> {
        let mut dirty = false;
        let mut mirror_week: Option<NaiveDate> = None;

        while let Ok(event) = self.events.try_recv() {
            dirty = true;
            if let SyncEvent::WeekChanged { week_date, .. } = event {
                mirror_week = Some(week_date);
            }
        }

        if !dirty {
            return Ok(None);
        }

        if let Some(week_date) = mirror_week {
            if !is_same_week(week_date, self.week_date) {
                return self.set_week(week_date).await.map(Some);
            }
        }
        self.refresh().await.map(Some)
    }

    /// Announce this view's week navigation so sibling views can mirror it.
    pub fn announce_week_change(&self) {
        self.bus.emit_week_change(self.week_date, &self.source);
    }

    /// Editor path: save a whole week for a user, then adopt the saved
    /// snapshot (scoped views) or re-fetch (house-wide views).
    pub async fn save_week(
        &mut self,
        user_id: i64,
        days: &DaySchedule,
    ) -> Result<(), GatewayError> {
        let snapshot = sync::save_week_for_user(
            &self.pool,
            &self.cache,
            &self.bus,
            user_id,
            self.week_date,
            days,
            &self.source,
        )
        .await?;

        if self.scope == Some(user_id) {
            self.snapshot = Some(snapshot);
        } else {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Stage an optimistic (pending) block locally before saving it.
    pub fn stage_block(&mut self, user_id: i64, day: Day, block: TimeBlock) {
        let current = self
            .snapshot
            .clone()
            .unwrap_or_else(|| ScheduleSnapshot::new([user_id]));
        self.snapshot = Some(current.with_block(user_id, day, block));
    }

    /// Save one block. A pending block is inserted and its temp id swapped
    /// for the store-assigned id everywhere the snapshot referenced it; a
    /// confirmed block is updated in place by id.
    pub async fn save_block(
        &mut self,
        user_id: i64,
        day: Day,
        block: TimeBlock,
    ) -> Result<i64, GatewayError> {
        let date = date_for_day(&self.window, day);
        let store_id = schedules::upsert_block(&self.pool, user_id, date, &block).await?;

        if let BlockId::Pending { temp_id } = block.id {
            if let Some(snapshot) = self.snapshot.take() {
                self.snapshot =
                    Some(snapshot.with_block_confirmed(user_id, day, temp_id, store_id));
            }
        }

        self.write_back_and_announce(user_id, Some(day)).await;
        Ok(store_id)
    }

    /// Remove a block. Confirmed blocks are deleted from the store (a
    /// missing id is a no-op); pending blocks were never persisted and are
    /// only dropped locally.
    pub async fn remove_block(
        &mut self,
        user_id: i64,
        day: Day,
        id: BlockId,
    ) -> Result<(), GatewayError> {
        if let BlockId::Confirmed { id } = id {
            schedules::delete_block(&self.pool, id).await?;
        }

        if let Some(snapshot) = self.snapshot.take() {
            self.snapshot = Some(snapshot.without_block(user_id, day, id));
        }

        self.write_back_and_announce(user_id, Some(day)).await;
        Ok(())
    }

    /// After a single-block mutation: invalidate the week everywhere,
    /// re-cache this view's updated snapshot, and tell the other views.
    async fn write_back_and_announce(&self, user_id: i64, day: Option<Day>) {
        self.cache.invalidate_week(self.window.key()).await;
        if let Some(snapshot) = &self.snapshot {
            self.cache
                .put(self.window.key(), self.scope, snapshot.clone())
                .await;
        }
        self.bus
            .emit_schedule_update(user_id, self.window.start_date(), day, &self.source);
    }
}

impl Drop for ScheduleView {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
