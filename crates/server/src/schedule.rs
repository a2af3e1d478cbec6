// In-memory schedule shape and the normalizer that builds it from raw store
// rows.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::ScheduleRow;
use crate::week::{Day, WeekWindow};

/// Identity of a time block across the optimistic-save handshake.
///
/// A block starts `Pending` with a client-assigned temp id and becomes
/// `Confirmed` once the store has assigned a row id. Keeping this a tagged
/// variant (rather than an optional id) forces every save path to handle the
/// swap explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BlockId {
    Pending { temp_id: Uuid },
    Confirmed { id: i64 },
}

impl BlockId {
    pub fn new_pending() -> Self {
        BlockId::Pending {
            temp_id: Uuid::new_v4(),
        }
    }

    pub fn confirmed(self) -> Option<i64> {
        match self {
            BlockId::Confirmed { id } => Some(id),
            BlockId::Pending { .. } => None,
        }
    }
}

/// One labeled interval of a user's schedule on one calendar day.
///
/// When `all_day` is set, `start`/`end` are the full-day sentinels and carry
/// no positioning meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub id: BlockId,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub label: String,
    #[serde(default)]
    pub all_day: bool,
}

impl TimeBlock {
    pub fn new(start: NaiveTime, end: NaiveTime, label: impl Into<String>) -> Self {
        Self {
            id: BlockId::new_pending(),
            start,
            end,
            label: label.into(),
            all_day: false,
        }
    }

    pub fn all_day(label: impl Into<String>) -> Self {
        Self {
            id: BlockId::new_pending(),
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_opt(23, 59, 0).expect("valid time"),
            label: label.into(),
            all_day: true,
        }
    }

    pub fn from_row(row: &ScheduleRow) -> Self {
        Self {
            id: BlockId::Confirmed { id: row.id },
            start: parse_hhmm(&row.start_time).unwrap_or_else(|| {
                tracing::warn!(row_id = row.id, start = %row.start_time, "unparseable start time");
                NaiveTime::MIN
            }),
            end: parse_hhmm(&row.end_time).unwrap_or_else(|| {
                tracing::warn!(row_id = row.id, end = %row.end_time, "unparseable end time");
                NaiveTime::MIN
            }),
            label: row.label.clone(),
            all_day: row.all_day,
        }
    }
}

/// Parse a stored `HH:MM` time, tolerating a trailing seconds component.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Render-time ordering: all-day blocks first, then by start time. Stable, so
/// blocks tied on start keep their store order.
pub fn sort_blocks(blocks: &mut [TimeBlock]) {
    blocks.sort_by_key(|b| (!b.all_day, b.start));
}

pub type DaySchedule = BTreeMap<Day, Vec<TimeBlock>>;

/// Fully-normalized week of schedules: user id -> day -> ordered blocks.
///
/// Every user entry always carries all seven day keys. Snapshots are values:
/// they are recreated on every fetch and never patched in place, so two views
/// holding the same snapshot can never alias each other's edits. The
/// `with_*`/`without_*` helpers return a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleSnapshot {
    users: BTreeMap<i64, DaySchedule>,
}

impl ScheduleSnapshot {
    pub fn new(user_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            users: user_ids
                .into_iter()
                .map(|id| (id, empty_week()))
                .collect(),
        }
    }

    pub fn user_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.users.keys().copied()
    }

    pub fn user(&self, user_id: i64) -> Option<&DaySchedule> {
        self.users.get(&user_id)
    }

    pub fn blocks(&self, user_id: i64, day: Day) -> &[TimeBlock] {
        self.users
            .get(&user_id)
            .and_then(|days| days.get(&day))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.users.values().flat_map(|days| days.values()).all(Vec::is_empty)
    }

    fn push(&mut self, user_id: i64, day: Day, block: TimeBlock) {
        self.users
            .entry(user_id)
            .or_insert_with(empty_week)
            .entry(day)
            .or_default()
            .push(block);
    }

    /// New snapshot with `block` appended to a user's day.
    pub fn with_block(&self, user_id: i64, day: Day, block: TimeBlock) -> Self {
        let mut next = self.clone();
        next.push(user_id, day, block);
        next
    }

    /// New snapshot with the pending block identified by `temp_id` swapped to
    /// its store-assigned id.
    pub fn with_block_confirmed(
        &self,
        user_id: i64,
        day: Day,
        temp_id: Uuid,
        store_id: i64,
    ) -> Self {
        let mut next = self.clone();
        if let Some(blocks) = next.users.get_mut(&user_id).and_then(|days| days.get_mut(&day)) {
            for block in blocks {
                if block.id == (BlockId::Pending { temp_id }) {
                    block.id = BlockId::Confirmed { id: store_id };
                }
            }
        }
        next
    }

    /// New snapshot with the identified block removed from a user's day.
    pub fn without_block(&self, user_id: i64, day: Day, id: BlockId) -> Self {
        let mut next = self.clone();
        if let Some(blocks) = next.users.get_mut(&user_id).and_then(|days| days.get_mut(&day)) {
            blocks.retain(|block| block.id != id);
        }
        next
    }

    /// True if any block anywhere is still pending confirmation.
    pub fn has_pending(&self) -> bool {
        self.users
            .values()
            .flat_map(|days| days.values())
            .flatten()
            .any(|block| matches!(block.id, BlockId::Pending { .. }))
    }
}

fn empty_week() -> DaySchedule {
    Day::ALL.iter().map(|day| (*day, Vec::new())).collect()
}

/// Build a snapshot from raw store rows for one week window.
///
/// Every id in `user_ids` gets a full (possibly empty) week. Rows outside
/// the window's date range are dropped even when their day label matches:
/// the explicit date is authoritative, a "Monday" row from another week must
/// not leak in. Rows with a missing or unknown day label get it re-derived
/// from the date; rows where the date itself is unusable fall back to Sunday
/// with a warning. Store order within a day is preserved; see [`sort_blocks`]
/// for render-time ordering.
pub fn normalize(rows: &[ScheduleRow], window: &WeekWindow, user_ids: &[i64]) -> ScheduleSnapshot {
    let mut snapshot = ScheduleSnapshot::new(user_ids.iter().copied());

    for row in rows {
        let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").ok();
        if let Some(date) = date {
            if !window.contains(date) {
                tracing::debug!(
                    row_id = row.id,
                    date = %row.date,
                    week = window.key(),
                    "dropping row outside requested week"
                );
                continue;
            }
        }

        let labeled = row.day.parse::<Day>().ok();
        let day = match (labeled, date) {
            // The explicit date wins over a disagreeing label.
            (Some(label), Some(date)) => {
                let derived = Day::from_date(date);
                if label != derived {
                    tracing::warn!(
                        row_id = row.id,
                        label = %label,
                        derived = %derived,
                        "day label disagrees with date, using date"
                    );
                }
                derived
            }
            (Some(label), None) => label,
            (None, Some(date)) => {
                tracing::warn!(
                    row_id = row.id,
                    day = %row.day,
                    "invalid day label, deriving from date"
                );
                Day::from_date(date)
            }
            (None, None) => {
                tracing::warn!(
                    row_id = row.id,
                    day = %row.day,
                    date = %row.date,
                    "row has no usable day or date, defaulting to Sunday"
                );
                Day::Sunday
            }
        };

        snapshot.push(row.user_id, day, TimeBlock::from_row(row));
    }

    snapshot
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_hhmm(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid time: {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::week::week_window;

    fn window_jan_2024() -> WeekWindow {
        week_window(NaiveDate::from_ymd_opt(2024, 1, 17).unwrap())
    }

    fn row(id: i64, user_id: i64, day: &str, date: &str, start: &str, end: &str) -> ScheduleRow {
        ScheduleRow {
            id,
            user_id,
            day: day.to_string(),
            date: date.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            label: "Work".to_string(),
            all_day: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn normalizes_the_documented_example() {
        let rows = vec![row(1, 1, "Tuesday", "2024-01-16", "09:00", "17:00")];
        let snapshot = normalize(&rows, &window_jan_2024(), &[1]);

        let tuesday = snapshot.blocks(1, Day::Tuesday);
        assert_eq!(tuesday.len(), 1);
        assert_eq!(tuesday[0].id, BlockId::Confirmed { id: 1 });
        assert_eq!(tuesday[0].start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(tuesday[0].end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(tuesday[0].label, "Work");
        assert!(!tuesday[0].all_day);

        // every other day present and empty
        for day in Day::ALL {
            if day != Day::Tuesday {
                assert!(snapshot.blocks(1, day).is_empty(), "{day} should be empty");
            }
        }
    }

    #[test]
    fn all_seven_days_present_with_no_rows() {
        let snapshot = normalize(&[], &window_jan_2024(), &[1, 2]);
        for user in [1, 2] {
            let days = snapshot.user(user).unwrap();
            assert_eq!(days.len(), 7);
            assert!(days.values().all(Vec::is_empty));
        }
    }

    #[test]
    fn normalizing_twice_is_deep_equal() {
        let rows = vec![
            row(1, 1, "Tuesday", "2024-01-16", "09:00", "17:00"),
            row(2, 2, "Friday", "2024-01-19", "12:00", "14:00"),
        ];
        let window = window_jan_2024();
        assert_eq!(normalize(&rows, &window, &[1, 2]), normalize(&rows, &window, &[1, 2]));
    }

    #[test]
    fn rows_outside_window_are_dropped_despite_matching_day() {
        // A Monday from the previous week must not leak into this week's view
        let rows = vec![
            row(1, 1, "Monday", "2024-01-08", "09:00", "17:00"),
            row(2, 1, "Monday", "2024-01-15", "10:00", "11:00"),
        ];
        let snapshot = normalize(&rows, &window_jan_2024(), &[1]);
        let monday = snapshot.blocks(1, Day::Monday);
        assert_eq!(monday.len(), 1);
        assert_eq!(monday[0].id, BlockId::Confirmed { id: 2 });
    }

    #[test]
    fn bad_day_label_is_repaired_from_date() {
        let rows = vec![row(1, 1, "someday", "2024-01-18", "09:00", "10:00")];
        let snapshot = normalize(&rows, &window_jan_2024(), &[1]);
        assert_eq!(snapshot.blocks(1, Day::Thursday).len(), 1);
    }

    #[test]
    fn label_disagreeing_with_date_follows_the_date() {
        let rows = vec![row(1, 1, "Monday", "2024-01-18", "09:00", "10:00")];
        let snapshot = normalize(&rows, &window_jan_2024(), &[1]);
        assert!(snapshot.blocks(1, Day::Monday).is_empty());
        assert_eq!(snapshot.blocks(1, Day::Thursday).len(), 1);
    }

    #[test]
    fn unusable_day_and_date_fall_back_to_sunday() {
        let rows = vec![row(1, 1, "", "nonsense", "09:00", "10:00")];
        let snapshot = normalize(&rows, &window_jan_2024(), &[1]);
        assert_eq!(snapshot.blocks(1, Day::Sunday).len(), 1);
    }

    #[test]
    fn store_order_is_preserved_within_a_day() {
        let rows = vec![
            row(1, 1, "Tuesday", "2024-01-16", "14:00", "15:00"),
            row(2, 1, "Tuesday", "2024-01-16", "09:00", "10:00"),
        ];
        let snapshot = normalize(&rows, &window_jan_2024(), &[1]);
        let ids: Vec<_> = snapshot
            .blocks(1, Day::Tuesday)
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(
            ids,
            vec![BlockId::Confirmed { id: 1 }, BlockId::Confirmed { id: 2 }]
        );
    }

    #[test]
    fn sort_puts_all_day_first_then_by_start() {
        let mut blocks = vec![
            TimeBlock::new(
                NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                "Afternoon",
            ),
            TimeBlock::all_day("Day off"),
            TimeBlock::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                "Morning",
            ),
        ];
        sort_blocks(&mut blocks);
        let labels: Vec<_> = blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["Day off", "Morning", "Afternoon"]);
    }

    #[test]
    fn confirm_swaps_pending_id_everywhere() {
        let pending = TimeBlock::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            "Gym",
        );
        let temp_id = match pending.id {
            BlockId::Pending { temp_id } => temp_id,
            BlockId::Confirmed { .. } => unreachable!(),
        };
        let snapshot = ScheduleSnapshot::new([1]).with_block(1, Day::Monday, pending);
        assert!(snapshot.has_pending());

        let confirmed = snapshot.with_block_confirmed(1, Day::Monday, temp_id, 42);
        assert!(!confirmed.has_pending());
        assert_eq!(
            confirmed.blocks(1, Day::Monday)[0].id,
            BlockId::Confirmed { id: 42 }
        );
        // the original snapshot is a distinct value, untouched
        assert!(snapshot.has_pending());
    }

    #[test]
    fn snapshot_serializes_day_names_as_keys() {
        let rows = vec![row(1, 1, "Tuesday", "2024-01-16", "09:00", "17:00")];
        let snapshot = normalize(&rows, &window_jan_2024(), &[1]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["1"]["Tuesday"][0]["start"], "09:00");
        assert_eq!(json["1"]["Tuesday"][0]["label"], "Work");
        assert!(json["1"]["Sunday"].as_array().unwrap().is_empty());
    }
}
