// In-process publish/subscribe for sync notifications between views.
//
// Events are dirty flags, not patches: they carry just enough to decide
// whether to re-fetch, never schedule data itself. Delivery is synchronous
// and in subscription order; a panicking subscriber is isolated and logged
// so the remaining subscribers still hear the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::week::Day;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SyncEvent {
    ScheduleUpdated {
        user_id: i64,
        week_date: NaiveDate,
        day: Option<Day>,
        source: String,
    },
    WeekChanged {
        week_date: NaiveDate,
        source: String,
    },
    UserColorChanged {
        user_id: i64,
        source: String,
    },
    SyncRequired {
        source: String,
    },
}

impl SyncEvent {
    /// Tag naming the view that emitted the event, used for self-echo
    /// suppression.
    pub fn source(&self) -> &str {
        match self {
            SyncEvent::ScheduleUpdated { source, .. }
            | SyncEvent::WeekChanged { source, .. }
            | SyncEvent::UserColorChanged { source, .. }
            | SyncEvent::SyncRequired { source } => source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::ScheduleUpdated { .. } => "schedule-updated",
            SyncEvent::WeekChanged { .. } => "week-changed",
            SyncEvent::UserColorChanged { .. } => "user-color-changed",
            SyncEvent::SyncRequired { .. } => "sync-required",
        }
    }
}

type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(u64, Handler)>,
}

/// Injectable observer registry shared as `Arc<EventBus>` across views and
/// request handlers. Constructed once at application start; isolated
/// instances are cheap, which is what makes the views testable.
#[derive(Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers run on the emitting thread, in
    /// subscription order.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every current subscriber, then return.
    ///
    /// Delivery iterates a snapshot of the subscriber list taken before the
    /// first handler runs, so handlers may subscribe or unsubscribe freely
    /// mid-delivery.
    pub fn emit(&self, event: SyncEvent) {
        let handlers: Vec<Handler> = self
            .registry
            .lock()
            .subscribers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        tracing::debug!(kind = event.kind(), source = event.source(), "sync event");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(
                    kind = event.kind(),
                    "sync event subscriber panicked, continuing delivery"
                );
            }
        }
    }

    pub fn emit_schedule_update(
        &self,
        user_id: i64,
        week_date: NaiveDate,
        day: Option<Day>,
        source: &str,
    ) {
        self.emit(SyncEvent::ScheduleUpdated {
            user_id,
            week_date,
            day,
            source: source.to_string(),
        });
    }

    pub fn emit_week_change(&self, week_date: NaiveDate, source: &str) {
        self.emit(SyncEvent::WeekChanged {
            week_date,
            source: source.to_string(),
        });
    }

    pub fn emit_user_color_change(&self, user_id: i64, source: &str) {
        self.emit(SyncEvent::UserColorChanged {
            user_id,
            source: source.to_string(),
        });
    }

    pub fn emit_sync_required(&self, source: &str) {
        self.emit(SyncEvent::SyncRequired {
            source: source.to_string(),
        });
    }
}

/// Handle returned by [`EventBus::subscribe`]. `unsubscribe` may be called
/// any number of times, including while an emit is in flight.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn test_event(source: &str) -> SyncEvent {
        SyncEvent::SyncRequired {
            source: source.to_string(),
        }
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let first = order.clone();
        let _s1 = bus.subscribe(move |_| first.lock().unwrap().push(1));
        let second = order.clone();
        let _s2 = bus.subscribe(move |_| second.lock().unwrap().push(2));
        let third = order.clone();
        let _s3 = bus.subscribe(move |_| third.lock().unwrap().push(3));

        bus.emit(test_event("test"));
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unsubscribed_handler_hears_nothing_more() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let seen = count.clone();
        let sub = bus.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(test_event("test"));
        sub.unsubscribe();
        bus.emit(test_event("test"));
        // idempotent
        sub.unsubscribe();
        bus.emit(test_event("test"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_block_later_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = bus.subscribe(|_| panic!("subscriber bug"));
        let seen = count.clone();
        let _good = bus.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(test_event("test"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_delivery_is_safe() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let slot: Arc<StdMutex<Option<Subscription>>> = Arc::new(StdMutex::new(None));
        let inner_slot = slot.clone();
        let sub = bus.subscribe(move |_| {
            if let Some(sub) = inner_slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        let seen = count.clone();
        let _after = bus.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        // first emit: the self-unsubscribing handler runs and removes itself,
        // later subscriber still delivered to
        bus.emit(test_event("test"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // second emit: only the surviving subscriber
        bus.emit(test_event("test"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn events_expose_their_source_tag() {
        let event = SyncEvent::WeekChanged {
            week_date: NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
            source: "roommates".to_string(),
        };
        assert_eq!(event.source(), "roommates");
        assert_eq!(event.kind(), "week-changed");
    }

    #[test]
    fn events_serialize_with_kind_tags() {
        let event = SyncEvent::ScheduleUpdated {
            user_id: 1,
            week_date: NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
            day: Some(Day::Tuesday),
            source: "editor".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "schedule-updated");
        assert_eq!(json["day"], "Tuesday");
        assert_eq!(json["week_date"], "2024-01-14");
    }
}
