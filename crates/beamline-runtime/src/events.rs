use std::sync::{Arc, Mutex};

use beamline_core::CmdId;

/// One lifecycle event emitted by the scheduler (§4.1.4).
#[derive(Debug, Clone)]
pub enum Event {
    /// `(cmdID, cmdName, prevCmdID, globalState)`
    Run {
        cmd_id: CmdId,
        cmd_name: String,
        prev_run_id: Option<CmdId>,
        control: String,
        running: bool,
    },
    /// `(cmdID, controlName, globalState)`
    Finish {
        cmd_id: Option<CmdId>,
        control: String,
        running: bool,
    },
    /// `(cmdID, controlName, globalState)`
    Check {
        cmd_id: CmdId,
        control: String,
        running: bool,
    },
    /// `(cmdID, cmdName, controlName)` — `cmd_id = None` for status polls.
    Error {
        cmd_id: Option<CmdId>,
        cmd_name: String,
        control: String,
    },
    /// `(newGlobalState)`
    StateChange { running: bool },
    /// `(oldRunID, controlName)`
    Abort {
        old_run_id: Option<CmdId>,
        control: String,
    },
}

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Subscriber registry for the six lifecycle event kinds.
///
/// Matches the design note on callback lists: registration returns a
/// [`SubscriptionId`] usable for deregistration, and emission iterates a
/// *snapshot* of the subscriber list so a callback that unsubscribes
/// itself mid-emission never invalidates the iteration (§9 "Callback
/// lists").
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_id: Mutex<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut id_guard = self.next_id.lock().expect("event bus id lock poisoned");
        let id = *id_guard;
        *id_guard += 1;
        drop(id_guard);

        self.subscribers
            .lock()
            .expect("event bus subscriber lock poisoned")
            .push((id, Arc::new(callback)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("event bus subscriber lock poisoned")
            .retain(|(sub_id, _)| *sub_id != id.0);
    }

    /// Invoke every subscriber in insertion order on a snapshot of the
    /// list taken before emission starts. A callback that panics is
    /// caught and logged (the source only guards against raised
    /// exceptions, not process aborts, so `catch_unwind` is the closest
    /// idiomatic analogue) — it must never abort the scheduler loop.
    pub fn emit(&self, event: &Event) {
        let snapshot: Vec<Callback> = self
            .subscribers
            .lock()
            .expect("event bus subscriber lock poisoned")
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for cb in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(event)));
            if result.is_err() {
                bl_warn!(sched, "event subscriber panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscriber_can_unsubscribe_itself_during_emission() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let bus_clone = bus.clone();
        let calls_clone = calls.clone();
        // Capture the id in a cell so the closure can unsubscribe itself.
        let id_cell: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let id_cell_clone = id_cell.clone();

        let id = bus.subscribe(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *id_cell_clone.lock().unwrap() {
                bus_clone.unsubscribe(id);
            }
        });
        *id_cell.lock().unwrap() = Some(id);

        bus.emit(&Event::StateChange { running: true });
        bus.emit(&Event::StateChange { running: false });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emission_order_matches_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe(move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.subscribe(move |_| o2.lock().unwrap().push(2));

        bus.emit(&Event::StateChange { running: true });
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
