pub mod sequences;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use orion_error::prelude::*;

use beamline_core::action_status::{self, ActionStatus, ChildStatus};
use beamline_core::{CmdId, Command};

use crate::error::RuntimeResult;
use crate::events::Event;
use crate::scheduler::Scheduler;

/// One step of a concrete Action's expansion: the control it targets plus
/// the command to enqueue on it.
pub type Step = (String, Command);

type StatusCallback = Arc<dyn Fn(ActionStatus) + Send + Sync>;

/// Handle returned by [`Action::subscribe`], usable with
/// [`Action::unsubscribe`]. Distinct from the scheduler's own
/// [`crate::events::SubscriptionId`] since it names a subscription to one
/// Action's aggregate, not to the scheduler's raw event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSubscriptionId(u64);

fn event_touches(event: &Event, controls: &HashSet<String>) -> bool {
    match event {
        // A global state flip can change every Action's aggregate (the
        // paused-fallback row of the §4.2 table), so it always qualifies.
        Event::StateChange { .. } => true,
        Event::Run { control, .. } | Event::Finish { control, .. } | Event::Check { control, .. } | Event::Error { control, .. } | Event::Abort { control, .. } => {
            controls.contains(control)
        }
    }
}

async fn compute_status(scheduler: &Scheduler, children: &[(String, CmdId)], abort_latched: &AtomicBool) -> ActionStatus {
    if abort_latched.load(Ordering::SeqCst) {
        return ActionStatus::Abort;
    }
    let mut children_status = Vec::with_capacity(children.len());
    for (control, id) in children {
        children_status.push(scheduler.child_status(control, *id).await);
    }
    action_status::aggregate(&children_status, scheduler.is_running())
}

fn notify_subscribers(subscribers: &StdMutex<Vec<(u64, StatusCallback)>>, status: ActionStatus) {
    let snapshot: Vec<StatusCallback> = subscribers.lock().expect("action subscriber lock poisoned").iter().map(|(_, cb)| cb.clone()).collect();
    for cb in snapshot {
        cb(status);
    }
}

/// Recompute the aggregate and notify subscribers only if it actually
/// changed since the last recomputation (§4.2's closing rule: "whenever
/// aggregate status changes, notify Action-level subscribers").
async fn recompute_and_notify(
    scheduler: &Scheduler,
    children: &[(String, CmdId)],
    abort_latched: &AtomicBool,
    last_status: &StdMutex<Option<ActionStatus>>,
    subscribers: &StdMutex<Vec<(u64, StatusCallback)>>,
) {
    let status = compute_status(scheduler, children, abort_latched).await;
    let changed = {
        let mut guard = last_status.lock().expect("action status lock poisoned");
        let changed = *guard != Some(status);
        *guard = Some(status);
        changed
    };
    if changed {
        notify_subscribers(subscribers, status);
    }
}

/// A running instance of one of the five concrete Actions (§4.2).
///
/// Bound to the scheduler at construction; tracks every child command's
/// `(control, cmdID)` so it can aggregate status, abort, or tear itself
/// down without needing the caller to keep that bookkeeping. Also
/// subscribes to the scheduler's event bus for its children's controls
/// (§3's `subscribers` field), so a caller can react to a status
/// transition by callback instead of polling `status()` — grounded on
/// `AutoCommand.add_status_change_callback` / `_status_change_callbacks`
/// in `autocon.py`.
pub struct Action {
    scheduler: Scheduler,
    children: Vec<(String, CmdId)>,
    abort_latched: Arc<AtomicBool>,
    subscribers: Arc<StdMutex<Vec<(u64, StatusCallback)>>>,
    next_sub_id: AtomicU64,
    last_status: Arc<StdMutex<Option<ActionStatus>>>,
    event_sub: crate::events::SubscriptionId,
}

impl Action {
    /// `initialize()` — transiently pauses the scheduler, enqueues every
    /// step in order, then restores the prior global state (§4.2 common
    /// contract). Steps are enqueued in the order given so FIFO-per-control
    /// ordering (I1) places them correctly relative to each other.
    ///
    /// Also subscribes to the scheduler's event bus, filtered to events
    /// touching one of this Action's own children, so aggregate-status
    /// transitions can be pushed to subscribers as they happen rather
    /// than only discovered the next time someone calls `status()`.
    pub async fn initialize(scheduler: &Scheduler, steps: Vec<Step>) -> RuntimeResult<Self> {
        let was_running = scheduler.is_running();
        scheduler.set_automator_state(false);

        let mut children = Vec::with_capacity(steps.len());
        let mut enqueue_err = None;
        for (control, cmd) in steps {
            match scheduler.add_cmd(&control, &cmd.cmd, cmd.args, cmd.kwargs, false).await {
                Ok(id) => children.push((control, id)),
                Err(e) => {
                    enqueue_err = Some(e);
                    break;
                }
            }
        }

        scheduler.set_automator_state(was_running);

        if let Some(e) = enqueue_err {
            return Err(e).err_conv();
        }

        let abort_latched = Arc::new(AtomicBool::new(false));
        let subscribers: Arc<StdMutex<Vec<(u64, StatusCallback)>>> = Arc::new(StdMutex::new(Vec::new()));
        let last_status = Arc::new(StdMutex::new(None));
        let control_names: HashSet<String> = children.iter().map(|(control, _)| control.clone()).collect();

        let cb_scheduler = scheduler.clone();
        let cb_children = children.clone();
        let cb_abort = abort_latched.clone();
        let cb_subscribers = subscribers.clone();
        let cb_last_status = last_status.clone();

        let event_sub = scheduler.subscribe(move |event| {
            if !event_touches(event, &control_names) {
                return;
            }
            let scheduler = cb_scheduler.clone();
            let children = cb_children.clone();
            let abort_latched = cb_abort.clone();
            let subscribers = cb_subscribers.clone();
            let last_status = cb_last_status.clone();
            tokio::spawn(async move {
                recompute_and_notify(&scheduler, &children, &abort_latched, &last_status, &subscribers).await;
            });
        });

        Ok(Self {
            scheduler: scheduler.clone(),
            children,
            abort_latched,
            subscribers,
            next_sub_id: AtomicU64::new(1),
            last_status,
            event_sub,
        })
    }

    /// The ids this Action is tracking, in enqueue order — exposed for
    /// tests and for Actions that need to chain a closing barrier onto an
    /// opening one (e.g. the second stop-coflow barrier in §4.2.1 step 7).
    pub fn child_ids(&self) -> &[(String, CmdId)] {
        &self.children
    }

    /// Aggregate status per the §4.2 table, or `Abort` once `abort()` has
    /// been called (latched — an aborted Action never reports anything
    /// else again, even after its children settle to `Done`).
    pub async fn status(&self) -> ActionStatus {
        compute_status(&self.scheduler, &self.children, &self.abort_latched).await
    }

    /// Register a callback fired whenever this Action's aggregate status
    /// actually changes (never for the status it is already in at
    /// subscribe time). Mirrors [`Scheduler::subscribe`]'s ergonomics.
    pub fn subscribe<F>(&self, callback: F) -> ActionSubscriptionId
    where
        F: Fn(ActionStatus) + Send + Sync + 'static,
    {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().expect("action subscriber lock poisoned").push((id, Arc::new(callback)));
        ActionSubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: ActionSubscriptionId) {
        self.subscribers.lock().expect("action subscriber lock poisoned").retain(|(sub_id, _)| *sub_id != id.0);
    }

    /// `abort()` — pause, unwind every child (dequeue the still-queued,
    /// stop the running/waiting), restore prior state, latch `Abort`.
    pub async fn abort(&self) {
        self.unwind().await;
        self.abort_latched.store(true, Ordering::SeqCst);
        recompute_and_notify(&self.scheduler, &self.children, &self.abort_latched, &self.last_status, &self.subscribers).await;
    }

    /// `delete_command()` — the same unwind as `abort()` but without
    /// latching the aggregate, so a caller that immediately re-queues a
    /// replacement sees a fresh `queue`/`done` read rather than a frozen
    /// `abort`.
    pub async fn delete_command(&self) {
        self.unwind().await;
        recompute_and_notify(&self.scheduler, &self.children, &self.abort_latched, &self.last_status, &self.subscribers).await;
    }

    async fn unwind(&self) {
        let was_running = self.scheduler.is_running();
        self.scheduler.set_automator_state(false);
        for (control, id) in &self.children {
            match self.scheduler.child_status(control, *id).await {
                ChildStatus::Queue => {
                    self.scheduler.remove_cmd(control, *id).await;
                }
                ChildStatus::Run | ChildStatus::Wait => {
                    self.scheduler.stop_running_item(control).await;
                }
                ChildStatus::Done => {}
            }
        }
        self.scheduler.set_automator_state(was_running);
    }
}

impl Drop for Action {
    fn drop(&mut self) {
        self.scheduler.unsubscribe(self.event_sub);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use beamline_core::{ActionStatus, Kwargs, Value};

    use super::*;
    use crate::dispatch::{Dispatch, DispatchError, DispatchOutcome};

    /// Always reports idle immediately — enough to drive a command from
    /// `queue` straight to `done` on the next scheduler tick.
    struct EchoDispatch;

    #[async_trait]
    impl Dispatch for EchoDispatch {
        async fn dispatch(&self, _cmd: &str, _args: &[Value], _kwargs: &Kwargs) -> Result<DispatchOutcome, DispatchError> {
            Ok(DispatchOutcome::ok("idle"))
        }
    }

    fn plain(cmd: &str) -> Command {
        Command::new(CmdId::new(0), cmd)
    }

    #[tokio::test]
    async fn initialize_enqueues_every_step_in_order() {
        let scheduler = Scheduler::new();
        scheduler.add_control("a", "test", Arc::new(EchoDispatch)).unwrap();
        scheduler.add_control("b", "test", Arc::new(EchoDispatch)).unwrap();

        let steps = vec![("a".to_string(), plain("one")), ("b".to_string(), plain("two")), ("a".to_string(), plain("three"))];
        let action = Action::initialize(&scheduler, steps).await.unwrap();

        assert_eq!(action.child_ids().len(), 3);
        assert_eq!(action.status().await, ActionStatus::Queue);
    }

    #[tokio::test]
    async fn status_reaches_done_once_the_scheduler_drains_every_child() {
        let scheduler = Scheduler::new();
        scheduler.add_control("a", "test", Arc::new(EchoDispatch)).unwrap();

        let steps = vec![("a".to_string(), plain("one")), ("a".to_string(), plain("two"))];
        let action = Action::initialize(&scheduler, steps).await.unwrap();

        let handle = tokio::spawn(scheduler.clone().run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop();
        handle.await.unwrap().unwrap();

        assert_eq!(action.status().await, ActionStatus::Done);
    }

    #[tokio::test]
    async fn abort_latches_even_after_children_would_otherwise_settle() {
        let scheduler = Scheduler::new();
        scheduler.add_control("a", "test", Arc::new(EchoDispatch)).unwrap();

        let steps = vec![("a".to_string(), plain("one"))];
        let action = Action::initialize(&scheduler, steps).await.unwrap();

        action.abort().await;
        assert_eq!(action.status().await, ActionStatus::Abort);

        let handle = tokio::spawn(scheduler.clone().run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();
        handle.await.unwrap().unwrap();

        // Still Abort, not Done, even though the child would have drained.
        assert_eq!(action.status().await, ActionStatus::Abort);
    }

    #[tokio::test]
    async fn abort_dequeues_a_still_queued_child() {
        let scheduler = Scheduler::new();
        scheduler.add_control("a", "test", Arc::new(EchoDispatch)).unwrap();

        // Pause first so the first command never starts running.
        scheduler.set_automator_state(false);
        let steps = vec![("a".to_string(), plain("one")), ("a".to_string(), plain("two"))];
        let action = Action::initialize(&scheduler, steps).await.unwrap();

        action.abort().await;

        let (control, id) = &action.child_ids()[1];
        assert_eq!(scheduler.child_status(control, *id).await, ChildStatus::Done);
    }

    #[tokio::test]
    async fn subscriber_is_notified_once_the_action_reaches_done() {
        let scheduler = Scheduler::new();
        scheduler.add_control("a", "test", Arc::new(EchoDispatch)).unwrap();

        let steps = vec![("a".to_string(), plain("one"))];
        let action = Action::initialize(&scheduler, steps).await.unwrap();

        let seen: Arc<StdMutex<Vec<ActionStatus>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        action.subscribe(move |status| seen_clone.lock().unwrap().push(status));

        let handle = tokio::spawn(scheduler.clone().run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop();
        handle.await.unwrap().unwrap();
        // Give the event-driven recompute task a moment to run after the
        // scheduler's own Finish event fires.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(seen.lock().unwrap().last(), Some(&ActionStatus::Done));
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_notifications() {
        let scheduler = Scheduler::new();
        scheduler.add_control("a", "test", Arc::new(EchoDispatch)).unwrap();

        let steps = vec![("a".to_string(), plain("one"))];
        let action = Action::initialize(&scheduler, steps).await.unwrap();

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let sub = action.subscribe(move |_| {
            calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        action.unsubscribe(sub);

        let handle = tokio::spawn(scheduler.clone().run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();
        handle.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
