use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use orion_error::prelude::*;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use beamline_core::action_status::ChildStatus;
use beamline_core::command::{CMD_ABORT, WAIT_SYNC_PREFIX};
use beamline_core::{CmdId, Command, CoreReason, CoreResult, IdGen, Kwargs, Status, Value};

use crate::control::Control;
use crate::dispatch::Dispatch;
use crate::events::{Event, EventBus, SubscriptionId};

/// How often the scheduler polls a non-waiting control's hardware state
/// and, when idle, how long it sleeps between ticks (§5: "~2 Hz when
/// idle and immediately when it just advanced a queue").
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn status_tag(status: &Status) -> Option<String> {
    match status {
        Status::Idle => Some("idle".to_string()),
        Status::Reported(s) => Some(s.clone()),
        Status::WaitSync { token, .. } | Status::WaitCheck { token, .. } => Some(token.clone()),
        Status::WaitTime { .. } | Status::WaitCmd { .. } => None,
    }
}

fn status_kwargs(inst_name: &str) -> Kwargs {
    Kwargs::from([("inst_name".to_string(), Value::Str(inst_name.to_string()))])
}

struct Inner {
    registry: StdRwLock<HashMap<String, Arc<AsyncMutex<Control>>>>,
    order: StdRwLock<Vec<String>>,
    ids: IdGen,
    running: AtomicBool,
    abort_pending: AtomicBool,
    events: EventBus,
    check_tx: mpsc::Sender<bool>,
    check_rx: AsyncMutex<mpsc::Receiver<bool>>,
    cancel: CancellationToken,
}

/// The Automator: a cooperative multi-queue scheduler. Cheaply `Clone`
/// (an `Arc` handle) so Actions and the lifecycle layer can share it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (check_tx, check_rx) = mpsc::channel(16);
        Self {
            inner: Arc::new(Inner {
                registry: StdRwLock::new(HashMap::new()),
                order: StdRwLock::new(Vec::new()),
                ids: IdGen::new(),
                running: AtomicBool::new(true),
                abort_pending: AtomicBool::new(false),
                events: EventBus::new(),
                check_tx,
                check_rx: AsyncMutex::new(check_rx),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    // -- registration ---------------------------------------------------

    /// Registers a control. Fails if `name` already exists.
    pub fn add_control(&self, name: &str, kind: &str, dispatch: Arc<dyn Dispatch>) -> CoreResult<()> {
        let mut reg = self.inner.registry.write().expect("registry lock poisoned");
        if reg.contains_key(name) {
            return Err(StructError::from(CoreReason::DuplicateControl));
        }
        reg.insert(
            name.to_string(),
            Arc::new(AsyncMutex::new(Control::new(name, kind, dispatch))),
        );
        drop(reg);
        self.inner.order.write().expect("order lock poisoned").push(name.to_string());
        bl_info!(sched, control = name, kind = kind, "control registered");
        Ok(())
    }

    fn control_arc(&self, name: &str) -> Option<Arc<AsyncMutex<Control>>> {
        self.inner.registry.read().expect("registry lock poisoned").get(name).cloned()
    }

    fn names_snapshot(&self) -> Vec<String> {
        self.inner.order.read().expect("order lock poisoned").clone()
    }

    // -- enqueue / dequeue ------------------------------------------------

    /// Enqueues a command; returns its new monotonic id. Never blocks on
    /// dispatch (§4.1). Fails with `UnknownControl` if `name` was never
    /// registered (the "enqueue rejection" error of §7).
    pub async fn add_cmd(
        &self,
        name: &str,
        cmd: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        at_start: bool,
    ) -> CoreResult<CmdId> {
        let arc = self
            .control_arc(name)
            .ok_or_else(|| StructError::from(CoreReason::UnknownControl))?;
        let cmd_id = self.inner.ids.next_cmd_id();
        let command = Command { cmd_id, cmd: cmd.to_string(), args, kwargs };
        arc.lock().await.enqueue(command, at_start);
        Ok(cmd_id)
    }

    /// Allocate a fresh wait id without enqueuing anything. Actions use
    /// this to name barriers before they build the commands that
    /// reference them.
    pub fn next_wait_id(&self) -> beamline_core::WaitId {
        self.inner.ids.next_wait_id()
    }

    /// Removes a still-queued command. No-op (returns `false`) for an
    /// unknown control — only `add_cmd` rejects those.
    pub async fn remove_cmd(&self, name: &str, cmd_id: CmdId) -> bool {
        let Some(arc) = self.control_arc(name) else { return false };
        arc.lock().await.remove(cmd_id)
    }

    /// Shifts a queued command by `delta` positions (positive = earlier).
    pub async fn reorder_cmd(&self, name: &str, cmd_id: CmdId, delta: i32) {
        if let Some(arc) = self.control_arc(name) {
            arc.lock().await.reorder(cmd_id, delta);
        }
    }

    /// One child command's status, for Action aggregation (§4.2): `Queue`
    /// while still in the control's queue, `Run`/`Wait` while it is the
    /// control's current `run_id` (depending on whether the control's
    /// status itself is a wait), `Done` once neither — including for a
    /// control that no longer exists.
    pub async fn child_status(&self, name: &str, cmd_id: CmdId) -> ChildStatus {
        let Some(arc) = self.control_arc(name) else { return ChildStatus::Done };
        let guard = arc.lock().await;
        if guard.queue.iter().any(|c| c.cmd_id == cmd_id) {
            return ChildStatus::Queue;
        }
        if guard.run_id == Some(cmd_id) {
            return if guard.status.is_wait() { ChildStatus::Wait } else { ChildStatus::Run };
        }
        ChildStatus::Done
    }

    // -- global state -----------------------------------------------------

    /// `run ⇄ pause`. Emits `on_state_change` only if the state actually
    /// changed.
    pub fn set_automator_state(&self, running: bool) {
        let prev = self.inner.running.swap(running, Ordering::SeqCst);
        if prev != running {
            bl_info!(sched, running = running, "automator state changed");
            self.inner.events.emit(&Event::StateChange { running });
        }
    }

    /// For each registered control: consume a pending time/sync wait by
    /// resetting it to idle, or head-insert and immediately dispatch a
    /// synthetic `abort` otherwise. Emits `on_abort` per control.
    pub async fn stop_running_items(&self) {
        for name in self.names_snapshot() {
            self.stop_running_item(&name).await;
        }
    }

    pub async fn stop_running_item(&self, name: &str) {
        let Some(arc) = self.control_arc(name) else { return };
        let mut guard = arc.lock().await;
        let old_run_id = guard.run_id;
        match guard.status {
            Status::WaitTime { .. } | Status::WaitSync { .. } => {
                guard.status = Status::Idle;
                guard.run_id = None;
            }
            _ => {
                let cmd_id = self.inner.ids.next_cmd_id();
                guard.enqueue(Command::new(cmd_id, CMD_ABORT), true);
                self.run_next_cmd(name, &mut guard).await;
            }
        }
        drop(guard);
        bl_info!(sched, control = name, "stop_running_item applied");
        self.inner.events.emit(&Event::Abort { old_run_id, control: name.to_string() });
    }

    /// External response channel for `wait_check_*`. The scheduler pops
    /// the first available element and discards any stragglers queued
    /// after it before resuming (§6).
    pub fn check_response(&self, ok: bool) {
        let _ = self.inner.check_tx.try_send(ok);
    }

    async fn await_check_response(&self) -> bool {
        let mut rx = self.inner.check_rx.lock().await;
        let first = rx.recv().await.unwrap_or(false);
        while rx.try_recv().is_ok() {}
        first
    }

    /// Request that all in-flight activity stop; consumed by the next
    /// loop tick.
    pub fn abort(&self) {
        self.inner.abort_pending.store(true, Ordering::SeqCst);
    }

    /// Request the scheduler loop terminate.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    // -- run loop ---------------------------------------------------------

    /// Run the cooperative scheduling loop until [`stop`](Self::stop) is
    /// called. Intended to be driven by a single spawned task — per §5
    /// there is exactly one scheduler thread.
    #[tracing::instrument(name = "scheduler.run", skip_all)]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            if self.inner.cancel.is_cancelled() {
                break;
            }
            if self.inner.abort_pending.swap(false, Ordering::SeqCst) {
                self.stop_running_items().await;
                continue;
            }
            if !self.is_running() {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    _ = self.inner.cancel.cancelled() => break,
                }
                continue;
            }

            let mut any_progress = false;
            for name in self.names_snapshot() {
                let Some(arc) = self.control_arc(&name) else { continue };
                let mut guard = arc.lock().await;
                if guard.status.is_wait() {
                    self.check_wait(&name, &mut guard).await;
                } else {
                    self.check_status(&name, &mut guard).await;
                }
                if guard.status.is_idle() && !guard.queue.is_empty() {
                    self.run_next_cmd(&name, &mut guard).await;
                    any_progress = true;
                }
            }

            if !any_progress {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    _ = self.inner.cancel.cancelled() => break,
                }
            }
        }
        bl_info!(sched, "scheduler loop exited");
        Ok(())
    }

    // -- §4.1.1 check_status ------------------------------------------------

    async fn check_status(&self, name: &str, control: &mut Control) {
        let prev_tag = status_tag(&control.status);
        match control.dispatch.dispatch("status", &[], &status_kwargs(name)).await {
            Ok(outcome) => {
                let new_state = outcome.reported_state;
                control.status = if new_state == "idle" { Status::Idle } else { Status::Reported(new_state.clone()) };
                if let Some(prev) = prev_tag {
                    if prev != "idle" && new_state == "idle" {
                        let run_id = control.run_id.take();
                        self.inner.events.emit(&Event::Finish { cmd_id: run_id, control: name.to_string(), running: self.is_running() });
                    }
                }
            }
            Err(e) => {
                bl_warn!(conn, control = name, error = %e.0, "status dispatch failed");
                self.inner.events.emit(&Event::Error { cmd_id: None, cmd_name: "status".to_string(), control: name.to_string() });
            }
        }
    }

    // -- §4.1.2 run_next_cmd --------------------------------------------

    async fn run_next_cmd(&self, name: &str, control: &mut Control) {
        let Some(cmd) = control.queue.pop_front() else { return };
        let prev_run_id = control.run_id;
        control.run_id = Some(cmd.cmd_id);
        self.inner.events.emit(&Event::Run {
            cmd_id: cmd.cmd_id,
            cmd_name: cmd.cmd.clone(),
            prev_run_id,
            control: name.to_string(),
            running: self.is_running(),
        });

        if cmd.is_wait() {
            self.install_wait(control, &cmd);
            return;
        }

        match control.dispatch.dispatch(&cmd.cmd, &cmd.args, &cmd.kwargs).await {
            Ok(outcome) if outcome.ok => {
                let expected_state = outcome.reported_state;
                match control.dispatch.dispatch("status", &[], &status_kwargs(name)).await {
                    Ok(actual) if actual.reported_state == expected_state => {
                        control.status = if expected_state == "idle" { Status::Idle } else { Status::Reported(expected_state) };
                        self.inner.events.emit(&Event::Finish { cmd_id: Some(cmd.cmd_id), control: name.to_string(), running: self.is_running() });
                    }
                    Ok(_) => {
                        let wait_id = self.inner.ids.next_wait_id();
                        control.status = Status::WaitCmd {
                            wait_id,
                            inst_conds: vec![(name.to_string(), vec![expected_state])],
                        };
                    }
                    Err(e) => {
                        bl_warn!(conn, control = name, error = %e.0, "post-command status poll failed");
                        self.inner.events.emit(&Event::Error { cmd_id: Some(cmd.cmd_id), cmd_name: "status".to_string(), control: name.to_string() });
                    }
                }
            }
            Ok(outcome) => {
                control.status = if outcome.reported_state == "idle" { Status::Idle } else { Status::Reported(outcome.reported_state) };
                self.inner.events.emit(&Event::Error { cmd_id: Some(cmd.cmd_id), cmd_name: cmd.cmd.clone(), control: name.to_string() });
            }
            Err(e) => {
                bl_warn!(conn, control = name, cmd = %cmd.cmd, error = %e.0, "dispatch fault");
                self.inner.events.emit(&Event::Error { cmd_id: Some(cmd.cmd_id), cmd_name: cmd.cmd.clone(), control: name.to_string() });
            }
        }
    }

    fn install_wait(&self, control: &mut Control, cmd: &Command) {
        let wait_id = beamline_core::WaitId::new(
            cmd.cmd.rsplit('_').next().and_then(|s| s.parse().ok()).unwrap_or(0),
        );
        let inst_conds = cmd.inst_conds().map(|c| c.to_vec()).unwrap_or_default();
        control.status = match cmd.condition() {
            Some("time") => Status::WaitTime {
                wait_id,
                t_start: Instant::now(),
                t_wait: cmd.t_wait().unwrap_or_default(),
            },
            Some("check") => Status::WaitCheck { wait_id, token: cmd.cmd.clone(), inst_conds },
            _ if cmd.cmd.starts_with(WAIT_SYNC_PREFIX) => {
                Status::WaitSync { wait_id, token: cmd.cmd.clone(), inst_conds }
            }
            _ => Status::WaitCmd { wait_id, inst_conds },
        };
    }

    // -- §4.1.3 check_wait --------------------------------------------------

    async fn check_wait(&self, name: &str, control: &mut Control) {
        match control.status.clone() {
            Status::WaitTime { t_start, t_wait, .. } => {
                if t_start.elapsed() >= t_wait {
                    self.check_status(name, control).await;
                }
            }
            Status::WaitCmd { inst_conds, .. } => {
                if self.inst_conds_satisfied_resolving(&inst_conds).await {
                    self.recheck_all(&inst_conds).await;
                    self.check_status(name, control).await;
                }
            }
            Status::WaitSync { inst_conds, token, .. } => {
                if self.barrier_satisfied(&inst_conds, &token).await {
                    self.recheck_all(&inst_conds).await;
                    self.check_status(name, control).await;
                }
            }
            Status::WaitCheck { inst_conds, token, .. } => {
                if self.barrier_satisfied(&inst_conds, &token).await {
                    let run_id = control.run_id.unwrap_or(CmdId::new(0));
                    self.inner.events.emit(&Event::Check { cmd_id: run_id, control: name.to_string(), running: self.is_running() });
                    let ok = self.await_check_response().await;
                    if ok {
                        self.recheck_all(&inst_conds).await;
                        self.check_status(name, control).await;
                    } else {
                        self.set_automator_state(false);
                    }
                }
            }
            Status::Idle | Status::Reported(_) => {}
        }
    }

    /// For `WaitCmd`: each named participant's status is re-polled if it
    /// is itself a transient `wait_cmd` before comparing against its
    /// accepted set.
    async fn inst_conds_satisfied_resolving(&self, inst_conds: &[(String, Vec<String>)]) -> bool {
        for (ctrl_name, accepted) in inst_conds {
            let Some(arc) = self.control_arc(ctrl_name) else { return false };
            let mut guard = arc.lock().await;
            if matches!(guard.status, Status::WaitCmd { .. }) {
                self.check_status(ctrl_name, &mut guard).await;
            }
            let Some(tag) = status_tag(&guard.status) else { return false };
            if !accepted.iter().any(|s| s == &tag) {
                return false;
            }
        }
        true
    }

    /// For `WaitSync`/`WaitCheck`: release iff every participant's
    /// current status tag equals the shared barrier token.
    async fn barrier_satisfied(&self, inst_conds: &[(String, Vec<String>)], token: &str) -> bool {
        for (ctrl_name, _) in inst_conds {
            let Some(arc) = self.control_arc(ctrl_name) else { return false };
            let guard = arc.lock().await;
            if status_tag(&guard.status).as_deref() != Some(token) {
                return false;
            }
        }
        true
    }

    async fn recheck_all(&self, inst_conds: &[(String, Vec<String>)]) {
        for (ctrl_name, _) in inst_conds {
            if let Some(arc) = self.control_arc(ctrl_name) {
                let mut guard = arc.lock().await;
                self.check_status(ctrl_name, &mut guard).await;
            }
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.events.unsubscribe(id)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use beamline_core::command::CMD_STATUS;
    use std::sync::Mutex as StdMutex;

    use crate::dispatch::{DispatchError, DispatchOutcome};

    /// Always reports the same fixed state, success unconditionally.
    struct EchoDispatch {
        state: String,
    }

    #[async_trait]
    impl Dispatch for EchoDispatch {
        async fn dispatch(&self, _cmd: &str, _args: &[Value], _kwargs: &Kwargs) -> Result<DispatchOutcome, DispatchError> {
            Ok(DispatchOutcome::ok(self.state.clone()))
        }
    }

    /// Always reports idle, but a `settle` command blocks until
    /// `ready_at` — used to simulate a control that only reaches its own
    /// sync barrier once some preceding step settles (S2).
    struct DelayedSettleDispatch {
        ready_at: Instant,
    }

    #[async_trait]
    impl Dispatch for DelayedSettleDispatch {
        async fn dispatch(&self, cmd: &str, _args: &[Value], _kwargs: &Kwargs) -> Result<DispatchOutcome, DispatchError> {
            if cmd == "settle" {
                let now = Instant::now();
                if now < self.ready_at {
                    tokio::time::sleep(self.ready_at - now).await;
                }
            }
            Ok(DispatchOutcome::ok("idle"))
        }
    }

    fn collect_runs(sched: &Scheduler) -> Arc<StdMutex<Vec<(String, String)>>> {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_clone = log.clone();
        sched.subscribe(move |event| {
            if let Event::Run { control, cmd_name, .. } = event {
                log_clone.lock().unwrap().push((control.clone(), cmd_name.clone()));
            }
        });
        log
    }

    fn collect_finishes(sched: &Scheduler) -> Arc<StdMutex<Vec<String>>> {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_clone = log.clone();
        sched.subscribe(move |event| {
            if let Event::Finish { control, .. } = event {
                log_clone.lock().unwrap().push(control.clone());
            }
        });
        log
    }

    #[tokio::test]
    async fn p1_fifo_order_per_control() {
        let sched = Scheduler::new();
        sched.add_control("a", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();

        let id1 = sched.add_cmd("a", "op1", vec![], Kwargs::new(), false).await.unwrap();
        let id2 = sched.add_cmd("a", "op2", vec![], Kwargs::new(), false).await.unwrap();
        let id3 = sched.add_cmd("a", "op3", vec![], Kwargs::new(), false).await.unwrap();
        assert!(id1.get() < id2.get());
        assert!(id2.get() < id3.get());

        let runs = collect_runs(&sched);
        let handle = tokio::spawn(sched.clone().run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        sched.stop();
        handle.await.unwrap().unwrap();

        let names: Vec<String> = runs.lock().unwrap().iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(names, vec!["op1", "op2", "op3"]);
    }

    #[tokio::test]
    async fn p2_ids_are_monotone_and_unique() {
        let sched = Scheduler::new();
        sched.add_control("a", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();
        let i1 = sched.add_cmd("a", "op1", vec![], Kwargs::new(), false).await.unwrap();
        let w1 = sched.next_wait_id();
        let i2 = sched.add_cmd("a", "op2", vec![], Kwargs::new(), false).await.unwrap();
        assert!(i1.get() < w1.get());
        assert!(w1.get() < i2.get());
    }

    #[tokio::test]
    async fn s1_time_wait_does_not_block_other_controls() {
        let sched = Scheduler::new();
        sched.add_control("a", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();
        sched.add_control("b", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();

        let mut kwargs = Kwargs::new();
        kwargs.insert("condition".into(), Value::Str("time".into()));
        kwargs.insert("t_wait".into(), Value::Float(0.2));
        sched.add_cmd("a", "wait_time_1", vec![], kwargs, false).await.unwrap();
        sched.add_cmd("a", "op1", vec![], Kwargs::new(), false).await.unwrap();
        sched.add_cmd("b", "op2", vec![], Kwargs::new(), false).await.unwrap();

        let runs = collect_runs(&sched);
        let handle = tokio::spawn(sched.clone().run());
        tokio::time::sleep(Duration::from_millis(400)).await;
        sched.stop();
        handle.await.unwrap().unwrap();

        let names: Vec<(String, String)> = runs.lock().unwrap().clone();
        let op2_idx = names.iter().position(|(c, n)| c == "b" && n == "op2").unwrap();
        let op1_idx = names.iter().position(|(c, n)| c == "a" && n == "op1").unwrap();
        // op2@B must run before the time-wait on A releases op1@A.
        assert!(op2_idx < op1_idx);
    }

    #[tokio::test]
    async fn p3_s2_barrier_releases_only_once_all_participants_arrive() {
        let sched = Scheduler::new();
        let ready_at = Instant::now() + Duration::from_millis(300);
        sched.add_control("x", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();
        sched.add_control("y", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();
        sched.add_control("z", "test", Arc::new(DelayedSettleDispatch { ready_at })).unwrap();

        let cond = |peers: &[&str]| {
            let mut kwargs = Kwargs::new();
            kwargs.insert("condition".into(), Value::Str("status".into()));
            kwargs.insert(
                "inst_conds".into(),
                Value::InstConds(peers.iter().map(|p| (p.to_string(), vec!["wait_sync_1".to_string()])).collect()),
            );
            kwargs
        };
        sched.add_cmd("x", "wait_sync_1", vec![], cond(&["y", "z"]), false).await.unwrap();
        sched.add_cmd("y", "wait_sync_1", vec![], cond(&["x", "z"]), false).await.unwrap();
        // z only reaches its own barrier once `settle` resolves, after `ready_at`.
        sched.add_cmd("z", "settle", vec![], Kwargs::new(), false).await.unwrap();
        sched.add_cmd("z", "wait_sync_1", vec![], cond(&["x", "y"]), false).await.unwrap();

        let finishes = collect_finishes(&sched);
        let handle = tokio::spawn(sched.clone().run());

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Before `z` settles, x and y are parked on the barrier and none
        // of the three has finished yet.
        assert_eq!(finishes.lock().unwrap().len(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        sched.stop();
        handle.await.unwrap().unwrap();

        let done = finishes.lock().unwrap();
        assert_eq!(done.len(), 3);
    }

    #[tokio::test]
    async fn p4_pause_then_resume_yields_same_dispatch_sequence() {
        let sched = Scheduler::new();
        sched.add_control("a", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();
        sched.add_cmd("a", "op1", vec![], Kwargs::new(), false).await.unwrap();
        sched.add_cmd("a", "op2", vec![], Kwargs::new(), false).await.unwrap();

        let runs = collect_runs(&sched);
        sched.set_automator_state(false);
        let handle = tokio::spawn(sched.clone().run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.lock().unwrap().len(), 0, "no dispatch while paused");

        sched.set_automator_state(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        sched.stop();
        handle.await.unwrap().unwrap();

        let names: Vec<String> = runs.lock().unwrap().iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(names, vec!["op1", "op2"]);
    }

    #[tokio::test]
    async fn p5_stop_running_item_clears_a_time_wait_promptly() {
        let sched = Scheduler::new();
        sched.add_control("a", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();
        let mut kwargs = Kwargs::new();
        kwargs.insert("condition".into(), Value::Str("time".into()));
        kwargs.insert("t_wait".into(), Value::Float(60.0));
        sched.add_cmd("a", "wait_time_9", vec![], kwargs, false).await.unwrap();

        let handle = tokio::spawn(sched.clone().run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        sched.stop_running_item("a").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        sched.stop();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn s4_negative_check_response_pauses_and_re_evaluates() {
        let sched = Scheduler::new();
        sched.add_control("a", "test", Arc::new(EchoDispatch { state: "wait_check_5".into() })).unwrap();

        let mut kwargs = Kwargs::new();
        kwargs.insert("condition".into(), Value::Str("check".into()));
        // No peer barrier — this wait gates purely on the external
        // check_response, so inst_conds is empty.
        kwargs.insert("inst_conds".into(), Value::InstConds(vec![]));
        sched.add_cmd("a", "wait_check_5", vec![], kwargs, false).await.unwrap();

        let handle = tokio::spawn(sched.clone().run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        sched.check_response(false);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!sched.is_running(), "negative check must pause the automator");
        sched.stop();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn add_cmd_on_unknown_control_is_rejected() {
        let sched = Scheduler::new();
        let err = sched.add_cmd("ghost", CMD_STATUS, vec![], Kwargs::new(), false).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn duplicate_control_registration_is_rejected() {
        let sched = Scheduler::new();
        sched.add_control("a", "test", Arc::new(EchoDispatch { state: "idle".into() })).unwrap();
        let err = sched.add_control("a", "test", Arc::new(EchoDispatch { state: "idle".into() }));
        assert!(err.is_err());
    }
}
