use std::collections::VecDeque;
use std::sync::Arc;

use beamline_core::{CmdId, Command, Status};

use crate::dispatch::Dispatch;

/// One named instrument queue (§3 "Control").
///
/// `queue`/`status` mutation is serialised by the `tokio::sync::Mutex`
/// this struct is always stored behind (one per control — the "per-control
/// reentrant mutex" of §5); the control registry itself is guarded
/// separately by the scheduler's `RwLock<HashMap<..>>`.
pub struct Control {
    pub name: String,
    pub kind: String,
    pub dispatch: Arc<dyn Dispatch>,
    pub queue: VecDeque<Command>,
    pub status: Status,
    pub run_id: Option<CmdId>,
}

impl Control {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            dispatch,
            queue: VecDeque::new(),
            status: Status::Idle,
            run_id: None,
        }
    }

    /// Enqueue a command, honoring `at_start` head-insertion (I4).
    pub fn enqueue(&mut self, cmd: Command, at_start: bool) {
        if at_start {
            self.queue.push_front(cmd);
        } else {
            self.queue.push_back(cmd);
        }
    }

    /// Remove a still-queued command by id (O(n) scan, per §4.1).
    pub fn remove(&mut self, cmd_id: CmdId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|c| c.cmd_id != cmd_id);
        self.queue.len() != before
    }

    /// Shift a queued command by `delta` positions (positive = earlier),
    /// clamped to queue bounds.
    pub fn reorder(&mut self, cmd_id: CmdId, delta: i32) {
        let Some(pos) = self.queue.iter().position(|c| c.cmd_id == cmd_id) else {
            return;
        };
        let new_pos = (pos as i64 - delta as i64).clamp(0, self.queue.len() as i64 - 1) as usize;
        if new_pos == pos {
            return;
        }
        if let Some(cmd) = self.queue.remove(pos) {
            self.queue.insert(new_pos, cmd);
        }
    }
}
