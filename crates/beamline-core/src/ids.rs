use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic identifier for an enqueued [`Command`](crate::command::Command).
///
/// `cmd_id` is strictly increasing process-wide (invariant I3 / P2): no two
/// commands, across any control, ever share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CmdId(u64);

impl CmdId {
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CmdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic identifier naming a rendezvous (`wait_time_<id>`,
/// `wait_sync_<id>`, `wait_check_<id>`, `wait_cmd_<id>`).
///
/// Shares the same invariant as [`CmdId`]: every wait planted anywhere in
/// the system gets a fresh id, even two waits belonging to the same
/// logical barrier that the original source aliased by mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitId(u64);

impl WaitId {
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide monotonic generator shared by `cmd_id` and `wait_id`
/// counters. Starts at 1 so `0` can be reserved as a sentinel.
#[derive(Debug, Default)]
pub struct IdGen {
    next: AtomicU64,
}

impl IdGen {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_cmd_id(&self) -> CmdId {
        CmdId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_wait_id(&self) -> WaitId {
        WaitId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_monotone_and_shared() {
        let gen = IdGen::new();
        let a = gen.next_cmd_id();
        let b = gen.next_wait_id();
        let c = gen.next_cmd_id();
        assert!(a.get() < b.get());
        assert!(b.get() < c.get());
    }
}
