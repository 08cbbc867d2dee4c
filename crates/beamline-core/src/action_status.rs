/// One child command's status as tracked by an Action (§4.2's
/// aggregation table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Queue,
    Run,
    Wait,
    Done,
}

/// An Action's externally-observable aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Queue,
    Wait,
    Run,
    Done,
    Pause,
    Abort,
}

/// Reduce child statuses + the global automator state to one aggregate.
///
/// Evaluated as an ordered chain exactly as the table in §4.2 lists it —
/// each row is a fallback for the rows above it, not an independent case:
///
/// | all children `queue`            => queue |
/// | all children `done`             => done  |
/// | any `wait` and none `run`       => wait   |
/// | any `run`                       => run    |
/// | global != run and not all done  => pause  |
///
/// In particular a child can still read `run` while the scheduler is
/// paused (I6: pause never abandons an in-flight command), so "any run"
/// is checked before the paused-global fallback.
pub fn aggregate(children: &[ChildStatus], global_running: bool) -> ActionStatus {
    if !children.is_empty() && children.iter().all(|c| *c == ChildStatus::Queue) {
        return ActionStatus::Queue;
    }
    if !children.is_empty() && children.iter().all(|c| *c == ChildStatus::Done) {
        return ActionStatus::Done;
    }
    let any_wait = children.iter().any(|c| *c == ChildStatus::Wait);
    let any_run = children.iter().any(|c| *c == ChildStatus::Run);
    if any_wait && !any_run {
        return ActionStatus::Wait;
    }
    if any_run {
        return ActionStatus::Run;
    }
    if !global_running {
        return ActionStatus::Pause;
    }
    ActionStatus::Queue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_queue_is_queue() {
        let c = vec![ChildStatus::Queue, ChildStatus::Queue];
        assert_eq!(aggregate(&c, true), ActionStatus::Queue);
    }

    #[test]
    fn all_done_is_done_even_when_paused() {
        let c = vec![ChildStatus::Done, ChildStatus::Done];
        assert_eq!(aggregate(&c, false), ActionStatus::Done);
    }

    #[test]
    fn any_run_wins_over_wait() {
        let c = vec![ChildStatus::Wait, ChildStatus::Run];
        assert_eq!(aggregate(&c, true), ActionStatus::Run);
    }

    #[test]
    fn wait_without_run_is_wait() {
        let c = vec![ChildStatus::Wait, ChildStatus::Queue];
        assert_eq!(aggregate(&c, true), ActionStatus::Wait);
    }

    #[test]
    fn running_child_during_pause_still_reads_run() {
        // I6: pause never abandons an in-flight command.
        let c = vec![ChildStatus::Run, ChildStatus::Queue];
        assert_eq!(aggregate(&c, false), ActionStatus::Run);
    }

    #[test]
    fn mixed_queue_and_done_while_paused_is_pause() {
        let c = vec![ChildStatus::Queue, ChildStatus::Done];
        assert_eq!(aggregate(&c, false), ActionStatus::Pause);
    }
}
