use tokio::task::JoinHandle;

use orion_error::prelude::*;

use crate::error::{RuntimeError, RuntimeReason};

/// A named group of background tasks, joined together on shutdown.
///
/// Groups are assembled in *start order* and joined in *reverse order*
/// (LIFO) by [`super::Reactor::wait`], so the scheduler (started first,
/// everything else depends on it) is joined last.
pub(crate) struct TaskGroup {
    pub(super) name: &'static str,
    handles: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl TaskGroup {
    pub(super) fn new(name: &'static str) -> Self {
        Self { name, handles: Vec::new() }
    }

    pub(super) fn push(&mut self, handle: JoinHandle<anyhow::Result<()>>) {
        self.handles.push(handle);
    }

    pub(super) async fn wait(self) -> Result<(), RuntimeError> {
        for handle in self.handles {
            handle
                .await
                .map_err(|e| StructError::from(RuntimeReason::Shutdown).with_detail(format!("task join error: {e}")))?
                .owe(RuntimeReason::Shutdown)?;
        }
        Ok(())
    }
}
