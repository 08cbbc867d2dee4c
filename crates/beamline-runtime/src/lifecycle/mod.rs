mod bootstrap;
mod signal;
mod types;

use std::time::Duration;

use orion_error::op_context;
use orion_error::prelude::*;

use beamline_config::BeamlineConfig;

use crate::drivers::buffer_task::run_buffer_integrator;
use crate::error::RuntimeResult;
use crate::scheduler::Scheduler;

pub use signal::wait_for_signal;

use bootstrap::build;
use types::TaskGroup;

/// How often the buffer integrator samples flow rate (§4.3.4: "roughly
/// once per second" is the original cadence).
const BUFFER_INTEGRATOR_INTERVAL: Duration = Duration::from_secs(1);

/// Manages the Automator's lifecycle: bootstrap from config, run, and
/// graceful shutdown.
///
/// Task groups are stored in start order (scheduler, then one buffer
/// integrator per HPLC control) and joined in reverse during
/// [`wait`](Self::wait) — integrators stop first since the scheduler's own
/// cancellation is what they key off, so there is nothing left to feed
/// once the scheduler loop has already exited.
pub struct Reactor {
    scheduler: Scheduler,
    groups: Vec<TaskGroup>,
}

impl Reactor {
    /// Bootstrap the scheduler and every configured control, then spawn
    /// the scheduler loop and one buffer integrator task per HPLC control.
    pub async fn start(config: &BeamlineConfig) -> RuntimeResult<Self> {
        let mut op = op_context!("automator-bootstrap").with_auto_log();
        op.record("instruments", config.instruments.len().to_string().as_str());

        let data = build(config)?;
        let scheduler = data.scheduler;

        let mut groups = Vec::with_capacity(1 + data.hplc_drivers.len());

        let mut scheduler_group = TaskGroup::new("scheduler");
        let run_handle = tokio::spawn(scheduler.clone().run());
        scheduler_group.push(run_handle);
        groups.push(scheduler_group);

        for (name, driver) in data.hplc_drivers {
            let mut group = TaskGroup::new("buffer_integrator");
            let cancel = scheduler.cancel_token();
            let handle = tokio::spawn(async move {
                run_buffer_integrator(driver, BUFFER_INTEGRATOR_INTERVAL, cancel).await;
                bl_debug!(pump, control = name.as_str(), "buffer integrator for control joined");
                Ok::<(), anyhow::Error>(())
            });
            group.push(handle);
            groups.push(group);
        }

        bl_info!(sys, instruments = config.instruments.len(), "automator bootstrap complete");
        op.mark_suc();
        Ok(Self { scheduler, groups })
    }

    /// A clone of the running scheduler handle, for a CLI/API layer to
    /// enqueue commands and build Actions against.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// A clone of the scheduler's cancellation token, for signal handling.
    pub fn cancel_token(&self) -> tokio_util::sync::CancellationToken {
        self.scheduler.cancel_token()
    }

    /// Request graceful shutdown: stop the scheduler loop, which in turn
    /// cancels every buffer integrator sharing its token.
    pub fn shutdown(&self) {
        bl_info!(sys, "initiating graceful shutdown");
        self.scheduler.stop();
    }

    /// Wait for every task group to finish after [`shutdown`](Self::shutdown).
    pub async fn wait(mut self) -> RuntimeResult<()> {
        while let Some(group) = self.groups.pop() {
            let name = group.name;
            bl_debug!(sys, task_group = name, "waiting for task group to finish");
            group.wait().await?;
            bl_debug!(sys, task_group = name, "task group finished");
        }
        Ok(())
    }
}
