use std::sync::Arc;

use orion_error::prelude::*;

use beamline_config::{BeamlineConfig, InstrumentKind};

use crate::drivers::{AutosamplerDriver, CoflowDriver, ExposureDriver, HplcDriver};
use crate::error::RuntimeError;
use crate::scheduler::Scheduler;

/// Artifacts from registering every `[[instrument]]` row against a fresh
/// [`Scheduler`] — handed back so the spawn phase knows which HPLC
/// controls need a buffer integrator task.
pub(super) struct BootstrapData {
    pub scheduler: Scheduler,
    pub hplc_drivers: Vec<(String, Arc<HplcDriver>)>,
}

/// Build a [`Scheduler`] and register one control per configured
/// instrument, backed by the simulated driver matching its kind.
pub(super) fn build(config: &BeamlineConfig) -> Result<BootstrapData, RuntimeError> {
    let scheduler = Scheduler::new();
    scheduler.set_automator_state(config.automator.start_running);

    let mut hplc_drivers = Vec::new();

    for inst in &config.instruments {
        match inst.kind {
            InstrumentKind::Hplc => {
                let driver = Arc::new(HplcDriver::new());
                scheduler.add_control(&inst.name, "hplc", driver.clone()).err_conv()?;
                hplc_drivers.push((inst.name.clone(), driver));
            }
            InstrumentKind::Coflow => {
                scheduler.add_control(&inst.name, "coflow", Arc::new(CoflowDriver::new())).err_conv()?;
            }
            InstrumentKind::Exposure => {
                scheduler.add_control(&inst.name, "exposure", Arc::new(ExposureDriver::new())).err_conv()?;
            }
            InstrumentKind::Autosampler => {
                scheduler.add_control(&inst.name, "autosampler", Arc::new(AutosamplerDriver::new())).err_conv()?;
            }
        }
    }

    Ok(BootstrapData { scheduler, hplc_drivers })
}
