use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use beamline_core::{Kwargs, Value};

use crate::dispatch::{Dispatch, DispatchError, DispatchOutcome};

struct LoadRun {
    start: Instant,
    duration: Duration,
}

struct AutosamplerState {
    load: Option<LoadRun>,
    linked_pump: Option<String>,
}

impl Default for AutosamplerState {
    fn default() -> Self {
        Self { load: None, linked_pump: None }
    }
}

/// Simulated autosampler: `load_and_move_to_inject` / `inject`, grounded
/// on `BatchSampleCommand`'s use of the autosampler as the injecting
/// actor for batch sample runs (§4.2.2).
pub struct AutosamplerDriver {
    state: StdMutex<AutosamplerState>,
}

impl AutosamplerDriver {
    pub fn new() -> Self {
        Self { state: StdMutex::new(AutosamplerState::default()) }
    }

    /// Reassign which pump this autosampler feeds from. Exposed directly
    /// for tests; production code reaches it via the `link_pump` dispatch
    /// command enqueued as step 5 of `switch_pumps_steps` (§4.3.3).
    pub fn link_pump(&self, pump: impl Into<String>) {
        self.state.lock().expect("autosampler state poisoned").linked_pump = Some(pump.into());
    }

    pub fn linked_pump(&self) -> Option<String> {
        self.state.lock().expect("autosampler state poisoned").linked_pump.clone()
    }

    fn resolve(&self, s: &mut AutosamplerState) -> String {
        let done = s.load.as_ref().is_some_and(|r| r.start.elapsed() >= r.duration);
        if done {
            s.load = None;
        }
        if s.load.is_some() { "moving".to_string() } else { "idle".to_string() }
    }
}

impl Default for AutosamplerDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatch for AutosamplerDriver {
    async fn dispatch(&self, cmd: &str, _args: &[Value], kwargs: &Kwargs) -> Result<DispatchOutcome, DispatchError> {
        let mut s = self.state.lock().expect("autosampler state poisoned");
        match cmd {
            "status" | "full_status" => Ok(DispatchOutcome::ok(self.resolve(&mut s))),
            "load_and_move_to_inject" => {
                let secs = kwargs.get("move_time").and_then(Value::as_f64).unwrap_or(0.0);
                s.load = Some(LoadRun { start: Instant::now(), duration: Duration::from_secs_f64(secs) });
                Ok(DispatchOutcome::ok("moving"))
            }
            "inject" => Ok(DispatchOutcome::ok("idle")),
            "link_pump" => {
                if let Some(pump) = kwargs.get("pump").and_then(Value::as_str) {
                    s.linked_pump = Some(pump.to_string());
                }
                Ok(DispatchOutcome::ok("idle"))
            }
            other => Err(DispatchError(format!("unrecognised autosampler command: {other}"))),
        }
    }
}
