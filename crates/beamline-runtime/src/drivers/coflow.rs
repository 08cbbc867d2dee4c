use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use beamline_core::{Kwargs, Value};

use crate::dispatch::{Dispatch, DispatchError, DispatchOutcome};

struct CoflowState {
    running: bool,
    rate: f64,
    buffer: Option<String>,
}

impl Default for CoflowState {
    fn default() -> Self {
        Self { running: false, rate: 0.0, buffer: None }
    }
}

/// Simulated coflow pump: `start`/`stop`/`change_flow`/`change_buf`,
/// grounded on the `coflow_fr`/`coflow_rate`/`change_buf` vocabulary
/// used throughout the original sample-run sequencing.
pub struct CoflowDriver {
    state: StdMutex<CoflowState>,
}

impl CoflowDriver {
    pub fn new() -> Self {
        Self { state: StdMutex::new(CoflowState::default()) }
    }

    pub fn current_rate(&self) -> f64 {
        self.state.lock().expect("coflow state poisoned").rate
    }
}

impl Default for CoflowDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatch for CoflowDriver {
    async fn dispatch(&self, cmd: &str, _args: &[Value], kwargs: &Kwargs) -> Result<DispatchOutcome, DispatchError> {
        let mut s = self.state.lock().expect("coflow state poisoned");
        match cmd {
            "status" | "full_status" => Ok(DispatchOutcome::ok(if s.running { "running" } else { "idle" })),
            "start" => {
                s.running = true;
                s.rate = kwargs.get("rate").and_then(Value::as_f64).unwrap_or(s.rate);
                Ok(DispatchOutcome::ok(if s.running { "running" } else { "idle" }))
            }
            "change_flow" => {
                s.rate = kwargs.get("rate").and_then(Value::as_f64).unwrap_or(s.rate);
                Ok(DispatchOutcome::ok(if s.running { "running" } else { "idle" }))
            }
            "change_buf" => {
                s.buffer = kwargs.get("position").and_then(Value::as_str).map(str::to_string);
                Ok(DispatchOutcome::ok(if s.running { "running" } else { "idle" }))
            }
            "stop" => {
                s.running = false;
                s.rate = 0.0;
                Ok(DispatchOutcome::ok("idle"))
            }
            other => Err(DispatchError(format!("unrecognised coflow command: {other}"))),
        }
    }
}
