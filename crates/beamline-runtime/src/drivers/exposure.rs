use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use beamline_core::{Kwargs, Value};

use crate::dispatch::{Dispatch, DispatchError, DispatchOutcome};

struct ExposeRun {
    start: Instant,
    duration: Duration,
}

struct ExposureState {
    run: Option<ExposeRun>,
}

impl Default for ExposureState {
    fn default() -> Self {
        Self { run: None }
    }
}

/// Simulated exposure controller: `idle ⇄ exposing`, driven by `expose`'s
/// `exposure_time` kwarg and cleared early by `abort` (§4.2.1/§4.2.5).
pub struct ExposureDriver {
    state: StdMutex<ExposureState>,
}

impl ExposureDriver {
    pub fn new() -> Self {
        Self { state: StdMutex::new(ExposureState::default()) }
    }

    fn resolve(&self, s: &mut ExposureState) -> String {
        let done = s.run.as_ref().is_some_and(|r| r.start.elapsed() >= r.duration);
        if done {
            s.run = None;
        }
        if s.run.is_some() { "exposing".to_string() } else { "idle".to_string() }
    }
}

impl Default for ExposureDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatch for ExposureDriver {
    async fn dispatch(&self, cmd: &str, _args: &[Value], kwargs: &Kwargs) -> Result<DispatchOutcome, DispatchError> {
        let mut s = self.state.lock().expect("exposure state poisoned");
        match cmd {
            "status" | "full_status" => Ok(DispatchOutcome::ok(self.resolve(&mut s))),
            "expose" => {
                let secs = kwargs.get("exposure_time").and_then(Value::as_f64).unwrap_or(0.0);
                s.run = Some(ExposeRun { start: Instant::now(), duration: Duration::from_secs_f64(secs) });
                Ok(DispatchOutcome::ok("exposing"))
            }
            "abort" => {
                s.run = None;
                Ok(DispatchOutcome::ok("idle"))
            }
            other => Err(DispatchError(format!("unrecognised exposure command: {other}"))),
        }
    }
}
