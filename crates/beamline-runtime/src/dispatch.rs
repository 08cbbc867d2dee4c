use async_trait::async_trait;
use beamline_core::{Kwargs, Value};

/// Outcome of one dispatch call: the instrument's reported state after the
/// command ran, and whether the callback considers it successful.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub reported_state: String,
    pub ok: bool,
}

impl DispatchOutcome {
    pub fn ok(reported_state: impl Into<String>) -> Self {
        Self {
            reported_state: reported_state.into(),
            ok: true,
        }
    }

    pub fn failed(reported_state: impl Into<String>) -> Self {
        Self {
            reported_state: reported_state.into(),
            ok: false,
        }
    }
}

/// Error raised by a dispatch callback itself (a "dispatch fault", §7).
/// Distinct from `ok: false`, which is a reported-but-unsuccessful result;
/// this variant is for the callback throwing/panicking/timing out.
#[derive(Debug, thiserror::Error)]
#[error("dispatch fault: {0}")]
pub struct DispatchError(pub String);

/// One control's injected hardware-affecting callback:
/// `dispatch(cmd, args, kwargs) -> (reportedState, ok)` (§6).
///
/// Implementors must return quickly (a few seconds at most) and, per the
/// contract, only need to tolerate concurrent self-calls for `status` /
/// `full_status` (the buffer integrator polls those independently of the
/// scheduler thread).
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        cmd: &str,
        args: &[Value],
        kwargs: &Kwargs,
    ) -> Result<DispatchOutcome, DispatchError>;
}
