use serde::Deserialize;

/// `[automator]` — scheduling-loop tuning (§5).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AutomatorConfig {
    /// Sleep between ticks once a full pass makes no progress, in seconds.
    /// Corresponds to the "~2 Hz when idle" cadence.
    pub idle_poll_interval_s: f64,
    /// Automator starts in the running (not paused) state.
    pub start_running: bool,
}

impl Default for AutomatorConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval_s: 0.5,
            start_running: true,
        }
    }
}
