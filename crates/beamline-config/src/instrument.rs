use serde::Deserialize;

/// Which driver a `[[instrument]]` entry is backed by (§2 "Control" kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Hplc,
    Coflow,
    Exposure,
    Autosampler,
}

/// One row of the instrument registration table.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    pub kind: InstrumentKind,
    /// Reported state a freshly-bootstrapped control starts in.
    #[serde(default = "default_initial_state")]
    pub initial_state: String,
}

fn default_initial_state() -> String {
    "idle".to_string()
}
