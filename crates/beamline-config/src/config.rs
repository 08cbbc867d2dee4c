use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::automator::AutomatorConfig;
use crate::instrument::InstrumentConfig;
use crate::logging::LoggingConfig;
use crate::validate;

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BeamlineConfigRaw {
    #[serde(default, rename = "instrument")]
    instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    automator: AutomatorConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// BeamlineConfig (resolved, validated)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct BeamlineConfig {
    pub instruments: Vec<InstrumentConfig>,
    pub automator: AutomatorConfig,
    pub logging: LoggingConfig,
}

impl BeamlineConfig {
    /// Read and parse a config file (conventionally `beamline.toml`).
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for BeamlineConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: BeamlineConfigRaw = toml::from_str(toml_str)?;
        let config = BeamlineConfig {
            instruments: raw.instruments,
            automator: raw.automator,
            logging: raw.logging,
        };
        validate::validate(&config)?;
        Ok(config)
    }
}
