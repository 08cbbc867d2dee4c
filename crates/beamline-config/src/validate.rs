use std::collections::HashSet;

use crate::config::BeamlineConfig;

/// Cross-field checks the TOML schema alone cannot express: unknown
/// instrument kinds are already rejected by `serde` at parse time, so this
/// only needs to cover duplicate names and nonsensical tuning values.
pub fn validate(cfg: &BeamlineConfig) -> anyhow::Result<()> {
    if cfg.automator.idle_poll_interval_s <= 0.0 {
        anyhow::bail!("automator.idle_poll_interval_s must be positive");
    }

    let mut seen = HashSet::with_capacity(cfg.instruments.len());
    for inst in &cfg.instruments {
        if !seen.insert(inst.name.as_str()) {
            anyhow::bail!("duplicate instrument name: {}", inst.name);
        }
    }

    Ok(())
}
