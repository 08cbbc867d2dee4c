//! Pure pump-flow math: volume integration, stop-distance estimation, and
//! buffer inventory bookkeeping. No I/O, no async — this is the part of
//! the pump-flow engine (§4.3) that can be unit tested without a
//! dispatcher or clock.

use std::collections::HashMap;

/// Trapezoidal volume delivered between two flow-rate samples.
///
/// `ΔV = ((f_now + f_prev)/2 / 60) · Δt`  (rate in mL/min, Δt in seconds,
/// result in mL) — reproduced verbatim from the purge procedure's
/// integration step (§4.3.1 step 6).
pub fn integrate_volume(f_prev: f64, f_now: f64, dt_seconds: f64) -> f64 {
    ((f_prev + f_now) / 2.0 / 60.0) * dt_seconds
}

/// Distance (in mL) still needed to decelerate from `f_now` to `target`
/// at acceleration `accel` (mL/min^2), expressed as the "half-ramp"
/// distance the original source uses: `stopVol = (f_now / a) · (f_now / 2)`
/// when the target is zero (§4.3.1 step 7). When the target is non-zero
/// the same half-ramp shape is used over the remaining rate delta, which
/// matches the restore-to-nonzero-rate branch the purge/equilibrate
/// procedures use when `restoreFlowAfterPurge` names a nonzero rate.
pub fn stop_volume(f_now: f64, target: f64, accel: f64) -> f64 {
    if accel <= 0.0 {
        return 0.0;
    }
    let delta = (f_now - target).abs();
    (delta / accel) * (delta / 2.0)
}

/// One named buffer position's inventory.
#[derive(Debug, Clone)]
pub struct BufferPosition {
    pub volume_ml: f64,
    pub description: String,
    pub active: bool,
}

/// Per-flow-path buffer inventory (§3 "Buffer inventory", §4.3.4).
///
/// Volumes are decremented by an integrator that samples the current flow
/// rate; only the position marked `active` is decremented.
#[derive(Debug, Default)]
pub struct BufferInventory {
    positions: HashMap<String, BufferPosition>,
    active_position: Option<String>,
}

impl BufferInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a position's `{volume, description}` atomically. Does not
    /// change which position is active.
    pub fn set_position(&mut self, name: impl Into<String>, volume_ml: f64, description: impl Into<String>) {
        let name = name.into();
        let active = self.active_position.as_deref() == Some(name.as_str());
        self.positions.insert(
            name,
            BufferPosition {
                volume_ml,
                description: description.into(),
                active,
            },
        );
    }

    pub fn remove_position(&mut self, name: &str) {
        self.positions.remove(name);
        if self.active_position.as_deref() == Some(name) {
            self.active_position = None;
        }
    }

    /// Select a buffer valve position: marks `name` active and the
    /// previous active position (if any) inactive.
    pub fn select(&mut self, name: &str) {
        if let Some(prev) = self.active_position.take() {
            if let Some(p) = self.positions.get_mut(&prev) {
                p.active = false;
            }
        }
        if let Some(p) = self.positions.get_mut(name) {
            p.active = true;
            self.active_position = Some(name.to_string());
        }
    }

    pub fn get(&self, name: &str) -> Option<&BufferPosition> {
        self.positions.get(name)
    }

    pub fn active(&self) -> Option<&BufferPosition> {
        self.active_position.as_deref().and_then(|n| self.positions.get(n))
    }

    /// Decrement the active buffer's volume by `rate_ml_per_min · dt`.
    /// Inactive buffers are untouched, per §4.3.4.
    pub fn tick(&mut self, rate_ml_per_min: f64, dt_seconds: f64) {
        if let Some(name) = self.active_position.clone() {
            if let Some(p) = self.positions.get_mut(&name) {
                p.volume_ml -= rate_ml_per_min / 60.0 * dt_seconds;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrate_volume_constant_rate_matches_r_times_t() {
        // P6: constant rate r for Δt seconds => r*Δt/60 mL, exactly (no
        // ramp) when f_prev == f_now.
        let v = integrate_volume(5.0, 5.0, 120.0);
        assert!((v - (5.0 * 120.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn stop_volume_zero_accel_is_zero() {
        assert_eq!(stop_volume(5.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn stop_volume_matches_half_ramp_formula() {
        // f_now=5, target=0, accel=10 => (5/10)*(5/2) = 0.5*2.5 = 1.25
        let v = stop_volume(5.0, 0.0, 10.0);
        assert!((v - 1.25).abs() < 1e-9);
    }

    #[test]
    fn buffer_inventory_only_decrements_active_position() {
        let mut inv = BufferInventory::new();
        inv.set_position("pos1", 100.0, "buffer A");
        inv.set_position("pos2", 50.0, "buffer B");
        inv.select("pos1");

        inv.tick(60.0, 60.0); // 60 mL/min for 60s => -60 mL

        assert!((inv.get("pos1").unwrap().volume_ml - 40.0).abs() < 1e-9);
        assert_eq!(inv.get("pos2").unwrap().volume_ml, 50.0);
    }

    #[test]
    fn buffer_inventory_select_switches_active_flag() {
        let mut inv = BufferInventory::new();
        inv.set_position("pos1", 100.0, "buffer A");
        inv.set_position("pos2", 50.0, "buffer B");
        inv.select("pos1");
        assert!(inv.get("pos1").unwrap().active);
        inv.select("pos2");
        assert!(!inv.get("pos1").unwrap().active);
        assert!(inv.get("pos2").unwrap().active);
    }
}
