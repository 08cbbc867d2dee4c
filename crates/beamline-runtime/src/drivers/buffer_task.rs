use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::hplc::HplcDriver;

/// Ticks a flow path's buffer inventory at `interval`, decrementing the
/// active buffer by the driver's own current flow rate (§4.3.4).
///
/// Grounded on the teacher's single-sweep-task shape (a `tokio::interval`
/// raced against a `CancellationToken` in a `tokio::select!` loop) rather
/// than any per-sample polling — this is a background housekeeping task,
/// not part of the scheduler's own cooperative loop.
pub async fn run_buffer_integrator(driver: Arc<HplcDriver>, interval: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    let dt = interval.as_secs_f64();
    loop {
        tokio::select! {
            _ = tick.tick() => {
                driver.tick_buffer(dt);
            }
            _ = cancel.cancelled() => break,
        }
    }
    bl_info!(pump, "buffer integrator stopped");
}

#[cfg(test)]
mod tests {
    use beamline_core::{Kwargs, Value};

    use super::*;
    use crate::dispatch::Dispatch;

    #[tokio::test]
    async fn integrator_decrements_active_buffer_over_several_ticks() {
        let driver = Arc::new(HplcDriver::new());
        driver.stock_buffer("a", 100.0, "buf a");
        driver
            .dispatch("select_buffer", &[], &Kwargs::from([("position".to_string(), Value::Str("a".into()))]))
            .await
            .unwrap();
        driver.dispatch("set_flow_rate", &[], &Kwargs::from([("rate".to_string(), Value::Float(60.0))])).await.unwrap(); // 1 mL/s

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_buffer_integrator(driver.clone(), Duration::from_millis(10), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let remaining = driver.active_buffer_volume_ml().unwrap();
        assert!(remaining < 100.0, "buffer should have been drawn down, got {remaining}");
    }
}
