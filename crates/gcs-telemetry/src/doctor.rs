use anyhow::Result;

use crate::TelemetryConfig;

pub fn check_thresholds(cfg: &TelemetryConfig) -> Result<()> {
    anyhow::ensure!(cfg.heartbeat_interval_ms >= 100, "telemetry.heartbeat_interval_ms too small");
    anyhow::ensure!(cfg.stale_heartbeats >= 2, "telemetry.stale_heartbeats should be >= 2");
    anyhow::ensure!(
        cfg.health_tick() < cfg.stale_after(),
        "telemetry.health_tick_ms must be shorter than the stale threshold"
    );
    anyhow::ensure!(cfg.event_capacity >= 1, "telemetry.event_capacity must be >= 1");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_must_fit_inside_stale_window() {
        check_thresholds(&TelemetryConfig::default()).unwrap();
        let slow = TelemetryConfig { health_tick_ms: 10_000, ..TelemetryConfig::default() };
        assert!(check_thresholds(&slow).is_err());
        let twitchy = TelemetryConfig { stale_heartbeats: 1, ..TelemetryConfig::default() };
        assert!(check_thresholds(&twitchy).is_err());
    }
}
