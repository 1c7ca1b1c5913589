use anyhow::Result;

use crate::builder::PatternConfig;
use crate::upload::UploadPolicy;

pub fn check_pattern(p: &PatternConfig) -> Result<()> {
    anyhow::ensure!(p.center().is_valid(), "mission center coordinates invalid");
    anyhow::ensure!(p.center_lat.abs() < 85.0, "mission center too close to a pole");
    anyhow::ensure!(p.leg_m >= 5.0 && p.leg_m <= 5_000.0, "mission.leg_m should be 5..5000");
    anyhow::ensure!(p.alt_m > 0.0 && p.alt_m <= 500.0, "mission.alt_m should be 0..500");
    Ok(())
}

pub fn check_policy(p: &UploadPolicy) -> Result<()> {
    anyhow::ensure!(p.response_timeout_ms >= 100, "upload.response_timeout_ms too small");
    anyhow::ensure!(p.max_retries <= 20, "upload.max_retries unreasonably high");
    anyhow::ensure!(p.reply_capacity >= 1, "upload.reply_capacity must be >= 1");
    Ok(())
}
