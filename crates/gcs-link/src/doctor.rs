use anyhow::{Context, Result};

use crate::transport::LinkAddress;
use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    let addr: LinkAddress = cfg.address.parse().context("link.address")?;
    anyhow::ensure!(cfg.sys_id != 0, "link.sys_id 0 is the broadcast id");
    anyhow::ensure!(
        cfg.send_heartbeat_hz == 0.0 || (0.2..=10.0).contains(&cfg.send_heartbeat_hz),
        "link.send_heartbeat_hz should be 0 (off) or 0.2..10"
    );
    anyhow::ensure!(cfg.outbound_capacity >= 4, "link.outbound_capacity too small");
    tracing::info!("doctor: link {} as {}/{}", addr, cfg.sys_id, cfg.comp_id);
    Ok(())
}
