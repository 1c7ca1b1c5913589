use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use gcs_link::{wait_for_stop, Link, LinkConfig};
use gcs_mission::plan_file;
use gcs_mission::{Mission, PatternConfig, UploadError, UploadPolicy, Uploader};
use gcs_proto::telemetry::VehicleSnapshot;
use gcs_telemetry::{TelemetryConfig, TelemetrySession};

#[derive(Debug, Parser)]
#[command(name = "gcs", version, about = "MAVLink ground station: live telemetry and mission upload")]
struct Cli {
    /// TOML config; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sanity-check the configuration.
    Doctor,
    /// Print one JSON vehicle snapshot per line until Ctrl-C.
    Bridge,
    Mission { #[command(subcommand)] cmd: MissionCmd },
}

#[derive(Debug, Subcommand)]
enum MissionCmd {
    /// Build the square survey pattern around the configured center.
    Generate {
        /// Upload to the vehicle after building.
        #[arg(long)]
        upload: bool,
        /// Write the mission as QGC WPL 110 text.
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lon: Option<f64>,
        /// Square side in meters.
        #[arg(long)]
        leg: Option<f64>,
        /// Altitude above home in meters.
        #[arg(long)]
        alt: Option<f32>,
    },
    /// Upload a QGroundControl `.plan` or WPL `.txt` file.
    Upload {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkConfig,
    telemetry: TelemetryConfig,
    mission: PatternConfig,
    upload: UploadPolicy,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries bridge output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;
    let stop = stop_on_ctrl_c();

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Bridge => bridge(&cfg, stop).await?,
        Command::Mission { cmd } => mission_cmd(&cfg, cmd, stop).await?,
    }
    Ok(())
}

fn stop_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c: stopping");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!("ctrl-c handler unavailable: {}", e);
                // keep the sender so receivers do not read this as a stop
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    gcs_link::doctor::check_link(&cfg.link)?;
    gcs_telemetry::doctor::check_thresholds(&cfg.telemetry)?;
    gcs_mission::doctor::check_pattern(&cfg.mission)?;
    gcs_mission::doctor::check_policy(&cfg.upload)?;
    info!(
        "doctor: stale after {:?}, upload timeout {:?} x{}",
        cfg.telemetry.stale_after(),
        cfg.upload.response_timeout(),
        cfg.upload.max_retries
    );
    info!("doctor: OK");
    Ok(())
}

async fn bridge(cfg: &Config, mut stop: watch::Receiver<bool>) -> Result<()> {
    let telemetry = TelemetrySession::new(&cfg.telemetry);
    let link = Link::open(&cfg.link, telemetry.clone(), stop.clone()).await.context("open link")?;
    info!("bridge: link up on {}", link.local_addr());
    let health = tokio::spawn(telemetry.clone().run_health(stop.clone()));

    let mut snapshots = telemetry.subscribe();
    let mut events = telemetry.events();
    loop {
        tokio::select! {
            _ = wait_for_stop(&mut stop) => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap: VehicleSnapshot = snapshots.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snap)?);
            }
            ev = events.recv() => match ev {
                Ok(e) => info!("bridge: {:?}: {}", e.kind, e.msg),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("bridge: skipped {} link events", n),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    link.join().await;
    health.await.context("health task")?;
    info!("bridge: stopped");
    Ok(())
}

async fn mission_cmd(cfg: &Config, cmd: MissionCmd, stop: watch::Receiver<bool>) -> Result<()> {
    match cmd {
        MissionCmd::Generate { upload, out, lat, lon, leg, alt } => {
            let mut pattern = cfg.mission.clone();
            if let Some(v) = lat {
                pattern.center_lat = v;
            }
            if let Some(v) = lon {
                pattern.center_lon = v;
            }
            if let Some(v) = leg {
                pattern.leg_m = v;
            }
            if let Some(v) = alt {
                pattern.alt_m = v;
            }
            gcs_mission::doctor::check_pattern(&pattern)?;

            let mission = pattern.build();
            info!(
                "mission: {} items, {} m square at {:.6},{:.6}, {} m",
                mission.len(),
                pattern.leg_m,
                pattern.center_lat,
                pattern.center_lon,
                pattern.alt_m
            );
            match &out {
                Some(path) => plan_file::save_wpl(path, &mission)
                    .with_context(|| format!("write mission {}", path.display()))?,
                None if !upload => print!("{}", plan_file::to_wpl(&mission)),
                None => {}
            }
            if upload {
                upload_mission(cfg, &mission, stop).await?;
            }
            Ok(())
        }
        MissionCmd::Upload { file } => {
            let mission = plan_file::load(&file).with_context(|| format!("load mission {}", file.display()))?;
            anyhow::ensure!(!mission.is_empty(), "{} contains no mission items", file.display());
            upload_mission(cfg, &mission, stop).await
        }
    }
}

/// Opens a link just for this upload and tears it down afterwards.
async fn upload_mission(cfg: &Config, mission: &Mission, mut stop: watch::Receiver<bool>) -> Result<()> {
    let (link_stop_tx, link_stop_rx) = watch::channel(false);
    let telemetry = TelemetrySession::new(&cfg.telemetry);
    let link = Link::open(&cfg.link, telemetry.clone(), link_stop_rx).await.context("open link")?;
    info!(
        "mission: waiting up to {:?} for a vehicle heartbeat on {}",
        cfg.upload.heartbeat_wait(),
        link.local_addr()
    );

    let attempt = async {
        let target = telemetry
            .wait_for_vehicle(cfg.upload.heartbeat_wait())
            .await
            .ok_or(UploadError::NoVehicle)?;
        Uploader::new(link.outbound(), link.missions(), target, cfg.upload.clone())
            .upload(mission)
            .await
    };
    let outcome = tokio::select! {
        res = attempt => Some(res),
        _ = wait_for_stop(&mut stop) => None,
    };

    let _ = link_stop_tx.send(true);
    link.join().await;

    match outcome {
        Some(Ok(report)) => {
            let resent: u32 = report.send_counts.values().map(|n| n.saturating_sub(1)).sum();
            println!(
                "mission accepted: {} items in {:.1}s ({} resent)",
                report.total,
                report.elapsed.as_secs_f32(),
                resent
            );
            Ok(())
        }
        Some(Err(e)) => {
            let hint = failure_hint(&e, &cfg.link);
            Err(anyhow::Error::new(e).context(hint))
        }
        None => anyhow::bail!("mission upload interrupted"),
    }
}

fn failure_hint(e: &UploadError, link: &LinkConfig) -> String {
    match e {
        UploadError::NoVehicle => format!("no vehicle heard on {}; is the autopilot streaming to it?", link.address),
        UploadError::Timeout { .. } => "mission upload timed out; the vehicle went quiet".into(),
        UploadError::Rejected { .. } => "mission upload rejected by the vehicle".into(),
        UploadError::Incomplete { .. } => "mission upload ended early; the vehicle skipped items".into(),
        UploadError::Busy => "mission upload refused; another transfer is active".into(),
        UploadError::LinkClosed => "mission upload aborted; the link closed".into(),
        UploadError::MissingItem { seq } => format!("mission upload aborted; the mission has no item {}", seq),
    }
}
