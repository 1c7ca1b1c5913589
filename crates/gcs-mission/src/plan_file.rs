//! Mission files: QGC WPL 110 text (read and write) and QGroundControl
//! `.plan` JSON (read).

use std::fmt::Write as _;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::geo::GeoPoint;
use crate::waypoint::{Mission, MissionCommand, MissionError, MissionFrame, Waypoint};

pub const WPL_HEADER: &str = "QGC WPL 110";

const WPL_FIELDS: usize = 12;
const PLAN_DEFAULT_FRAME: u8 = 3;
const PLAN_DEFAULT_COMMAND: u16 = 16;

#[derive(Debug, thiserror::Error)]
pub enum PlanFileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing `QGC WPL` header")]
    MissingHeader,
    #[error("line {line}: {reason}")]
    BadLine { line: usize, reason: String },
    #[error("item {item}: unsupported MAV_CMD {code}")]
    UnsupportedCommand { item: usize, code: u16 },
    #[error("item {item}: position {lat},{lon} out of range")]
    BadPosition { item: usize, lat: f64, lon: f64 },
    #[error("item {item}: unsupported MAV_FRAME {code}")]
    UnsupportedFrame { item: usize, code: u8 },
    #[error("plan json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown mission file extension for {0} (expected .plan or .txt)")]
    UnknownFormat(String),
    #[error(transparent)]
    Mission(#[from] MissionError),
}

pub fn to_wpl(mission: &Mission) -> String {
    let mut out = String::from(WPL_HEADER);
    out.push('\n');
    for w in mission.items() {
        // writing to a String cannot fail
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.8}\t{:.8}\t{:.6}\t{}",
            w.seq,
            w.current as u8,
            w.frame.code(),
            w.command.code(),
            w.params[0],
            w.params[1],
            w.params[2],
            w.params[3],
            w.lat,
            w.lon,
            w.alt,
            w.autocontinue as u8,
        );
    }
    out
}

pub fn parse_wpl(text: &str) -> Result<Mission, PlanFileError> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header.starts_with("QGC WPL") => {}
        _ => return Err(PlanFileError::MissingHeader),
    }

    let mut items = Vec::new();
    for (idx, raw) in lines {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() != WPL_FIELDS {
            warn!("mission: skipping line {} with {} fields", line, fields.len());
            continue;
        }
        let mut v = [0f64; WPL_FIELDS];
        for (slot, f) in v.iter_mut().zip(&fields) {
            *slot = f.trim().parse().map_err(|_| PlanFileError::BadLine {
                line,
                reason: format!("`{}` is not a number", f),
            })?;
        }
        let item = items.len();
        let command = command_from(item, v[3] as u16)?;
        let frame = frame_from(item, v[2] as u8)?;
        let (lat, lon) = position_from(item, v[8], v[9])?;
        let mut wp = Waypoint::new(command, lat, lon, v[10] as f32)
            .with_params([v[4] as f32, v[5] as f32, v[6] as f32, v[7] as f32]);
        wp.frame = frame;
        wp.autocontinue = v[11] != 0.0;
        items.push(wp);
    }
    Ok(Mission::new(items)?)
}

#[derive(Deserialize)]
struct PlanDocument {
    #[serde(default)]
    mission: PlanMission,
}

#[derive(Deserialize, Default)]
struct PlanMission {
    #[serde(default)]
    items: Vec<PlanItem>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum PlanItem {
    SimpleItem(SimpleItem),
    ComplexItem(ComplexItem),
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct SimpleItem {
    #[serde(default = "default_command")]
    command: u16,
    #[serde(default = "default_frame")]
    frame: u8,
    #[serde(default)]
    params: Value,
    #[serde(rename = "autoContinue", default = "default_true")]
    auto_continue: bool,
}

#[derive(Deserialize)]
struct ComplexItem {
    #[serde(rename = "TransectStyleComplexItem", default)]
    transect: Option<Transect>,
}

#[derive(Deserialize)]
struct Transect {
    #[serde(rename = "Items", default)]
    items: Vec<SimpleItem>,
}

fn default_command() -> u16 {
    PLAN_DEFAULT_COMMAND
}

fn default_frame() -> u8 {
    PLAN_DEFAULT_FRAME
}

fn default_true() -> bool {
    true
}

/// param1..4 then x/y/z; nulls and missing entries are zero.
fn plan_params(raw: &Value) -> [f64; 7] {
    let mut out = [0.0; 7];
    if let Value::Array(list) = raw {
        for (slot, v) in out.iter_mut().zip(list) {
            *slot = v.as_f64().unwrap_or(0.0);
        }
    }
    out
}

pub fn parse_plan(text: &str) -> Result<Mission, PlanFileError> {
    let doc: PlanDocument = serde_json::from_str(text)?;
    let mut simple = Vec::new();
    for item in doc.mission.items {
        match item {
            PlanItem::SimpleItem(s) => simple.push(s),
            PlanItem::ComplexItem(c) => simple.extend(c.transect.into_iter().flat_map(|t| t.items)),
            PlanItem::Other => {}
        }
    }

    let mut items = Vec::with_capacity(simple.len());
    for (i, s) in simple.iter().enumerate() {
        let p = plan_params(&s.params);
        let (lat, lon) = position_from(i, p[4], p[5])?;
        let mut wp = Waypoint::new(command_from(i, s.command)?, lat, lon, p[6] as f32)
            .with_params([p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]);
        wp.frame = frame_from(i, s.frame)?;
        wp.autocontinue = s.auto_continue;
        items.push(wp);
    }
    Ok(Mission::new(items)?)
}

fn command_from(item: usize, code: u16) -> Result<MissionCommand, PlanFileError> {
    MissionCommand::from_code(code).ok_or(PlanFileError::UnsupportedCommand { item, code })
}

fn frame_from(item: usize, code: u8) -> Result<MissionFrame, PlanFileError> {
    MissionFrame::from_code(code).ok_or(PlanFileError::UnsupportedFrame { item, code })
}

/// Degrees must fit the 1e7 fixed-point fields of MISSION_ITEM_INT.
fn position_from(item: usize, lat: f64, lon: f64) -> Result<(f64, f64), PlanFileError> {
    if !GeoPoint::new(lat, lon).is_valid() {
        return Err(PlanFileError::BadPosition { item, lat, lon });
    }
    Ok((lat, lon))
}

/// Loads `.plan` or `.txt` by extension.
pub fn load(path: &Path) -> Result<Mission, PlanFileError> {
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let parse: fn(&str) -> Result<Mission, PlanFileError> = match ext.as_deref() {
        Some("plan") => parse_plan,
        Some("txt") | Some("waypoints") => parse_wpl,
        _ => return Err(PlanFileError::UnknownFormat(path.display().to_string())),
    };
    let mission = parse(&std::fs::read_to_string(path)?)?;
    info!("mission: loaded {} items from {}", mission.len(), path.display());
    Ok(mission)
}

pub fn save_wpl(path: &Path, mission: &Mission) -> Result<(), PlanFileError> {
    std::fs::write(path, to_wpl(mission))?;
    info!("mission: wrote {} items to {}", mission.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::geo::GeoPoint;

    #[test]
    fn wpl_export_has_header_and_one_line_per_item() {
        let m = build(GeoPoint::new(47.397742, 8.545594), 50.0, 20.0);
        let text = to_wpl(&m);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], WPL_HEADER);
        assert_eq!(lines.len(), 7);
        assert_eq!(
            lines[1],
            "0\t1\t3\t22\t15\t0\t0\t0\t47.39774200\t8.54559400\t20.000000\t1"
        );
        assert!(lines[6].starts_with("5\t0\t3\t20\t"));
        assert!(lines[1..].iter().all(|l| l.split('\t').count() == 12));
    }

    #[test]
    fn wpl_import_reads_back_what_export_wrote() {
        let m = build(GeoPoint::new(-33.8688, 151.2093), 120.0, 35.0);
        let back = parse_wpl(&to_wpl(&m)).unwrap();
        assert_eq!(back.len(), m.len());
        for (a, b) in m.items().iter().zip(back.items()) {
            assert_eq!((a.seq, a.command, a.frame, a.current), (b.seq, b.command, b.frame, b.current));
            assert!((a.lat - b.lat).abs() < 1e-7 && (a.lon - b.lon).abs() < 1e-7);
        }
    }

    #[test]
    fn wpl_import_skips_comments_and_short_lines_and_resequences() {
        let text = "QGC WPL 110\n\
            # home\n\
            \n\
            5\t0\t3\t16\t0\t0\t0\t0\t1.0\t2.0\t10\t1\n\
            9\t0\t3\t16\t0\t0\n\
            7\t1\t0\t21\t0\t0\t0\t0\t1.5\t2.5\t0\t0\n";
        let m = parse_wpl(text).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!((m.items()[0].seq, m.items()[0].current), (0, true));
        assert_eq!((m.items()[1].seq, m.items()[1].current), (1, false));
        assert_eq!(m.items()[1].command, MissionCommand::Land);
        assert_eq!(m.items()[1].frame, MissionFrame::Global);
        assert!(!m.items()[1].autocontinue);
    }

    #[test]
    fn wpl_import_rejects_bad_header_numbers_and_commands() {
        assert!(matches!(parse_wpl("hello\n"), Err(PlanFileError::MissingHeader)));
        assert!(matches!(parse_wpl(""), Err(PlanFileError::MissingHeader)));
        let bad_num = "QGC WPL 110\n0\t1\t3\tx\t0\t0\t0\t0\t1\t2\t3\t1\n";
        assert!(matches!(parse_wpl(bad_num), Err(PlanFileError::BadLine { line: 2, .. })));
        let loiter = "QGC WPL 110\n0\t1\t3\t17\t0\t0\t0\t0\t1\t2\t3\t1\n";
        assert!(matches!(parse_wpl(loiter), Err(PlanFileError::UnsupportedCommand { item: 0, code: 17 })));
    }

    #[test]
    fn plan_import_flattens_complex_items_and_fills_params() {
        let json = r#"{
            "fileType": "Plan",
            "mission": {
                "items": [
                    {"type": "SimpleItem", "command": 22, "frame": 3,
                     "params": [15, 0, 0, null, 47.1, 8.1, 20], "autoContinue": true},
                    {"type": "ComplexItem", "complexItemType": "survey",
                     "TransectStyleComplexItem": {"Items": [
                        {"type": "SimpleItem", "command": 16, "params": [0, 0, 0, 0, 47.2, 8.2]},
                        {"type": "SimpleItem", "params": null}
                     ]}},
                    {"type": "SomethingNew"},
                    {"type": "SimpleItem", "command": 20, "autoContinue": false}
                ]
            }
        }"#;
        let m = parse_plan(json).unwrap();
        assert_eq!(m.len(), 4);
        let w = m.items();
        assert_eq!(w[0].command, MissionCommand::Takeoff);
        assert_eq!(w[0].params, [15.0, 0.0, 0.0, 0.0]);
        assert_eq!((w[0].lat, w[0].lon, w[0].alt), (47.1, 8.1, 20.0));
        // short list padded: alt missing
        assert_eq!((w[1].lat, w[1].lon, w[1].alt), (47.2, 8.2, 0.0));
        // defaults: NAV_WAYPOINT in relative-alt frame
        assert_eq!(w[2].command, MissionCommand::Waypoint);
        assert_eq!(w[2].frame, MissionFrame::GlobalRelativeAlt);
        assert_eq!((w[2].lat, w[2].lon), (0.0, 0.0));
        assert_eq!(w[3].command, MissionCommand::ReturnToLaunch);
        assert!(!w[3].autocontinue);
        assert!(w.iter().enumerate().all(|(i, x)| x.seq as usize == i && x.current == (i == 0)));
    }

    #[test]
    fn out_of_range_positions_are_rejected_on_import() {
        let wpl = "QGC WPL 110\n\
            0\t1\t3\t16\t0\t0\t0\t0\t47.0\t8.0\t10\t1\n\
            1\t0\t3\t16\t0\t0\t0\t0\t95.0\t8.0\t10\t1\n";
        assert!(matches!(
            parse_wpl(wpl),
            Err(PlanFileError::BadPosition { item: 1, lat, .. }) if lat == 95.0
        ));
        let nan = "QGC WPL 110\n0\t1\t3\t16\t0\t0\t0\t0\tNaN\t8.0\t10\t1\n";
        assert!(matches!(parse_wpl(nan), Err(PlanFileError::BadPosition { item: 0, .. })));

        let plan = r#"{"mission": {"items": [
            {"type": "SimpleItem", "command": 16, "params": [0, 0, 0, 0, 47.0, 200.0, 20]}
        ]}}"#;
        let err = parse_plan(plan).unwrap_err();
        assert!(matches!(err, PlanFileError::BadPosition { item: 0, lon, .. } if lon == 200.0));
        assert_eq!(err.to_string(), "item 0: position 47,200 out of range");

        // the poles and the antimeridian are still fine
        let edge = "QGC WPL 110\n0\t1\t3\t16\t0\t0\t0\t0\t-90.0\t180.0\t10\t1\n";
        assert_eq!(parse_wpl(edge).unwrap().len(), 1);
    }

    #[test]
    fn plan_import_reports_invalid_json() {
        assert!(matches!(parse_plan("{not json"), Err(PlanFileError::Json(_))));
        let empty = parse_plan(r#"{"mission": {}}"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn load_dispatches_on_extension() {
        let dir = std::env::temp_dir().join(format!("gcs-plan-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let m = build(GeoPoint::new(10.0, 20.0), 50.0, 20.0);

        let txt = dir.join("square.txt");
        save_wpl(&txt, &m).unwrap();
        assert_eq!(load(&txt).unwrap().len(), 6);

        let plan = dir.join("empty.PLAN");
        std::fs::write(&plan, r#"{"mission": {"items": []}}"#).unwrap();
        assert!(load(&plan).unwrap().is_empty());

        assert!(matches!(load(&dir.join("square.kml")), Err(PlanFileError::UnknownFormat(_))));
        assert!(matches!(load(&dir.join("missing.txt")), Err(PlanFileError::Io(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
