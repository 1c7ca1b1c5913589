use gcs_link::VehicleId;
use mavlink::common::{MavCmd, MavFrame, MISSION_ITEM_INT_DATA};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("mission has {0} items; MISSION_COUNT carries at most 65535")]
    TooLong(usize),
}

/// MAV_CMD subset a mission may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionCommand {
    Waypoint,
    ReturnToLaunch,
    Land,
    Takeoff,
}

impl MissionCommand {
    pub fn code(self) -> u16 {
        match self {
            MissionCommand::Waypoint => 16,
            MissionCommand::ReturnToLaunch => 20,
            MissionCommand::Land => 21,
            MissionCommand::Takeoff => 22,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            16 => Some(MissionCommand::Waypoint),
            20 => Some(MissionCommand::ReturnToLaunch),
            21 => Some(MissionCommand::Land),
            22 => Some(MissionCommand::Takeoff),
            _ => None,
        }
    }

    pub fn to_mav(self) -> MavCmd {
        match self {
            MissionCommand::Waypoint => MavCmd::MAV_CMD_NAV_WAYPOINT,
            MissionCommand::ReturnToLaunch => MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
            MissionCommand::Land => MavCmd::MAV_CMD_NAV_LAND,
            MissionCommand::Takeoff => MavCmd::MAV_CMD_NAV_TAKEOFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionFrame {
    Global,
    GlobalRelativeAlt,
    GlobalTerrainAlt,
}

impl MissionFrame {
    pub fn code(self) -> u8 {
        match self {
            MissionFrame::Global => 0,
            MissionFrame::GlobalRelativeAlt => 3,
            MissionFrame::GlobalTerrainAlt => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MissionFrame::Global),
            3 => Some(MissionFrame::GlobalRelativeAlt),
            10 => Some(MissionFrame::GlobalTerrainAlt),
            _ => None,
        }
    }

    pub fn to_mav(self) -> MavFrame {
        match self {
            MissionFrame::Global => MavFrame::MAV_FRAME_GLOBAL,
            MissionFrame::GlobalRelativeAlt => MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            MissionFrame::GlobalTerrainAlt => MavFrame::MAV_FRAME_GLOBAL_TERRAIN_ALT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub seq: u16,
    pub command: MissionCommand,
    pub frame: MissionFrame,
    pub current: bool,
    pub autocontinue: bool,
    /// param1..param4; meaning depends on `command`.
    pub params: [f32; 4],
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
}

impl Waypoint {
    pub fn new(command: MissionCommand, lat: f64, lon: f64, alt: f32) -> Self {
        Self {
            seq: 0,
            command,
            frame: MissionFrame::GlobalRelativeAlt,
            current: false,
            autocontinue: true,
            params: [0.0; 4],
            lat,
            lon,
            alt,
        }
    }

    pub fn with_params(mut self, params: [f32; 4]) -> Self {
        self.params = params;
        self
    }

    pub fn to_mission_item(&self, target: VehicleId) -> MISSION_ITEM_INT_DATA {
        MISSION_ITEM_INT_DATA {
            param1: self.params[0],
            param2: self.params[1],
            param3: self.params[2],
            param4: self.params[3],
            x: (self.lat * 1e7).round() as i32,
            y: (self.lon * 1e7).round() as i32,
            z: self.alt,
            seq: self.seq,
            command: self.command.to_mav(),
            target_system: target.system_id,
            target_component: target.component_id,
            frame: self.frame.to_mav(),
            current: self.current as u8,
            autocontinue: self.autocontinue as u8,
            ..Default::default()
        }
    }
}

/// Ordered, immutable waypoint list. Sequence numbers are `0..len` and only
/// item 0 is flagged current.
#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    items: Vec<Waypoint>,
}

impl Mission {
    /// Re-sequences `items` in their given order.
    pub fn new(items: Vec<Waypoint>) -> Result<Self, MissionError> {
        if items.len() > u16::MAX as usize {
            return Err(MissionError::TooLong(items.len()));
        }
        Ok(Self::sequenced(items))
    }

    pub(crate) fn sequenced(mut items: Vec<Waypoint>) -> Self {
        for (i, wp) in items.iter_mut().enumerate() {
            wp.seq = i as u16;
            wp.current = i == 0;
        }
        Self { items }
    }

    pub fn items(&self) -> &[Waypoint] {
        &self.items
    }

    pub fn get(&self, seq: u16) -> Option<&Waypoint> {
        self.items.get(seq as usize)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item count as sent in MISSION_COUNT.
    pub fn count(&self) -> u16 {
        self.items.len() as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_resequences_and_flags_first_item_current() {
        let mut a = Waypoint::new(MissionCommand::Takeoff, 1.0, 2.0, 10.0);
        a.seq = 7;
        let mut b = Waypoint::new(MissionCommand::Waypoint, 1.0, 2.0, 10.0);
        b.current = true;
        let m = Mission::new(vec![a, b]).unwrap();
        let seqs: Vec<_> = m.items().iter().map(|w| (w.seq, w.current)).collect();
        assert_eq!(seqs, vec![(0, true), (1, false)]);
        assert_eq!(m.count(), 2);
    }

    #[test]
    fn command_and_frame_codes_match_mavlink() {
        for cmd in [MissionCommand::Waypoint, MissionCommand::Takeoff, MissionCommand::Land, MissionCommand::ReturnToLaunch] {
            assert_eq!(MissionCommand::from_code(cmd.code()), Some(cmd));
        }
        assert_eq!(MissionCommand::from_code(178), None);
        assert_eq!(MissionFrame::from_code(3), Some(MissionFrame::GlobalRelativeAlt));
        assert_eq!(MissionFrame::from_code(6), None);
    }

    #[test]
    fn mission_item_carries_fixed_point_position_and_target() {
        let mut wp = Waypoint::new(MissionCommand::Takeoff, 47.397742, 8.545594, 20.0).with_params([15.0, 0.0, 0.0, 0.0]);
        wp.seq = 0;
        wp.current = true;
        let item = wp.to_mission_item(VehicleId { system_id: 1, component_id: 1 });
        assert_eq!(item.x, 473_977_420);
        assert_eq!(item.y, 85_455_940);
        assert_eq!(item.z, 20.0);
        assert_eq!(item.param1, 15.0);
        assert_eq!(item.current, 1);
        assert_eq!(item.autocontinue, 1);
        assert_eq!(item.target_system, 1);
        assert_eq!(item.command, MavCmd::MAV_CMD_NAV_TAKEOFF);
        assert_eq!(item.frame, MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT);
    }
}
