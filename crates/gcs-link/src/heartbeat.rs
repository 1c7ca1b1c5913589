use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};

/// Heartbeat we emit as a ground station peer. Autopilots use it to decide
/// whether a GCS is present (failsafe) and where to stream to.
pub fn gcs_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

/// True for heartbeats from a flight controller. Ground stations, companion
/// computers, gimbals, cameras and ADS-B receivers share the link but are
/// never an upload target.
pub fn is_vehicle(hb: &HEARTBEAT_DATA) -> bool {
    if matches!(hb.autopilot, MavAutopilot::MAV_AUTOPILOT_INVALID) {
        return false;
    }
    !matches!(
        hb.mavtype,
        MavType::MAV_TYPE_GCS
            | MavType::MAV_TYPE_ONBOARD_CONTROLLER
            | MavType::MAV_TYPE_GIMBAL
            | MavType::MAV_TYPE_ADSB
            | MavType::MAV_TYPE_CAMERA
    )
}
