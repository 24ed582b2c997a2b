use serde::{Deserialize, Serialize};

/// Identity of the system and component that emitted a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    pub system_id: u8,
    pub component_id: u8,
    pub sequence: u8,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            system_id: 255,
            component_id: 0,
            sequence: 0,
        }
    }
}

impl Header {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Header {
            system_id,
            component_id,
            sequence: 0,
        }
    }
}

/// System and component a command is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub system: u8,
    pub component: u8,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            system: 1,
            component: 0,
        }
    }
}

impl Target {
    pub fn new(system: u8, component: u8) -> Self {
        Target { system, component }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub header: Header,
    pub payload: Payload,
}

impl Frame {
    pub fn new(header: Header, payload: Payload) -> Self {
        Frame { header, payload }
    }

    pub fn name(&self) -> &'static str {
        self.payload.name()
    }
}

/// The closed set of messages understood on the wire.
///
/// Field units follow the vehicle's conventions: angles in radians, integer coordinates in
/// degrees * 1e7, integer altitudes in millimetres, integer velocities in cm/s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Heartbeat {
        mav_type: u8,
        autopilot: u8,
        base_mode: u8,
        custom_mode: u32,
        system_status: u8,
    },
    SysStatus {
        sensors_present: u32,
        sensors_enabled: u32,
        sensors_health: u32,
        load: u16,
        voltage_battery: u16,
        current_battery: i16,
        battery_remaining: i8,
    },
    SystemTime {
        time_unix_usec: u64,
        time_boot_ms: u32,
    },
    GpsRawInt {
        time_usec: u64,
        fix_type: u8,
        lat: i32,
        lon: i32,
        alt: i32,
        eph: u16,
        epv: u16,
        vel: u16,
        cog: u16,
        satellites_visible: u8,
    },
    RawImu {
        time_usec: u64,
        acc: [i16; 3],
        gyro: [i16; 3],
        mag: [i16; 3],
    },
    Attitude {
        time_boot_ms: u32,
        roll: f32,
        pitch: f32,
        yaw: f32,
        rollspeed: f32,
        pitchspeed: f32,
        yawspeed: f32,
    },
    AttitudeQuaternion {
        time_boot_ms: u32,
        q: [f32; 4],
        rollspeed: f32,
        pitchspeed: f32,
        yawspeed: f32,
    },
    LocalPositionNed {
        time_boot_ms: u32,
        x: f32,
        y: f32,
        z: f32,
        vx: f32,
        vy: f32,
        vz: f32,
    },
    GlobalPositionInt {
        time_boot_ms: u32,
        lat: i32,
        lon: i32,
        alt: i32,
        relative_alt: i32,
        vx: i16,
        vy: i16,
        vz: i16,
        hdg: u16,
    },
    RcChannels {
        time_boot_ms: u32,
        chancount: u8,
        channels: [u16; 18],
        rssi: u8,
    },
    VfrHud {
        airspeed: f32,
        groundspeed: f32,
        heading: i16,
        throttle: u16,
        alt: f32,
        climb: f32,
    },
    BatteryStatus {
        id: u8,
        battery_function: u8,
        battery_type: u8,
        temperature: i16,
        voltages: [u16; 10],
        current_battery: i16,
        current_consumed: i32,
        energy_consumed: i32,
        battery_remaining: i8,
    },
    StatusText {
        severity: u8,
        text: String,
    },
    CommandLong {
        target_system: u8,
        target_component: u8,
        command: u16,
        confirmation: u8,
        params: [f32; 7],
    },
    CommandAck {
        command: u16,
        result: u8,
    },
    MissionCount {
        target_system: u8,
        target_component: u8,
        count: u16,
        mission_type: u8,
    },
    MissionRequestInt {
        target_system: u8,
        target_component: u8,
        seq: u16,
        mission_type: u8,
    },
    MissionItemInt {
        target_system: u8,
        target_component: u8,
        seq: u16,
        frame: u8,
        command: u16,
        current: u8,
        autocontinue: u8,
        params: [f32; 4],
        x: i32,
        y: i32,
        z: f32,
        mission_type: u8,
    },
    MissionAck {
        target_system: u8,
        target_component: u8,
        result: u8,
        mission_type: u8,
    },
    MissionClearAll {
        target_system: u8,
        target_component: u8,
        mission_type: u8,
    },
    SetPositionTargetLocalNed {
        time_boot_ms: u32,
        target_system: u8,
        target_component: u8,
        coordinate_frame: u8,
        type_mask: u16,
        position: [f32; 3],
        velocity: [f32; 3],
        acceleration: [f32; 3],
        yaw: f32,
        yaw_rate: f32,
    },
    SetAttitudeTarget {
        time_boot_ms: u32,
        target_system: u8,
        target_component: u8,
        type_mask: u8,
        q: [f32; 4],
        body_rates: [f32; 3],
        thrust: f32,
    },
    RcChannelsOverride {
        target_system: u8,
        target_component: u8,
        channels: [u16; 18],
    },
    GpsRtcmData {
        flags: u8,
        data: Vec<u8>,
    },
}

impl Payload {
    /// The dispatch key for this payload.
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Heartbeat { .. } => "HEARTBEAT",
            Payload::SysStatus { .. } => "SYS_STATUS",
            Payload::SystemTime { .. } => "SYSTEM_TIME",
            Payload::GpsRawInt { .. } => "GPS_RAW_INT",
            Payload::RawImu { .. } => "RAW_IMU",
            Payload::Attitude { .. } => "ATTITUDE",
            Payload::AttitudeQuaternion { .. } => "ATTITUDE_QUATERNION",
            Payload::LocalPositionNed { .. } => "LOCAL_POSITION_NED",
            Payload::GlobalPositionInt { .. } => "GLOBAL_POSITION_INT",
            Payload::RcChannels { .. } => "RC_CHANNELS",
            Payload::VfrHud { .. } => "VFR_HUD",
            Payload::BatteryStatus { .. } => "BATTERY_STATUS",
            Payload::StatusText { .. } => "STATUSTEXT",
            Payload::CommandLong { .. } => "COMMAND_LONG",
            Payload::CommandAck { .. } => "COMMAND_ACK",
            Payload::MissionCount { .. } => "MISSION_COUNT",
            Payload::MissionRequestInt { .. } => "MISSION_REQUEST_INT",
            Payload::MissionItemInt { .. } => "MISSION_ITEM_INT",
            Payload::MissionAck { .. } => "MISSION_ACK",
            Payload::MissionClearAll { .. } => "MISSION_CLEAR_ALL",
            Payload::SetPositionTargetLocalNed { .. } => "SET_POSITION_TARGET_LOCAL_NED",
            Payload::SetAttitudeTarget { .. } => "SET_ATTITUDE_TARGET",
            Payload::RcChannelsOverride { .. } => "RC_CHANNELS_OVERRIDE",
            Payload::GpsRtcmData { .. } => "GPS_RTCM_DATA",
        }
    }
}
