use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{FlightMode, invalid, unexpected};
use crate::{DecodeError, Frame, Message, Payload, Target};

const CUSTOM_MODE_ENABLED: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum MavCmd {
    NavTakeoff = 22,
    DoSetMode = 176,
    DoSetHome = 179,
    PreflightCalibration = 241,
    PreflightRebootShutdown = 246,
    ComponentArmDisarm = 400,
    SetMessageInterval = 511,
    NavFencePolygonVertexInclusion = 5001,
    NavFencePolygonVertexExclusion = 5002,
    FixedMagCalYaw = 42006,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MavResult {
    Accepted = 0,
    TemporarilyRejected = 1,
    Denied = 2,
    Unsupported = 3,
    Failed = 4,
    InProgress = 5,
    Cancelled = 6,
    LongOnly = 7,
    IntOnly = 8,
    UnsupportedFrame = 9,
}

/// Telemetry streams whose rate can be requested with [`CommandLong::set_message_interval`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum MessageId {
    SysStatus = 1,
    SystemTime = 2,
    GpsRawInt = 24,
    RawImu = 27,
    Attitude = 30,
    AttitudeQuaternion = 31,
    LocalPositionNed = 32,
    GlobalPositionInt = 33,
    RcChannels = 65,
    VfrHud = 74,
    BatteryStatus = 147,
}

impl MessageId {
    pub fn from_name(name: &str) -> Option<Self> {
        let id = match name.to_ascii_uppercase().as_str() {
            "SYS_STATUS" => MessageId::SysStatus,
            "SYSTEM_TIME" => MessageId::SystemTime,
            "GPS_RAW_INT" => MessageId::GpsRawInt,
            "RAW_IMU" => MessageId::RawImu,
            "ATTITUDE" => MessageId::Attitude,
            "ATTITUDE_QUATERNION" => MessageId::AttitudeQuaternion,
            "LOCAL_POSITION_NED" => MessageId::LocalPositionNed,
            "GLOBAL_POSITION_INT" => MessageId::GlobalPositionInt,
            "RC_CHANNELS" => MessageId::RcChannels,
            "VFR_HUD" => MessageId::VfrHud,
            "BATTERY_STATUS" => MessageId::BatteryStatus,
            _ => return None,
        };
        Some(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calibration {
    Accelerometer,
    Barometer,
    Compass,
    Level,
}

/// A generic command with seven float parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandLong {
    pub target: Target,
    pub command: MavCmd,
    pub confirmation: u8,
    pub params: [f32; 7],
}

impl CommandLong {
    pub fn new(target: Target, command: MavCmd, params: [f32; 7]) -> Self {
        CommandLong {
            target,
            command,
            confirmation: 0,
            params,
        }
    }

    pub fn arm(target: Target, arm: bool) -> Self {
        let arm = if arm { 1.0 } else { 0.0 };
        CommandLong::new(target, MavCmd::ComponentArmDisarm, [arm, 0., 0., 0., 0., 0., 0.])
    }

    pub fn set_mode(target: Target, mode: FlightMode) -> Self {
        let custom = u32::from(mode) as f32;
        CommandLong::new(
            target,
            MavCmd::DoSetMode,
            [CUSTOM_MODE_ENABLED, custom, 0., 0., 0., 0., 0.],
        )
    }

    /// Requests `message` at `rate_hz`. A rate of zero or less disables the stream.
    pub fn set_message_interval(target: Target, message: MessageId, rate_hz: f32) -> Self {
        let interval_us = if rate_hz > 0.0 { 1e6 / rate_hz } else { -1.0 };
        let id = u32::from(message) as f32;
        CommandLong::new(
            target,
            MavCmd::SetMessageInterval,
            [id, interval_us, 0., 0., 0., 0., 1.0],
        )
    }

    pub fn takeoff(target: Target, altitude: f32) -> Self {
        CommandLong::new(target, MavCmd::NavTakeoff, [0., 0., 0., 0., 0., 0., altitude])
    }

    pub fn reboot(target: Target) -> Self {
        CommandLong::new(
            target,
            MavCmd::PreflightRebootShutdown,
            [1.0, 0., 0., 0., 0., 0., 0.],
        )
    }

    /// Sets home to the vehicle's current location.
    pub fn set_home(target: Target) -> Self {
        CommandLong::new(target, MavCmd::DoSetHome, [1.0, 0., 0., 0., 0., 0., 0.])
    }

    pub fn calibrate(target: Target, kind: Calibration) -> Self {
        match kind {
            Calibration::Accelerometer => CommandLong::new(
                target,
                MavCmd::PreflightCalibration,
                [0., 0., 0., 0., 1.0, 0., 0.],
            ),
            Calibration::Barometer => CommandLong::new(
                target,
                MavCmd::PreflightCalibration,
                [0., 0., 1.0, 0., 0., 0., 0.],
            ),
            Calibration::Level => CommandLong::new(
                target,
                MavCmd::PreflightCalibration,
                [0., 0., 0., 0., 2.0, 0., 0.],
            ),
            Calibration::Compass => CommandLong::new(target, MavCmd::FixedMagCalYaw, [0.; 7]),
        }
    }
}

impl Message for CommandLong {
    const NAME: &'static str = "COMMAND_LONG";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::CommandLong {
            target_system: self.target.system,
            target_component: self.target.component,
            command: self.command.into(),
            confirmation: self.confirmation,
            params: self.params,
        })
    }
}

/// Reply to a [`CommandLong`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandAck {
    pub command: u16,
    pub result: Option<MavResult>,
}

impl CommandAck {
    pub fn accepted(&self) -> bool {
        self.result == Some(MavResult::Accepted)
    }

    pub fn acknowledges(&self, command: MavCmd) -> bool {
        self.command == u16::from(command)
    }
}

impl Message for CommandAck {
    const NAME: &'static str = "COMMAND_ACK";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::CommandAck { command, result } = frame.payload else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let result = MavResult::try_from(result).map_err(|_| invalid("result", result))?;
        self.command = command;
        self.result = Some(result);
        Ok(())
    }
}
