use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{MavCmd, invalid, unexpected};
use crate::{DecodeError, Frame, Message, Payload, Target};

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MissionType {
    Mission = 0,
    Fence = 1,
    Rally = 2,
    All = 255,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MissionResult {
    Accepted = 0,
    Error = 1,
    UnsupportedFrame = 2,
    Unsupported = 3,
    NoSpace = 4,
    Invalid = 5,
    InvalidParam1 = 6,
    InvalidParam2 = 7,
    InvalidParam3 = 8,
    InvalidParam4 = 9,
    InvalidParam5X = 10,
    InvalidParam6Y = 11,
    InvalidParam7 = 12,
    InvalidSequence = 13,
    Denied = 14,
    OperationCancelled = 15,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MavFrame {
    Global = 0,
    LocalNed = 1,
    Mission = 2,
    GlobalRelativeAlt = 3,
    LocalEnu = 4,
    LocalOffsetNed = 7,
    BodyNed = 8,
    BodyOffsetNed = 9,
}

/// Opens an upload of `count` items.
#[derive(Clone, Debug, PartialEq)]
pub struct MissionCount {
    pub target: Target,
    pub count: u16,
    pub mission_type: MissionType,
}

impl Message for MissionCount {
    const NAME: &'static str = "MISSION_COUNT";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::MissionCount {
            target_system: self.target.system,
            target_component: self.target.component,
            count: self.count,
            mission_type: self.mission_type.into(),
        })
    }
}

/// The vehicle asking for item `seq` during an upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MissionRequestInt {
    pub seq: u16,
    pub mission_type: Option<MissionType>,
}

impl Message for MissionRequestInt {
    const NAME: &'static str = "MISSION_REQUEST_INT";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::MissionRequestInt {
            seq, mission_type, ..
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let mission_type = MissionType::try_from(mission_type)
            .map_err(|_| invalid("mission_type", mission_type))?;
        self.seq = seq;
        self.mission_type = Some(mission_type);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissionItemInt {
    pub target: Target,
    pub seq: u16,
    pub frame: MavFrame,
    pub command: MavCmd,
    pub current: bool,
    pub autocontinue: bool,
    pub params: [f32; 4],
    pub x: i32,
    pub y: i32,
    pub z: f32,
    pub mission_type: MissionType,
}

impl MissionItemInt {
    /// One corner of a fence polygon of `vertex_count` vertices.
    pub fn fence_vertex(
        target: Target,
        seq: u16,
        vertex_count: u16,
        latitude: f64,
        longitude: f64,
        inclusion: bool,
    ) -> Self {
        let command = if inclusion {
            MavCmd::NavFencePolygonVertexInclusion
        } else {
            MavCmd::NavFencePolygonVertexExclusion
        };
        MissionItemInt {
            target,
            seq,
            frame: MavFrame::Global,
            command,
            current: false,
            autocontinue: false,
            params: [vertex_count as f32, 0.0, 0.0, 0.0],
            x: (latitude * 1e7).round() as i32,
            y: (longitude * 1e7).round() as i32,
            z: 0.0,
            mission_type: MissionType::Fence,
        }
    }
}

impl Message for MissionItemInt {
    const NAME: &'static str = "MISSION_ITEM_INT";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::MissionItemInt {
            target_system: self.target.system,
            target_component: self.target.component,
            seq: self.seq,
            frame: self.frame.into(),
            command: self.command.into(),
            current: self.current as u8,
            autocontinue: self.autocontinue as u8,
            params: self.params,
            x: self.x,
            y: self.y,
            z: self.z,
            mission_type: self.mission_type.into(),
        })
    }
}

/// Final reply to an upload or clear.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MissionAck {
    pub result: Option<MissionResult>,
    pub mission_type: Option<MissionType>,
}

impl MissionAck {
    pub fn accepted(&self) -> bool {
        self.result == Some(MissionResult::Accepted)
    }
}

impl Message for MissionAck {
    const NAME: &'static str = "MISSION_ACK";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::MissionAck {
            result,
            mission_type,
            ..
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let result = MissionResult::try_from(result).map_err(|_| invalid("result", result))?;
        let mission_type = MissionType::try_from(mission_type)
            .map_err(|_| invalid("mission_type", mission_type))?;
        self.result = Some(result);
        self.mission_type = Some(mission_type);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissionClearAll {
    pub target: Target,
    pub mission_type: MissionType,
}

impl Message for MissionClearAll {
    const NAME: &'static str = "MISSION_CLEAR_ALL";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::MissionClearAll {
            target_system: self.target.system,
            target_component: self.target.component,
            mission_type: self.mission_type.into(),
        })
    }
}
