use std::time::Duration;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{invalid, unexpected};
use crate::{DecodeError, Frame, Message, Payload};

const MAV_TYPE_GCS: u8 = 6;
const MAV_AUTOPILOT_INVALID: u8 = 8;
const MAV_MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MavState {
    Uninit = 0,
    Boot = 1,
    Calibrating = 2,
    Standby = 3,
    Active = 4,
    Critical = 5,
    Emergency = 6,
    Poweroff = 7,
    FlightTermination = 8,
}

/// ArduCopter flight modes, carried in the heartbeat's custom mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum FlightMode {
    Stabilize = 0,
    Acro = 1,
    AltHold = 2,
    Auto = 3,
    Guided = 4,
    Loiter = 5,
    Rtl = 6,
    Circle = 7,
    Land = 9,
    Drift = 11,
    Sport = 13,
    Flip = 14,
    AutoTune = 15,
    PosHold = 16,
    Brake = 17,
    Throw = 18,
    AvoidAdsb = 19,
    GuidedNoGps = 20,
    SmartRtl = 21,
    FlowHold = 22,
    Follow = 23,
    ZigZag = 24,
    SystemId = 25,
    HeliAutorotate = 26,
    AutoRtl = 27,
    Turtle = 28,
}

impl FlightMode {
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_uppercase().replace(['_', '-'], "");
        let mode = match name.as_str() {
            "STABILIZE" => FlightMode::Stabilize,
            "ACRO" => FlightMode::Acro,
            "ALTHOLD" => FlightMode::AltHold,
            "AUTO" => FlightMode::Auto,
            "GUIDED" => FlightMode::Guided,
            "LOITER" => FlightMode::Loiter,
            "RTL" => FlightMode::Rtl,
            "CIRCLE" => FlightMode::Circle,
            "LAND" => FlightMode::Land,
            "DRIFT" => FlightMode::Drift,
            "SPORT" => FlightMode::Sport,
            "FLIP" => FlightMode::Flip,
            "AUTOTUNE" => FlightMode::AutoTune,
            "POSHOLD" => FlightMode::PosHold,
            "BRAKE" => FlightMode::Brake,
            "THROW" => FlightMode::Throw,
            "AVOIDADSB" => FlightMode::AvoidAdsb,
            "GUIDEDNOGPS" => FlightMode::GuidedNoGps,
            "SMARTRTL" => FlightMode::SmartRtl,
            "FLOWHOLD" => FlightMode::FlowHold,
            "FOLLOW" => FlightMode::Follow,
            "ZIGZAG" => FlightMode::ZigZag,
            "SYSTEMID" => FlightMode::SystemId,
            "HELIAUTOROTATE" => FlightMode::HeliAutorotate,
            "AUTORTL" => FlightMode::AutoRtl,
            "TURTLE" => FlightMode::Turtle,
            _ => return None,
        };
        Some(mode)
    }
}

/// Liveness and mode of a vehicle. Sent back as a ground station heartbeat when created with
/// [`Heartbeat::ground_station`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Heartbeat {
    pub mav_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub custom_mode: u32,
    pub state: Option<MavState>,
    pub system_id: u8,
    pub component_id: u8,
    period: Option<Duration>,
}

impl Heartbeat {
    pub fn ground_station(period: Duration) -> Self {
        Heartbeat {
            period: Some(period),
            ..Default::default()
        }
    }

    pub fn is_armed(&self) -> bool {
        self.base_mode & MAV_MODE_FLAG_SAFETY_ARMED != 0
    }

    pub fn mode(&self) -> Option<FlightMode> {
        FlightMode::try_from(self.custom_mode).ok()
    }
}

impl Message for Heartbeat {
    const NAME: &'static str = "HEARTBEAT";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::Heartbeat {
            mav_type,
            autopilot,
            base_mode,
            custom_mode,
            system_status,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let state =
            MavState::try_from(system_status).map_err(|_| invalid("system_status", system_status))?;
        self.mav_type = mav_type;
        self.autopilot = autopilot;
        self.base_mode = base_mode;
        self.custom_mode = custom_mode;
        self.state = Some(state);
        self.system_id = frame.header.system_id;
        self.component_id = frame.header.component_id;
        Ok(())
    }

    fn encode(&self) -> Option<Payload> {
        Some(Payload::Heartbeat {
            mav_type: MAV_TYPE_GCS,
            autopilot: MAV_AUTOPILOT_INVALID,
            base_mode: 0,
            custom_mode: 0,
            system_status: MavState::Uninit.into(),
        })
    }

    fn repeat_period(&self) -> Option<Duration> {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Header;

    fn frame(base_mode: u8, custom_mode: u32, system_status: u8) -> Frame {
        Frame::new(
            Header::new(1, 1),
            Payload::Heartbeat {
                mav_type: 2,
                autopilot: 3,
                base_mode,
                custom_mode,
                system_status,
            },
        )
    }

    #[test]
    fn test_decode_armed_guided() {
        let mut heartbeat = Heartbeat::default();
        heartbeat.decode(&frame(0x80 | 0x01, 4, 4)).unwrap();
        assert!(heartbeat.is_armed());
        assert_eq!(heartbeat.mode(), Some(FlightMode::Guided));
        assert_eq!(heartbeat.state, Some(MavState::Active));
        assert_eq!((heartbeat.system_id, heartbeat.component_id), (1, 1));
    }

    #[test]
    fn test_invalid_state_keeps_previous() {
        let mut heartbeat = Heartbeat::default();
        heartbeat.decode(&frame(0, 5, 3)).unwrap();
        assert!(heartbeat.decode(&frame(0x80, 9, 42)).is_err());
        assert_eq!(heartbeat.mode(), Some(FlightMode::Loiter));
        assert!(!heartbeat.is_armed());
    }

    #[test]
    fn test_unknown_mode() {
        let mut heartbeat = Heartbeat::default();
        heartbeat.decode(&frame(0, 8, 3)).unwrap();
        assert_eq!(heartbeat.mode(), None);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(FlightMode::from_name("guided"), Some(FlightMode::Guided));
        assert_eq!(FlightMode::from_name("smart_rtl"), Some(FlightMode::SmartRtl));
        assert_eq!(FlightMode::from_name("warp"), None);
    }

    #[test]
    fn test_ground_station_repeats() {
        let heartbeat = Heartbeat::ground_station(Duration::from_secs(1));
        assert_eq!(heartbeat.repeat_period(), Some(Duration::from_secs(1)));
        assert!(matches!(
            heartbeat.encode(),
            Some(Payload::Heartbeat { mav_type: 6, autopilot: 8, .. })
        ));
        assert_eq!(Heartbeat::default().repeat_period(), None);
    }
}
