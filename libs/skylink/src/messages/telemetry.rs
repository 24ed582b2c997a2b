use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{invalid, unexpected};
use crate::{DecodeError, Frame, Message, Payload};

/// Euler attitude in radians.
#[derive(Clone, Debug, PartialEq)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rates: Vector3<f32>,
}

impl Default for Attitude {
    fn default() -> Self {
        Attitude {
            time_boot_ms: 0,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            rates: Vector3::zeros(),
        }
    }
}

impl Message for Attitude {
    const NAME: &'static str = "ATTITUDE";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::Attitude {
            time_boot_ms,
            roll,
            pitch,
            yaw,
            rollspeed,
            pitchspeed,
            yawspeed,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        self.time_boot_ms = time_boot_ms;
        self.roll = roll;
        self.pitch = pitch;
        self.yaw = yaw;
        self.rates = Vector3::new(rollspeed, pitchspeed, yawspeed);
        Ok(())
    }
}

/// Body attitude relative to local NED as a unit quaternion.
#[derive(Clone, Debug, PartialEq)]
pub struct AttitudeQuaternion {
    pub time_boot_ms: u32,
    pub orientation: UnitQuaternion<f64>,
    pub rates: Vector3<f32>,
}

impl Default for AttitudeQuaternion {
    fn default() -> Self {
        AttitudeQuaternion {
            time_boot_ms: 0,
            orientation: UnitQuaternion::identity(),
            rates: Vector3::zeros(),
        }
    }
}

impl Message for AttitudeQuaternion {
    const NAME: &'static str = "ATTITUDE_QUATERNION";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::AttitudeQuaternion {
            time_boot_ms,
            q: [w, x, y, z],
            rollspeed,
            pitchspeed,
            yawspeed,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let q = Quaternion::new(w as f64, x as f64, y as f64, z as f64);
        let norm = q.norm();
        if !norm.is_finite() || norm < 1e-6 {
            return Err(invalid("q", 0));
        }
        self.time_boot_ms = time_boot_ms;
        self.orientation = UnitQuaternion::from_quaternion(q);
        self.rates = Vector3::new(rollspeed, pitchspeed, yawspeed);
        Ok(())
    }
}

/// Position and velocity in the local NED frame, metres and m/s.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalPositionNed {
    pub time_boot_ms: u32,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl Default for LocalPositionNed {
    fn default() -> Self {
        LocalPositionNed {
            time_boot_ms: 0,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
        }
    }
}

impl LocalPositionNed {
    pub fn position_enu(&self) -> Vector3<f64> {
        Vector3::new(self.position.y, self.position.x, -self.position.z)
    }
}

impl Message for LocalPositionNed {
    const NAME: &'static str = "LOCAL_POSITION_NED";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::LocalPositionNed {
            time_boot_ms,
            x,
            y,
            z,
            vx,
            vy,
            vz,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        self.time_boot_ms = time_boot_ms;
        self.position = Vector3::new(x as f64, y as f64, z as f64);
        self.velocity = Vector3::new(vx as f64, vy as f64, vz as f64);
        Ok(())
    }
}

/// Fused global position. Degrees, metres, m/s.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalPositionInt {
    pub time_boot_ms: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_msl: f64,
    pub altitude_relative: f64,
    pub velocity: Vector3<f64>,
    /// Degrees from north, `None` when unknown.
    pub heading: Option<f64>,
}

impl Default for GlobalPositionInt {
    fn default() -> Self {
        GlobalPositionInt {
            time_boot_ms: 0,
            latitude: 0.0,
            longitude: 0.0,
            altitude_msl: 0.0,
            altitude_relative: 0.0,
            velocity: Vector3::zeros(),
            heading: None,
        }
    }
}

impl Message for GlobalPositionInt {
    const NAME: &'static str = "GLOBAL_POSITION_INT";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::GlobalPositionInt {
            time_boot_ms,
            lat,
            lon,
            alt,
            relative_alt,
            vx,
            vy,
            vz,
            hdg,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        self.time_boot_ms = time_boot_ms;
        self.latitude = lat as f64 / 1e7;
        self.longitude = lon as f64 / 1e7;
        self.altitude_msl = alt as f64 / 1e3;
        self.altitude_relative = relative_alt as f64 / 1e3;
        self.velocity = Vector3::new(vx as f64, vy as f64, vz as f64) / 100.0;
        self.heading = (hdg != u16::MAX).then(|| hdg as f64 / 100.0);
        Ok(())
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum FixType {
    #[default]
    NoGps = 0,
    NoFix = 1,
    Fix2d = 2,
    Fix3d = 3,
    Dgps = 4,
    RtkFloat = 5,
    RtkFixed = 6,
    Static = 7,
    Ppp = 8,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GpsRawInt {
    pub fix_type: FixType,
    pub satellites: Option<u8>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_msl: f64,
    /// Ground speed in m/s, `None` when unknown.
    pub ground_speed: Option<f64>,
}

impl GpsRawInt {
    pub fn has_3d_fix(&self) -> bool {
        self.fix_type >= FixType::Fix3d
    }
}

impl Message for GpsRawInt {
    const NAME: &'static str = "GPS_RAW_INT";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::GpsRawInt {
            fix_type,
            lat,
            lon,
            alt,
            vel,
            satellites_visible,
            ..
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let fix_type = FixType::try_from(fix_type).map_err(|_| invalid("fix_type", fix_type))?;
        self.fix_type = fix_type;
        self.satellites = (satellites_visible != u8::MAX).then_some(satellites_visible);
        self.latitude = lat as f64 / 1e7;
        self.longitude = lon as f64 / 1e7;
        self.altitude_msl = alt as f64 / 1e3;
        self.ground_speed = (vel != u16::MAX).then(|| vel as f64 / 100.0);
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VfrHud {
    pub airspeed: f32,
    pub groundspeed: f32,
    pub heading: i16,
    /// Percent.
    pub throttle: u16,
    pub altitude_msl: f32,
    pub climb: f32,
}

impl Message for VfrHud {
    const NAME: &'static str = "VFR_HUD";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::VfrHud {
            airspeed,
            groundspeed,
            heading,
            throttle,
            alt,
            climb,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        *self = VfrHud {
            airspeed,
            groundspeed,
            heading,
            throttle,
            altitude_msl: alt,
            climb,
        };
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemTime {
    pub time_unix_usec: u64,
    pub time_boot_ms: u32,
}

impl Message for SystemTime {
    const NAME: &'static str = "SYSTEM_TIME";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::SystemTime {
            time_unix_usec,
            time_boot_ms,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        self.time_unix_usec = time_unix_usec;
        self.time_boot_ms = time_boot_ms;
        Ok(())
    }
}

/// Raw sensor counts, in the autopilot's native units.
#[derive(Clone, Debug, PartialEq)]
pub struct RawImu {
    pub time_usec: u64,
    pub acc: Vector3<i16>,
    pub gyro: Vector3<i16>,
    pub mag: Vector3<i16>,
}

impl Default for RawImu {
    fn default() -> Self {
        RawImu {
            time_usec: 0,
            acc: Vector3::zeros(),
            gyro: Vector3::zeros(),
            mag: Vector3::zeros(),
        }
    }
}

impl Message for RawImu {
    const NAME: &'static str = "RAW_IMU";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::RawImu {
            time_usec,
            acc,
            gyro,
            mag,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        self.time_usec = time_usec;
        self.acc = Vector3::from(acc);
        self.gyro = Vector3::from(gyro);
        self.mag = Vector3::from(mag);
        Ok(())
    }
}

/// Pilot RC input in PWM microseconds, before any auxiliary function mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RcChannels {
    pub time_boot_ms: u32,
    pub channels: Vec<u16>,
    pub rssi: u8,
}

impl Message for RcChannels {
    const NAME: &'static str = "RC_CHANNELS";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::RcChannels {
            time_boot_ms,
            chancount,
            channels,
            rssi,
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        if chancount as usize > channels.len() {
            return Err(invalid("chancount", chancount));
        }
        self.time_boot_ms = time_boot_ms;
        self.channels = channels[..chancount as usize].to_vec();
        self.rssi = rssi;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Header;
    use approx::assert_relative_eq;

    fn decode<M: Message + Default>(payload: Payload) -> Result<M, DecodeError> {
        let mut msg = M::default();
        msg.decode(&Frame::new(Header::new(1, 1), payload))?;
        Ok(msg)
    }

    #[test]
    fn test_attitude_quaternion_normalized() {
        let att: AttitudeQuaternion = decode(Payload::AttitudeQuaternion {
            time_boot_ms: 10,
            q: [2.0, 0.0, 0.0, 0.0],
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.1,
        })
        .unwrap();
        assert_relative_eq!(att.orientation.angle(), 0.0);
        assert_relative_eq!(att.rates.z, 0.1);

        let zero = decode::<AttitudeQuaternion>(Payload::AttitudeQuaternion {
            time_boot_ms: 10,
            q: [0.0; 4],
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
        });
        assert!(zero.is_err());
    }

    #[test]
    fn test_global_position_units() {
        let pos: GlobalPositionInt = decode(Payload::GlobalPositionInt {
            time_boot_ms: 0,
            lat: 473_977_420,
            lon: 85_455_940,
            alt: 488_120,
            relative_alt: 10_500,
            vx: 150,
            vy: -20,
            vz: 0,
            hdg: u16::MAX,
        })
        .unwrap();
        assert_relative_eq!(pos.latitude, 47.397742, epsilon = 1e-9);
        assert_relative_eq!(pos.altitude_relative, 10.5);
        assert_relative_eq!(pos.velocity.x, 1.5);
        assert_eq!(pos.heading, None);
    }

    #[test]
    fn test_local_position_enu() {
        let pos: LocalPositionNed = decode(Payload::LocalPositionNed {
            time_boot_ms: 0,
            x: 1.0,
            y: 2.0,
            z: -3.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
        })
        .unwrap();
        assert_eq!(pos.position_enu(), Vector3::new(2.0, 1.0, 3.0));
    }

    #[test]
    fn test_gps_fix() {
        let gps: GpsRawInt = decode(Payload::GpsRawInt {
            time_usec: 0,
            fix_type: 6,
            lat: 0,
            lon: 0,
            alt: 0,
            eph: 0,
            epv: 0,
            vel: u16::MAX,
            cog: 0,
            satellites_visible: 17,
        })
        .unwrap();
        assert!(gps.has_3d_fix());
        assert_eq!(gps.satellites, Some(17));
        assert_eq!(gps.ground_speed, None);
    }

    #[test]
    fn test_rc_channels_count() {
        let mut channels = [0u16; 18];
        channels[..4].copy_from_slice(&[1500, 1500, 1000, 1500]);
        let rc: RcChannels = decode(Payload::RcChannels {
            time_boot_ms: 0,
            chancount: 4,
            channels,
            rssi: 200,
        })
        .unwrap();
        assert_eq!(rc.channels, vec![1500, 1500, 1000, 1500]);
        assert!(
            decode::<RcChannels>(Payload::RcChannels {
                time_boot_ms: 0,
                chancount: 19,
                channels,
                rssi: 0,
            })
            .is_err()
        );
    }
}
