use std::time::Instant;

use nalgebra::{UnitQuaternion, Vector3};

use super::{MavFrame, boot_ms};
use crate::{Message, Payload, Target};

const POSITION_ONLY: u16 = 3064;
const VELOCITY_ONLY: u16 = 0b0000_1011_1100_0111;

const IGNORE_BODY_RATES: u8 = 0b0000_0111;
const IGNORE_THRUST: u8 = 0b0100_0000;
const IGNORE_ATTITUDE: u8 = 0b1000_0000;

pub const RC_CHANNELS: usize = 18;
/// Largest correction blob carried by a single `GPS_RTCM_DATA` frame.
pub const RTCM_FRAGMENT_LEN: usize = 180;

/// Local NED position target.
#[derive(Clone, Debug)]
pub struct SetpointLocal {
    pub target: Target,
    pub position: Vector3<f64>,
    pub yaw: f32,
    boot: Instant,
}

impl SetpointLocal {
    pub fn new(target: Target) -> Self {
        SetpointLocal {
            target,
            position: Vector3::zeros(),
            yaw: 0.0,
            boot: Instant::now(),
        }
    }

    pub fn load(&mut self, position: Vector3<f64>) {
        self.position = position;
    }
}

impl Message for SetpointLocal {
    const NAME: &'static str = "SET_POSITION_TARGET_LOCAL_NED";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::SetPositionTargetLocalNed {
            time_boot_ms: boot_ms(self.boot),
            target_system: self.target.system,
            target_component: self.target.component,
            coordinate_frame: MavFrame::LocalNed.into(),
            type_mask: POSITION_ONLY,
            position: [
                self.position.x as f32,
                self.position.y as f32,
                self.position.z as f32,
            ],
            velocity: [0.0; 3],
            acceleration: [0.0; 3],
            yaw: self.yaw,
            yaw_rate: 0.0,
        })
    }
}

/// Local NED velocity target.
#[derive(Clone, Debug)]
pub struct SetpointVelocity {
    pub target: Target,
    pub velocity: Vector3<f64>,
    boot: Instant,
}

impl SetpointVelocity {
    pub fn new(target: Target) -> Self {
        SetpointVelocity {
            target,
            velocity: Vector3::zeros(),
            boot: Instant::now(),
        }
    }

    pub fn load(&mut self, velocity: Vector3<f64>) {
        self.velocity = velocity;
    }
}

impl Message for SetpointVelocity {
    const NAME: &'static str = "SET_POSITION_TARGET_LOCAL_NED";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::SetPositionTargetLocalNed {
            time_boot_ms: boot_ms(self.boot),
            target_system: self.target.system,
            target_component: self.target.component,
            coordinate_frame: MavFrame::LocalNed.into(),
            type_mask: VELOCITY_ONLY,
            position: [0.0; 3],
            velocity: [
                self.velocity.x as f32,
                self.velocity.y as f32,
                self.velocity.z as f32,
            ],
            acceleration: [0.0; 3],
            yaw: 0.0,
            yaw_rate: 0.0,
        })
    }
}

/// Attitude and thrust target. Body rates are ignored unless cleared from the mask.
#[derive(Clone, Debug)]
pub struct SetpointAttitude {
    pub target: Target,
    pub orientation: UnitQuaternion<f64>,
    pub body_rates: Vector3<f32>,
    pub thrust: f32,
    pub type_mask: u8,
    boot: Instant,
}

impl SetpointAttitude {
    pub fn new(target: Target) -> Self {
        SetpointAttitude {
            target,
            orientation: UnitQuaternion::identity(),
            body_rates: Vector3::zeros(),
            thrust: 0.0,
            type_mask: IGNORE_BODY_RATES,
            boot: Instant::now(),
        }
    }

    pub fn ignore_thrust(&mut self, ignore: bool) {
        self.set_mask(IGNORE_THRUST, ignore);
    }

    pub fn ignore_attitude(&mut self, ignore: bool) {
        self.set_mask(IGNORE_ATTITUDE, ignore);
    }

    pub fn ignore_body_rates(&mut self, ignore: bool) {
        self.set_mask(IGNORE_BODY_RATES, ignore);
    }

    fn set_mask(&mut self, bits: u8, set: bool) {
        if set {
            self.type_mask |= bits;
        } else {
            self.type_mask &= !bits;
        }
    }
}

impl Message for SetpointAttitude {
    const NAME: &'static str = "SET_ATTITUDE_TARGET";

    fn encode(&self) -> Option<Payload> {
        let q = self.orientation.quaternion();
        Some(Payload::SetAttitudeTarget {
            time_boot_ms: boot_ms(self.boot),
            target_system: self.target.system,
            target_component: self.target.component,
            type_mask: self.type_mask,
            q: [q.w as f32, q.i as f32, q.j as f32, q.k as f32],
            body_rates: [self.body_rates.x, self.body_rates.y, self.body_rates.z],
            thrust: self.thrust,
        })
    }
}

/// RC channel override. A value of zero releases the channel back to the radio.
#[derive(Clone, Debug, PartialEq)]
pub struct RcOverride {
    pub target: Target,
    pub channels: [u16; RC_CHANNELS],
}

impl RcOverride {
    pub fn new(target: Target) -> Self {
        RcOverride {
            target,
            channels: [0; RC_CHANNELS],
        }
    }

    /// Sets 1-based `channel` to `pwm`. Out of range channels are ignored.
    pub fn set(&mut self, channel: usize, pwm: u16) {
        if let Some(slot) = channel
            .checked_sub(1)
            .and_then(|i| self.channels.get_mut(i))
        {
            *slot = pwm;
        }
    }

    pub fn release_all(&mut self) {
        self.channels = [0; RC_CHANNELS];
    }
}

impl Message for RcOverride {
    const NAME: &'static str = "RC_CHANNELS_OVERRIDE";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::RcChannelsOverride {
            target_system: self.target.system,
            target_component: self.target.component,
            channels: self.channels,
        })
    }
}

/// One fragment of an RTCM correction stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RtcmData {
    pub flags: u8,
    pub data: Vec<u8>,
}

impl RtcmData {
    /// `sequence` is the 5-bit message counter, `fragment` the 2-bit fragment index.
    pub fn fragment(sequence: u8, fragment: u8, fragmented: bool, data: &[u8]) -> Self {
        RtcmData {
            flags: ((sequence & 0x1f) << 3) | ((fragment & 0x03) << 1) | fragmented as u8,
            data: data.to_vec(),
        }
    }
}

impl Message for RtcmData {
    const NAME: &'static str = "GPS_RTCM_DATA";

    fn encode(&self) -> Option<Payload> {
        Some(Payload::GpsRtcmData {
            flags: self.flags,
            data: self.data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_setpoint() {
        let mut setpoint = SetpointLocal::new(Target::default());
        setpoint.load(Vector3::new(1.0, -2.0, -3.5));
        let Some(Payload::SetPositionTargetLocalNed {
            coordinate_frame,
            type_mask,
            position,
            ..
        }) = setpoint.encode()
        else {
            panic!("not a position target");
        };
        assert_eq!((coordinate_frame, type_mask), (1, 3064));
        assert_eq!(position, [1.0, -2.0, -3.5]);
    }

    #[test]
    fn test_attitude_mask() {
        let mut setpoint = SetpointAttitude::new(Target::default());
        assert_eq!(setpoint.type_mask, 0b111);
        setpoint.ignore_thrust(true);
        setpoint.ignore_body_rates(false);
        assert_eq!(setpoint.type_mask, 0b0100_0000);
        let Some(Payload::SetAttitudeTarget { q, .. }) = setpoint.encode() else {
            panic!("not an attitude target");
        };
        assert_eq!(q, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rc_override_channels() {
        let mut rc = RcOverride::new(Target::default());
        rc.set(3, 1500);
        rc.set(0, 1000);
        rc.set(19, 1000);
        assert_eq!(rc.channels[2], 1500);
        assert_eq!(rc.channels.iter().filter(|c| **c != 0).count(), 1);
    }

    #[test]
    fn test_rtcm_flags() {
        let fragment = RtcmData::fragment(33, 2, true, &[0xd3, 0x00]);
        assert_eq!(fragment.flags, (1 << 3) | (2 << 1) | 1);
        assert_eq!(RtcmData::fragment(5, 0, false, &[]).flags, 5 << 3);
    }
}
