use std::sync::Arc;
use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::Mutex;
use tracing::warn;

use super::{AttitudeQuaternion, GlobalPositionInt, LocalPositionNed};
use crate::config::PoseConfig;
use crate::entity::{Listen, Sink};
use crate::pose::{Pose, PoseBuffer};
use crate::{Entity, Error, Timestamp};

/// Pairs each position fix with the latest attitude and records the result.
#[derive(Clone)]
pub struct PoseFusion {
    buffer: Arc<Mutex<PoseBuffer>>,
    attitude: Arc<Mutex<Option<(Timestamp, UnitQuaternion<f64>)>>>,
    max_skew: Duration,
}

impl PoseFusion {
    pub fn new(capacity: usize, max_skew: Duration) -> Self {
        PoseFusion {
            buffer: Arc::new(Mutex::new(PoseBuffer::new(capacity))),
            attitude: Arc::new(Mutex::new(None)),
            max_skew,
        }
    }

    /// Remembers a decoded attitude for the next position fix.
    pub fn record_attitude(&self, timestamp: Timestamp, orientation: UnitQuaternion<f64>) {
        *self.attitude.lock() = Some((timestamp, orientation));
    }

    pub fn attitude(&self) -> Option<(Timestamp, UnitQuaternion<f64>)> {
        *self.attitude.lock()
    }

    /// Fuses a decoded position fix with the last recorded attitude.
    pub fn fuse_position(&self, timestamp: Timestamp, position: Vector3<f64>) -> bool {
        let attitude = self.attitude();
        self.fuse((timestamp, position), attitude)
    }

    /// Records a fused pose stamped halfway between the two sources. Returns `false` when the
    /// sources are too far apart in time or no attitude has arrived yet.
    pub fn fuse(
        &self,
        position: (Timestamp, Vector3<f64>),
        attitude: Option<(Timestamp, UnitQuaternion<f64>)>,
    ) -> bool {
        let Some((attitude_ts, orientation)) = attitude else {
            return false;
        };
        let (position_ts, position) = position;
        let skew = position_ts.secs_since(attitude_ts).abs();
        if skew > self.max_skew.as_secs_f64() {
            warn!(
                skew_ms = skew * 1e3,
                max_skew_ms = self.max_skew.as_millis() as u64,
                "attitude and position too far apart, dropping pose"
            );
            return false;
        }
        let pose = Pose::new(position_ts.midpoint(attitude_ts), position, orientation);
        self.buffer.lock().record(pose);
        true
    }

    pub fn query(&self, timestamp: Option<Timestamp>) -> Result<Pose, Error> {
        self.buffer.lock().query(timestamp)
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

/// Attitude, local position and global position, fused into a queryable pose history.
///
/// Poses are in the vehicle's local NED frame: `position` is north, east, down in metres.
/// Use [`LocalPositionNed::position_enu`] for ENU consumers.
///
/// Register with [`Registry::add_listener`](crate::Registry::add_listener); all three children
/// are registered at once.
#[derive(Clone)]
pub struct FullPose {
    pub attitude: Entity<AttitudeQuaternion>,
    pub local: Entity<LocalPositionNed>,
    pub global: Entity<GlobalPositionInt>,
    fusion: PoseFusion,
}

impl Default for FullPose {
    fn default() -> Self {
        FullPose::new(&PoseConfig::default())
    }
}

impl FullPose {
    pub fn new(config: &PoseConfig) -> Self {
        let fusion = PoseFusion::new(config.capacity, config.max_skew());
        let attitude = {
            let fusion = fusion.clone();
            Entity::new(AttitudeQuaternion::default()).with_callback(move |msg, timestamp| {
                fusion.record_attitude(timestamp, msg.orientation);
            })
        };
        let local = {
            let fusion = fusion.clone();
            Entity::new(LocalPositionNed::default()).with_callback(move |msg, timestamp| {
                fusion.fuse_position(timestamp, msg.position);
            })
        };
        FullPose {
            attitude,
            local,
            global: Entity::new(GlobalPositionInt::default()),
            fusion,
        }
    }

    /// The fused NED pose at `timestamp`, or the latest one when `None`.
    pub fn query(&self, timestamp: Option<Timestamp>) -> Result<Pose, Error> {
        self.fusion.query(timestamp)
    }

    pub fn fusion(&self) -> &PoseFusion {
        &self.fusion
    }
}

impl Listen for FullPose {
    fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        vec![self.attitude.sink(), self.local.sink(), self.global.sink()]
    }
}
