use std::collections::VecDeque;

use nalgebra::{UnitQuaternion, Vector3};

use crate::{Error, Timestamp};

pub const DEFAULT_POSE_CAPACITY: usize = 200;

const SLERP_EPSILON: f64 = 1e-9;

/// Vehicle position (local NED, metres) and orientation at an instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub timestamp: Timestamp,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(
        timestamp: Timestamp,
        position: Vector3<f64>,
        orientation: UnitQuaternion<f64>,
    ) -> Self {
        Pose {
            timestamp,
            position,
            orientation,
        }
    }

    /// Blends `self` toward `other` by `p`.
    ///
    /// Inside `[0, 1]` orientation follows the shortest arc. Outside it the relative rotation is
    /// scaled as a rotation vector, so extrapolation keeps turning in the same direction.
    pub fn interpolate(&self, other: &Pose, p: f64, timestamp: Timestamp) -> Pose {
        let position = self.position + (other.position - self.position) * p;
        let orientation = if (0.0..=1.0).contains(&p) {
            slerp(&self.orientation, &other.orientation, p)
        } else {
            let delta = other.orientation * self.orientation.inverse();
            UnitQuaternion::from_scaled_axis(delta.scaled_axis() * p) * self.orientation
        };
        Pose {
            timestamp,
            position,
            orientation,
        }
    }
}

fn slerp(q0: &UnitQuaternion<f64>, q1: &UnitQuaternion<f64>, p: f64) -> UnitQuaternion<f64> {
    q0.try_slerp(q1, p, SLERP_EPSILON).unwrap_or_else(|| {
        // nearly identical rotations, where slerp is ill conditioned
        let q1 = if q0.coords.dot(&q1.coords) < 0.0 {
            UnitQuaternion::new_unchecked(-q1.into_inner())
        } else {
            *q1
        };
        q0.nlerp(&q1, p)
    })
}

/// Bounded, time-ordered history of poses.
#[derive(Clone, Debug)]
pub struct PoseBuffer {
    samples: VecDeque<Pose>,
    capacity: usize,
}

impl Default for PoseBuffer {
    fn default() -> Self {
        PoseBuffer::new(DEFAULT_POSE_CAPACITY)
    }
}

impl PoseBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PoseBuffer {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts `pose` in timestamp order, dropping the oldest sample past capacity.
    ///
    /// A sample with the same timestamp as an existing one goes after it.
    pub fn record(&mut self, pose: Pose) {
        let at = self
            .samples
            .partition_point(|s| s.timestamp <= pose.timestamp);
        self.samples.insert(at, pose);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn latest(&self) -> Option<&Pose> {
        self.samples.back()
    }

    pub fn earliest(&self) -> Option<&Pose> {
        self.samples.front()
    }

    /// The pose at `timestamp`, or the most recent one when `None`.
    pub fn query(&self, timestamp: Option<Timestamp>) -> Result<Pose, Error> {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return Err(Error::NoPoseData);
        };
        let Some(t) = timestamp else {
            return Ok(*last);
        };
        let n = self.samples.len();
        if n == 1 {
            return Ok(*first);
        }
        let (a, b) = if t < first.timestamp {
            (0, 1)
        } else if t > last.timestamp {
            (n - 2, n - 1)
        } else {
            let i = self.samples.partition_point(|s| s.timestamp < t);
            if self.samples[i].timestamp == t {
                return Ok(self.samples[i]);
            }
            (i - 1, i)
        };
        Ok(blend(&self.samples[a], &self.samples[b], t))
    }
}

fn blend(p0: &Pose, p1: &Pose, t: Timestamp) -> Pose {
    let span = p1.timestamp.secs_since(p0.timestamp);
    if span <= 0.0 {
        return Pose { timestamp: t, ..*p1 };
    }
    let p = t.secs_since(p0.timestamp) / span;
    p0.interpolate(p1, p, t)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;
    use std::f64::consts::FRAC_PI_4;

    use super::*;
    use approx::assert_relative_eq;

    fn yaw(angle: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(0.0, 0.0, angle)
    }

    fn pose(secs: f64, x: f64, heading: f64) -> Pose {
        Pose::new(
            Timestamp::from_secs_f64(secs),
            Vector3::new(x, 0.0, 0.0),
            yaw(heading),
        )
    }

    fn buffer() -> PoseBuffer {
        let mut buf = PoseBuffer::default();
        buf.record(pose(0.0, 0.0, 0.0));
        buf.record(pose(1.0, 1.0, FRAC_PI_2));
        buf
    }

    #[test]
    fn test_interpolate_midpoint() {
        let p = buffer().query(Some(Timestamp::from_secs_f64(0.5))).unwrap();
        assert_relative_eq!(p.position, Vector3::new(0.5, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(p.orientation.euler_angles().2, FRAC_PI_4, epsilon = 1e-9);
        assert_eq!(p.timestamp, Timestamp::from_secs_f64(0.5));
    }

    #[test]
    fn test_extrapolate_before_first() {
        let p = buffer().query(Some(Timestamp::from_secs_f64(-1.0))).unwrap();
        assert_relative_eq!(p.position, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(p.orientation.euler_angles().2, -FRAC_PI_2, epsilon = 1e-9);
    }

    #[test]
    fn test_extrapolate_after_last() {
        let p = buffer().query(Some(Timestamp::from_secs_f64(1.5))).unwrap();
        assert_relative_eq!(p.position, Vector3::new(1.5, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(
            p.orientation.euler_angles().2,
            3.0 * FRAC_PI_4,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_exact_and_latest() {
        let buf = buffer();
        let exact = buf.query(Some(Timestamp::from_secs_f64(1.0))).unwrap();
        assert_eq!(exact, pose(1.0, 1.0, FRAC_PI_2));
        assert_eq!(buf.query(None).unwrap(), exact);
    }

    #[test]
    fn test_empty_and_single() {
        let mut buf = PoseBuffer::default();
        assert!(matches!(buf.query(None), Err(Error::NoPoseData)));
        buf.record(pose(2.0, 3.0, 0.1));
        let p = buf.query(Some(Timestamp::from_secs_f64(100.0))).unwrap();
        assert_eq!(p, pose(2.0, 3.0, 0.1));
    }

    #[test]
    fn test_duplicate_timestamps_return_later() {
        let mut buf = PoseBuffer::default();
        buf.record(pose(1.0, 1.0, 0.0));
        buf.record(pose(1.0, 2.0, 0.0));
        let p = buf.query(Some(Timestamp::from_secs_f64(3.0))).unwrap();
        assert_relative_eq!(p.position.x, 2.0);
    }

    #[test]
    fn test_out_of_order_insert() {
        let mut buf = PoseBuffer::default();
        buf.record(pose(2.0, 2.0, 0.0));
        buf.record(pose(0.0, 0.0, 0.0));
        buf.record(pose(1.0, 1.0, 0.0));
        assert_eq!(buf.earliest().unwrap().timestamp, Timestamp::ZERO);
        let p = buf.query(Some(Timestamp::from_secs_f64(1.5))).unwrap();
        assert_relative_eq!(p.position.x, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buf = PoseBuffer::new(200);
        for i in 0..250 {
            buf.record(pose(i as f64, i as f64, 0.0));
        }
        assert_eq!(buf.len(), 200);
        assert_eq!(buf.earliest().unwrap().timestamp, Timestamp::from_secs_f64(50.0));
    }

    #[test]
    fn test_slerp_shortest_arc() {
        let q0 = yaw(0.1);
        let q1 = UnitQuaternion::new_unchecked(-yaw(0.3).into_inner());
        let mid = slerp(&q0, &q1, 0.5);
        assert_relative_eq!(mid.angle_to(&yaw(0.2)), 0.0, epsilon = 1e-9);
        let same = slerp(&q0, &q0, 0.5);
        assert_relative_eq!(same.angle_to(&q0), 0.0, epsilon = 1e-6);
    }
}
