use std::thread;
use std::time::{Duration, Instant};

use nalgebra::Vector3;
use tracing::{debug, info};

use super::Protocol;
use crate::messages::{LocalPositionNed, SetpointLocal};
use crate::{Entity, Error, Registry, Sender, Target};

const DEFAULT_RESEND: Duration = Duration::from_secs(1);

/// A local NED target and how close counts as reached, in metres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    pub position: Vector3<f64>,
    pub radius: f64,
}

impl Waypoint {
    pub fn new(north: f64, east: f64, down: f64, radius: f64) -> Self {
        Waypoint {
            position: Vector3::new(north, east, down),
            radius,
        }
    }
}

/// Flies through waypoints in order by streaming position setpoints.
///
/// `local` must be registered as a listener so it tracks the vehicle. The vehicle has to be in
/// guided mode. The send gate is released between setpoints so periodic traffic such as the
/// heartbeat keeps flowing.
pub struct WaypointProtocol {
    local: Entity<LocalPositionNed>,
    waypoints: Vec<Waypoint>,
    setpoint: Entity<SetpointLocal>,
    resend: Duration,
    timeout: Option<Duration>,
    reached: usize,
}

impl WaypointProtocol {
    pub fn new(target: Target, local: Entity<LocalPositionNed>, waypoints: Vec<Waypoint>) -> Self {
        WaypointProtocol {
            local,
            waypoints,
            setpoint: Entity::new(SetpointLocal::new(target)),
            resend: DEFAULT_RESEND,
            timeout: None,
            reached: 0,
        }
    }

    pub fn with_resend(mut self, resend: Duration) -> Self {
        self.resend = resend;
        self
    }

    /// Gives up on a waypoint not reached within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Waypoints reached during the last run.
    pub fn reached(&self) -> usize {
        self.reached
    }

    fn distance_to(&self, waypoint: &Waypoint) -> f64 {
        (waypoint.position - self.local.lock().position).norm()
    }

    fn pause(&self, sender: &Sender) -> Result<(), Error> {
        sender.release()?;
        thread::sleep(self.resend);
        sender.acquire()
    }
}

impl Protocol for WaypointProtocol {
    fn run(&mut self, sender: &Sender, _registry: &Registry) -> Result<(), Error> {
        self.reached = 0;
        let waypoints = self.waypoints.clone();
        for (index, waypoint) in waypoints.iter().enumerate() {
            self.setpoint.update(|s| s.load(waypoint.position));
            let started = Instant::now();
            loop {
                let distance = self.distance_to(waypoint);
                if distance <= waypoint.radius {
                    info!(index, "waypoint reached");
                    break;
                }
                if self.timeout.is_some_and(|timeout| started.elapsed() >= timeout) {
                    return Err(Error::Timeout("waypoint"));
                }
                debug!(index, distance, "streaming setpoint");
                sender.send_message(&self.setpoint, None)?;
                self.pause(sender)?;
            }
            self.reached += 1;
        }
        Ok(())
    }
}
