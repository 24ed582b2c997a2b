use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{DEFAULT_ACK_TIMEOUT, Protocol};
use crate::entity::WaitOutcome;
use crate::messages::{
    MissionAck, MissionClearAll, MissionCount, MissionItemInt, MissionRequestInt, MissionType,
};
use crate::{Entity, Error, Registry, Sender, Target};

pub const MIN_FENCE_VERTICES: usize = 3;

const DEFAULT_HANDSHAKE_DEADLINE: Duration = Duration::from_secs(10);
const REQUEST_ROUND: Duration = Duration::from_secs(1);

/// Removes every fence item from the vehicle and waits for its `MISSION_ACK`.
pub struct FenceClearProtocol {
    clear: Entity<MissionClearAll>,
    ack: Entity<MissionAck>,
    timeout: Option<Duration>,
    outcome: WaitOutcome,
}

impl FenceClearProtocol {
    pub fn new(target: Target) -> Self {
        FenceClearProtocol {
            clear: Entity::new(MissionClearAll {
                target,
                mission_type: MissionType::Fence,
            }),
            ack: Entity::new(MissionAck::default()),
            timeout: Some(DEFAULT_ACK_TIMEOUT),
            outcome: WaitOutcome::Idle,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ack(&self) -> MissionAck {
        self.ack.get()
    }

    pub fn outcome(&self) -> WaitOutcome {
        self.outcome
    }
}

impl Protocol for FenceClearProtocol {
    fn run(&mut self, sender: &Sender, registry: &Registry) -> Result<(), Error> {
        registry.wait_for_message(&self.ack, self.timeout, false);
        if let Err(err) = sender.send_message(&self.clear, None) {
            registry.cancel_wait(&self.ack);
            return Err(err);
        }
        self.outcome = self.ack.wait_until_finished();
        if self.outcome == WaitOutcome::TimedOut {
            registry.cancel_wait(&self.ack);
            warn!("no ack for fence clear");
        }
        Ok(())
    }
}

/// Where a fence upload currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    Idle,
    CountSent,
    /// Waiting for the vehicle to request an item; the payload is how many items went out so far.
    AwaitingRequest(u16),
    /// Item `seq` was just sent.
    ItemSent(u16),
    AwaitingAck,
    Done,
}

/// Uploads one fence polygon through the mission handshake.
///
/// ```text
/// -> MISSION_COUNT(n)
/// <- MISSION_REQUEST_INT(seq)   ┐ n times
/// -> MISSION_ITEM_INT(seq)      ┘
/// <- MISSION_ACK
/// ```
///
/// Requests for another mission type or for an index out of range are ignored. If the vehicle
/// stops requesting items before `n` have been sent and the overall deadline passes, the run
/// fails with [`Error::HandshakeStalled`].
pub struct FenceUploadProtocol {
    target: Target,
    vertices: Vec<(f64, f64)>,
    inclusion: bool,
    deadline: Option<Duration>,
    round: Duration,
    ack_timeout: Option<Duration>,
    count: Entity<MissionCount>,
    item: Entity<MissionItemInt>,
    request: Entity<MissionRequestInt>,
    ack: Entity<MissionAck>,
    state: FenceState,
    sent: u16,
    outcome: WaitOutcome,
}

impl FenceUploadProtocol {
    /// `vertices` are `(latitude, longitude)` in degrees. An exclusion fence keeps the vehicle
    /// out of the polygon instead of inside it.
    pub fn new(target: Target, vertices: Vec<(f64, f64)>, inclusion: bool) -> Self {
        let count = vertices.len().min(u16::MAX as usize) as u16;
        FenceUploadProtocol {
            target,
            vertices,
            inclusion,
            deadline: Some(DEFAULT_HANDSHAKE_DEADLINE),
            round: REQUEST_ROUND,
            ack_timeout: Some(DEFAULT_ACK_TIMEOUT),
            count: Entity::new(MissionCount {
                target,
                count,
                mission_type: MissionType::Fence,
            }),
            item: Entity::new(MissionItemInt::fence_vertex(target, 0, count, 0.0, 0.0, inclusion)),
            request: Entity::new(MissionRequestInt::default())
                .with_wait_filter(move |request| answerable(request, count)),
            ack: Entity::new(MissionAck::default()),
            state: FenceState::Idle,
            sent: 0,
            outcome: WaitOutcome::Idle,
        }
    }

    /// Overall limit on the request phase; `None` keeps serving requests forever.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Longest single wait for the next request.
    pub fn with_round(mut self, round: Duration) -> Self {
        self.round = round;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn state(&self) -> FenceState {
        self.state
    }

    /// Items sent so far.
    pub fn sent(&self) -> u16 {
        self.sent
    }

    pub fn ack(&self) -> MissionAck {
        self.ack.get()
    }

    pub fn ack_outcome(&self) -> WaitOutcome {
        self.outcome
    }

    fn expected(&self) -> u16 {
        self.vertices.len().min(u16::MAX as usize) as u16
    }

    /// Registers the waiter for whatever comes after `self.sent` items.
    fn await_next(&self, registry: &Registry) {
        if self.sent < self.expected() {
            registry.wait_for_message(&self.request, Some(self.round), false);
        } else {
            registry.wait_for_message(&self.ack, self.ack_timeout, false);
        }
    }

    fn cancel(&self, registry: &Registry) {
        registry.cancel_wait(&self.request);
        registry.cancel_wait(&self.ack);
    }

    fn send_item(&self, sender: &Sender, seq: u16) -> Result<(), Error> {
        let (latitude, longitude) = self.vertices[seq as usize];
        let item = MissionItemInt::fence_vertex(
            self.target,
            seq,
            self.expected(),
            latitude,
            longitude,
            self.inclusion,
        );
        self.item.update(|msg| *msg = item);
        sender.send_message(&self.item, None)
    }

    fn serve_requests(&mut self, sender: &Sender, registry: &Registry) -> Result<(), Error> {
        let expected = self.expected();
        let started = Instant::now();
        self.await_next(registry);
        sender.send_message(&self.count, None)?;
        self.state = FenceState::CountSent;

        while self.sent < expected {
            if self.deadline.is_some_and(|deadline| started.elapsed() >= deadline) {
                return Err(Error::HandshakeStalled {
                    sent: self.sent,
                    expected,
                });
            }
            self.state = FenceState::AwaitingRequest(self.sent);
            if self.request.wait_until_finished() != WaitOutcome::Received {
                self.await_next(registry);
                continue;
            }
            let seq = self.request.lock().seq;
            self.sent += 1;
            // the reply to this item may arrive before send returns
            self.await_next(registry);
            self.send_item(sender, seq)?;
            self.state = FenceState::ItemSent(seq);
        }
        Ok(())
    }
}

impl Protocol for FenceUploadProtocol {
    fn run(&mut self, sender: &Sender, registry: &Registry) -> Result<(), Error> {
        let expected = self.vertices.len();
        if expected < MIN_FENCE_VERTICES {
            return Err(Error::TooFewVertices(expected));
        }
        self.state = FenceState::Idle;
        self.sent = 0;
        self.outcome = WaitOutcome::Idle;

        if let Err(err) = self.serve_requests(sender, registry) {
            self.cancel(registry);
            return Err(err);
        }

        self.state = FenceState::AwaitingAck;
        self.outcome = self.ack.wait_until_finished();
        self.cancel(registry);
        match self.outcome {
            WaitOutcome::Received => {
                let ack = self.ack.get();
                info!(vertices = expected, result = ?ack.result, "fence upload finished");
            }
            _ => warn!(vertices = expected, "no ack for fence upload"),
        }
        self.state = FenceState::Done;
        Ok(())
    }
}

/// Whether `request` is one this upload should answer. Anything else is ignored without
/// resolving the pending wait.
fn answerable(request: &MissionRequestInt, expected: u16) -> bool {
    if request.mission_type != Some(MissionType::Fence) {
        debug!(mission_type = ?request.mission_type, "ignoring request for another mission type");
        return false;
    }
    if request.seq >= expected {
        debug!(seq = request.seq, "ignoring out of range request");
        return false;
    }
    true
}
