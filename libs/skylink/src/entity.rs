use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::queue::{DEFAULT_QUEUE_CAPACITY, FrameQueue};
use crate::rate::RateEstimator;
use crate::{DecodeError, Frame, Payload, Timestamp};

const DEFAULT_POLL: Duration = Duration::from_millis(10);

/// A typed view of one message from the catalog.
///
/// `decode` must validate the frame before touching `self`, so a failed decode leaves the
/// previous state intact.
pub trait Message: Clone + Send + 'static {
    const NAME: &'static str;

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let _ = frame;
        Ok(())
    }

    fn encode(&self) -> Option<Payload> {
        None
    }

    fn repeat_period(&self) -> Option<Duration> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        EntityId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A matching frame was decoded into the entity.
    Received,
    TimedOut,
    /// The wait was registered without blocking; see [`Entity::wait_until_finished`].
    Pending,
    /// No wait was ever registered on the entity.
    Idle,
}

/// Result of offering a frame to a registered waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Fulfilled,
    /// The frame did not decode; keep the waiter registered.
    Pending,
    /// The wait already resolved or expired; drop the registration.
    Stale,
}

/// The registry side of an entity: how dispatched frames reach it.
pub trait Sink: Send + Sync {
    fn id(&self) -> EntityId;
    fn name(&self) -> &'static str;
    /// Listener path. Accepts the frame only if it is strictly newer than the last one seen.
    fn offer(&self, timestamp: Timestamp, frame: &Arc<Frame>) -> bool;
    /// Waiter path. Decodes inline on the calling thread.
    fn fulfill(&self, timestamp: Timestamp, frame: &Frame) -> WaitStatus;
    fn begin_wait(&self, timeout: Option<Duration>);
    /// True once the pending wait has resolved or its deadline has passed.
    fn wait_expired(&self) -> bool;
    fn start(self: Arc<Self>);
    fn stop(&self);
}

/// The sender side of an entity.
pub trait Outgoing: Send + Sync {
    fn id(&self) -> EntityId;
    fn name(&self) -> &'static str;
    fn payload(&self) -> Option<Payload>;
    fn repeat_period(&self) -> Option<Duration>;
    fn last_sent(&self) -> Option<Timestamp>;
    fn mark_sent(&self, timestamp: Timestamp);
}

/// Anything that can be registered as a listener. Composite messages return the sinks of all
/// their children.
pub trait Listen {
    fn sinks(&self) -> Vec<Arc<dyn Sink>>;
}

pub type Callback<M> = Box<dyn FnMut(&M, Timestamp) + Send>;

pub type Filter<M> = Box<dyn Fn(&M) -> bool + Send + Sync>;

#[derive(Default)]
struct State {
    timestamp: Option<Timestamp>,
    rate: RateEstimator,
    last_sent: Option<Timestamp>,
}

#[derive(Default)]
struct WaitState {
    pending: bool,
    deadline: Option<Instant>,
    outcome: Option<WaitOutcome>,
}

struct Core<M: Message> {
    id: EntityId,
    msg: Mutex<M>,
    state: Mutex<State>,
    wait: Mutex<WaitState>,
    waited: Condvar,
    queue: FrameQueue,
    callback: Mutex<Option<Callback<M>>>,
    filter: Mutex<Option<Filter<M>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    poll: Duration,
}

/// A shared handle to a message, its arrival bookkeeping, and the worker that decodes queued
/// frames into it.
pub struct Entity<M: Message>(Arc<Core<M>>);

impl<M: Message> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Entity(self.0.clone())
    }
}

impl<M: Message + Default> Default for Entity<M> {
    fn default() -> Self {
        Entity::new(M::default())
    }
}

impl<M: Message + fmt::Debug> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &M::NAME)
            .field("id", &self.0.id)
            .field("timestamp", &self.timestamp())
            .field("msg", &*self.0.msg.lock())
            .finish()
    }
}

impl<M: Message> Entity<M> {
    pub fn new(msg: M) -> Self {
        Entity::with_capacity(msg, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(msg: M, capacity: usize) -> Self {
        Entity(Arc::new(Core {
            id: EntityId::next(),
            msg: Mutex::new(msg),
            state: Mutex::new(State::default()),
            wait: Mutex::new(WaitState::default()),
            waited: Condvar::new(),
            queue: FrameQueue::new(capacity),
            callback: Mutex::new(None),
            filter: Mutex::new(None),
            worker: Mutex::new(None),
            running: AtomicBool::new(false),
            poll: DEFAULT_POLL,
        }))
    }

    pub fn with_callback(self, callback: impl FnMut(&M, Timestamp) + Send + 'static) -> Self {
        self.set_callback(callback);
        self
    }

    /// Replaces the callback. Must not be called from inside the callback itself.
    pub fn set_callback(&self, callback: impl FnMut(&M, Timestamp) + Send + 'static) {
        *self.0.callback.lock() = Some(Box::new(callback));
    }

    /// Restricts which frames resolve a pending wait. A decoded frame the filter rejects leaves
    /// the entity untouched and the waiter registered. Listener delivery is not filtered.
    pub fn set_wait_filter(&self, filter: impl Fn(&M) -> bool + Send + Sync + 'static) {
        *self.0.filter.lock() = Some(Box::new(filter));
    }

    pub fn with_wait_filter(self, filter: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        self.set_wait_filter(filter);
        self
    }

    pub fn id(&self) -> EntityId {
        self.0.id
    }

    pub fn name(&self) -> &'static str {
        M::NAME
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.0.state.lock().timestamp
    }

    pub fn hz(&self) -> f64 {
        self.0.state.lock().rate.hz()
    }

    pub fn last_sent(&self) -> Option<Timestamp> {
        self.0.state.lock().last_sent
    }

    pub fn lock(&self) -> MutexGuard<'_, M> {
        self.0.msg.lock()
    }

    pub fn get(&self) -> M {
        self.0.msg.lock().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.0.msg.lock())
    }

    /// Records an arrival. Returns `false`, leaving the entity untouched, unless `timestamp` is
    /// strictly newer than the last recorded one.
    pub fn update_timestamp(&self, timestamp: Timestamp) -> bool {
        self.0.update_timestamp(timestamp)
    }

    /// Queues a frame for the worker, evicting the oldest queued frame when full.
    pub fn enqueue_frame(&self, timestamp: Timestamp, frame: Arc<Frame>) {
        self.0.enqueue(timestamp, frame)
    }

    pub fn queue_len(&self) -> usize {
        self.0.queue.len()
    }

    /// Blocks until the pending one-shot wait resolves. Returns immediately with the last
    /// outcome when nothing is pending.
    pub fn wait_until_finished(&self) -> WaitOutcome {
        self.0.wait_until_finished()
    }

    pub fn is_waiting(&self) -> bool {
        self.0.wait.lock().pending
    }

    pub fn start(&self) {
        Core::spawn_worker(&self.0)
    }

    /// Stops the worker at its next poll. A callback in flight runs to completion.
    pub fn stop(&self) {
        self.0.stop_worker()
    }

    pub fn is_running(&self) -> bool {
        self.0.running.load(Ordering::SeqCst)
    }

    pub fn sink(&self) -> Arc<dyn Sink> {
        self.0.clone()
    }

    pub fn outgoing(&self) -> Arc<dyn Outgoing> {
        self.0.clone()
    }
}

impl<M: Message> Listen for Entity<M> {
    fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        vec![self.sink()]
    }
}

impl<M: Message> Core<M> {
    fn update_timestamp(&self, timestamp: Timestamp) -> bool {
        let mut state = self.state.lock();
        if state.timestamp.is_some_and(|last| last >= timestamp) {
            return false;
        }
        state.timestamp = Some(timestamp);
        state.rate.update(timestamp);
        true
    }

    fn enqueue(&self, timestamp: Timestamp, frame: Arc<Frame>) {
        if let Some((dropped, _)) = self.queue.push((timestamp, frame)) {
            debug!(name = M::NAME, ?dropped, "queue full, dropped oldest frame");
        }
    }

    fn decode(&self, frame: &Frame, snapshot: bool) -> Result<Option<M>, DecodeError> {
        let mut msg = self.msg.lock();
        msg.decode(frame)?;
        Ok(snapshot.then(|| msg.clone()))
    }

    /// Decodes into a scratch copy and commits it only if the wait filter accepts it.
    fn decode_accepted(&self, frame: &Frame) -> Result<Option<M>, DecodeError> {
        let mut candidate = self.msg.lock().clone();
        candidate.decode(frame)?;
        if self
            .filter
            .lock()
            .as_ref()
            .is_some_and(|filter| !filter(&candidate))
        {
            return Ok(None);
        }
        *self.msg.lock() = candidate.clone();
        Ok(Some(candidate))
    }

    fn process(&self, timestamp: Timestamp, frame: &Frame) {
        let has_callback = self.callback.lock().is_some();
        match self.decode(frame, has_callback) {
            Ok(Some(msg)) => self.invoke(&msg, timestamp),
            Ok(None) => {}
            Err(err) => debug!(name = M::NAME, ?err, "dropping undecodable frame"),
        }
    }

    fn invoke(&self, msg: &M, timestamp: Timestamp) {
        let mut callback = self.callback.lock();
        let Some(callback) = callback.as_mut() else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(msg, timestamp))).is_err() {
            error!(name = M::NAME, "callback panicked");
        }
    }

    fn spawn_worker(this: &Arc<Self>) {
        let mut worker = this.worker.lock();
        if this.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(this);
        let poll = this.poll;
        let spawned = thread::Builder::new()
            .name(format!("skylink-{}", M::NAME.to_lowercase()))
            .spawn(move || {
                loop {
                    let Some(core) = weak.upgrade() else {
                        break;
                    };
                    if !core.running.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some((timestamp, frame)) = core.queue.pop(poll) {
                        core.process(timestamp, &frame);
                    }
                }
            });
        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(err) => {
                warn!(name = M::NAME, ?err, "failed to spawn entity worker");
                this.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn stop_worker(&self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }

    fn wait_until_finished(&self) -> WaitOutcome {
        let mut wait = self.wait.lock();
        loop {
            if !wait.pending {
                return wait.outcome.unwrap_or(WaitOutcome::Idle);
            }
            match wait.deadline {
                Some(deadline) => {
                    if self.waited.wait_until(&mut wait, deadline).timed_out() && wait.pending {
                        wait.pending = false;
                        wait.outcome = Some(WaitOutcome::TimedOut);
                        return WaitOutcome::TimedOut;
                    }
                }
                None => self.waited.wait(&mut wait),
            }
        }
    }

    fn resolve(&self, outcome: WaitOutcome) {
        let mut wait = self.wait.lock();
        wait.pending = false;
        wait.outcome = Some(outcome);
        self.waited.notify_all();
    }
}

impl<M: Message> Sink for Core<M> {
    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &'static str {
        M::NAME
    }

    fn offer(&self, timestamp: Timestamp, frame: &Arc<Frame>) -> bool {
        if !self.update_timestamp(timestamp) {
            return false;
        }
        self.enqueue(timestamp, frame.clone());
        true
    }

    fn fulfill(&self, timestamp: Timestamp, frame: &Frame) -> WaitStatus {
        {
            let wait = self.wait.lock();
            if !wait.pending {
                return WaitStatus::Stale;
            }
            if wait.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                drop(wait);
                self.resolve(WaitOutcome::TimedOut);
                return WaitStatus::Stale;
            }
        }
        let msg = match self.decode_accepted(frame) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                debug!(name = M::NAME, "waiter filtered out frame");
                return WaitStatus::Pending;
            }
            Err(err) => {
                debug!(name = M::NAME, ?err, "waiter skipped undecodable frame");
                return WaitStatus::Pending;
            }
        };
        self.update_timestamp(timestamp);
        self.resolve(WaitOutcome::Received);
        self.invoke(&msg, timestamp);
        WaitStatus::Fulfilled
    }

    fn begin_wait(&self, timeout: Option<Duration>) {
        let mut wait = self.wait.lock();
        wait.pending = true;
        wait.deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        wait.outcome = None;
    }

    fn wait_expired(&self) -> bool {
        let wait = self.wait.lock();
        !wait.pending || wait.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn start(self: Arc<Self>) {
        Core::spawn_worker(&self)
    }

    fn stop(&self) {
        self.stop_worker()
    }
}

impl<M: Message> Outgoing for Core<M> {
    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &'static str {
        M::NAME
    }

    fn payload(&self) -> Option<Payload> {
        self.msg.lock().encode()
    }

    fn repeat_period(&self) -> Option<Duration> {
        self.msg
            .lock()
            .repeat_period()
            .filter(|period| !period.is_zero())
    }

    fn last_sent(&self) -> Option<Timestamp> {
        self.state.lock().last_sent
    }

    fn mark_sent(&self, timestamp: Timestamp) {
        let mut state = self.state.lock();
        state.last_sent = Some(timestamp);
        state.timestamp = state.timestamp.max(Some(timestamp));
    }
}
