use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use crate::entity::{EntityId, Listen, Message, Sink, WaitOutcome, WaitStatus};
use crate::queue::QueuedFrame;
use crate::{Entity, Frame, Timestamp};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

const DISPATCH_POLL: Duration = Duration::from_millis(50);

type SinkMap = HashMap<&'static str, Vec<Arc<dyn Sink>>>;

/// Routes every inbound frame, in arrival order, to the waiters and listeners registered under
/// its name, and keeps a bounded per-name history.
pub struct Registry {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    listeners: RwLock<SinkMap>,
    waiters: Mutex<SinkMap>,
    history: Mutex<HashMap<&'static str, VecDeque<QueuedFrame>>>,
    history_capacity: usize,
    inbound_tx: flume::Sender<QueuedFrame>,
    inbound_rx: flume::Receiver<QueuedFrame>,
    running: AtomicBool,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Registry {
    pub fn new(history_capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = flume::unbounded();
        Registry {
            shared: Arc::new(Shared {
                listeners: RwLock::new(HashMap::new()),
                waiters: Mutex::new(HashMap::new()),
                history: Mutex::new(HashMap::new()),
                history_capacity: history_capacity.max(1),
                inbound_tx,
                inbound_rx,
                running: AtomicBool::new(false),
            }),
            dispatcher: Mutex::new(None),
        }
    }

    /// Starts the dispatch loop. Frames fed before this call are held and dispatched in order.
    pub fn start(&self) -> Result<(), crate::Error> {
        let mut dispatcher = self.dispatcher.lock();
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("skylink-dispatch".to_string())
            .spawn(move || shared.run())
            .inspect_err(|_| self.shared.running.store(false, Ordering::SeqCst))?;
        *dispatcher = Some(handle);
        Ok(())
    }

    /// Stops the dispatch loop and every registered listener's worker.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
        let listeners = self.shared.listeners.read();
        for sink in listeners.values().flatten() {
            sink.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Registers every sink of `listener` under its name and starts its worker.
    pub fn add_listener(&self, listener: &impl Listen) {
        let sinks = listener.sinks();
        {
            let mut listeners = self.shared.listeners.write();
            for sink in &sinks {
                let entry = listeners.entry(sink.name()).or_default();
                if !entry.iter().any(|s| s.id() == sink.id()) {
                    entry.push(sink.clone());
                }
            }
        }
        for sink in sinks {
            sink.start();
        }
    }

    /// Deregisters every sink of `listener`. Returns how many registrations were removed.
    pub fn remove_listener(&self, listener: &impl Listen) -> usize {
        let ids: Vec<(EntityId, &'static str)> = listener
            .sinks()
            .iter()
            .map(|sink| (sink.id(), sink.name()))
            .collect();
        let mut removed = Vec::new();
        {
            let mut listeners = self.shared.listeners.write();
            for (id, name) in ids {
                let Some(entry) = listeners.get_mut(name) else {
                    continue;
                };
                if let Some(pos) = entry.iter().position(|s| s.id() == id) {
                    removed.push(entry.remove(pos));
                }
                if entry.is_empty() {
                    listeners.remove(name);
                }
            }
        }
        for sink in &removed {
            sink.stop();
        }
        removed.len()
    }

    /// Deregisters every listener for `name`.
    pub fn remove_listeners_named(&self, name: &str) -> usize {
        let removed = self.shared.listeners.write().remove(name);
        let removed = removed.unwrap_or_default();
        for sink in &removed {
            sink.stop();
        }
        removed.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.shared.listeners.read().get(name).map_or(0, Vec::len)
    }

    pub fn waiter_count(&self, name: &str) -> usize {
        self.shared.waiters.lock().get(name).map_or(0, Vec::len)
    }

    /// Registers `entity` to receive the next frame with its name.
    ///
    /// Without `blocking` this returns [`WaitOutcome::Pending`] at once and the caller resolves
    /// the wait with [`Entity::wait_until_finished`]. A `timeout` of `None` waits forever.
    pub fn wait_for_message<M: Message>(
        &self,
        entity: &Entity<M>,
        timeout: Option<Duration>,
        blocking: bool,
    ) -> WaitOutcome {
        let sink = entity.sink();
        sink.begin_wait(timeout);
        {
            let mut waiters = self.shared.waiters.lock();
            prune_expired(&mut waiters);
            let entry = waiters.entry(sink.name()).or_default();
            if !entry.iter().any(|s| s.id() == sink.id()) {
                entry.push(sink);
            }
        }
        if !blocking {
            return WaitOutcome::Pending;
        }
        let outcome = entity.wait_until_finished();
        if outcome == WaitOutcome::TimedOut {
            self.remove_waiter(entity.id(), entity.name());
        }
        outcome
    }

    /// Drops every waiter whose wait already resolved or timed out. Returns how many went.
    pub fn prune_waiters(&self) -> usize {
        prune_expired(&mut self.shared.waiters.lock())
    }

    /// Drops a pending registration made by [`Registry::wait_for_message`]. Returns whether one
    /// was registered.
    pub fn cancel_wait<M: Message>(&self, entity: &Entity<M>) -> bool {
        self.remove_waiter(entity.id(), entity.name())
    }

    fn remove_waiter(&self, id: EntityId, name: &'static str) -> bool {
        let mut waiters = self.shared.waiters.lock();
        let Some(entry) = waiters.get_mut(name) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|s| s.id() != id);
        let removed = entry.len() != before;
        if entry.is_empty() {
            waiters.remove(name);
        }
        removed
    }

    /// Queues an arrived frame for dispatch.
    pub fn feed(&self, timestamp: Timestamp, frame: Frame) {
        // the registry owns a receiver, so the channel is never disconnected
        let _ = self.shared.inbound_tx.send((timestamp, Arc::new(frame)));
    }

    pub fn backlog(&self) -> usize {
        self.shared.inbound_rx.len()
    }

    /// Recent frames for `name`, newest first.
    pub fn history(&self, name: &str) -> Vec<QueuedFrame> {
        self.shared
            .history
            .lock()
            .get(name)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, name: &str) -> Option<QueuedFrame> {
        self.shared
            .history
            .lock()
            .get(name)
            .and_then(|entries| entries.front().cloned())
    }

    #[cfg(test)]
    pub(crate) fn dispatch(&self, timestamp: Timestamp, frame: Frame) {
        self.shared.dispatch(timestamp, Arc::new(frame));
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn run(&self) {
        while self.running.load(Ordering::SeqCst) {
            match self.inbound_rx.recv_timeout(DISPATCH_POLL) {
                Ok((timestamp, frame)) => self.dispatch(timestamp, frame),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => {
                    warn!("inbound channel closed");
                    break;
                }
            }
        }
    }

    fn dispatch(&self, timestamp: Timestamp, frame: Arc<Frame>) {
        let name = frame.name();
        trace!(name, ?timestamp, "dispatch");

        // taken out of the map so waiter callbacks can register new waits
        let waiters = self.waiters.lock().remove(name);
        if let Some(waiters) = waiters {
            let retained: Vec<_> = waiters
                .into_iter()
                .filter(|sink| sink.fulfill(timestamp, &frame) == WaitStatus::Pending)
                .collect();
            if !retained.is_empty() {
                let mut map = self.waiters.lock();
                let entry = map.entry(name).or_default();
                for sink in retained {
                    if !entry.iter().any(|s| s.id() == sink.id()) {
                        entry.push(sink);
                    }
                }
            }
        }

        let listeners = self.listeners.read().get(name).cloned();
        for sink in listeners.iter().flatten() {
            sink.offer(timestamp, &frame);
        }

        let mut history = self.history.lock();
        let entries = history.entry(name).or_default();
        entries.push_front((timestamp, frame));
        entries.truncate(self.history_capacity);
    }
}

fn prune_expired(waiters: &mut SinkMap) -> usize {
    let mut pruned = 0;
    waiters.retain(|_, entry| {
        let before = entry.len();
        entry.retain(|sink| !sink.wait_expired());
        pruned += before - entry.len();
        !entry.is_empty()
    });
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CommandAck, Heartbeat, MavResult, StatusText};
    use crate::{Header, Payload};

    fn ack_frame(command: u16) -> Frame {
        Frame::new(
            Header::new(1, 1),
            Payload::CommandAck { command, result: 0 },
        )
    }

    fn heartbeat_frame(custom_mode: u32) -> Frame {
        Frame::new(
            Header::new(1, 1),
            Payload::Heartbeat {
                mav_type: 2,
                autopilot: 3,
                base_mode: 0,
                custom_mode,
                system_status: 4,
            },
        )
    }

    #[test]
    fn test_waiter_and_listener_are_orthogonal() {
        let registry = Registry::default();
        let listener = Entity::new(CommandAck::default());
        let waiter = Entity::new(CommandAck::default());
        registry.add_listener(&listener);
        registry.wait_for_message(&waiter, None, false);
        assert_eq!(registry.waiter_count("COMMAND_ACK"), 1);

        registry.dispatch(Timestamp(10), ack_frame(400));
        assert_eq!(waiter.wait_until_finished(), WaitOutcome::Received);
        assert_eq!(waiter.get().command, 400);
        assert_eq!(waiter.get().result, Some(MavResult::Accepted));
        assert_eq!(registry.waiter_count("COMMAND_ACK"), 0);
        assert_eq!(listener.timestamp(), Some(Timestamp(10)));

        // only the listener sees the next one
        registry.dispatch(Timestamp(20), ack_frame(176));
        assert_eq!(waiter.get().command, 400);
        assert_eq!(listener.timestamp(), Some(Timestamp(20)));
        listener.stop();
    }

    #[test]
    fn test_listener_skips_stale_frames() {
        let registry = Registry::default();
        let listener = Entity::new(Heartbeat::default());
        registry.add_listener(&listener);
        listener.stop();

        registry.dispatch(Timestamp(5), heartbeat_frame(4));
        registry.dispatch(Timestamp(5), heartbeat_frame(5));
        registry.dispatch(Timestamp(3), heartbeat_frame(6));
        assert_eq!(listener.queue_len(), 1);
        assert_eq!(registry.history("HEARTBEAT").len(), 3);
    }

    #[test]
    fn test_history_is_bounded_newest_first() {
        let registry = Registry::new(3);
        for n in 0..5 {
            registry.dispatch(Timestamp(n), ack_frame(n as u16));
        }
        let history: Vec<i64> = registry
            .history("COMMAND_ACK")
            .iter()
            .map(|(ts, _)| ts.0)
            .collect();
        assert_eq!(history, vec![4, 3, 2]);
        assert_eq!(registry.latest("COMMAND_ACK").unwrap().0, Timestamp(4));
        assert!(registry.latest("HEARTBEAT").is_none());
    }

    #[test]
    fn test_blocking_wait_ignores_unrelated_traffic() {
        let registry = Arc::new(Registry::default());
        registry.start().unwrap();
        let ack = Entity::new(CommandAck::default());

        let feeder = {
            let registry = registry.clone();
            thread::spawn(move || {
                for n in 0..50 {
                    registry.feed(Timestamp::now(), heartbeat_frame(n));
                }
                thread::sleep(Duration::from_millis(20));
                registry.feed(Timestamp::now(), ack_frame(511));
                for n in 0..50 {
                    registry.feed(Timestamp::now(), heartbeat_frame(n));
                }
            })
        };
        let outcome = registry.wait_for_message(&ack, Some(Duration::from_secs(5)), true);
        feeder.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Received);
        assert_eq!(ack.get().command, 511);
        registry.stop();
    }

    #[test]
    fn test_wait_times_out() {
        let registry = Registry::default();
        registry.start().unwrap();
        let text = Entity::new(StatusText::default());
        let outcome = registry.wait_for_message(&text, Some(Duration::from_millis(20)), true);
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(text.timestamp().is_none());
        assert_eq!(registry.waiter_count("STATUSTEXT"), 0);
    }

    #[test]
    fn test_remove_listener() {
        let registry = Registry::default();
        let a = Entity::new(Heartbeat::default());
        let b = Entity::new(Heartbeat::default());
        registry.add_listener(&a);
        registry.add_listener(&a);
        registry.add_listener(&b);
        assert_eq!(registry.listener_count("HEARTBEAT"), 2);
        assert_eq!(registry.remove_listener(&a), 1);
        assert!(!a.is_running());
        assert_eq!(registry.remove_listeners_named("HEARTBEAT"), 1);
        assert_eq!(registry.listener_count("HEARTBEAT"), 0);
        assert!(!b.is_running());
    }

    struct Pair {
        heartbeat: Entity<Heartbeat>,
        ack: Entity<CommandAck>,
    }

    impl Listen for Pair {
        fn sinks(&self) -> Vec<Arc<dyn Sink>> {
            let mut sinks = self.heartbeat.sinks();
            sinks.extend(self.ack.sinks());
            sinks
        }
    }

    #[test]
    fn test_composite_fans_out() {
        let registry = Registry::default();
        let pair = Pair {
            heartbeat: Entity::new(Heartbeat::default()),
            ack: Entity::new(CommandAck::default()),
        };
        registry.add_listener(&pair);
        assert_eq!(registry.listener_count("HEARTBEAT"), 1);
        assert_eq!(registry.listener_count("COMMAND_ACK"), 1);
        registry.dispatch(Timestamp(1), ack_frame(22));
        assert_eq!(pair.ack.timestamp(), Some(Timestamp(1)));
        assert!(pair.heartbeat.timestamp().is_none());
        assert_eq!(registry.remove_listener(&pair), 2);
    }

    #[test]
    fn test_expired_waiters_are_pruned() {
        let registry = Registry::default();
        let text = Entity::new(StatusText::default());
        registry.wait_for_message(&text, Some(Duration::from_millis(10)), false);
        assert_eq!(text.wait_until_finished(), WaitOutcome::TimedOut);
        assert_eq!(registry.waiter_count("STATUSTEXT"), 1);

        // registering any other wait sweeps the expired one
        let ack = Entity::new(CommandAck::default());
        registry.wait_for_message(&ack, None, false);
        assert_eq!(registry.waiter_count("STATUSTEXT"), 0);
        assert_eq!(registry.waiter_count("COMMAND_ACK"), 1);
        assert_eq!(registry.prune_waiters(), 0);
        assert!(registry.cancel_wait(&ack));

        registry.wait_for_message(&text, Some(Duration::from_millis(10)), false);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(registry.prune_waiters(), 1);
        assert_eq!(registry.waiter_count("STATUSTEXT"), 0);
    }
}
