use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::entity::{EntityId, Message, Outgoing};
use crate::transport::Transport;
use crate::{Entity, Error, Frame, Header, Timestamp};

struct RepeatEntry {
    outgoing: Arc<dyn Outgoing>,
    header: Option<Header>,
    period: Duration,
}

struct Shared {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    header: Header,
    sequence: AtomicU8,
    repeating: Mutex<Vec<RepeatEntry>>,
    running: AtomicBool,
    closed: AtomicBool,
    reconnect_poll: Duration,
}

/// Exclusive access to the outbound link, plus the scheduler that resends periodic messages.
///
/// Only the thread holding the gate may send. Periodic resends take the gate like any other
/// sender, so they never interleave with a protocol exchange.
pub struct Sender {
    shared: Arc<Shared>,
    repeater: Mutex<Option<JoinHandle<()>>>,
}

impl Sender {
    pub fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        header: Header,
        reconnect_poll: Duration,
    ) -> Self {
        Sender {
            shared: Arc::new(Shared {
                owner: Mutex::new(None),
                released: Condvar::new(),
                transport,
                codec,
                header,
                sequence: AtomicU8::new(0),
                repeating: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                reconnect_poll,
            }),
            repeater: Mutex::new(None),
        }
    }

    /// Starts the repeat scheduler, scanning for due entries every `scan`.
    pub fn start(&self, scan: Duration) -> Result<(), Error> {
        let mut repeater = self.repeater.lock();
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.closed.store(false, Ordering::SeqCst);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("skylink-repeat".to_string())
            .spawn(move || shared.repeat_loop(scan))
            .inspect_err(|_| self.shared.running.store(false, Ordering::SeqCst))?;
        *repeater = Some(handle);
        Ok(())
    }

    /// Stops the scheduler. Sends blocked on a dead link give up with
    /// [`Error::Disconnected`].
    pub fn stop(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.repeater.lock().take() {
            let _ = handle.join();
        }
    }

    /// Blocks until the gate is free, then takes it for the calling thread.
    pub fn acquire(&self) -> Result<(), Error> {
        self.shared.acquire()
    }

    pub fn release(&self) -> Result<(), Error> {
        self.shared.release()
    }

    pub fn is_held(&self) -> bool {
        self.shared.owner.lock().is_some()
    }

    pub fn is_owner(&self) -> bool {
        *self.shared.owner.lock() == Some(thread::current().id())
    }

    /// Encodes and transmits `entity`. The caller must hold the gate.
    ///
    /// Blocks while the transport is down. Entities with a repeat period are (re)registered
    /// with the scheduler; `header` overrides the link identity for this entity.
    pub fn send_message<M: Message>(
        &self,
        entity: &Entity<M>,
        header: Option<Header>,
    ) -> Result<(), Error> {
        self.shared.send(&entity.outgoing(), header)
    }

    /// Removes `id` from the repeat table. Returns whether it was scheduled.
    pub fn stop_repeating(&self, id: EntityId) -> bool {
        let mut repeating = self.shared.repeating.lock();
        let before = repeating.len();
        repeating.retain(|entry| entry.outgoing.id() != id);
        repeating.len() != before
    }

    pub fn repeating(&self) -> usize {
        self.shared.repeating.lock().len()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.shared.transport
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn acquire(&self) -> Result<(), Error> {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        if *owner == Some(me) {
            return Err(Error::Reentrant);
        }
        while owner.is_some() {
            self.released.wait(&mut owner);
        }
        *owner = Some(me);
        Ok(())
    }

    fn release(&self) -> Result<(), Error> {
        let mut owner = self.owner.lock();
        if *owner != Some(thread::current().id()) {
            return Err(Error::NotOwner);
        }
        *owner = None;
        self.released.notify_one();
        Ok(())
    }

    fn check_owner(&self) -> Result<(), Error> {
        if *self.owner.lock() != Some(thread::current().id()) {
            return Err(Error::NotOwner);
        }
        Ok(())
    }

    fn wait_for_link(&self) -> Result<(), Error> {
        if self.transport.is_alive() {
            return Ok(());
        }
        warn!("link down, holding outbound frames");
        while !self.transport.is_alive() {
            if self.closed.load(Ordering::SeqCst) {
                return Err(Error::Disconnected);
            }
            thread::sleep(self.reconnect_poll);
        }
        debug!("link restored");
        Ok(())
    }

    fn send(&self, outgoing: &Arc<dyn Outgoing>, header: Option<Header>) -> Result<(), Error> {
        self.check_owner()?;
        let payload = outgoing
            .payload()
            .ok_or(Error::NotSendable(outgoing.name()))?;
        self.wait_for_link()?;

        let mut header = header.unwrap_or(self.header);
        header.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let buf = self.codec.encode(&Frame::new(header, payload))?;
        self.transport.send(&buf)?;
        outgoing.mark_sent(Timestamp::now());

        if let Some(period) = outgoing.repeat_period() {
            let mut repeating = self.repeating.lock();
            match repeating
                .iter_mut()
                .find(|entry| entry.outgoing.id() == outgoing.id())
            {
                Some(entry) => {
                    entry.header = Some(header);
                    entry.period = period;
                }
                None => repeating.push(RepeatEntry {
                    outgoing: outgoing.clone(),
                    header: Some(header),
                    period,
                }),
            }
        }
        Ok(())
    }

    fn repeat_loop(&self, scan: Duration) {
        while self.running.load(Ordering::SeqCst) {
            thread::sleep(scan);
            let due: Vec<(Arc<dyn Outgoing>, Option<Header>)> = self
                .repeating
                .lock()
                .iter()
                .filter(|entry| {
                    entry
                        .outgoing
                        .last_sent()
                        .is_none_or(|sent| sent.elapsed() >= entry.period)
                })
                .map(|entry| (entry.outgoing.clone(), entry.header))
                .collect();
            for (outgoing, header) in due {
                if let Err(err) = self.resend(&outgoing, header) {
                    warn!(name = outgoing.name(), ?err, "periodic send failed");
                }
            }
        }
    }

    fn resend(&self, outgoing: &Arc<dyn Outgoing>, header: Option<Header>) -> Result<(), Error> {
        self.acquire()?;
        let res = self.send(outgoing, header);
        self.release()?;
        res
    }
}
