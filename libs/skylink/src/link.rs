use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::codec::{Codec, PostcardCodec};
use crate::entity::{Listen, Message, WaitOutcome};
use crate::messages::Heartbeat;
use crate::protocols::{Protocol, SendProtocol};
use crate::queue::QueuedFrame;
use crate::transport::Transport;
use crate::{Entity, Error, LinkConfig, Registry, Sender, Target, Timestamp};

/// A connected vehicle: the reader thread feeding the registry, the registry dispatching to
/// entities, and the send gate with its repeat scheduler.
pub struct Link {
    config: LinkConfig,
    registry: Arc<Registry>,
    sender: Arc<Sender>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Link {
    pub fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        config: LinkConfig,
    ) -> Result<Self, Error> {
        let registry = Arc::new(Registry::new(config.history_capacity));
        registry.start()?;
        let sender = Arc::new(Sender::new(
            transport.clone(),
            codec.clone(),
            config.header(),
            config.reconnect_poll(),
        ));
        sender.start(config.repeat_scan())?;

        let running = Arc::new(AtomicBool::new(true));
        let reader = Reader {
            transport,
            codec,
            registry: registry.clone(),
            running: running.clone(),
            timeout: config.reader_timeout(),
            reconnect_poll: config.reconnect_poll(),
        };
        let handle = thread::Builder::new()
            .name("skylink-reader".to_string())
            .spawn(move || reader.run())?;
        info!(
            system_id = config.system_id,
            target_system = config.target_system,
            "link up"
        );
        Ok(Link {
            config,
            registry,
            sender,
            running,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// A link speaking the default postcard framing.
    pub fn connect(transport: impl Transport + 'static, config: LinkConfig) -> Result<Self, Error> {
        Link::new(Arc::new(transport), Arc::new(PostcardCodec), config)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The vehicle addressed by commands.
    pub fn target(&self) -> Target {
        self.config.target()
    }

    pub fn add_listener<L: Listen>(&self, listener: &L) {
        self.registry.add_listener(listener)
    }

    pub fn remove_listener<L: Listen>(&self, listener: &L) -> usize {
        self.registry.remove_listener(listener)
    }

    pub fn wait_for_message<M: Message>(
        &self,
        entity: &Entity<M>,
        timeout: Option<Duration>,
        blocking: bool,
    ) -> WaitOutcome {
        self.registry.wait_for_message(entity, timeout, blocking)
    }

    /// Runs `protocol` with the send gate held. The gate is released even when the protocol
    /// fails.
    pub fn run_protocol<P: Protocol + ?Sized>(&self, protocol: &mut P) -> Result<(), Error> {
        self.sender.acquire()?;
        let res = protocol.run(&self.sender, &self.registry);
        let released = self.sender.release();
        res.and(released)
    }

    /// Starts the ground station heartbeat. The returned entity stays scheduled until passed to
    /// [`Sender::stop_repeating`].
    pub fn start_heartbeat(&self, period: Duration) -> Result<Entity<Heartbeat>, Error> {
        let mut heartbeat = SendProtocol::heartbeat(period);
        self.run_protocol(&mut heartbeat)?;
        Ok(heartbeat.entity().clone())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Recent frames for `name`, newest first.
    pub fn history(&self, name: &str) -> Vec<QueuedFrame> {
        self.registry.history(name)
    }

    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the reader, the scheduler and dispatch. Idempotent.
    pub fn close(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
        self.sender.stop();
        self.registry.stop();
        info!("link closed");
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.close();
    }
}

struct Reader {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    registry: Arc<Registry>,
    running: Arc<AtomicBool>,
    timeout: Duration,
    reconnect_poll: Duration,
}

impl Reader {
    fn run(self) {
        while self.running.load(Ordering::SeqCst) {
            let buf = match self.transport.recv(self.timeout) {
                Ok(Some(buf)) => buf,
                Ok(None) => continue,
                Err(err) if err.is_disconnect() => {
                    debug!(?err, "transport down");
                    thread::sleep(self.reconnect_poll);
                    continue;
                }
                Err(err) => {
                    warn!(?err, "read failed");
                    thread::sleep(self.reconnect_poll);
                    continue;
                }
            };
            match self.codec.decode(&buf) {
                Ok(frame) => {
                    trace!(name = frame.name(), "frame received");
                    self.registry.feed(Timestamp::now(), frame);
                }
                Err(err) => warn!(?err, len = buf.len(), "dropping undecodable frame"),
            }
        }
    }
}
