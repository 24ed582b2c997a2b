use std::time::Duration;

use tracing::{debug, warn};

use super::{DEFAULT_ACK_TIMEOUT, Protocol};
use crate::entity::WaitOutcome;
use crate::messages::{Calibration, CommandAck, CommandLong, FlightMode, MessageId};
use crate::{Entity, Error, Registry, Sender, Target};

/// Sends one `COMMAND_LONG` and waits for the next `COMMAND_ACK`.
///
/// The run succeeds whether or not the vehicle accepted; inspect [`CommandProtocol::ack`] and
/// [`CommandProtocol::outcome`] afterwards.
pub struct CommandProtocol {
    command: Entity<CommandLong>,
    ack: Entity<CommandAck>,
    timeout: Option<Duration>,
    outcome: WaitOutcome,
}

impl CommandProtocol {
    pub fn new(command: CommandLong) -> Self {
        CommandProtocol {
            command: Entity::new(command),
            ack: Entity::new(CommandAck::default()),
            timeout: Some(DEFAULT_ACK_TIMEOUT),
            outcome: WaitOutcome::Idle,
        }
    }

    /// Ack timeout; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn arm(target: Target) -> Self {
        CommandProtocol::new(CommandLong::arm(target, true))
    }

    pub fn disarm(target: Target) -> Self {
        CommandProtocol::new(CommandLong::arm(target, false))
    }

    pub fn set_mode(target: Target, mode: FlightMode) -> Self {
        CommandProtocol::new(CommandLong::set_mode(target, mode))
    }

    pub fn request_interval(target: Target, message: MessageId, rate_hz: f32) -> Self {
        CommandProtocol::new(CommandLong::set_message_interval(target, message, rate_hz))
    }

    pub fn takeoff(target: Target, altitude: f32) -> Self {
        CommandProtocol::new(CommandLong::takeoff(target, altitude))
    }

    pub fn reboot(target: Target) -> Self {
        CommandProtocol::new(CommandLong::reboot(target))
    }

    pub fn set_home(target: Target) -> Self {
        CommandProtocol::new(CommandLong::set_home(target))
    }

    pub fn calibrate(target: Target, kind: Calibration) -> Self {
        CommandProtocol::new(CommandLong::calibrate(target, kind))
    }

    pub fn command(&self) -> CommandLong {
        self.command.get()
    }

    pub fn ack(&self) -> CommandAck {
        self.ack.get()
    }

    pub fn outcome(&self) -> WaitOutcome {
        self.outcome
    }

    /// Whether an ack arrived and reported success.
    pub fn accepted(&self) -> bool {
        self.outcome == WaitOutcome::Received && self.ack.lock().accepted()
    }
}

impl Protocol for CommandProtocol {
    fn run(&mut self, sender: &Sender, registry: &Registry) -> Result<(), Error> {
        registry.wait_for_message(&self.ack, self.timeout, false);
        if let Err(err) = sender.send_message(&self.command, None) {
            registry.cancel_wait(&self.ack);
            return Err(err);
        }
        self.outcome = self.ack.wait_until_finished();
        let command = self.command.lock().command;
        match self.outcome {
            WaitOutcome::Received => {
                let ack = self.ack.get();
                if !ack.acknowledges(command) {
                    warn!(?command, acked = ack.command, "ack is for a different command");
                }
                debug!(?command, result = ?ack.result, "command acknowledged");
            }
            WaitOutcome::TimedOut => {
                registry.cancel_wait(&self.ack);
                warn!(?command, "no ack");
            }
            WaitOutcome::Pending | WaitOutcome::Idle => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::codec::{Codec, PostcardCodec};
    use crate::transport::{ChannelTransport, Transport};
    use crate::{Frame, Header, Payload};

    fn setup() -> (Sender, Arc<Registry>, ChannelTransport) {
        let (ours, theirs) = ChannelTransport::pair();
        let sender = Sender::new(
            Arc::new(ours),
            Arc::new(PostcardCodec),
            Header::default(),
            Duration::from_millis(5),
        );
        let registry = Arc::new(Registry::default());
        registry.start().unwrap();
        (sender, registry, theirs)
    }

    #[test]
    fn test_arm_acknowledged() {
        let (sender, registry, vehicle) = setup();
        let responder = {
            let registry = registry.clone();
            thread::spawn(move || {
                let buf = vehicle.recv(Duration::from_secs(1)).unwrap().unwrap();
                let frame = PostcardCodec.decode(&buf).unwrap();
                let Payload::CommandLong { command, .. } = frame.payload else {
                    panic!("expected a command");
                };
                registry.feed(
                    crate::Timestamp::now(),
                    Frame::new(Header::new(1, 1), Payload::CommandAck { command, result: 0 }),
                );
            })
        };
        let mut arm = CommandProtocol::arm(Target::default());
        sender.acquire().unwrap();
        arm.run(&sender, &registry).unwrap();
        sender.release().unwrap();
        responder.join().unwrap();
        assert_eq!(arm.outcome(), WaitOutcome::Received);
        assert!(arm.accepted());
        assert_eq!(arm.ack().command, 400);
    }

    #[test]
    fn test_no_ack_times_out() {
        let (sender, registry, _vehicle) = setup();
        let mut reboot =
            CommandProtocol::reboot(Target::default()).with_timeout(Some(Duration::from_millis(30)));
        sender.acquire().unwrap();
        reboot.run(&sender, &registry).unwrap();
        sender.release().unwrap();
        assert_eq!(reboot.outcome(), WaitOutcome::TimedOut);
        assert!(!reboot.accepted());
        assert_eq!(registry.waiter_count("COMMAND_ACK"), 0);
    }

    #[test]
    fn test_run_without_gate_fails() {
        let (sender, registry, _vehicle) = setup();
        let mut arm = CommandProtocol::arm(Target::default());
        assert!(matches!(arm.run(&sender, &registry), Err(Error::NotOwner)));
        assert_eq!(registry.waiter_count("COMMAND_ACK"), 0);
    }
}
