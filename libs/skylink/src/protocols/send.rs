use std::time::Duration;

use super::Protocol;
use crate::messages::{BatteryStatus, Heartbeat, MavSeverity, RcOverride, StatusText};
use crate::{Entity, Error, Header, Message, Registry, Sender};

/// Sends one message without waiting for a reply.
///
/// Messages with a repeat period (the ground station heartbeat) keep going out from the
/// scheduler after the first send.
pub struct SendProtocol<M: Message> {
    entity: Entity<M>,
    header: Option<Header>,
}

impl<M: Message> SendProtocol<M> {
    pub fn new(msg: M) -> Self {
        SendProtocol::from_entity(Entity::new(msg))
    }

    /// Sends through an existing entity, so the caller can keep updating it between runs.
    pub fn from_entity(entity: Entity<M>) -> Self {
        SendProtocol {
            entity,
            header: None,
        }
    }

    /// Overrides the link's system and component ids for this message.
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    pub fn entity(&self) -> &Entity<M> {
        &self.entity
    }
}

impl SendProtocol<Heartbeat> {
    pub fn heartbeat(period: Duration) -> Self {
        SendProtocol::new(Heartbeat::ground_station(period))
    }
}

impl SendProtocol<StatusText> {
    pub fn status_text(severity: MavSeverity, text: impl Into<String>) -> Self {
        SendProtocol::new(StatusText::new(severity, text))
    }
}

pub type RcOverrideProtocol = SendProtocol<RcOverride>;
pub type BatteryUpdateProtocol = SendProtocol<BatteryStatus>;

impl<M: Message> Protocol for SendProtocol<M> {
    fn run(&mut self, sender: &Sender, _registry: &Registry) -> Result<(), Error> {
        sender.send_message(&self.entity, self.header)
    }
}
