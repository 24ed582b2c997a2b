//! Typed views over the wire catalog.
//!
//! Each type here implements [`Message`](crate::Message) and is used through an
//! [`Entity`](crate::Entity). Inbound types decode, outbound types encode, a few do both.

mod command;
mod full_pose;
mod heartbeat;
mod mission;
mod power;
mod setpoint;
mod status;
mod telemetry;

pub use command::*;
pub use full_pose::*;
pub use heartbeat::*;
pub use mission::*;
pub use power::*;
pub use setpoint::*;
pub use status::*;
pub use telemetry::*;

use crate::{DecodeError, Message, Payload};

pub(crate) fn unexpected<M: Message>(payload: &Payload) -> DecodeError {
    DecodeError::UnexpectedPayload {
        expected: M::NAME,
        found: payload.name(),
    }
}

pub(crate) fn invalid(field: &'static str, value: impl Into<i64>) -> DecodeError {
    DecodeError::InvalidField {
        field,
        value: value.into(),
    }
}

/// Milliseconds since `boot`, as carried by setpoint messages.
pub(crate) fn boot_ms(boot: std::time::Instant) -> u32 {
    boot.elapsed().as_millis() as u32
}
