//! Telemetry and command link for autonomous vehicles.
//!
//! Inbound frames are read off a [`Transport`], decoded by a [`Codec`] and handed to the
//! [`Registry`], which routes each one to the [`Entity`] handles registered for its name.
//! Outbound traffic goes through the [`Sender`] gate, and multi-message exchanges are written as
//! [`protocols::Protocol`]s. [`Link`] wires all of it together.

pub mod codec;
pub mod config;
pub mod entity;
mod error;
mod frame;
pub mod link;
pub mod messages;
pub mod pose;
pub mod protocols;
pub mod queue;
pub mod rate;
pub mod registry;
pub mod sender;
mod time;
pub mod transport;

pub use codec::{Codec, PostcardCodec};
pub use config::{LinkConfig, PoseConfig, timeout_from_secs};
pub use entity::{Entity, EntityId, Listen, Message, Sink, WaitOutcome};
pub use error::{DecodeError, Error};
pub use frame::{Frame, Header, Payload, Target};
pub use link::Link;
pub use pose::{Pose, PoseBuffer};
pub use registry::Registry;
pub use sender::Sender;
pub use time::Timestamp;
#[cfg(feature = "serial")]
pub use transport::SerialTransport;
pub use transport::{ChannelTransport, Transport, UdpTransport};
