//! Multi-message exchanges with the vehicle.
//!
//! A protocol runs with the send gate already held by the calling thread (see
//! [`Link::run_protocol`](crate::Link::run_protocol)), so nothing else is sent in the middle of
//! an exchange. Replies are registered as waiters before the message that triggers them is
//! sent.

mod command;
mod fence;
mod rtcm;
mod send;
mod waypoint;

pub use command::*;
pub use fence::*;
pub use rtcm::*;
pub use send::*;
pub use waypoint::*;

use std::time::Duration;

use crate::{Error, Registry, Sender};

/// Default wait for a single acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);

pub trait Protocol {
    fn run(&mut self, sender: &Sender, registry: &Registry) -> Result<(), Error>;
}

impl<P: Protocol + ?Sized> Protocol for &mut P {
    fn run(&mut self, sender: &Sender, registry: &Registry) -> Result<(), Error> {
        (**self).run(sender, registry)
    }
}

impl<P: Protocol + ?Sized> Protocol for Box<P> {
    fn run(&mut self, sender: &Sender, registry: &Registry) -> Result<(), Error> {
        (**self).run(sender, registry)
    }
}
