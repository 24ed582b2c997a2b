use tracing::warn;

use super::Protocol;
use crate::messages::{RTCM_FRAGMENT_LEN, RtcmData};
use crate::{Entity, Error, Registry, Sender};

const MAX_FRAGMENTS: usize = 4;
const SEQUENCE_MODULUS: u8 = 32;

/// Forwards RTCM corrections to the vehicle's GPS, split across up to four
/// `GPS_RTCM_DATA` frames.
pub struct RtcmProtocol {
    rtcm: Entity<RtcmData>,
    payload: Vec<u8>,
    sequence: u8,
}

impl Default for RtcmProtocol {
    fn default() -> Self {
        RtcmProtocol::new()
    }
}

impl RtcmProtocol {
    pub fn new() -> Self {
        RtcmProtocol {
            rtcm: Entity::new(RtcmData::default()),
            payload: Vec::new(),
            sequence: 0,
        }
    }

    /// Loads the next correction message to send.
    pub fn update(&mut self, data: &[u8]) {
        self.payload = data.to_vec();
    }

    /// Sequence number the next message will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }
}

impl Protocol for RtcmProtocol {
    fn run(&mut self, sender: &Sender, _registry: &Registry) -> Result<(), Error> {
        let payload = std::mem::take(&mut self.payload);
        if payload.len() > RTCM_FRAGMENT_LEN * MAX_FRAGMENTS {
            warn!(len = payload.len(), "rtcm message too long, truncating");
        }
        let fragmented = payload.len() > RTCM_FRAGMENT_LEN;
        for (fragment, chunk) in payload
            .chunks(RTCM_FRAGMENT_LEN)
            .take(MAX_FRAGMENTS)
            .enumerate()
        {
            let msg = RtcmData::fragment(self.sequence, fragment as u8, fragmented, chunk);
            self.rtcm.update(|rtcm| *rtcm = msg);
            sender.send_message(&self.rtcm, None)?;
        }
        self.sequence = (self.sequence + 1) % SEQUENCE_MODULUS;
        Ok(())
    }
}
