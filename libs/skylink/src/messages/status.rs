use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{invalid, unexpected};
use crate::{DecodeError, Frame, Message, Payload};

const MAX_TEXT_LEN: usize = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MavSeverity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    #[default]
    Info = 6,
    Debug = 7,
}

/// Free-form text from the vehicle, or outgoing text when encoded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusText {
    pub severity: MavSeverity,
    pub text: String,
}

impl StatusText {
    pub fn new(severity: MavSeverity, text: impl Into<String>) -> Self {
        StatusText {
            severity,
            text: text.into(),
        }
    }
}

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_TEXT_LEN {
        return text;
    }
    let mut end = MAX_TEXT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl Message for StatusText {
    const NAME: &'static str = "STATUSTEXT";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::StatusText { severity, text } = &frame.payload else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let severity =
            MavSeverity::try_from(*severity).map_err(|_| invalid("severity", *severity))?;
        self.severity = severity;
        self.text = text.trim_end_matches('\0').to_string();
        Ok(())
    }

    fn encode(&self) -> Option<Payload> {
        Some(Payload::StatusText {
            severity: self.severity.into(),
            text: truncate(&self.text).to_string(),
        })
    }
}
