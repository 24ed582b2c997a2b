use std::io;

use thiserror::Error;

#[derive(Debug, Error, miette::Diagnostic)]
pub enum Error {
    #[error("send gate is not held by the calling thread")]
    #[diagnostic(
        code(skylink::not_owner),
        help("call `Sender::acquire` before sending or releasing")
    )]
    NotOwner,

    #[error("send gate is already held by the calling thread")]
    #[diagnostic(
        code(skylink::reentrant),
        help("release the gate before acquiring it again")
    )]
    Reentrant,

    #[error("io {0}")]
    Io(#[from] io::Error),

    #[error("postcard {0}")]
    #[diagnostic(code(skylink::codec))]
    Postcard(#[from] postcard::Error),

    #[cfg(feature = "serial")]
    #[error("serial {0}")]
    Serial(#[from] serialport::Error),

    #[error("transport disconnected")]
    #[diagnostic(code(skylink::disconnected))]
    Disconnected,

    #[error("{0} has no outbound encoding")]
    #[diagnostic(
        code(skylink::not_sendable),
        help("only messages that implement `Message::encode` can be sent")
    )]
    NotSendable(&'static str),

    #[error("pose buffer is empty")]
    #[diagnostic(
        code(skylink::no_pose_data),
        help("wait for attitude and local position telemetry before querying")
    )]
    NoPoseData,

    #[error("fence needs at least 3 vertices, got {0}")]
    #[diagnostic(code(skylink::too_few_vertices))]
    TooFewVertices(usize),

    #[error("handshake stalled after {sent} of {expected} items")]
    #[diagnostic(
        code(skylink::handshake_stalled),
        help("the vehicle stopped requesting items before the upload completed")
    )]
    HandshakeStalled { sent: u16, expected: u16 },

    #[error("timed out waiting for {0}")]
    #[diagnostic(code(skylink::timeout))]
    Timeout(&'static str),
}

/// Reasons a frame could not be decoded into a message.
///
/// A failed decode never modifies the target message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("expected {expected}, found {found}")]
    UnexpectedPayload {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: i64 },
}

impl Error {
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Disconnected => true,
            Error::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Diagnostic;

    #[test]
    fn test_disconnect_kinds() {
        assert!(Error::Disconnected.is_disconnect());
        assert!(Error::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_disconnect());
        assert!(!Error::from(io::Error::from(io::ErrorKind::InvalidData)).is_disconnect());
        assert!(!Error::NotOwner.is_disconnect());
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = Error::HandshakeStalled {
            sent: 1,
            expected: 4,
        };
        assert_eq!(err.to_string(), "handshake stalled after 1 of 4 items");
        assert_eq!(
            err.code().map(|code| code.to_string()).as_deref(),
            Some("skylink::handshake_stalled")
        );
    }
}
