use crate::{Error, Frame};

/// Converts frames to and from their byte representation on the link.
pub trait Codec: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, Error>;
    fn decode(&self, buf: &[u8]) -> Result<Frame, Error>;
}

/// COBS framed postcard. Every encoded frame ends with a single `0` delimiter, so stream
/// transports can split on it.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostcardCodec;

impl Codec for PostcardCodec {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, Error> {
        Ok(postcard::to_allocvec_cobs(frame)?)
    }

    fn decode(&self, buf: &[u8]) -> Result<Frame, Error> {
        let mut buf = buf.to_vec();
        Ok(postcard::from_bytes_cobs(&mut buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Header, Payload};

    #[test]
    fn test_encoded_frame_is_delimited() {
        let frame = Frame::new(
            Header::new(1, 1),
            Payload::StatusText {
                severity: 6,
                text: "EKF3 IMU0 is using GPS".to_string(),
            },
        );
        let buf = PostcardCodec.encode(&frame).unwrap();
        assert_eq!(buf.last(), Some(&0));
        assert_eq!(buf.iter().filter(|b| **b == 0).count(), 1);
        assert_eq!(PostcardCodec.decode(&buf).unwrap(), frame);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            PostcardCodec.decode(&[0xff, 0xff, 0xff, 0x00]),
            Err(Error::Postcard(_))
        ));
    }
}
