//! Length-prefixed JSON framing.
//!
//! Every message on the wire is a 4-byte **little-endian** `u32` length prefix
//! followed by that many bytes of UTF-8 JSON payload.
//!
//! ```text
//! +----------------+------------------+
//! | Length (4B LE) | JSON Payload     |
//! +----------------+------------------+
//! ```

use std::io::{ErrorKind, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TransportError;

/// Largest accepted payload (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

fn checked_len(len: usize) -> Result<u32, TransportError> {
    let too_large = TransportError::PayloadTooLarge {
        size: len,
        max: MAX_MESSAGE_SIZE,
    };
    if len > MAX_MESSAGE_SIZE {
        return Err(too_large);
    }
    u32::try_from(len).map_err(|_| too_large)
}

/// Serialize `msg` into one contiguous frame, prefix included.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let mut frame = vec![0u8; PREFIX_LEN];
    serde_json::to_writer(&mut frame, msg)?;
    let len = checked_len(frame.len() - PREFIX_LEN)?;
    frame[..PREFIX_LEN].copy_from_slice(&len.to_le_bytes());
    Ok(frame)
}

/// Read one raw payload. `Ok(None)` on EOF at a frame boundary.
fn read_frame(reader: &mut impl Read) -> Result<Option<Vec<u8>>, TransportError> {
    let mut prefix = [0u8; PREFIX_LEN];
    if let Err(e) = reader.read_exact(&mut prefix) {
        return match e.kind() {
            ErrorKind::UnexpectedEof => Ok(None),
            _ => Err(e.into()),
        };
    }
    let len = u32::from_le_bytes(prefix) as usize;
    checked_len(len)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Read a length-prefixed JSON message from a stream.
///
/// Returns `Ok(None)` if the stream reaches EOF before any bytes are read
/// (clean disconnect).
pub fn read_message<T: DeserializeOwned>(
    reader: &mut impl Read,
) -> Result<Option<T>, TransportError> {
    read_frame(reader)?
        .map(|payload| serde_json::from_slice(&payload).map_err(TransportError::from))
        .transpose()
}

/// Write a length-prefixed JSON message with a single write, then flush.
pub fn write_message<T: Serialize>(
    writer: &mut impl Write,
    msg: &T,
) -> Result<(), TransportError> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ObservationMessage, Request, Response};
    use std::io::Cursor;

    fn observation() -> ObservationMessage {
        ObservationMessage {
            time: 0.5,
            state: vec![1.0, 2.0],
            input: vec![0.0],
            mode: 0,
        }
    }

    #[test]
    fn length_prefix_is_little_endian() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Request::Close).unwrap();
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);
    }

    #[test]
    fn encoded_frame_matches_written_bytes() {
        let request = Request::Observation {
            observation: observation(),
        };
        let frame = encode_frame(&request).unwrap();
        let mut written = Vec::new();
        write_message(&mut written, &request).unwrap();
        assert_eq!(frame, written);
        let payload: serde_json::Value = serde_json::from_slice(&frame[4..]).unwrap();
        assert_eq!(payload["type"], "observation");
    }

    #[test]
    fn eof_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let result: Result<Option<Request>, _> = read_message(&mut cursor);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Request::Close).unwrap();
        buf.truncate(buf.len() - 1);
        let mut cursor = Cursor::new(buf);
        let result: Result<Option<Request>, _> = read_message(&mut cursor);
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[test]
    fn payload_too_large_is_rejected() {
        let fake_len = (u32::try_from(MAX_MESSAGE_SIZE).unwrap() + 1).to_le_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        let result: Result<Option<Request>, _> = read_message(&mut cursor);
        assert!(matches!(
            result.unwrap_err(),
            TransportError::PayloadTooLarge { .. }
        ));
    }

    #[test]
    fn multiple_messages_in_sequence() {
        let mut buf = Vec::new();
        write_message(
            &mut buf,
            &Request::Observation {
                observation: observation(),
            },
        )
        .unwrap();
        write_message(&mut buf, &Response::ResetAck).unwrap();

        let mut cursor = Cursor::new(&buf);
        let first: Request = read_message(&mut cursor).unwrap().unwrap();
        let second: Response = read_message(&mut cursor).unwrap().unwrap();
        match first {
            Request::Observation { observation: obs } => assert_eq!(obs, observation()),
            other => panic!("expected Observation, got {other:?}"),
        }
        assert!(matches!(second, Response::ResetAck));
        let rest: Option<Request> = read_message(&mut cursor).unwrap();
        assert!(rest.is_none());
    }

    #[test]
    fn invalid_json_returns_error() {
        let garbage = b"not json at all";
        let mut data = u32::try_from(garbage.len()).unwrap().to_le_bytes().to_vec();
        data.extend_from_slice(garbage);
        let mut cursor = Cursor::new(&data);
        let result: Result<Option<Request>, _> = read_message(&mut cursor);
        assert!(matches!(result, Err(TransportError::Json(_))));
    }
}
