/*!
 * Frame Codec
 * Length-prefixed bincode frames for connections and manager channels
 *
 * # Wire Format
 * - 4-byte big-endian payload length
 * - bincode payload
 */

use super::errors::TransportError;
use super::limits::FRAME_HEADER_LEN;
use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, Read, Write};

/// Serialize a value with bincode
#[inline]
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    bincode::serialize(value).map_err(|e| TransportError::Codec(e.to_string()))
}

/// Deserialize a value produced by [`encode`]
#[inline]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
    bincode::deserialize(bytes).map_err(|e| TransportError::Codec(e.to_string()))
}

/// Write one raw frame
pub fn write_frame<W: Write>(
    writer: &mut W,
    payload: &[u8],
    max_len: usize,
) -> Result<(), TransportError> {
    if payload.len() > max_len || payload.len() > u32::MAX as usize {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            limit: max_len,
        });
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);

    writer.write_all(&buf).map_err(io_to_transport)?;
    writer.flush().map_err(io_to_transport)
}

/// Read one raw frame
///
/// A clean end of stream before the header yields `TransportError::Closed`.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, TransportError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).map_err(io_to_transport)?;

    let len = (&header[..]).get_u32() as usize;
    if len > max_len {
        return Err(TransportError::FrameTooLarge {
            len,
            limit: max_len,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(io_to_transport)?;
    Ok(payload)
}

/// Encode and write a value as one frame
#[inline]
pub fn send_value<W: Write, T: Serialize>(
    writer: &mut W,
    value: &T,
    max_len: usize,
) -> Result<(), TransportError> {
    write_frame(writer, &encode(value)?, max_len)
}

/// Read and decode one frame
#[inline]
pub fn recv_value<R: Read, T: DeserializeOwned>(
    reader: &mut R,
    max_len: usize,
) -> Result<T, TransportError> {
    decode(&read_frame(reader, max_len)?)
}

pub(crate) fn io_to_transport(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::Closed,
        _ => TransportError::Io(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let mut wire = Vec::new();
        send_value(&mut wire, &(7u32, "seven".to_string()), 1024).unwrap();
        assert_eq!(&wire[..4], &[0, 0, 0, (wire.len() - 4) as u8]);

        let mut cursor = Cursor::new(wire);
        let value: (u32, String) = recv_value(&mut cursor, 1024).unwrap();
        assert_eq!(value, (7, "seven".to_string()));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut wire = Vec::new();
        let err = write_frame(&mut wire, &[0u8; 32], 16).unwrap_err();
        assert_eq!(err, TransportError::FrameTooLarge { len: 32, limit: 16 });

        let mut wire = Vec::new();
        write_frame(&mut wire, &[0u8; 32], 64).unwrap();
        let err = read_frame(&mut Cursor::new(wire), 16).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { len: 32, .. }));
    }

    #[test]
    fn test_eof_is_closed() {
        let err = read_frame(&mut Cursor::new(Vec::<u8>::new()), 16).unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    proptest::proptest! {
        #[test]
        fn prop_back_to_back_frames_keep_boundaries(
            frames in proptest::collection::vec(
                proptest::collection::vec(proptest::num::u8::ANY, 0..64),
                0..16,
            )
        ) {
            let mut wire = Vec::new();
            for frame in &frames {
                write_frame(&mut wire, frame, 64).unwrap();
            }

            let mut cursor = Cursor::new(wire);
            for frame in &frames {
                proptest::prop_assert_eq!(&read_frame(&mut cursor, 64).unwrap(), frame);
            }
            proptest::prop_assert_eq!(read_frame(&mut cursor, 64), Err(TransportError::Closed));
        }
    }
}
