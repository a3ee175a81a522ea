/*!
 * Connection Delegate
 *
 * Message endpoint over a byte stream. Each message is one length-prefixed
 * frame (see `core::codec`). `poll` reads ahead one whole frame and keeps it
 * for the next `recv_bytes`.
 */

use super::stream::{Address, Stream};
use crate::core::backoff::poll_until;
use crate::core::codec;
use crate::core::config::BridgeConfig;
use crate::core::errors::{BridgeError, BridgeResult, DelegateError, TransportError};
use crate::sync::traits::ConnectionOps;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

struct Reader {
    stream: Stream,
    pending: Option<Vec<u8>>,
}

pub struct Connection {
    reader: Option<Mutex<Reader>>,
    writer: Option<Mutex<Stream>>,
    /// Separate handle so `close` never waits behind a blocked reader
    control: Stream,
    closed: AtomicBool,
    max_frame_len: usize,
}

impl Connection {
    pub(crate) fn from_stream(
        stream: Stream,
        readable: bool,
        writable: bool,
    ) -> BridgeResult<Self> {
        let reader = if readable {
            Some(Mutex::new(Reader {
                stream: stream.try_clone()?,
                pending: None,
            }))
        } else {
            None
        };
        let writer = if writable {
            Some(Mutex::new(stream.try_clone()?))
        } else {
            None
        };

        Ok(Self {
            reader,
            writer,
            control: stream,
            closed: AtomicBool::new(false),
            max_frame_len: BridgeConfig::global().max_frame_len,
        })
    }

    /// Open a client connection to a listener
    pub fn connect(address: &Address) -> BridgeResult<Self> {
        let timeout = BridgeConfig::global().connect_timeout;
        let stream = Stream::connect(address, timeout)
            .map_err(|e| DelegateError::Io(format!("connect to {}: {}", address, e)))?;
        debug!(%address, "Connection opened");
        Self::from_stream(stream, true, true)
    }

    #[inline]
    pub fn readable(&self) -> bool {
        self.reader.is_some()
    }

    #[inline]
    pub fn writable(&self) -> bool {
        self.writer.is_some()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Serialize `message` and send it as one frame
    pub fn send<M: Serialize>(&self, message: &M) -> BridgeResult<()> {
        let payload = codec::encode(message).map_err(frame_error)?;
        self.send_bytes(&payload)
    }

    pub fn recv<M: DeserializeOwned>(&self) -> BridgeResult<M> {
        let payload = self.recv_bytes()?;
        codec::decode(&payload).map_err(frame_error)
    }

    /// Shut the stream down; blocked reads on either end see end of stream
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Already disconnected by the peer is fine
            let _ = self.control.shutdown();
            debug!("Connection closed");
        }
    }

    fn check_open(&self) -> BridgeResult<()> {
        if self.closed() {
            return Err(DelegateError::Closed("connection is closed".into()).into());
        }
        Ok(())
    }

    fn reader(&self) -> BridgeResult<&Mutex<Reader>> {
        self.check_open()?;
        self.reader
            .as_ref()
            .ok_or_else(|| {
                DelegateError::InvalidOperation("connection is write-only".into()).into()
            })
    }

    fn writer(&self) -> BridgeResult<&Mutex<Stream>> {
        self.check_open()?;
        self.writer
            .as_ref()
            .ok_or_else(|| DelegateError::InvalidOperation("connection is read-only".into()).into())
    }
}

impl ConnectionOps for Connection {
    fn send_bytes(&self, payload: &[u8]) -> BridgeResult<()> {
        let mut writer = self.writer()?.lock();
        codec::write_frame(&mut *writer, payload, self.max_frame_len).map_err(frame_error)
    }

    fn recv_bytes(&self) -> BridgeResult<Vec<u8>> {
        let mut reader = self.reader()?.lock();
        if let Some(frame) = reader.pending.take() {
            return Ok(frame);
        }
        codec::read_frame(&mut reader.stream, self.max_frame_len).map_err(frame_error)
    }

    fn poll(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        let mut guard = self.reader()?.lock();
        let reader = &mut *guard;
        if reader.pending.is_some() {
            return Ok(true);
        }

        let first = match reader.stream.read_byte_within(timeout) {
            Ok(Some(byte)) => byte,
            Ok(None) => return Ok(false),
            Err(e) => return Err(frame_error(codec::io_to_transport(e))),
        };

        let prefix = [first];
        let mut rest = (&prefix[..]).chain(&mut reader.stream);
        let frame = codec::read_frame(&mut rest, self.max_frame_len).map_err(frame_error)?;
        reader.pending = Some(frame);
        Ok(true)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("readable", &self.readable())
            .field("writable", &self.writable())
            .field("closed", &self.closed())
            .finish()
    }
}

/// A connected pair of endpoints
///
/// With `duplex = false` the first end only receives and the second only sends.
pub fn pipe(duplex: bool) -> BridgeResult<(Connection, Connection)> {
    let (a, b) = Stream::pair()?;
    if duplex {
        Ok((Connection::from_stream(a, true, true)?, Connection::from_stream(b, true, true)?))
    } else {
        Ok((Connection::from_stream(a, true, false)?, Connection::from_stream(b, false, true)?))
    }
}

/// Indices of the connections that have a message ready
///
/// Waits up to `timeout` for at least one; an empty result means none became
/// ready in time.
pub fn wait(connections: &[&Connection], timeout: Option<Duration>) -> BridgeResult<Vec<usize>> {
    if connections.is_empty() {
        return Ok(Vec::new());
    }

    let ready = poll_until(timeout, || -> BridgeResult<Option<Vec<usize>>> {
        let mut ready = Vec::new();
        for (index, conn) in connections.iter().enumerate() {
            if conn.poll(Some(Duration::ZERO))? {
                ready.push(index);
            }
        }
        Ok((!ready.is_empty()).then_some(ready))
    })?;
    Ok(ready.unwrap_or_default())
}

/// Frame failures on a user connection are the connection's own errors
fn frame_error(err: TransportError) -> BridgeError {
    match err {
        TransportError::Closed => DelegateError::Closed("connection closed by peer".into()).into(),
        TransportError::Codec(reason) => DelegateError::InvalidArgument(reason).into(),
        other => DelegateError::Io(other.to_string()).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_duplex_pipe_messages() {
        let (a, b) = pipe(true).unwrap();

        let mut scores = HashMap::new();
        scores.insert("alice".to_string(), vec![1u32, 2]);
        a.send(&scores).unwrap();
        assert_eq!(b.recv::<HashMap<String, Vec<u32>>>().unwrap(), scores);

        b.send_bytes(b"raw").unwrap();
        assert_eq!(a.recv_bytes().unwrap(), b"raw".to_vec());
    }

    #[test]
    fn test_poll_reads_ahead() {
        let (a, b) = pipe(true).unwrap();
        assert_eq!(a.poll(Some(Duration::ZERO)), Ok(false));
        assert_eq!(a.poll(Some(Duration::from_millis(10))), Ok(false));

        b.send(&42u64).unwrap();
        assert_eq!(a.poll(None), Ok(true));
        assert_eq!(a.poll(Some(Duration::ZERO)), Ok(true));
        assert_eq!(a.recv::<u64>(), Ok(42));
        assert_eq!(a.poll(Some(Duration::ZERO)), Ok(false));
    }

    #[test]
    fn test_simplex_pipe_directions() {
        let (reader, writer) = pipe(false).unwrap();
        assert!(reader.send(&1u8).is_err());
        assert!(writer.recv::<u8>().is_err());

        writer.send(&"one way").unwrap();
        assert_eq!(reader.recv::<String>().unwrap(), "one way");
    }

    #[test]
    fn test_close_and_peer_eof() {
        let (a, b) = pipe(true).unwrap();
        a.close();
        assert!(a.closed());
        assert!(matches!(
            a.send_bytes(b"x").unwrap_err().delegate(),
            Some(DelegateError::Closed(_))
        ));
        assert!(matches!(
            b.recv_bytes().unwrap_err().delegate(),
            Some(DelegateError::Closed(_))
        ));
    }

    #[test]
    fn test_wait_reports_ready_connections() {
        let (a1, b1) = pipe(true).unwrap();
        let (a2, b2) = pipe(true).unwrap();
        assert_eq!(wait(&[&a1, &a2], Some(Duration::from_millis(10))), Ok(vec![]));

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            b2.send(&"ready").unwrap();
            b2
        });
        assert_eq!(wait(&[&a1, &a2], Some(Duration::from_secs(2))), Ok(vec![1]));
        assert_eq!(a2.recv::<String>().unwrap(), "ready");
        drop(b1);
        drop(sender.join());
    }
}
