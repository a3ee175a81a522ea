/*!
 * Listener
 * Accepts connections on a TCP port or a Unix socket path
 */

use super::conn::Connection;
use super::stream::{Address, Stream};
use crate::core::errors::{BridgeResult, DelegateError};
use crate::sync::traits::Accept;
use std::fmt;
use std::net::TcpListener;
use tracing::{debug, info};

#[cfg(unix)]
use std::os::unix::net::UnixListener;

enum Socket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

pub struct Listener {
    socket: Socket,
    address: Address,
}

impl Listener {
    /// Bind to `address`; a TCP port of 0 picks a free one
    pub fn bind(address: &Address) -> BridgeResult<Self> {
        let (socket, address) = match address {
            Address::Tcp(addr) => {
                let listener = TcpListener::bind(addr)
                    .map_err(|e| DelegateError::Io(format!("bind {}: {}", addr, e)))?;
                let bound = listener.local_addr()?;
                (Socket::Tcp(listener), Address::Tcp(bound))
            }
            #[cfg(unix)]
            Address::Unix(path) => {
                let listener = UnixListener::bind(path)
                    .map_err(|e| DelegateError::Io(format!("bind {}: {}", path.display(), e)))?;
                (Socket::Unix(listener), Address::Unix(path.clone()))
            }
        };
        info!(%address, "Listener bound");
        Ok(Self { socket, address })
    }

    /// The bound address, with the real port for TCP
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl Accept for Listener {
    type Conn = Connection;

    fn accept(&self) -> BridgeResult<Connection> {
        let stream = match &self.socket {
            Socket::Tcp(listener) => {
                let (stream, peer) = listener.accept()?;
                stream.set_nodelay(true)?;
                debug!(%peer, "Accepted TCP connection");
                Stream::Tcp(stream)
            }
            #[cfg(unix)]
            Socket::Unix(listener) => {
                let (stream, _) = listener.accept()?;
                debug!("Accepted Unix connection");
                Stream::Unix(stream)
            }
        };
        Connection::from_stream(stream, true, true)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Address::Unix(path) = &self.address {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("address", &self.address).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::thread;

    #[test]
    fn test_tcp_listener_round_trip() {
        let loopback = Address::Tcp(SocketAddr::from(([127, 0, 0, 1], 0)));
        let listener = Listener::bind(&loopback).unwrap();
        let address = listener.address().clone();
        assert!(matches!(address, Address::Tcp(addr) if addr.port() != 0));

        let client = thread::spawn(move || {
            let conn = Connection::connect(&address).unwrap();
            conn.send(&vec![1u8, 2, 3]).unwrap();
            conn.recv::<String>().unwrap()
        });

        let server = listener.accept().unwrap();
        assert_eq!(server.recv::<Vec<u8>>().unwrap(), vec![1, 2, 3]);
        server.send(&"ack").unwrap();
        assert_eq!(client.join().unwrap(), "ack");
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_listener_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listener.sock");

        let listener = Listener::bind(&Address::Unix(path.clone())).unwrap();
        assert!(path.exists());
        let client = thread::spawn({
            let address = listener.address().clone();
            move || Connection::connect(&address).unwrap().send(&7i32).unwrap()
        });
        assert_eq!(listener.accept().unwrap().recv::<i32>().unwrap(), 7);
        client.join().unwrap();

        drop(listener);
        assert!(!path.exists());
    }
}
