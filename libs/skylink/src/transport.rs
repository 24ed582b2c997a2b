use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::Error;

/// The byte-level link to a vehicle.
///
/// `recv` returns one complete encoded frame at a time, or `None` when nothing arrived before
/// `timeout` elapsed.
pub trait Transport: Send + Sync {
    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error>;
    fn send(&self, buf: &[u8]) -> Result<(), Error>;
    fn is_alive(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
        (**self).recv(timeout)
    }

    fn send(&self, buf: &[u8]) -> Result<(), Error> {
        (**self).send(buf)
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }
}

/// In-memory transport; the two halves of a pair are connected back to back.
pub struct ChannelTransport {
    tx: flume::Sender<Vec<u8>>,
    rx: flume::Receiver<Vec<u8>>,
    alive: Arc<AtomicBool>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, ChannelTransport) {
        let (a_tx, a_rx) = flume::unbounded();
        let (b_tx, b_rx) = flume::unbounded();
        let alive = Arc::new(AtomicBool::new(true));
        (
            ChannelTransport {
                tx: a_tx,
                rx: b_rx,
                alive: alive.clone(),
            },
            ChannelTransport {
                tx: b_tx,
                rx: a_rx,
                alive,
            },
        )
    }

    /// Simulates a link outage on both halves.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

impl Transport for ChannelTransport {
    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
        match self.rx.recv_timeout(timeout) {
            Ok(buf) => Ok(Some(buf)),
            Err(flume::RecvTimeoutError::Timeout) => Ok(None),
            Err(flume::RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }

    fn send(&self, buf: &[u8]) -> Result<(), Error> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| Error::Disconnected)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.tx.is_disconnected()
    }
}

/// One frame per datagram.
///
/// Created with [`UdpTransport::bind`] the transport answers whoever spoke last, and reports
/// itself dead until the first datagram arrives.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: Mutex<Option<SocketAddr>>,
    fixed_peer: bool,
}

const MAX_DATAGRAM: usize = 2048;

impl UdpTransport {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        Ok(UdpTransport {
            socket: UdpSocket::bind(addr)?,
            peer: Mutex::new(None),
            fixed_peer: false,
        })
    }

    pub fn connect(local: impl ToSocketAddrs, remote: SocketAddr) -> Result<Self, Error> {
        Ok(UdpTransport {
            socket: UdpSocket::bind(local)?,
            peer: Mutex::new(Some(remote)),
            fixed_peer: true,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut buf = [0u8; MAX_DATAGRAM];
        match self.socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                if !self.fixed_peer {
                    let mut peer = self.peer.lock();
                    if *peer != Some(addr) {
                        tracing::info!(%addr, "udp peer connected");
                        *peer = Some(addr);
                    }
                }
                Ok(Some(buf[..len].to_vec()))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn send(&self, buf: &[u8]) -> Result<(), Error> {
        let peer = (*self.peer.lock()).ok_or(Error::Disconnected)?;
        self.socket.send_to(buf, peer)?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.peer.lock().is_some()
    }
}

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

#[cfg(feature = "serial")]
mod serial {
    use std::io::{Read, Write};

    use serialport::SerialPort;

    use super::*;

    /// A serial device carrying 0-delimited frames.
    ///
    /// An I/O error marks the port dead; the next `recv` tries to reopen it.
    pub struct SerialTransport {
        path: String,
        baud: u32,
        reader: Mutex<Option<Box<dyn SerialPort>>>,
        writer: Mutex<Option<Box<dyn SerialPort>>>,
        pending: Mutex<Vec<u8>>,
        alive: AtomicBool,
    }

    impl SerialTransport {
        pub fn open(path: &str, baud: u32) -> Result<Self, Error> {
            let transport = SerialTransport {
                path: path.to_string(),
                baud,
                reader: Mutex::new(None),
                writer: Mutex::new(None),
                pending: Mutex::new(Vec::new()),
                alive: AtomicBool::new(false),
            };
            transport.reopen()?;
            Ok(transport)
        }

        fn reopen(&self) -> Result<(), Error> {
            let port = serialport::new(&self.path, self.baud)
                .timeout(Duration::from_millis(100))
                .open()?;
            let writer = port.try_clone()?;
            *self.reader.lock() = Some(port);
            *self.writer.lock() = Some(writer);
            self.pending.lock().clear();
            self.alive.store(true, Ordering::SeqCst);
            tracing::info!(path = %self.path, baud = self.baud, "opened serial port");
            Ok(())
        }

        fn mark_dead(&self, err: &io::Error) {
            if self.alive.swap(false, Ordering::SeqCst) {
                tracing::warn!(path = %self.path, ?err, "serial port lost");
            }
        }

        fn take_frame(&self) -> Option<Vec<u8>> {
            let mut pending = self.pending.lock();
            loop {
                let end = pending.iter().position(|b| *b == 0)?;
                let frame: Vec<u8> = pending.drain(..=end).collect();
                if frame.len() > 1 {
                    return Some(frame);
                }
            }
        }
    }

    impl Transport for SerialTransport {
        fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
            if let Some(frame) = self.take_frame() {
                return Ok(Some(frame));
            }
            if !self.is_alive() {
                if let Err(err) = self.reopen() {
                    std::thread::sleep(timeout);
                    return Err(err);
                }
            }
            let mut reader = self.reader.lock();
            let Some(port) = reader.as_mut() else {
                return Err(Error::Disconnected);
            };
            port.set_timeout(timeout)?;
            let mut chunk = [0u8; 512];
            match port.read(&mut chunk) {
                Ok(0) => Ok(None),
                Ok(len) => {
                    self.pending.lock().extend_from_slice(&chunk[..len]);
                    Ok(self.take_frame())
                }
                Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(None),
                Err(err) => {
                    self.mark_dead(&err);
                    Err(err.into())
                }
            }
        }

        fn send(&self, buf: &[u8]) -> Result<(), Error> {
            let mut writer = self.writer.lock();
            let port = writer.as_mut().ok_or(Error::Disconnected)?;
            port.write_all(buf).inspect_err(|err| self.mark_dead(err))?;
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_pair() {
        let (a, b) = ChannelTransport::pair();
        a.send(&[1, 2, 0]).unwrap();
        assert_eq!(
            b.recv(Duration::from_millis(10)).unwrap(),
            Some(vec![1, 2, 0])
        );
        assert_eq!(a.recv(Duration::from_millis(1)).unwrap(), None);
        b.set_alive(false);
        assert!(!a.is_alive());
        drop(b);
        assert!(matches!(
            a.recv(Duration::from_millis(1)),
            Err(Error::Disconnected)
        ));
    }

    #[test]
    fn test_udp_learns_peer() {
        let server = UdpTransport::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let client = UdpTransport::connect("127.0.0.1:0", addr).unwrap();
        assert!(!server.is_alive());
        assert!(matches!(server.send(&[1, 0]), Err(Error::Disconnected)));

        client.send(&[7, 0]).unwrap();
        let got = server.recv(Duration::from_secs(1)).unwrap();
        assert_eq!(got, Some(vec![7, 0]));
        assert!(server.is_alive());

        server.send(&[9, 0]).unwrap();
        assert_eq!(
            client.recv(Duration::from_secs(1)).unwrap(),
            Some(vec![9, 0])
        );
    }
}
