//! Consumer side of both channels, used by `relay-monitor` and the tests.

use std::{
    io::{self, BufReader, Read},
    net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use super::image::read_frame;
use crate::telemetry::TelemetryRecord;

/// Yields framed JPEG payloads from the image channel in arrival order.
pub struct ImageStreamReader<R> {
    inner: R,
}

impl ImageStreamReader<BufReader<TcpStream>> {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(BufReader::new(stream)))
    }
}

impl<R: Read> ImageStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// `Ok(None)` once the publisher has closed the stream.
    pub fn next_payload(&mut self) -> io::Result<Option<Vec<u8>>> {
        read_frame(&mut self.inner)
    }
}

impl<R: Read> Iterator for ImageStreamReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_payload().transpose()
    }
}

pub struct TelemetryReceiver {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl TelemetryReceiver {
    pub fn bind(addr: impl ToSocketAddrs, timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(Self {
            socket,
            buf: vec![0u8; 64 * 1024],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Waits for the next decodable record. Malformed datagrams are skipped; `Ok(None)`
    /// means the receive timeout elapsed.
    pub fn recv(&mut self) -> io::Result<Option<TelemetryRecord>> {
        loop {
            let (len, from) = match self.socket.recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };
            match TelemetryRecord::from_json(&self.buf[..len]) {
                Ok(record) => return Ok(Some(record)),
                Err(err) => log::warn!("skipping malformed telemetry from {from}: {err}"),
            }
        }
    }
}
