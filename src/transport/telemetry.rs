use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    error::{MAX_DATAGRAM_LEN, RelayError, Result},
    telemetry::TelemetryRecord,
};

/// Fire-and-forget UDP sender: one JSON record per datagram to a fixed peer.
///
/// The socket is non-blocking, so a full send buffer shows up as a failed send
/// rather than a stalled caller.
pub struct TelemetryPublisher {
    socket: UdpSocket,
    peer: SocketAddr,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl TelemetryPublisher {
    pub fn connect(peer: impl ToSocketAddrs) -> Result<Self> {
        let peer = peer.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "telemetry address resolved to nothing")
        })?;
        let bind_addr: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        log::info!("telemetry channel sending to {peer}");

        Ok(Self {
            socket,
            peer,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn send(&self, record: &TelemetryRecord) -> Result<()> {
        let outcome = self.try_send(record);
        match outcome {
            Ok(()) => self.sent.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        outcome
    }

    fn try_send(&self, record: &TelemetryRecord) -> Result<()> {
        let payload = record.to_json()?;
        if payload.len() > MAX_DATAGRAM_LEN {
            return Err(RelayError::DatagramTooLarge { len: payload.len() });
        }
        self.socket
            .send_to(&payload, self.peer)
            .map_err(|source| RelayError::TelemetrySend {
                peer: self.peer,
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::telemetry::PixelLandmark;

    #[test]
    fn delivers_one_record_per_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let publisher = TelemetryPublisher::connect(receiver.local_addr().unwrap()).unwrap();

        for frame_id in 0..3 {
            let record = TelemetryRecord {
                frame_id,
                timestamp_ms: 1_000 + frame_id,
                ..TelemetryRecord::default()
            };
            publisher.send(&record).unwrap();
        }

        let mut buf = [0u8; 2048];
        for frame_id in 0..3 {
            let (n, _) = receiver.recv_from(&mut buf).unwrap();
            let record = TelemetryRecord::from_json(&buf[..n]).unwrap();
            assert_eq!(record.frame_id, frame_id);
            assert!(record.poses.is_empty());
        }
        assert_eq!(publisher.sent(), 3);
    }

    #[test]
    fn unreachable_peer_is_not_fatal() {
        // Grab a free port and release it so nothing listens there.
        let port = UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let publisher = TelemetryPublisher::connect(("127.0.0.1", port)).unwrap();
        for frame_id in 0..50 {
            let record = TelemetryRecord {
                frame_id,
                ..TelemetryRecord::default()
            };
            let _ = publisher.send(&record);
        }
        assert_eq!(publisher.sent() + publisher.failed(), 50);
    }

    #[test]
    fn oversized_record_is_rejected() {
        let publisher = TelemetryPublisher::connect("127.0.0.1:9").unwrap();
        let record = TelemetryRecord {
            poses: vec![vec![PixelLandmark::default(); 4_000]],
            ..TelemetryRecord::default()
        };
        assert!(matches!(
            publisher.send(&record),
            Err(RelayError::DatagramTooLarge { .. })
        ));
        assert_eq!(publisher.failed(), 1);
    }
}
