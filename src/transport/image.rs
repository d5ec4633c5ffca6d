//! TCP image channel: one consumer, JPEG payloads behind a 4-byte big-endian length.
//!
//! Encoding happens on the caller's thread; the socket writes happen on a dedicated
//! writer thread fed by a bounded queue, so a slow consumer costs dropped frames
//! instead of stalling inference. Only the writer thread touches the socket, which
//! keeps each header+payload pair contiguous on the wire.
//!
//! With [`AcceptPolicy::Once`] the channel accepts at most one consumer, once. If
//! nobody usable connects in time, or the consumer goes away, every later send is a no-op
//! for the rest of the process. [`AcceptPolicy::Supervised`] keeps accepting instead.

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use image::{
    ExtendedColorType, ImageError,
    codecs::jpeg::JpegEncoder,
    error::{ParameterError, ParameterErrorKind},
};

use crate::{
    error::{RelayError, Result},
    shutdown::StopSignal,
    types::{Frame, RawImage},
};

pub const FRAME_HEADER_LEN: usize = 4;
/// Largest payload `read_frame` accepts from a header.
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const WRITER_IDLE_TICK: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcceptPolicy {
    #[default]
    Once,
    Supervised,
}

#[derive(Clone, Debug)]
pub struct ImageChannelConfig {
    pub jpeg_quality: u8,
    pub queue_depth: usize,
    pub write_timeout: Duration,
    pub policy: AcceptPolicy,
}

impl Default for ImageChannelConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            queue_depth: 2,
            write_timeout: Duration::from_millis(200),
            policy: AcceptPolicy::Once,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    Waiting,
    Connected,
    Disconnected,
}

impl PeerState {
    fn load(cell: &AtomicU8) -> Self {
        match cell.load(Ordering::SeqCst) {
            0 => PeerState::Waiting,
            1 => PeerState::Connected,
            _ => PeerState::Disconnected,
        }
    }

    fn store(self, cell: &AtomicU8) {
        let raw = match self {
            PeerState::Waiting => 0,
            PeerState::Connected => 1,
            PeerState::Disconnected => 2,
        };
        cell.store(raw, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// The writer was still busy with earlier frames.
    Dropped,
    NoPeer,
    EncodeFailed,
}

#[derive(Debug, Default)]
pub struct ImageChannelStats {
    pub written: AtomicU64,
    pub dropped: AtomicU64,
}

pub struct ImagePublisher {
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    config: ImageChannelConfig,
    state: Arc<AtomicU8>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ImageChannelStats>,
    tx: Option<Sender<Vec<u8>>>,
    writer: Option<thread::JoinHandle<()>>,
    accept_attempted: bool,
}

impl ImagePublisher {
    pub fn bind(addr: impl ToSocketAddrs, config: ImageChannelConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!("image channel listening on {local_addr}");

        Ok(Self {
            local_addr,
            listener: Some(listener),
            config,
            state: Arc::new(AtomicU8::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ImageChannelStats::default()),
            tx: None,
            writer: None,
            accept_attempted: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> PeerState {
        PeerState::load(&self.state)
    }

    pub fn stats(&self) -> &ImageChannelStats {
        &self.stats
    }

    /// Waits up to `timeout` for a consumer. Only the first call does anything; later
    /// calls report whether a consumer is currently connected.
    pub fn accept(&mut self, timeout: Duration, stop: &StopSignal) -> Result<bool> {
        if self.accept_attempted {
            return Ok(self.state() == PeerState::Connected);
        }
        self.accept_attempted = true;

        let Some(listener) = self.listener.take() else {
            return Ok(false);
        };

        let keep_listening = self.config.policy == AcceptPolicy::Supervised;
        let deadline = Instant::now() + timeout;
        let stream = loop {
            match listener.accept() {
                Ok((stream, peer)) => match configure_stream(&stream, self.config.write_timeout) {
                    Ok(()) => {
                        log::info!("image consumer connected from {peer}");
                        break Some(stream);
                    }
                    Err(err) => {
                        log::warn!("failed to configure image consumer {peer}: {err}");
                        if !keep_listening {
                            break None;
                        }
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    log::warn!("image channel accept failed: {err}");
                    if !keep_listening {
                        break None;
                    }
                }
            }
            if stop.is_raised() || Instant::now() >= deadline {
                break None;
            }
            thread::sleep(ACCEPT_POLL_INTERVAL);
        };

        let connected = stream.is_some();

        if !connected && !keep_listening {
            log::info!("no usable image consumer; image channel disabled for this run");
            PeerState::Disconnected.store(&self.state);
            return Ok(false);
        }

        if connected {
            PeerState::Connected.store(&self.state);
        } else {
            log::info!("no image consumer yet; accepting in the background");
        }

        let (tx, rx) = bounded(self.config.queue_depth.max(1));
        let writer = ChannelWriter {
            rx,
            stream,
            listener: keep_listening.then_some(listener),
            write_timeout: self.config.write_timeout,
            state: self.state.clone(),
            shutdown: self.shutdown.clone(),
            stats: self.stats.clone(),
        };
        let handle = thread::Builder::new()
            .name("image-channel-writer".into())
            .spawn(move || writer.run())?;

        self.tx = Some(tx);
        self.writer = Some(handle);
        Ok(connected)
    }

    /// Encodes `frame` and queues it for the consumer. Never blocks on the network.
    pub fn send(&self, frame: &Frame) -> SendOutcome {
        if self.tx.is_none() || self.state() != PeerState::Connected {
            return SendOutcome::NoPeer;
        }
        match encode_jpeg(frame, self.config.jpeg_quality) {
            Ok(payload) => self.send_payload(payload),
            Err(err) => {
                log::warn!("{err}");
                SendOutcome::EncodeFailed
            }
        }
    }

    /// Queues an already-encoded payload.
    pub fn send_payload(&self, payload: Vec<u8>) -> SendOutcome {
        let Some(tx) = self.tx.as_ref() else {
            return SendOutcome::NoPeer;
        };
        if self.state() != PeerState::Connected {
            return SendOutcome::NoPeer;
        }
        match tx.try_send(payload) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("image writer busy, frame dropped");
                SendOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => SendOutcome::NoPeer,
        }
    }
}

impl Drop for ImagePublisher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.tx.take();
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

struct ChannelWriter {
    rx: Receiver<Vec<u8>>,
    stream: Option<TcpStream>,
    listener: Option<TcpListener>,
    write_timeout: Duration,
    state: Arc<AtomicU8>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ImageChannelStats>,
}

impl ChannelWriter {
    fn run(mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let Some(stream) = self.stream.as_mut() else {
                if !self.accept_next() {
                    break;
                }
                continue;
            };

            match self.rx.recv_timeout(WRITER_IDLE_TICK) {
                Ok(payload) => {
                    if let Err(err) = write_frame(stream, &payload) {
                        log::warn!("image consumer dropped: {err}");
                        self.stream = None;
                        if self.listener.is_some() {
                            PeerState::Waiting.store(&self.state);
                        } else {
                            PeerState::Disconnected.store(&self.state);
                            break;
                        }
                    } else {
                        self.stats.written.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Polls the listener once. Returns false when there is nothing left to accept on.
    fn accept_next(&mut self) -> bool {
        let Some(listener) = self.listener.as_ref() else {
            return false;
        };

        // Frames queued while nobody was listening are stale.
        while self.rx.try_recv().is_ok() {}

        match listener.accept() {
            Ok((stream, peer)) => match configure_stream(&stream, self.write_timeout) {
                Ok(()) => {
                    log::info!("image consumer connected from {peer}");
                    self.stream = Some(stream);
                    PeerState::Connected.store(&self.state);
                }
                Err(err) => log::warn!("failed to configure consumer socket: {err}"),
            },
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                log::warn!("image channel accept failed: {err}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
        true
    }
}

fn configure_stream(stream: &TcpStream, write_timeout: Duration) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(write_timeout))?;
    Ok(())
}

/// Writes one framed message: the payload length as a big-endian `u32`, then the payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit the header", payload.len()),
        )
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Reads one framed message. Returns `Ok(None)` on a clean end of stream between
/// messages; a stream that ends mid-message is an `UnexpectedEof` error.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let encode_err = |source| RelayError::Encode {
        frame_id: frame.sequence,
        source,
    };

    if frame.rgb.len() != RawImage::expected_len(frame.width, frame.height)
        || frame.width == 0
        || frame.height == 0
    {
        return Err(encode_err(ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        ))));
    }

    let mut payload = Vec::with_capacity(frame.rgb.len() / 8);
    JpegEncoder::new_with_quality(&mut payload, quality.clamp(1, 100))
        .encode(&frame.rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(encode_err)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::types::RawImage;

    fn test_frame(sequence: u64) -> Frame {
        let (width, height) = (32, 24);
        let rgb = (0..RawImage::expected_len(width, height))
            .map(|i| (i % 251) as u8)
            .collect();
        Frame::from_raw(RawImage { rgb, width, height }, sequence)
    }

    fn loopback(config: ImageChannelConfig) -> ImagePublisher {
        ImagePublisher::bind("127.0.0.1:0", config).unwrap()
    }

    #[test]
    fn framing_round_trip() {
        let payloads = [vec![], vec![0xFFu8, 0xD8, 0x00], vec![7u8; 70_000]];
        let mut wire = Vec::new();
        for p in &payloads {
            write_frame(&mut wire, p).unwrap();
        }
        assert_eq!(&wire[..4], &[0, 0, 0, 0]);
        assert_eq!(&wire[4..8], &[0, 0, 0, 3]);

        let mut cursor = Cursor::new(wire);
        for p in &payloads {
            assert_eq!(read_frame(&mut cursor).unwrap().as_ref(), Some(p));
        }
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &[1, 2, 3, 4]).unwrap();
        wire.truncate(6);
        let err = read_frame(&mut Cursor::new(wire)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn encodes_frame_as_jpeg() {
        let payload = encode_jpeg(&test_frame(0), 75).unwrap();
        assert_eq!(&payload[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&payload).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let mut frame = test_frame(9);
        frame.rgb.pop();
        assert!(matches!(
            encode_jpeg(&frame, 80),
            Err(RelayError::Encode { frame_id: 9, .. })
        ));
    }

    #[test]
    fn sends_are_noops_without_consumer() {
        let mut publisher = loopback(ImageChannelConfig::default());
        let connected = publisher
            .accept(Duration::from_millis(30), &StopSignal::new())
            .unwrap();
        assert!(!connected);
        assert_eq!(publisher.state(), PeerState::Disconnected);

        let frame = test_frame(0);
        let started = Instant::now();
        for _ in 0..500 {
            assert_eq!(publisher.send(&frame), SendOutcome::NoPeer);
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        // The listener is released, so a late consumer is refused.
        assert!(TcpStream::connect(publisher.local_addr()).is_err());
    }

    #[test]
    fn stop_signal_cuts_accept_short() {
        let mut publisher = loopback(ImageChannelConfig::default());
        let stop = StopSignal::new();
        stop.raise();
        let started = Instant::now();
        assert!(!publisher.accept(Duration::from_secs(30), &stop).unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn consumer_reads_framed_jpeg() {
        let mut publisher = loopback(ImageChannelConfig::default());
        let mut client = TcpStream::connect(publisher.local_addr()).unwrap();
        assert!(
            publisher
                .accept(Duration::from_secs(5), &StopSignal::new())
                .unwrap()
        );

        for seq in 0..3 {
            let mut outcome = publisher.send(&test_frame(seq));
            while outcome == SendOutcome::Dropped {
                thread::sleep(Duration::from_millis(5));
                outcome = publisher.send(&test_frame(seq));
            }
            assert_eq!(outcome, SendOutcome::Queued);
            let payload = read_frame(&mut client).unwrap().unwrap();
            let decoded = image::load_from_memory(&payload).unwrap();
            assert_eq!(decoded.width(), 32);
        }
    }

    #[test]
    fn dropped_consumer_is_terminal_under_once_policy() {
        let mut publisher = loopback(ImageChannelConfig::default());
        let client = TcpStream::connect(publisher.local_addr()).unwrap();
        assert!(
            publisher
                .accept(Duration::from_secs(5), &StopSignal::new())
                .unwrap()
        );
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(5);
        while publisher.state() == PeerState::Connected && Instant::now() < deadline {
            let _ = publisher.send_payload(vec![0u8; 64 * 1024]);
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(publisher.state(), PeerState::Disconnected);
        assert_eq!(publisher.send(&test_frame(1)), SendOutcome::NoPeer);
    }

    #[test]
    fn supervised_policy_accepts_a_late_consumer() {
        let config = ImageChannelConfig {
            policy: AcceptPolicy::Supervised,
            ..ImageChannelConfig::default()
        };
        let mut publisher = loopback(config);
        assert!(
            !publisher
                .accept(Duration::from_millis(20), &StopSignal::new())
                .unwrap()
        );
        assert_eq!(publisher.state(), PeerState::Waiting);

        let mut client = TcpStream::connect(publisher.local_addr()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while publisher.state() != PeerState::Connected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(publisher.send_payload(vec![1, 2, 3]), SendOutcome::Queued);
        assert_eq!(read_frame(&mut client).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn oversized_header_is_rejected() {
        let mut wire = u32::MAX.to_be_bytes().to_vec();
        wire.extend_from_slice(&[0u8; 16]);
        let err = read_frame(&mut Cursor::new(wire)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unusable_consumer_socket_disables_channel() {
        // A zero write timeout is refused by the socket once a consumer connects.
        let config = ImageChannelConfig {
            write_timeout: Duration::ZERO,
            ..ImageChannelConfig::default()
        };
        let mut publisher = loopback(config);
        let _client = TcpStream::connect(publisher.local_addr()).unwrap();

        let connected = publisher
            .accept(Duration::from_secs(5), &StopSignal::new())
            .unwrap();
        assert!(!connected);
        assert_eq!(publisher.state(), PeerState::Disconnected);
        assert_eq!(publisher.send(&test_frame(0)), SendOutcome::NoPeer);
    }

    #[test]
    fn stalled_consumer_costs_frames_not_time() {
        let config = ImageChannelConfig {
            write_timeout: Duration::from_millis(50),
            ..ImageChannelConfig::default()
        };
        let mut publisher = loopback(config);
        // Connected but never reads.
        let _client = TcpStream::connect(publisher.local_addr()).unwrap();
        assert!(
            publisher
                .accept(Duration::from_secs(5), &StopSignal::new())
                .unwrap()
        );

        let started = Instant::now();
        let mut slowest = Duration::ZERO;
        while publisher.state() == PeerState::Connected
            && started.elapsed() < Duration::from_secs(20)
        {
            let payload = vec![0u8; 1024 * 1024];
            let send_started = Instant::now();
            let _ = publisher.send_payload(payload);
            slowest = slowest.max(send_started.elapsed());
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(publisher.state(), PeerState::Disconnected);
        assert!(publisher.stats().dropped.load(Ordering::Relaxed) > 0);
        assert!(slowest < Duration::from_millis(250));
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(publisher.send_payload(vec![1]), SendOutcome::NoPeer);
    }
}
