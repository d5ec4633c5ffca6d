use std::io;

use thiserror::Error;

/// Largest UDP payload that fits in a single IPv4 datagram.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode frame {frame_id} as jpeg: {source}")]
    Encode {
        frame_id: u64,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to serialize telemetry record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("telemetry record is {len} bytes, datagram limit is {MAX_DATAGRAM_LEN}")]
    DatagramTooLarge { len: usize },

    #[error("telemetry datagram to {peer} failed: {source}")]
    TelemetrySend {
        peer: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no more frames")]
    Exhausted,

    #[error("source unreadable: {0}")]
    Unreadable(String),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
