pub mod config;
pub mod error;
pub mod inference;
pub mod model_download;
pub mod pipeline;
pub mod shutdown;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use error::{RelayError, Result, SourceError};
