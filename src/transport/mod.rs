pub mod image;
pub mod receiver;
pub mod telemetry;

pub use image::{AcceptPolicy, ImageChannelConfig, ImagePublisher, PeerState, SendOutcome};
pub use receiver::{ImageStreamReader, TelemetryReceiver};
pub use telemetry::TelemetryPublisher;
