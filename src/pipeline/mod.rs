#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod display;
pub mod driver;
pub mod overlay;
#[cfg(feature = "camera-nokhwa")]
pub mod rgb_converter;
pub mod source;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CameraSource, available_cameras};
pub use display::{DisplayControl, LocalDisplay, ThroughputDisplay};
pub use driver::{DriverOptions, PipelineDriver, RunSummary, StopReason};
pub use source::{FrameSource, ScriptedSource, SyntheticSource};
