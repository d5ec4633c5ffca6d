use std::{ffi::OsString, path::PathBuf, time::Duration};

use anyhow::{Result, bail, ensure};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::{
    inference::{
        RunningMode,
        ort::{HAND_MODEL, POSE_MODEL},
    },
    transport::{AcceptPolicy, ImageChannelConfig},
};

pub const DEFAULT_IMAGE_ADDR: &str = "127.0.0.1:9000";
pub const DEFAULT_TELEMETRY_ADDR: &str = "127.0.0.1:9001";
pub const DEFAULT_ACCEPT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_IMAGE_QUEUE: usize = 2;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_SYNTHETIC_WIDTH: u32 = 640;
pub const DEFAULT_SYNTHETIC_HEIGHT: u32 = 480;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Synthetic,
}

impl Default for SourceKind {
    fn default() -> Self {
        if cfg!(feature = "camera-nokhwa") {
            SourceKind::Camera
        } else {
            SourceKind::Synthetic
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub image_addr: String,
    pub telemetry_addr: String,
    pub accept_timeout: Duration,
    pub image: ImageChannelConfig,
    pub running_mode: RunningMode,
    pub source: SourceKind,
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub max_frames: Option<u64>,
    pub pose_model: PathBuf,
    pub hand_model: PathBuf,
    pub pose_enabled: bool,
    pub hands_enabled: bool,
    pub show_image: bool,
    pub debug_overlay: bool,
    pub list_cameras: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            image_addr: DEFAULT_IMAGE_ADDR.to_owned(),
            telemetry_addr: DEFAULT_TELEMETRY_ADDR.to_owned(),
            accept_timeout: Duration::from_millis(DEFAULT_ACCEPT_TIMEOUT_MS),
            image: ImageChannelConfig {
                jpeg_quality: DEFAULT_JPEG_QUALITY,
                queue_depth: DEFAULT_IMAGE_QUEUE,
                write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
                policy: AcceptPolicy::Once,
            },
            running_mode: RunningMode::Video,
            source: SourceKind::default(),
            camera_index: 0,
            width: DEFAULT_SYNTHETIC_WIDTH,
            height: DEFAULT_SYNTHETIC_HEIGHT,
            max_frames: None,
            pose_model: POSE_MODEL.default_path(),
            hand_model: HAND_MODEL.default_path(),
            pose_enabled: true,
            hands_enabled: true,
            show_image: true,
            debug_overlay: true,
            list_cameras: false,
        }
    }
}

pub fn command() -> Command {
    Command::new("pose-relay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Streams annotated camera frames over TCP and pose/gesture landmarks over UDP.")
        .arg(
            Arg::new("image-addr")
                .long("image-addr")
                .value_name("HOST:PORT")
                .help("Address the annotated image stream listens on [default: 127.0.0.1:9000]"),
        )
        .arg(
            Arg::new("telemetry-addr")
                .long("telemetry-addr")
                .value_name("HOST:PORT")
                .help("Address landmark telemetry is sent to [default: 127.0.0.1:9001]"),
        )
        .arg(
            Arg::new("accept-timeout-ms")
                .long("accept-timeout-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("How long to wait for the image consumer before streaming without it [default: 5000]"),
        )
        .arg(
            Arg::new("jpeg-quality")
                .long("jpeg-quality")
                .value_name("1-100")
                .value_parser(value_parser!(u8))
                .help("JPEG quality of the image stream [default: 80]"),
        )
        .arg(
            Arg::new("image-queue")
                .long("image-queue")
                .value_name("FRAMES")
                .value_parser(value_parser!(usize))
                .help("Encoded frames buffered for the image consumer before dropping [default: 2]"),
        )
        .arg(
            Arg::new("write-timeout-ms")
                .long("write-timeout-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Socket write timeout for the image consumer [default: 200]"),
        )
        .arg(
            Arg::new("reconnect")
                .long("reconnect")
                .action(ArgAction::SetTrue)
                .help("Accept a new image consumer after the previous one disconnects"),
        )
        .arg(
            Arg::new("running-mode")
                .long("running-mode")
                .value_parser(["video", "live-stream"])
                .help("Run detectors inline (video) or on a worker thread (live-stream) [default: video]"),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .value_parser(["camera", "synthetic"])
                .help("Where frames come from"),
        )
        .arg(
            Arg::new("camera-index")
                .long("camera-index")
                .value_name("INDEX")
                .value_parser(value_parser!(u32))
                .help("Camera to open [default: 0]"),
        )
        .arg(
            Arg::new("list-cameras")
                .long("list-cameras")
                .action(ArgAction::SetTrue)
                .help("Print the available cameras and exit"),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .value_parser(value_parser!(u32))
                .help("Synthetic frame width [default: 640]"),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .value_parser(value_parser!(u32))
                .help("Synthetic frame height [default: 480]"),
        )
        .arg(
            Arg::new("max-frames")
                .long("max-frames")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Stop after N frames"),
        )
        .arg(
            Arg::new("pose-model")
                .long("pose-model")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Pose landmark ONNX model, downloaded when missing"),
        )
        .arg(
            Arg::new("hand-model")
                .long("hand-model")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Hand landmark ONNX model, downloaded when missing"),
        )
        .arg(
            Arg::new("no-pose")
                .long("no-pose")
                .action(ArgAction::SetTrue)
                .help("Disable body pose detection"),
        )
        .arg(
            Arg::new("no-hands")
                .long("no-hands")
                .action(ArgAction::SetTrue)
                .help("Disable hand gesture recognition"),
        )
        .arg(
            Arg::new("no-display")
                .long("no-display")
                .alias("not-show-image")
                .action(ArgAction::SetTrue)
                .help("Do not preview frames locally"),
        )
        .arg(
            Arg::new("no-debug-overlay")
                .long("no-debug-overlay")
                .alias("not-print-debug-image")
                .action(ArgAction::SetTrue)
                .help("Stream frames without drawn landmarks"),
        )
}

impl RelayConfig {
    /// Parses the process arguments. `--help` and usage errors exit through clap.
    pub fn from_args() -> Result<Self> {
        let config = Self::from_matches(&command().get_matches())?;
        config.validate()?;
        Ok(config)
    }

    pub fn try_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = command().try_get_matches_from(args)?;
        let config = Self::from_matches(&matches)?;
        config.validate()?;
        Ok(config)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = matches.get_one::<String>("image-addr") {
            config.image_addr = addr.clone();
        }
        if let Some(addr) = matches.get_one::<String>("telemetry-addr") {
            config.telemetry_addr = addr.clone();
        }
        if let Some(&ms) = matches.get_one::<u64>("accept-timeout-ms") {
            config.accept_timeout = Duration::from_millis(ms);
        }
        if let Some(&quality) = matches.get_one::<u8>("jpeg-quality") {
            config.image.jpeg_quality = quality;
        }
        if let Some(&depth) = matches.get_one::<usize>("image-queue") {
            config.image.queue_depth = depth;
        }
        if let Some(&ms) = matches.get_one::<u64>("write-timeout-ms") {
            config.image.write_timeout = Duration::from_millis(ms);
        }
        if matches.get_flag("reconnect") {
            config.image.policy = AcceptPolicy::Supervised;
        }
        if let Some(mode) = matches.get_one::<String>("running-mode") {
            config.running_mode = parse_running_mode(mode)?;
        }
        if let Some(source) = matches.get_one::<String>("source") {
            config.source = parse_source(source)?;
        }
        if let Some(&index) = matches.get_one::<u32>("camera-index") {
            config.camera_index = index;
        }
        if let Some(&width) = matches.get_one::<u32>("width") {
            config.width = width;
        }
        if let Some(&height) = matches.get_one::<u32>("height") {
            config.height = height;
        }
        config.max_frames = matches.get_one::<u64>("max-frames").copied();
        if let Some(path) = matches.get_one::<PathBuf>("pose-model") {
            config.pose_model = path.clone();
        }
        if let Some(path) = matches.get_one::<PathBuf>("hand-model") {
            config.hand_model = path.clone();
        }
        config.pose_enabled = !matches.get_flag("no-pose");
        config.hands_enabled = !matches.get_flag("no-hands");
        config.show_image = !matches.get_flag("no-display");
        config.debug_overlay = !matches.get_flag("no-debug-overlay");
        config.list_cameras = matches.get_flag("list-cameras");

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=100).contains(&self.image.jpeg_quality),
            "jpeg quality must be between 1 and 100, got {}",
            self.image.jpeg_quality
        );
        ensure!(self.image.queue_depth >= 1, "image queue must hold at least one frame");
        ensure!(
            !self.image.write_timeout.is_zero(),
            "image write timeout must be at least 1 ms"
        );
        ensure!(
            self.width > 0 && self.height > 0,
            "frame size must be non-zero, got {}x{}",
            self.width,
            self.height
        );
        if self.source == SourceKind::Camera && !cfg!(feature = "camera-nokhwa") {
            bail!("camera support was not compiled in; use --source synthetic");
        }
        Ok(())
    }
}

pub fn parse_running_mode(value: &str) -> Result<RunningMode> {
    match value {
        "video" => Ok(RunningMode::Video),
        "live-stream" | "live_stream" => Ok(RunningMode::LiveStream),
        other => bail!("unknown running mode `{other}`"),
    }
}

fn parse_source(value: &str) -> Result<SourceKind> {
    match value {
        "camera" => Ok(SourceKind::Camera),
        "synthetic" => Ok(SourceKind::Synthetic),
        other => bail!("unknown frame source `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RelayConfig> {
        RelayConfig::try_from_args(std::iter::once("pose-relay").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_consumer_ports() {
        let config = parse(&["--source", "synthetic"]).unwrap();
        assert_eq!(config.image_addr, "127.0.0.1:9000");
        assert_eq!(config.telemetry_addr, "127.0.0.1:9001");
        assert_eq!(config.accept_timeout, Duration::from_secs(5));
        assert_eq!(config.image.jpeg_quality, 80);
        assert_eq!(config.image.queue_depth, 2);
        assert_eq!(config.image.policy, AcceptPolicy::Once);
        assert_eq!(config.running_mode, RunningMode::Video);
        assert!(config.show_image && config.debug_overlay);
        assert!(config.pose_enabled && config.hands_enabled);
        assert_eq!(config.max_frames, None);
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--source",
            "synthetic",
            "--image-addr",
            "0.0.0.0:7000",
            "--jpeg-quality",
            "55",
            "--reconnect",
            "--running-mode",
            "live-stream",
            "--max-frames",
            "10",
            "--no-hands",
        ])
        .unwrap();
        assert_eq!(config.image_addr, "0.0.0.0:7000");
        assert_eq!(config.image.jpeg_quality, 55);
        assert_eq!(config.image.policy, AcceptPolicy::Supervised);
        assert_eq!(config.running_mode, RunningMode::LiveStream);
        assert_eq!(config.max_frames, Some(10));
        assert!(config.pose_enabled);
        assert!(!config.hands_enabled);
    }

    #[test]
    fn legacy_flag_names_still_work() {
        let config = parse(&[
            "--source",
            "synthetic",
            "--not-show-image",
            "--not-print-debug-image",
        ])
        .unwrap();
        assert!(!config.show_image);
        assert!(!config.debug_overlay);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--source", "synthetic", "--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--source", "synthetic", "--jpeg-quality", "101"]).is_err());
        assert!(parse(&["--source", "synthetic", "--image-queue", "0"]).is_err());
        assert!(parse(&["--source", "synthetic", "--write-timeout-ms", "0"]).is_err());
        assert!(parse(&["--running-mode", "batch"]).is_err());
    }

    #[test]
    fn running_mode_names() {
        assert_eq!(parse_running_mode("video").unwrap(), RunningMode::Video);
        assert_eq!(
            parse_running_mode("live_stream").unwrap(),
            RunningMode::LiveStream
        );
        assert!(parse_running_mode("image").is_err());
    }
}
