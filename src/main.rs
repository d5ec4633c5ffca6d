use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use pose_relay::{
    config::{RelayConfig, SourceKind},
    inference::{
        DetectorAdapter, GestureRecognizer, PoseDetector,
        ort::{OrtHandRecognizer, OrtPoseDetector},
    },
    pipeline::{
        DriverOptions, FrameSource, PipelineDriver, SyntheticSource, ThroughputDisplay,
    },
    shutdown::StopSignal,
    transport::{ImagePublisher, TelemetryPublisher},
};

fn main() -> Result<()> {
    env_logger::init();

    let config = RelayConfig::from_args()?;

    if config.list_cameras {
        return print_cameras();
    }

    let stop = StopSignal::new();
    stop.install_ctrlc_handler()?;

    let source = open_source(&config)?;
    let adapter = build_adapter(&config)?;

    let mut image = ImagePublisher::bind(config.image_addr.as_str(), config.image.clone())
        .with_context(|| format!("failed to bind image stream on {}", config.image_addr))?;
    if !image.accept(config.accept_timeout, &stop)? {
        log::warn!("streaming without an image consumer");
    }

    let telemetry = TelemetryPublisher::connect(config.telemetry_addr.as_str())
        .with_context(|| format!("failed to open telemetry socket for {}", config.telemetry_addr))?;

    let options = DriverOptions {
        debug_overlay: config.debug_overlay,
        max_frames: config.max_frames,
    };
    let mut driver = PipelineDriver::new(source, adapter, image, telemetry, options);
    if config.show_image {
        driver = driver.with_display(Box::new(ThroughputDisplay::default()));
    }

    let summary = driver.run(&stop);
    log::info!(
        "sent {} telemetry records ({} failed), {} images written",
        driver.telemetry_publisher().sent(),
        driver.telemetry_publisher().failed(),
        driver.image_publisher().stats().written.load(Ordering::Relaxed)
    );
    log::debug!("{summary:?}");
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn print_cameras() -> Result<()> {
    for camera in pose_relay::pipeline::available_cameras()? {
        println!("{}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn print_cameras() -> Result<()> {
    anyhow::bail!("camera support was not compiled in")
}

fn open_source(config: &RelayConfig) -> Result<Box<dyn FrameSource>> {
    match config.source {
        #[cfg(feature = "camera-nokhwa")]
        SourceKind::Camera => {
            let camera = pose_relay::pipeline::CameraSource::open(config.camera_index)
                .with_context(|| format!("failed to open camera {}", config.camera_index))?;
            Ok(Box::new(camera))
        }
        #[cfg(not(feature = "camera-nokhwa"))]
        SourceKind::Camera => anyhow::bail!("camera support was not compiled in"),
        SourceKind::Synthetic => {
            log::info!("using synthetic {}x{} frames", config.width, config.height);
            Ok(Box::new(SyntheticSource::new(config.width, config.height)))
        }
    }
}

fn build_adapter(config: &RelayConfig) -> Result<DetectorAdapter> {
    let pose: Option<Box<dyn PoseDetector>> = if config.pose_enabled {
        Some(Box::new(OrtPoseDetector::load(&config.pose_model)?))
    } else {
        None
    };
    let gesture: Option<Box<dyn GestureRecognizer>> = if config.hands_enabled {
        Some(Box::new(OrtHandRecognizer::load(&config.hand_model)?))
    } else {
        None
    };
    DetectorAdapter::new(config.running_mode, pose, gesture)
}
