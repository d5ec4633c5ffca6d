use anyhow::{Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};

use super::{rgb_converter, source::FrameSource};
use crate::{error::SourceError, types::RawImage};

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

const MAX_CONSECUTIVE_DECODE_FAILURES: u32 = 5;

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Pulls frames synchronously from a local camera. The stream is closed on drop.
pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<Self> {
        let camera = build_camera(CameraIndex::Index(index))?;
        let format = camera.camera_format();
        log::info!(
            "camera {index} streaming {}x{} {:?} @ {} fps",
            format.width(),
            format.height(),
            format.format(),
            format.frame_rate()
        );
        Ok(Self { camera })
    }
}

impl FrameSource for CameraSource {
    fn next_image(&mut self) -> Result<RawImage, SourceError> {
        let mut failures = 0;
        loop {
            let buffer = self
                .camera
                .frame()
                .map_err(|err| SourceError::Unreadable(err.to_string()))?;

            match rgb_converter::convert_camera_frame(&buffer) {
                Ok(image) => return Ok(image),
                Err(err) => {
                    failures += 1;
                    log::warn!("failed to decode camera frame: {err:?}");
                    if failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                        return Err(SourceError::Unreadable(format!(
                            "{failures} consecutive undecodable frames"
                        )));
                    }
                }
            }
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err}");
        }
    }
}
