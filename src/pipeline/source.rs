use std::collections::VecDeque;

use crate::{error::SourceError, types::RawImage};

/// Produces raw images for the driver, one per call. Blocking is allowed up to the
/// source's own timeout. Any error ends the pipeline.
pub trait FrameSource {
    fn next_image(&mut self) -> Result<RawImage, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_image(&mut self) -> Result<RawImage, SourceError> {
        (**self).next_image()
    }
}

/// Moving diagonal gradient, handy when no camera is around.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    remaining: Option<u64>,
    tick: u32,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            remaining: None,
            tick: 0,
        }
    }

    /// Stops with [`SourceError::Exhausted`] after `frames` images.
    pub fn limited(width: u32, height: u32, frames: u64) -> Self {
        Self {
            remaining: Some(frames),
            ..Self::new(width, height)
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_image(&mut self) -> Result<RawImage, SourceError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(SourceError::Exhausted);
            }
            *remaining -= 1;
        }

        let mut rgb = Vec::with_capacity(RawImage::expected_len(self.width, self.height));
        for y in 0..self.height {
            for x in 0..self.width {
                let v = x.wrapping_add(y).wrapping_add(self.tick);
                rgb.extend_from_slice(&[v as u8, (v >> 1) as u8, 255 - (v as u8)]);
            }
        }
        self.tick = self.tick.wrapping_add(4);

        Ok(RawImage {
            rgb,
            width: self.width,
            height: self.height,
        })
    }
}

/// Replays a fixed list of images, then reports exhaustion.
pub struct ScriptedSource {
    images: VecDeque<RawImage>,
}

impl ScriptedSource {
    pub fn new(images: impl IntoIterator<Item = RawImage>) -> Self {
        Self {
            images: images.into_iter().collect(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_image(&mut self) -> Result<RawImage, SourceError> {
        self.images.pop_front().ok_or(SourceError::Exhausted)
    }
}
