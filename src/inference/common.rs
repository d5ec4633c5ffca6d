use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, Landmark, RawImage};

#[derive(Clone, Debug, PartialEq)]
pub struct LetterboxInfo {
    pub input_size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    pub fn new(orig_w: u32, orig_h: u32, input_size: u32) -> Self {
        let scale = input_size as f32 / (orig_w.max(orig_h).max(1) as f32);
        let new_w = (orig_w as f32 * scale).round().max(1.0) as u32;
        let new_h = (orig_h as f32 * scale).round().max(1.0) as u32;
        Self {
            input_size,
            scale,
            pad_x: ((input_size as i64 - new_w as i64) / 2).max(0) as f32,
            pad_y: ((input_size as i64 - new_h as i64) / 2).max(0) as f32,
            orig_w,
            orig_h,
        }
    }

    fn resized_dims(&self) -> (u32, u32) {
        (
            (self.orig_w as f32 * self.scale).round().max(1.0) as u32,
            (self.orig_h as f32 * self.scale).round().max(1.0) as u32,
        )
    }

    /// Maps a point from model-input pixels back to normalized frame coordinates.
    /// Depth is expressed in the same unit as x.
    pub fn to_normalized(&self, x: f32, y: f32, z: f32) -> Landmark {
        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        Landmark {
            x: (x - self.pad_x) / self.scale / w,
            y: (y - self.pad_y) / self.scale / h,
            z: z / self.scale / w,
        }
    }
}

/// Letterboxes `frame` into a square `target_size` RGB tensor scaled to `[0, 1]`,
/// NHWC layout.
pub fn prepare_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    let expected_len = RawImage::expected_len(frame.width, frame.height);
    if frame.rgb.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgb.len(),
            expected_len
        ));
    }

    let letterbox = LetterboxInfo::new(frame.width, frame.height, target_size);
    let (new_w, new_h) = letterbox.resized_dims();

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgb.clone(),
        fir::PixelType::U8x3,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x3);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let side = target_size as usize;
    let mut canvas = vec![0u8; side * side * 3];
    let dst_stride = side * 3;
    let src_stride = new_w as usize * 3;
    let pad_x = letterbox.pad_x as usize;
    let pad_y = letterbox.pad_y as usize;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 3;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas.par_iter().map(|&v| v as f32 / 255.0).collect();
    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((input, letterbox))
}

/// Splits a flat model output into `count` landmarks of `stride` values each,
/// reading x, y, z from the first three.
pub fn decode_landmarks(
    flat: &[f32],
    count: usize,
    stride: usize,
    letterbox: &LetterboxInfo,
) -> Result<Vec<Landmark>> {
    if stride < 3 || flat.len() < count * stride {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            count * stride
        ));
    }

    Ok(flat
        .chunks_exact(stride)
        .take(count)
        .map(|chunk| letterbox.to_normalized(chunk[0], chunk[1], chunk[2]))
        .collect())
}
