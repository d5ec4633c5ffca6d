//! Wire record for the telemetry channel and the encoder that builds it from an
//! [`InferenceResult`].
//!
//! Landmarks leave the detectors in normalized space and are scaled to pixel space
//! here: `x * width`, `y * height`, and `z * width` (depth shares the x-axis unit).

pub mod velocity;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::{Category, Detection, InferenceResult, Landmark};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GestureCategory {
    pub category_name: String,
    pub score: f32,
}

/// One datagram on the telemetry channel. Every list is always present on the wire,
/// empty when nothing was detected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub frame_id: u64,
    pub timestamp_ms: u64,
    pub poses: Vec<Vec<PixelLandmark>>,
    pub gestures: Vec<Vec<GestureCategory>>,
    pub hands: Vec<Vec<PixelLandmark>>,
}

impl TelemetryRecord {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty() && self.gestures.is_empty() && self.hands.is_empty()
    }
}

pub fn scale_landmark(landmark: &Landmark, width: u32, height: u32) -> PixelLandmark {
    let w = width as f32;
    let h = height as f32;
    PixelLandmark {
        x: landmark.x * w,
        y: landmark.y * h,
        z: landmark.z * w,
    }
}

fn scale_all(landmarks: &[Landmark], width: u32, height: u32) -> Vec<PixelLandmark> {
    landmarks
        .iter()
        .map(|lm| scale_landmark(lm, width, height))
        .collect()
}

fn to_wire(categories: &[Category]) -> Vec<GestureCategory> {
    categories
        .iter()
        .map(|c| GestureCategory {
            category_name: c.name.clone(),
            score: c.score,
        })
        .collect()
}

/// Builds the wire record for `result`. Detections are flattened in the order the
/// adapter produced them. The record's `frame_id` is taken from `result`.
pub fn encode(
    result: &InferenceResult,
    width: u32,
    height: u32,
    timestamp_ms: u64,
) -> TelemetryRecord {
    let mut record = TelemetryRecord {
        frame_id: result.frame_id,
        timestamp_ms,
        ..TelemetryRecord::default()
    };

    for detection in &result.detections {
        match detection {
            Detection::Pose(set) => {
                record
                    .poses
                    .extend(set.poses.iter().map(|pose| scale_all(pose, width, height)));
            }
            Detection::Gesture(set) => {
                record
                    .gestures
                    .extend(set.gestures.iter().map(|hand| to_wire(hand)));
                record
                    .hands
                    .extend(set.hands.iter().map(|hand| scale_all(hand, width, height)));
            }
        }
    }

    record
}

/// Wall-clock milliseconds since the Unix epoch; `0` if the clock is before it.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
