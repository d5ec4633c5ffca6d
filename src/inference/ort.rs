use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{GestureRecognizer, PoseDetector, common, gesture};
use crate::{
    model_download::{ModelSpec, ensure_model_ready},
    types::{Frame, GestureSet, Landmark, PoseSet},
};

pub const POSE_INPUT_SIZE: u32 = 256;
pub const POSE_LANDMARKS: usize = 33;
/// x, y, z, visibility, presence
const POSE_LANDMARK_STRIDE: usize = 5;
const POSE_MIN_CONFIDENCE: f32 = 0.5;

pub const HAND_INPUT_SIZE: u32 = 224;
const HAND_MIN_CONFIDENCE: f32 = 0.5;

pub const POSE_MODEL: ModelSpec = ModelSpec {
    label: "pose landmarker",
    file_name: "pose_estimation_mediapipe_2023mar.onnx",
    url: "https://github.com/opencv/opencv_zoo/raw/main/models/pose_estimation_mediapipe/pose_estimation_mediapipe_2023mar.onnx",
};

pub const HAND_MODEL: ModelSpec = ModelSpec {
    label: "hand landmarker",
    file_name: "handpose_estimation_mediapipe_2023feb.onnx",
    url: "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/handpose_estimation_mediapipe_2023feb.onnx",
};

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

/// Single-person body landmarks on the letterboxed full frame.
pub struct OrtPoseDetector {
    session: Session,
}

impl OrtPoseDetector {
    pub fn load(model_path: &Path) -> Result<Self> {
        ensure_model_ready(&POSE_MODEL, model_path)?;
        let session = load_session(model_path)?;
        log::info!("pose landmarker ready using {}", model_path.display());
        Ok(Self { session })
    }
}

impl PoseDetector for OrtPoseDetector {
    fn detect(&mut self, frame: &Frame, _frame_index: u64) -> Result<PoseSet> {
        let (input, letterbox) = common::prepare_frame(frame, POSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run pose session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "pose model returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }
        let confidence = outputs[1]
            .try_extract_array::<f32>()
            .ok()
            .and_then(|arr| arr.iter().next().copied())
            .unwrap_or(0.0);
        if confidence < POSE_MIN_CONFIDENCE {
            return Ok(PoseSet::default());
        }

        let flat: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let landmarks =
            common::decode_landmarks(&flat, POSE_LANDMARKS, POSE_LANDMARK_STRIDE, &letterbox)?;
        Ok(PoseSet {
            poses: vec![landmarks],
        })
    }
}

/// Hand landmarks on the letterboxed full frame, classified into a canned gesture.
pub struct OrtHandRecognizer {
    session: Session,
}

impl OrtHandRecognizer {
    pub fn load(model_path: &Path) -> Result<Self> {
        ensure_model_ready(&HAND_MODEL, model_path)?;
        let session = load_session(model_path)?;
        log::info!("hand landmarker ready using {}", model_path.display());
        Ok(Self { session })
    }

    fn landmarks(&mut self, frame: &Frame) -> Result<Option<(Vec<Landmark>, f32)>> {
        let (input, letterbox) = common::prepare_frame(frame, HAND_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run hand session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("hand model returned no outputs"));
        }
        let confidence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        if confidence < HAND_MIN_CONFIDENCE {
            return Ok(None);
        }

        let flat: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flat, gesture::HAND_LANDMARKS, 3, &letterbox)?;
        Ok(Some((landmarks, confidence)))
    }
}

impl GestureRecognizer for OrtHandRecognizer {
    fn recognize(&mut self, frame: &Frame, _frame_index: u64) -> Result<GestureSet> {
        let Some((landmarks, confidence)) = self.landmarks(frame)? else {
            return Ok(GestureSet::default());
        };
        let aspect = frame.width as f32 / frame.height.max(1) as f32;
        let category = gesture::classify_hand(&landmarks, aspect, confidence);
        Ok(GestureSet {
            gestures: vec![vec![category]],
            hands: vec![landmarks],
        })
    }
}
