use std::time::Instant;

/// Pixels handed over by a [`FrameSource`](crate::pipeline::FrameSource) before the
/// driver stamps them with a sequence number.
#[derive(Clone, Debug)]
pub struct RawImage {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RawImage {
    pub fn expected_len(width: u32, height: u32) -> usize {
        (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(3)
    }
}

/// One captured RGB8 image, owned by the driver for a single iteration.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn from_raw(raw: RawImage, sequence: u64) -> Self {
        Self {
            rgb: raw.rgb,
            width: raw.width,
            height: raw.height,
            sequence,
            captured_at: Instant::now(),
        }
    }
}

/// A landmark in normalized detector space, `[0, 1]` on both image axes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub name: String,
    pub score: f32,
}

impl Category {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Output of a pose detector: one landmark list per detected person.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseSet {
    pub poses: Vec<Vec<Landmark>>,
}

impl PoseSet {
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

/// Output of a gesture recognizer: per hand, the ranked gesture categories and the
/// hand landmarks they were computed from. Both lists are indexed by hand.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GestureSet {
    pub gestures: Vec<Vec<Category>>,
    pub hands: Vec<Vec<Landmark>>,
}

impl GestureSet {
    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty() && self.hands.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Detection {
    Pose(PoseSet),
    Gesture(GestureSet),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceResult {
    pub frame_id: u64,
    pub detections: Vec<Detection>,
}

impl InferenceResult {
    pub fn empty(frame_id: u64) -> Self {
        Self {
            frame_id,
            detections: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.iter().all(|detection| match detection {
            Detection::Pose(set) => set.is_empty(),
            Detection::Gesture(set) => set.is_empty(),
        })
    }
}
