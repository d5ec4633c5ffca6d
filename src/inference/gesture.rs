//! Rule-based hand gesture classification from 21 hand landmarks.
//!
//! Each finger is scored as extended, half bent or folded from joint distances and
//! segment straightness, then the finger pattern is mapped onto the canned gesture
//! names consumers already know (`Open_Palm`, `Victory`, ...).

use crate::types::{Category, Landmark};

pub const HAND_LANDMARKS: usize = 21;

pub const NONE: &str = "None";
pub const CLOSED_FIST: &str = "Closed_Fist";
pub const OPEN_PALM: &str = "Open_Palm";
pub const POINTING_UP: &str = "Pointing_Up";
pub const THUMB_UP: &str = "Thumb_Up";
pub const THUMB_DOWN: &str = "Thumb_Down";
pub const VICTORY: &str = "Victory";
pub const I_LOVE_YOU: &str = "ILoveYou";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerState {
    Extended,
    HalfBent,
    Folded,
}

/// Classifies one hand. `aspect` is frame width over height, used to undo the
/// per-axis normalization before measuring angles and distances.
pub fn classify_hand(landmarks: &[Landmark], aspect: f32, confidence: f32) -> Category {
    if landmarks.len() < HAND_LANDMARKS {
        return Category::new(NONE, 0.0);
    }

    let points: Vec<[f32; 3]> = landmarks
        .iter()
        .map(|lm| [lm.x * aspect, lm.y, lm.z * aspect])
        .collect();
    let normalized = normalize_landmarks(&points);
    let states = [
        classify_thumb(&normalized),
        classify_finger(&normalized, [5, 6, 7, 8]),
        classify_finger(&normalized, [9, 10, 11, 12]),
        classify_finger(&normalized, [13, 14, 15, 16]),
        classify_finger(&normalized, [17, 18, 19, 20]),
    ];

    let name = gesture_name(&states, &points);
    let score = if name == NONE { 0.0 } else { confidence.clamp(0.0, 1.0) };
    Category::new(name, score)
}

fn gesture_name(states: &[FingerState; 5], points: &[[f32; 3]]) -> &'static str {
    use FingerState::*;

    let ext = |i: usize| states[i] == Extended;
    let folded = |i: usize| states[i] != Extended;
    let [thumb, index, middle, ring, pinky] = [0, 1, 2, 3, 4];

    if states.iter().all(|s| *s == Extended) {
        OPEN_PALM
    } else if states[1..].iter().all(|s| *s == Folded) && states[thumb] != Extended {
        CLOSED_FIST
    } else if ext(thumb) && ext(index) && ext(pinky) && folded(middle) && folded(ring) {
        I_LOVE_YOU
    } else if ext(index) && ext(middle) && folded(ring) && folded(pinky) {
        VICTORY
    } else if ext(index) && folded(middle) && folded(ring) && folded(pinky) && !ext(thumb) {
        POINTING_UP
    } else if ext(thumb) && states[1..].iter().all(|s| *s != Extended) {
        // image y grows downwards
        if points[4][1] < points[0][1] {
            THUMB_UP
        } else {
            THUMB_DOWN
        }
    } else {
        NONE
    }
}

fn normalize_landmarks(points: &[[f32; 3]]) -> Vec<[f32; 3]> {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;

    for [x, y, _z] in points {
        min_x = min_x.min(*x);
        min_y = min_y.min(*y);
        max_x = max_x.max(*x);
        max_y = max_y.max(*y);
    }

    let span = (max_x - min_x).max(max_y - min_y).max(1e-3);
    points
        .iter()
        .map(|[x, y, z]| [(*x - min_x) / span, (*y - min_y) / span, *z / span])
        .collect()
}

fn classify_finger(points: &[[f32; 3]], idx: [usize; 4]) -> FingerState {
    let wrist = points[0];
    let mcp = points[idx[0]];
    let pip = points[idx[1]];
    let dip = points[idx[2]];
    let tip = points[idx[3]];

    let dist_tip = distance3(tip, wrist);
    let dist_pip = distance3(pip, wrist);
    let dist_mcp = distance3(mcp, wrist);

    let straightness = average_straightness(sub(pip, mcp), sub(dip, pip), sub(tip, dip));
    let extension = dist_tip - dist_pip;
    let reach = dist_tip - dist_mcp;

    if extension > 0.15 && straightness > 0.40 && reach > 0.06 {
        FingerState::Extended
    } else if extension < 0.08 || straightness < 0.18 || reach < 0.05 {
        FingerState::Folded
    } else {
        FingerState::HalfBent
    }
}

fn classify_thumb(points: &[[f32; 3]]) -> FingerState {
    let wrist = points[0];
    let cmc = points[1];
    let mcp = points[2];
    let ip = points[3];
    let tip = points[4];

    let dist_tip_wrist = distance3(tip, wrist);
    let spread = distance3(tip, points[5]).min(distance3(tip, points[17]));
    let straightness = average_straightness(sub(mcp, cmc), sub(ip, mcp), sub(tip, ip));
    let extension = dist_tip_wrist - distance3(ip, wrist);
    let reach = dist_tip_wrist - distance3(mcp, wrist);

    if spread < 0.25 && (straightness < 0.28 || reach < 0.15) {
        FingerState::Folded
    } else if dist_tip_wrist > 0.30 && straightness > 0.28 && extension > 0.08 {
        FingerState::Extended
    } else {
        FingerState::HalfBent
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn distance3(a: [f32; 3], b: [f32; 3]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn average_straightness(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> f32 {
    let ab = dot(normalize(a), normalize(b));
    let bc = dot(normalize(b), normalize(c));
    ((ab + bc) / 2.0).clamp(-1.0, 1.0)
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len < 1e-5 {
        [0.0, 0.0, 0.0]
    } else {
        [v[0] / len, v[1] / len, v[2] / len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Upright right hand, palm facing the camera, wrist at the bottom.
    /// `extended[i]` picks straight or curled geometry per finger, thumb first.
    fn synthetic_hand(extended: [bool; 5]) -> Vec<Landmark> {
        let mut pts = vec![Landmark::new(0.5, 0.9, 0.0); HAND_LANDMARKS];

        // thumb: 1..=4, out to the side
        let thumb = if extended[0] {
            [(0.42, 0.84), (0.36, 0.78), (0.31, 0.72), (0.26, 0.66)]
        } else {
            [(0.45, 0.85), (0.43, 0.79), (0.47, 0.76), (0.51, 0.76)]
        };
        for (i, (x, y)) in thumb.into_iter().enumerate() {
            pts[1 + i] = Landmark::new(x, y, 0.0);
        }

        let bases = [0.42f32, 0.48, 0.54, 0.60];
        for (finger, base_x) in bases.into_iter().enumerate() {
            let first = 5 + finger * 4;
            pts[first] = Landmark::new(base_x, 0.70, 0.0);
            let chain = if extended[finger + 1] {
                [(base_x, 0.60), (base_x, 0.52), (base_x, 0.45)]
            } else {
                [(base_x, 0.64), (base_x + 0.01, 0.70), (base_x, 0.74)]
            };
            for (j, (x, y)) in chain.into_iter().enumerate() {
                pts[first + 1 + j] = Landmark::new(x, y, 0.0);
            }
        }
        pts
    }

    #[test]
    fn open_hand_is_open_palm() {
        let cat = classify_hand(&synthetic_hand([true; 5]), 1.0, 0.8);
        assert_eq!(cat.name, OPEN_PALM);
        assert_eq!(cat.score, 0.8);
    }

    #[test]
    fn curled_hand_is_fist() {
        let cat = classify_hand(&synthetic_hand([false; 5]), 1.0, 0.8);
        assert_eq!(cat.name, CLOSED_FIST);
    }

    #[test]
    fn two_fingers_is_victory() {
        let cat = classify_hand(&synthetic_hand([false, true, true, false, false]), 1.0, 0.6);
        assert_eq!(cat.name, VICTORY);
    }

    #[test]
    fn too_few_landmarks_is_none() {
        let cat = classify_hand(&[Landmark::default(); 5], 1.0, 0.9);
        assert_eq!(cat, Category::new(NONE, 0.0));
    }
}
