use crate::types::{Detection, Frame, InferenceResult, Landmark};

pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

const POSE_LINE_COLOR: [u8; 3] = [245, 117, 66];
const POSE_POINT_COLOR: [u8; 3] = [245, 66, 230];
const HAND_LINE_COLOR: [u8; 3] = [56, 189, 248];
const HAND_POINT_COLOR: [u8; 3] = [248, 113, 113];
const LINE_THICKNESS: i32 = 3;
const POINT_RADIUS: i32 = 4;

/// Returns a copy of `frame` with every detected skeleton drawn on top.
pub fn annotate(frame: &Frame, result: &InferenceResult) -> Frame {
    let mut annotated = frame.clone();
    let mut canvas = Canvas {
        buffer: &mut annotated.rgb,
        width: frame.width,
        height: frame.height,
    };

    for detection in &result.detections {
        match detection {
            Detection::Pose(set) => {
                for pose in &set.poses {
                    canvas.skeleton(pose, POSE_CONNECTIONS, POSE_LINE_COLOR, POSE_POINT_COLOR);
                }
            }
            Detection::Gesture(set) => {
                for hand in &set.hands {
                    canvas.skeleton(hand, HAND_CONNECTIONS, HAND_LINE_COLOR, HAND_POINT_COLOR);
                }
            }
        }
    }

    annotated
}

struct Canvas<'a> {
    buffer: &'a mut [u8],
    width: u32,
    height: u32,
}

impl Canvas<'_> {
    fn skeleton(
        &mut self,
        landmarks: &[Landmark],
        connections: &[(usize, usize)],
        line_color: [u8; 3],
        point_color: [u8; 3],
    ) {
        let points: Vec<(i32, i32)> = landmarks
            .iter()
            .map(|lm| {
                (
                    (lm.x * self.width as f32) as i32,
                    (lm.y * self.height as f32) as i32,
                )
            })
            .collect();

        for &(a, b) in connections {
            if let (Some(&pa), Some(&pb)) = (points.get(a), points.get(b)) {
                self.line(pa, pb, line_color);
            }
        }
        for &center in &points {
            self.circle(center, POINT_RADIUS, point_color);
        }
    }

    fn line(&mut self, p0: (i32, i32), p1: (i32, i32), color: [u8; 3]) {
        let (mut x0, mut y0) = p0;
        let (x1, y1) = p1;
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = (LINE_THICKNESS.max(1) - 1) / 2;

        loop {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if ox.abs() + oy.abs() <= radius {
                        self.put_pixel(x0 + ox, y0 + oy, color);
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn circle(&mut self, center: (i32, i32), radius: i32, color: [u8; 3]) {
        let (cx, cy) = center;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 3]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy as usize) * (self.width as usize) + ux as usize) * 3;
        if idx + 2 < self.buffer.len() {
            self.buffer[idx..idx + 3].copy_from_slice(&color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GestureSet, PoseSet, RawImage};

    fn black_frame() -> Frame {
        Frame::from_raw(
            RawImage {
                rgb: vec![0; RawImage::expected_len(40, 20)],
                width: 40,
                height: 20,
            },
            0,
        )
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * frame.width + x) * 3) as usize;
        [frame.rgb[idx], frame.rgb[idx + 1], frame.rgb[idx + 2]]
    }

    #[test]
    fn draws_on_a_copy() {
        let frame = black_frame();
        let result = InferenceResult {
            frame_id: 0,
            detections: vec![Detection::Pose(PoseSet {
                poses: vec![vec![Landmark::new(0.5, 0.5, 0.0)]],
            })],
        };
        let annotated = annotate(&frame, &result);
        assert_eq!(pixel(&annotated, 20, 10), POSE_POINT_COLOR);
        assert!(frame.rgb.iter().all(|&v| v == 0));
    }

    #[test]
    fn connects_hand_joints() {
        let mut hand = vec![Landmark::new(0.1, 0.5, 0.0); 21];
        hand[1] = Landmark::new(0.9, 0.5, 0.0);
        let result = InferenceResult {
            frame_id: 0,
            detections: vec![Detection::Gesture(GestureSet {
                gestures: Vec::new(),
                hands: vec![hand],
            })],
        };
        let annotated = annotate(&black_frame(), &result);
        assert_eq!(pixel(&annotated, 20, 10), HAND_LINE_COLOR);
    }

    #[test]
    fn off_frame_points_are_clipped() {
        let result = InferenceResult {
            frame_id: 0,
            detections: vec![Detection::Pose(PoseSet {
                poses: vec![vec![Landmark::new(-3.0, 7.0, 0.0), Landmark::new(2.0, -1.0, 0.0)]],
            })],
        };
        let annotated = annotate(&black_frame(), &result);
        assert_eq!(annotated.rgb.len(), black_frame().rgb.len());
    }
}
