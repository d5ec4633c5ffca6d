use super::{PixelLandmark, TelemetryRecord};

/// Per-landmark velocity in pixels per second between two consecutive records.
///
/// The result follows the shape of `current`; landmarks without a counterpart at the
/// same pose/hand and landmark index in `previous` are dropped. Gestures are not
/// differentiable and come back empty.
pub fn landmark_velocity(
    previous: &TelemetryRecord,
    current: &TelemetryRecord,
) -> Option<TelemetryRecord> {
    if current.timestamp_ms <= previous.timestamp_ms {
        return None;
    }
    let dt = (current.timestamp_ms - previous.timestamp_ms) as f32 / 1_000.0;

    Some(TelemetryRecord {
        frame_id: current.frame_id,
        timestamp_ms: current.timestamp_ms,
        poses: diff_groups(&previous.poses, &current.poses, dt),
        gestures: Vec::new(),
        hands: diff_groups(&previous.hands, &current.hands, dt),
    })
}

fn diff_groups(
    previous: &[Vec<PixelLandmark>],
    current: &[Vec<PixelLandmark>],
    dt: f32,
) -> Vec<Vec<PixelLandmark>> {
    current
        .iter()
        .zip(previous)
        .map(|(now, before)| {
            now.iter()
                .zip(before)
                .map(|(a, b)| PixelLandmark {
                    x: (a.x - b.x) / dt,
                    y: (a.y - b.y) / dt,
                    z: (a.z - b.z) / dt,
                })
                .collect()
        })
        .collect()
}
