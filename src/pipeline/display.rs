use std::time::{Duration, Instant};

use crate::types::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayControl {
    Continue,
    Quit,
}

/// Local preview of the annotated frames. Returning [`DisplayControl::Quit`] stops
/// the pipeline after the current frame.
pub trait LocalDisplay {
    fn show(&mut self, frame: &Frame) -> DisplayControl;
}

/// Headless preview: reports the frame rate once per interval.
pub struct ThroughputDisplay {
    interval: Duration,
    window_start: Instant,
    frames_in_window: u32,
    last_sequence: Option<u64>,
}

impl ThroughputDisplay {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            frames_in_window: 0,
            last_sequence: None,
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}

impl Default for ThroughputDisplay {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl LocalDisplay for ThroughputDisplay {
    fn show(&mut self, frame: &Frame) -> DisplayControl {
        self.frames_in_window += 1;
        self.last_sequence = Some(frame.sequence);

        let elapsed = self.window_start.elapsed();
        if elapsed >= self.interval {
            let fps = self.frames_in_window as f32 / elapsed.as_secs_f32();
            log::info!(
                "frame {} ({}x{}) at {fps:.1} fps",
                frame.sequence,
                frame.width,
                frame.height
            );
            self.window_start = Instant::now();
            self.frames_in_window = 0;
        }
        DisplayControl::Continue
    }
}
