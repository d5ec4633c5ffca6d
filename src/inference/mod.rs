pub mod common;
pub mod gesture;
pub mod ort;

use std::thread;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::types::{Detection, Frame, GestureSet, InferenceResult, PoseSet};

pub trait PoseDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame, frame_index: u64) -> Result<PoseSet>;
}

pub trait GestureRecognizer: Send + 'static {
    fn recognize(&mut self, frame: &Frame, frame_index: u64) -> Result<GestureSet>;
}

impl<F> PoseDetector for F
where
    F: FnMut(&Frame, u64) -> Result<PoseSet> + Send + 'static,
{
    fn detect(&mut self, frame: &Frame, frame_index: u64) -> Result<PoseSet> {
        self(frame, frame_index)
    }
}

/// What the driver calls once per frame.
pub trait InferenceAdapter {
    fn infer(&mut self, frame: &Frame) -> Result<InferenceResult>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunningMode {
    /// Detectors run inline; each result belongs to the frame it was computed from.
    #[default]
    Video,
    /// Detectors run on a worker thread and the driver picks up whatever finished
    /// since the last frame. Busy workers skip frames.
    LiveStream,
}

struct Detectors {
    pose: Option<Box<dyn PoseDetector>>,
    gesture: Option<Box<dyn GestureRecognizer>>,
}

impl Detectors {
    /// A failing detector contributes nothing for this frame; the other still runs.
    fn run(&mut self, frame: &Frame) -> InferenceResult {
        let mut result = InferenceResult::empty(frame.sequence);

        if let Some(pose) = self.pose.as_mut() {
            match pose.detect(frame, frame.sequence) {
                Ok(set) => result.detections.push(Detection::Pose(set)),
                Err(err) => log::warn!("pose detection failed on frame {}: {err:?}", frame.sequence),
            }
        }
        if let Some(gesture) = self.gesture.as_mut() {
            match gesture.recognize(frame, frame.sequence) {
                Ok(set) => result.detections.push(Detection::Gesture(set)),
                Err(err) => log::warn!(
                    "gesture recognition failed on frame {}: {err:?}",
                    frame.sequence
                ),
            }
        }

        result
    }
}

/// Runs an optional pose detector and an optional gesture recognizer per frame.
/// Pose detections come before gesture detections in every result.
pub struct DetectorAdapter {
    inner: Mode,
}

enum Mode {
    Video(Detectors),
    LiveStream(LiveStreamWorker),
}

impl DetectorAdapter {
    pub fn new(
        mode: RunningMode,
        pose: Option<Box<dyn PoseDetector>>,
        gesture: Option<Box<dyn GestureRecognizer>>,
    ) -> Result<Self> {
        let detectors = Detectors { pose, gesture };
        let inner = match mode {
            RunningMode::Video => Mode::Video(detectors),
            RunningMode::LiveStream => Mode::LiveStream(LiveStreamWorker::spawn(detectors)?),
        };
        Ok(Self { inner })
    }

    pub fn running_mode(&self) -> RunningMode {
        match self.inner {
            Mode::Video(_) => RunningMode::Video,
            Mode::LiveStream(_) => RunningMode::LiveStream,
        }
    }
}

impl InferenceAdapter for DetectorAdapter {
    fn infer(&mut self, frame: &Frame) -> Result<InferenceResult> {
        match &mut self.inner {
            Mode::Video(detectors) => Ok(detectors.run(frame)),
            Mode::LiveStream(worker) => Ok(worker.exchange(frame)),
        }
    }
}

struct LiveStreamWorker {
    frame_tx: Option<Sender<Frame>>,
    result_rx: Receiver<InferenceResult>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LiveStreamWorker {
    fn spawn(mut detectors: Detectors) -> Result<Self> {
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let (result_tx, result_rx) = bounded::<InferenceResult>(1);
        let stale_rx = result_rx.clone();

        let handle = thread::Builder::new()
            .name("live-stream-inference".into())
            .spawn(move || {
                while let Some(frame) = recv_latest_frame(&frame_rx) {
                    let result = detectors.run(&frame);
                    replace_latest(&result_tx, &stale_rx, result);
                }
            })?;

        Ok(Self {
            frame_tx: Some(frame_tx),
            result_rx,
            handle: Some(handle),
        })
    }

    /// Submits `frame` if the worker is idle and returns the newest finished result,
    /// or an empty one tagged with `frame` when nothing new is ready.
    fn exchange(&mut self, frame: &Frame) -> InferenceResult {
        if let Some(tx) = self.frame_tx.as_ref() {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::debug!("inference worker busy, frame {} skipped", frame.sequence)
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::warn!("inference worker exited");
                    self.frame_tx = None;
                }
            }
        }

        let mut newest = None;
        while let Ok(result) = self.result_rx.try_recv() {
            newest = Some(result);
        }
        newest.unwrap_or_else(|| InferenceResult::empty(frame.sequence))
    }
}

impl Drop for LiveStreamWorker {
    fn drop(&mut self) {
        self.frame_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Publishes `value` into a single-slot channel, evicting an uncollected older value.
fn replace_latest<T>(tx: &Sender<T>, rx: &Receiver<T>, value: T) {
    let mut pending = value;
    loop {
        match tx.try_send(pending) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(back)) => {
                let _ = rx.try_recv();
                pending = back;
            }
        }
    }
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}
