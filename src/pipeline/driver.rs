//! The per-frame control loop.
//!
//! Each iteration captures one frame, runs inference on it, then publishes telemetry
//! and the (optionally annotated) image before the next capture. Only the frame
//! source can end the loop on its own; transport failures are logged and the loop
//! keeps going.

use crate::{
    error::SourceError,
    inference::InferenceAdapter,
    pipeline::{
        display::{DisplayControl, LocalDisplay},
        overlay,
        source::FrameSource,
    },
    shutdown::StopSignal,
    telemetry,
    transport::{ImagePublisher, SendOutcome, TelemetryPublisher},
    types::{Frame, InferenceResult},
};

#[derive(Debug)]
pub enum StopReason {
    SourceExhausted(SourceError),
    StopRequested,
    DisplayQuit,
    FrameLimit,
}

#[derive(Debug)]
pub struct RunSummary {
    pub frames: u64,
    pub telemetry_failures: u64,
    pub images_queued: u64,
    pub images_dropped: u64,
    pub reason: StopReason,
}

#[derive(Clone, Debug)]
pub struct DriverOptions {
    pub debug_overlay: bool,
    pub max_frames: Option<u64>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            debug_overlay: true,
            max_frames: None,
        }
    }
}

pub struct PipelineDriver<S, A> {
    source: S,
    adapter: A,
    image: ImagePublisher,
    telemetry: TelemetryPublisher,
    display: Option<Box<dyn LocalDisplay>>,
    options: DriverOptions,
    next_sequence: u64,
}

impl<S: FrameSource, A: InferenceAdapter> PipelineDriver<S, A> {
    pub fn new(
        source: S,
        adapter: A,
        image: ImagePublisher,
        telemetry: TelemetryPublisher,
        options: DriverOptions,
    ) -> Self {
        Self {
            source,
            adapter,
            image,
            telemetry,
            display: None,
            options,
            next_sequence: 0,
        }
    }

    pub fn with_display(mut self, display: Box<dyn LocalDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn image_publisher(&self) -> &ImagePublisher {
        &self.image
    }

    pub fn telemetry_publisher(&self) -> &TelemetryPublisher {
        &self.telemetry
    }

    /// Runs until the source ends, `stop` is raised, the display asks to quit, or the
    /// frame limit is reached.
    pub fn run(&mut self, stop: &StopSignal) -> RunSummary {
        let mut frames = 0u64;
        let mut telemetry_failures = 0u64;
        let mut images_queued = 0u64;
        let mut images_dropped = 0u64;

        let reason = loop {
            if stop.is_raised() {
                break StopReason::StopRequested;
            }
            if self.options.max_frames.is_some_and(|max| frames >= max) {
                break StopReason::FrameLimit;
            }

            let raw = match self.source.next_image() {
                Ok(raw) => raw,
                Err(err) => {
                    log::info!("frame source ended: {err}");
                    break StopReason::SourceExhausted(err);
                }
            };
            let frame = Frame::from_raw(raw, self.next_sequence);
            self.next_sequence += 1;
            frames += 1;

            let result = self.adapter.infer(&frame).unwrap_or_else(|err| {
                log::warn!("inference failed on frame {}: {err:?}", frame.sequence);
                InferenceResult::empty(frame.sequence)
            });
            if result.frame_id != frame.sequence {
                log::debug!(
                    "publishing result of frame {} with frame {}",
                    result.frame_id,
                    frame.sequence
                );
            }

            let mut record =
                telemetry::encode(&result, frame.width, frame.height, telemetry::now_ms());
            record.frame_id = frame.sequence;
            if let Err(err) = self.telemetry.send(&record) {
                telemetry_failures += 1;
                log::warn!("{err}");
            }

            let shown = if self.options.debug_overlay && !result.is_empty() {
                overlay::annotate(&frame, &result)
            } else {
                frame
            };

            match self.image.send(&shown) {
                SendOutcome::Queued => images_queued += 1,
                SendOutcome::Dropped => images_dropped += 1,
                SendOutcome::NoPeer | SendOutcome::EncodeFailed => {}
            }

            if let Some(display) = self.display.as_mut() {
                if display.show(&shown) == DisplayControl::Quit {
                    break StopReason::DisplayQuit;
                }
            }
        };

        let summary = RunSummary {
            frames,
            telemetry_failures,
            images_queued,
            images_dropped,
            reason,
        };
        log::info!(
            "pipeline stopped after {} frames ({:?}); telemetry failures: {}, images queued: {}, dropped: {}",
            summary.frames,
            summary.reason,
            summary.telemetry_failures,
            summary.images_queued,
            summary.images_dropped
        );
        summary
    }
}
