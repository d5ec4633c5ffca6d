use std::{
    net::UdpSocket,
    sync::atomic::Ordering,
    thread,
    time::{Duration, Instant},
};

use pose_relay::{
    inference::{DetectorAdapter, PoseDetector, RunningMode},
    pipeline::{DriverOptions, PipelineDriver, ScriptedSource, StopReason},
    shutdown::StopSignal,
    telemetry::PixelLandmark,
    transport::{
        ImageChannelConfig, ImagePublisher, ImageStreamReader, TelemetryPublisher,
        TelemetryReceiver,
    },
    types::{Frame, Landmark, PoseSet, RawImage},
};

fn gray_frames(count: usize, width: u32, height: u32) -> Vec<RawImage> {
    (0..count)
        .map(|_| RawImage {
            rgb: vec![90; RawImage::expected_len(width, height)],
            width,
            height,
        })
        .collect()
}

/// Reports a single landmark at the image centre on the third frame only.
fn pose_on_third_frame() -> Box<dyn PoseDetector> {
    Box::new(|frame: &Frame, _index: u64| -> anyhow::Result<PoseSet> {
        let poses = if frame.sequence == 2 {
            vec![vec![Landmark::new(0.5, 0.5, 0.1)]]
        } else {
            Vec::new()
        };
        Ok(PoseSet { poses })
    })
}

fn unconnected_image_publisher() -> ImagePublisher {
    let mut publisher =
        ImagePublisher::bind("127.0.0.1:0", ImageChannelConfig::default()).unwrap();
    let connected = publisher
        .accept(Duration::from_millis(20), &StopSignal::new())
        .unwrap();
    assert!(!connected);
    publisher
}

#[test]
fn telemetry_carries_scaled_landmarks_per_frame() {
    let mut receiver =
        TelemetryReceiver::bind("127.0.0.1:0", Duration::from_secs(2)).unwrap();
    let telemetry = TelemetryPublisher::connect(receiver.local_addr().unwrap()).unwrap();
    let adapter =
        DetectorAdapter::new(RunningMode::Video, Some(pose_on_third_frame()), None).unwrap();

    let mut driver = PipelineDriver::new(
        ScriptedSource::new(gray_frames(3, 640, 480)),
        adapter,
        unconnected_image_publisher(),
        telemetry,
        DriverOptions::default(),
    );
    let summary = driver.run(&StopSignal::new());
    assert_eq!(summary.frames, 3);
    assert!(matches!(summary.reason, StopReason::SourceExhausted(_)));

    let records: Vec<_> = (0..3)
        .map(|_| receiver.recv().unwrap().expect("record within timeout"))
        .collect();

    let ids: Vec<u64> = records.iter().map(|r| r.frame_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(records[0].poses.is_empty());
    assert!(records[1].poses.is_empty());
    assert_eq!(
        records[2].poses,
        vec![vec![PixelLandmark {
            x: 320.0,
            y: 240.0,
            z: 64.0
        }]]
    );
    assert!(records.iter().all(|r| r.gestures.is_empty() && r.hands.is_empty()));
    assert!(records[0].timestamp_ms <= records[2].timestamp_ms);
}

#[test]
fn unreachable_telemetry_peer_does_not_stop_the_pipeline() {
    let dead_port = UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let telemetry = TelemetryPublisher::connect(("127.0.0.1", dead_port)).unwrap();
    let adapter =
        DetectorAdapter::new(RunningMode::Video, Some(pose_on_third_frame()), None).unwrap();

    let mut driver = PipelineDriver::new(
        ScriptedSource::new(gray_frames(20, 64, 48)),
        adapter,
        unconnected_image_publisher(),
        telemetry,
        DriverOptions::default(),
    );
    let summary = driver.run(&StopSignal::new());
    assert_eq!(summary.frames, 20);
    assert!(matches!(summary.reason, StopReason::SourceExhausted(_)));
}

#[test]
fn image_consumer_receives_framed_jpegs() {
    let config = ImageChannelConfig {
        queue_depth: 8,
        ..ImageChannelConfig::default()
    };
    let mut publisher = ImagePublisher::bind("127.0.0.1:0", config).unwrap();
    let addr = publisher.local_addr();

    let consumer = thread::spawn(move || {
        let reader = ImageStreamReader::connect(addr).unwrap();
        reader
            .map(|payload| payload.unwrap())
            .collect::<Vec<Vec<u8>>>()
    });

    assert!(
        publisher
            .accept(Duration::from_secs(5), &StopSignal::new())
            .unwrap()
    );

    let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
    let telemetry = TelemetryPublisher::connect(sink.local_addr().unwrap()).unwrap();
    let adapter =
        DetectorAdapter::new(RunningMode::Video, Some(pose_on_third_frame()), None).unwrap();

    let mut driver = PipelineDriver::new(
        ScriptedSource::new(gray_frames(3, 64, 48)),
        adapter,
        publisher,
        telemetry,
        DriverOptions::default(),
    );
    let summary = driver.run(&StopSignal::new());
    assert_eq!(summary.images_queued, 3);

    let deadline = Instant::now() + Duration::from_secs(5);
    while driver.image_publisher().stats().written.load(Ordering::Relaxed) < 3 {
        assert!(Instant::now() < deadline, "writer never flushed the queue");
        thread::sleep(Duration::from_millis(10));
    }
    drop(driver);

    let payloads = consumer.join().unwrap();
    assert_eq!(payloads.len(), 3);
    for jpeg in payloads {
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 48));
    }
}
