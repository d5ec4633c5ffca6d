//! Connects to a running relay and logs what arrives on both channels.

use std::{thread, time::Duration};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command, value_parser};
use pose_relay::{
    shutdown::StopSignal,
    telemetry::{TelemetryRecord, velocity::landmark_velocity},
    transport::{ImageStreamReader, TelemetryReceiver},
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("relay-monitor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reads the pose-relay image stream and telemetry and logs a summary per frame.")
        .arg(
            Arg::new("image-addr")
                .long("image-addr")
                .value_name("HOST:PORT")
                .default_value("127.0.0.1:9000"),
        )
        .arg(
            Arg::new("telemetry-addr")
                .long("telemetry-addr")
                .value_name("HOST:PORT")
                .default_value("127.0.0.1:9001"),
        )
        .arg(
            Arg::new("no-images")
                .long("no-images")
                .action(ArgAction::SetTrue)
                .help("Only listen for telemetry"),
        )
        .arg(
            Arg::new("max-records")
                .long("max-records")
                .value_name("N")
                .value_parser(value_parser!(u64)),
        )
        .get_matches();

    let stop = StopSignal::new();
    stop.install_ctrlc_handler()?;

    let telemetry_addr = matches
        .get_one::<String>("telemetry-addr")
        .map(String::as_str)
        .unwrap_or("127.0.0.1:9001");
    let mut receiver = TelemetryReceiver::bind(telemetry_addr, Duration::from_millis(500))
        .with_context(|| format!("failed to bind telemetry receiver on {telemetry_addr}"))?;
    log::info!("listening for telemetry on {}", receiver.local_addr()?);

    if !matches.get_flag("no-images") {
        let image_addr = matches
            .get_one::<String>("image-addr")
            .cloned()
            .unwrap_or_else(|| "127.0.0.1:9000".to_owned());
        spawn_image_reader(image_addr)?;
    }

    let max_records = matches.get_one::<u64>("max-records").copied();
    let mut previous: Option<TelemetryRecord> = None;
    let mut received = 0u64;

    while !stop.is_raised() && max_records.is_none_or(|max| received < max) {
        let Some(record) = receiver.recv()? else {
            continue;
        };
        received += 1;
        log::info!(
            "frame {}: {} poses, {} hands, gestures {:?}",
            record.frame_id,
            record.poses.len(),
            record.hands.len(),
            record
                .gestures
                .iter()
                .flatten()
                .map(|g| g.category_name.as_str())
                .collect::<Vec<_>>()
        );

        if let Some(prev) = previous.as_ref() {
            if let Some(velocity) = landmark_velocity(prev, &record) {
                if let Some(nose) = velocity.poses.first().and_then(|p| p.first()) {
                    log::info!("  nose velocity ({:.1}, {:.1}) px/s", nose.x, nose.y);
                }
                if let Some(wrist) = velocity.hands.first().and_then(|h| h.first()) {
                    log::info!("  wrist velocity ({:.1}, {:.1}) px/s", wrist.x, wrist.y);
                }
            }
        }
        previous = Some(record);
    }

    log::info!("received {received} telemetry records");
    Ok(())
}

fn spawn_image_reader(addr: String) -> Result<()> {
    thread::Builder::new()
        .name("image-reader".into())
        .spawn(move || {
            let reader = match ImageStreamReader::connect(addr.as_str()) {
                Ok(reader) => reader,
                Err(err) => {
                    log::warn!("could not connect to image stream at {addr}: {err}");
                    return;
                }
            };
            log::info!("connected to image stream at {addr}");
            for (index, payload) in reader.enumerate() {
                match payload {
                    Ok(jpeg) => log::debug!("image {index}: {} bytes", jpeg.len()),
                    Err(err) => {
                        log::warn!("image stream failed: {err}");
                        return;
                    }
                }
            }
            log::info!("image stream closed");
        })?;
    Ok(())
}
