//! Stream device pose and point cloud summaries from the simulated source as
//! JSON lines:
//!
//! {"x":0.9950,"y":0.0998,"z":0.0000,"points":2000,"avg_depth":2.013,"t":1.250}
//!
//! One line per depth delivery. Usage: cargo run --release --example stream_json

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use pcoverlay::{
    FramePair, OverlayConfig, OverlayError, SensorEvent, SensorSource, SimulatedSource,
    SourceConfig,
};

fn main() {
    env_logger::init();

    let config = OverlayConfig::from_env();
    let source = Arc::new(SimulatedSource::new(config.sim, config.channel_capacity));

    let caps = source.capabilities();
    eprintln!("Capabilities: {:?}", caps);
    eprintln!("Max points:   {}", source.max_point_cloud_elements());

    if let Err(e) = source.connect(&SourceConfig::default()) {
        eprintln!("Failed to connect: {}", e);
        std::process::exit(1);
    }

    let stream = match source.subscribe(&[FramePair::device_motion()]) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to subscribe: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Streaming JSON (Ctrl+C to stop)...");

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut idle_timeouts: u32 = 0;

    loop {
        match stream.recv_timeout(Duration::from_secs(2)) {
            Ok(SensorEvent::PointCloud(depth)) => {
                idle_timeouts = 0;
                let pose = match source.pose_at_time(depth.timestamp, FramePair::device_motion()) {
                    Ok(p) => p,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let count = depth.xyz_count();
                let avg_depth = if count == 0 {
                    0.0
                } else {
                    depth.xyz.chunks_exact(3).map(|p| p[2]).sum::<f32>() / count as f32
                };
                let _ = writeln!(
                    out,
                    "{{\"x\":{:.4},\"y\":{:.4},\"z\":{:.4},\"points\":{},\"avg_depth\":{:.3},\"t\":{:.3}}}",
                    pose.translation.x,
                    pose.translation.y,
                    pose.translation.z,
                    count,
                    avg_depth,
                    depth.timestamp,
                );
                let _ = out.flush();
            }
            Ok(_) => {}
            Err(OverlayError::Timeout) => {
                idle_timeouts += 1;
                eprintln!("No sensor events for 2s (timeout #{})", idle_timeouts);
                if idle_timeouts >= 5 {
                    break;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    stream.stop();
    source.disconnect();
}
