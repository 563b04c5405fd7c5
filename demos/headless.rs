//! Run the overlay against the simulated source without a GL context.
//!
//! Draw calls go to a canvas that only logs them; per-frame point count and
//! average depth are printed to stdout.
//!
//! Usage: cargo run --example headless
//! Set PCOVERLAY_* variables to change camera mode, rates or cloud size.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};
use pcoverlay::{Canvas, LogSink, OverlayConfig, Session, SimulatedSource};

#[derive(Default)]
struct LogCanvas {
    draws: u64,
}

impl Canvas for LogCanvas {
    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        log::debug!("clear color {:?}", rgba);
    }

    fn enable_depth_test(&mut self) {
        log::debug!("depth test on");
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        log::debug!("viewport {}x{}", width, height);
    }

    fn clear(&mut self) {}

    fn draw_points(&mut self, points: &[Vec3], mvp: &Mat4) {
        self.draws += 1;
        log::trace!("draw {} points, mvp col3 {:?}", points.len(), mvp.w_axis);
    }
}

fn main() {
    env_logger::init();

    let config = OverlayConfig::from_env();
    let source = Arc::new(SimulatedSource::new(config.sim, config.channel_capacity));

    let session = match Session::start(source, Arc::new(LogSink), None, config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start session: {}", e);
            std::process::exit(1);
        }
    };

    let mut renderer = session.renderer();
    let mut canvas = LogCanvas::default();
    renderer.on_surface_created(&mut canvas);
    if let Err(e) = renderer.on_surface_changed(&mut canvas, 1280, 720) {
        eprintln!("Failed to size surface: {}", e);
        std::process::exit(1);
    }

    println!("Rendering for 5s at ~60 Hz...");

    let start = Instant::now();
    let mut frames: u64 = 0;
    while start.elapsed() < Duration::from_secs(5) {
        match renderer.on_draw_frame(&mut canvas) {
            Ok(stats) => {
                frames += 1;
                if frames % 30 == 1 {
                    let pos = session.scene().lock().calculator.device_position();
                    println!(
                        "frame={:<5} points={:<6} avg_depth={:.3}  device=[{:+.3}, {:+.3}, {:+.3}]",
                        frames, stats.point_count, stats.average_depth, pos.x, pos.y, pos.z,
                    );
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    println!("\nTotal: {} frames, {} draw calls", frames, canvas.draws);
}
