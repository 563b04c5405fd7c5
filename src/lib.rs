//! # pcoverlay - point cloud overlay core for motion-tracking devices
//!
//! Turns a stream of device poses and depth point clouds into the matrices
//! and vertex data a renderer needs. Provides:
//! - Model matrix composition from device motion and fixed extrinsics
//! - A lock-guarded scene shared between the sensor thread and the render thread
//! - A render surface lifecycle driven through a host-supplied `Canvas`
//! - A simulated sensor source for running without hardware
//! - C FFI for native hosts that own the sensor service and GL context
//!
//! ## Quick Start
//! ```no_run
//! use pcoverlay::{LogSink, OverlayConfig, Session, SimulatedSource};
//! use std::sync::Arc;
//!
//! let config = OverlayConfig::from_env();
//! let source = Arc::new(SimulatedSource::new(config.sim, config.channel_capacity));
//! let session = Session::start(source, Arc::new(LogSink), None, config).unwrap();
//!
//! let snap = session.scene().snapshot();
//! println!("{} points", snap.points.len());
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod transform;
pub mod point_cloud;
pub mod scene;
pub mod renderer;
pub mod source;
pub mod sim;
pub mod listener;
pub mod session;
pub mod ffi;

pub use config::{CameraMode, FrameConvention, OverlayConfig, SimConfig};
pub use error::OverlayError;
pub use listener::{CameraPreview, EventListener, LogSink, UiSink};
pub use renderer::{Canvas, FrameStats, Renderer, SurfaceState};
pub use scene::{FrameSnapshot, SharedScene};
pub use session::Session;
pub use sim::SimulatedSource;
pub use source::{EventStream, SensorSource};
pub use transform::ModelMatrixCalculator;
pub use types::*;

/// Result type alias for pcoverlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;
