use std::fmt;

use crate::types::FramePair;

/// Errors that can occur while driving the overlay from a sensor source.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// The user declined the motion-tracking permission. Fatal for the session.
    #[error("Motion tracking permission denied")]
    PermissionDenied,

    /// The source could not produce a pose for the requested time and frame pair.
    #[error("Pose query failed for {pair} at t={timestamp:.6}: {reason}")]
    PoseQuery {
        pair: FramePair,
        timestamp: f64,
        reason: String,
    },

    #[error("Invalid pose sample: {0}")]
    InvalidPose(String),

    #[error("Sensor source not connected")]
    NotConnected,

    #[error("Render surface not created")]
    SurfaceNotCreated,

    #[error("Invalid surface size {width}x{height}")]
    InvalidSurface { width: u32, height: u32 },

    #[error("Event stream stopped")]
    StreamStopped,

    #[error("Timeout waiting for sensor events")]
    Timeout,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

impl OverlayError {
    /// Transient errors are reported to the user and processing continues.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OverlayError::PoseQuery { .. } | OverlayError::InvalidPose(_) | OverlayError::Timeout
        )
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &OverlayError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoordinateFrame;

    #[test]
    fn test_transient_classification() {
        let err = OverlayError::PoseQuery {
            pair: FramePair::new(CoordinateFrame::StartOfService, CoordinateFrame::Device),
            timestamp: 1.5,
            reason: "no data".into(),
        };
        assert!(err.is_transient());
        assert!(!OverlayError::PermissionDenied.is_transient());
    }

    #[test]
    fn test_last_error_is_nul_terminated() {
        let last = LastError::new();
        assert!(last.as_ptr().is_null());
        last.set(&OverlayError::NotConnected);
        let msg = last.message.lock().unwrap();
        assert!(msg.ends_with('\0'));
        assert!(msg.starts_with("Sensor source not connected"));
    }
}
