//! Error taxonomy for the detector and matcher.
//!
//! `Capacity` on the keypoint append-buffer is deliberately *not* a variant
//! constructed on the normal detect path: an append-buffer overflow is local
//! recovery (truncate, warn), surfaced as [`crate::DetectWarning`] rather
//! than an `Err`. The variant still exists here for other allocation
//! failures (pyramid textures, staging buffers) where no local recovery is
//! possible.

use thiserror::Error;

/// Errors surfaced across the detector/matcher function-call boundary.
#[derive(Debug, Error)]
pub enum SiftError {
    /// No suitable GPU adapter/device could be obtained. Nothing retries.
    #[error("no suitable GPU device available: {message}")]
    Unavailable { message: String },

    /// Options out of range, image too small, or an unsupported pixel format.
    #[error("invalid configuration: {message}")]
    BadConfig { message: String },

    /// Allocation failure for a pyramid texture or staging buffer.
    #[error("capacity exceeded during {stage}: {message}")]
    Capacity {
        stage: &'static str,
        message: String,
    },

    /// A shader failed to compile or its source was missing. Fatal at init.
    #[error("failed to load shader: {message}")]
    ShaderLoad { message: String },

    /// The GPU device was lost mid-operation; the driver must be reconstructed.
    #[error("GPU device lost: {message}")]
    DeviceLost { message: String },

    /// Reading or writing a descriptor file failed at the OS level.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A descriptor file's contents did not match the expected format.
    #[error("malformed descriptor file: {message}")]
    Parse { message: String },
}

impl SiftError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        SiftError::Unavailable {
            message: message.into(),
        }
    }

    pub fn bad_config(message: impl Into<String>) -> Self {
        SiftError::BadConfig {
            message: message.into(),
        }
    }

    pub fn capacity(stage: &'static str, message: impl Into<String>) -> Self {
        SiftError::Capacity {
            stage,
            message: message.into(),
        }
    }

    pub fn shader_load(message: impl Into<String>) -> Self {
        SiftError::ShaderLoad {
            message: message.into(),
        }
    }

    pub fn device_lost(message: impl Into<String>) -> Self {
        SiftError::DeviceLost {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        SiftError::Parse {
            message: message.into(),
        }
    }
}

pub type Result<T, E = SiftError> = std::result::Result<T, E>;

/// Non-fatal warning attached to a successful detect result.
///
/// This is the *only* signal for append-buffer truncation; it is never
/// raised as an [`SiftError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated {
    pub kept: u32,
    pub capacity: u32,
}
