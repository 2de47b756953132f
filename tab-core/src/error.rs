//! # Error Module
//!
//! A single error type for everything in `tab-core` that can fail.
//!
//! Only construction-time problems (a bad tuning, a missing file, an
//! unreadable config) are errors. Per-frame problems such as a silent frame
//! or a pitch that fits nowhere on the fretboard are skipped where they
//! occur and never surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crate.
pub type TabResult<T> = Result<T, TabError>;

/// Errors that can occur while building a fretboard, loading audio,
/// separating stems or exporting a tab.
#[derive(Debug, Error)]
pub enum TabError {
    /// The tuning is empty, has a non-positive open string, or is not
    /// strictly ascending.
    #[error("invalid tuning: {reason}")]
    InvalidTuning {
        /// What is wrong with the tuning.
        reason: String,
    },

    /// The audio file does not exist.
    #[error("audio file not found: {}", path.display())]
    AudioNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The audio file exists but cannot be handled.
    #[error("unsupported audio file {}: {reason}", path.display())]
    UnsupportedAudio {
        /// The offending path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// WAV decoding/encoding failed.
    #[error("WAV error: {0}")]
    AudioDecode(#[from] hound::Error),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The external stem separator could not be run.
    #[error("stem separation failed: {message}")]
    Separation {
        /// Error message.
        message: String,
    },

    /// An exporter refused its input or failed to encode it.
    #[error("export failed: {message}")]
    Export {
        /// Error message.
        message: String,
    },

    /// Microphone capture failed.
    #[error("audio capture failed: {message}")]
    Capture {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TabError {
    pub(crate) fn invalid_tuning(reason: impl Into<String>) -> Self {
        TabError::InvalidTuning {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        TabError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn export(message: impl Into<String>) -> Self {
        TabError::Export {
            message: message.into(),
        }
    }

    pub(crate) fn separation(message: impl Into<String>) -> Self {
        TabError::Separation {
            message: message.into(),
        }
    }
}
