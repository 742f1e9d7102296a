//! Error taxonomy for the capture and localization pipeline.
//!
//! Public operations return `anyhow::Result`. The variants below are wrapped into
//! `anyhow::Error` so callers can branch with `err.downcast_ref::<LocalizeError>()`.

use std::fmt;

use thiserror::Error;

/// Rendering primitive that an accessor failed to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    Scene,
    Camera,
    Renderer,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Scene => f.write_str("scene"),
            Handle::Camera => f.write_str("camera"),
            Handle::Renderer => f.write_str("renderer"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LocalizeError {
    /// Camera access requires an HTTPS-equivalent context.
    #[error("a secure context is required to start an AR session")]
    SecureContext,

    #[error("{0} not initialized; call initialize() first")]
    NotInitialized(Handle),

    #[error("no active AR session")]
    NoActiveSession,

    #[error("AR session has no reference space")]
    NoReferenceSpace,

    /// A previous `capture_frame` has not resolved yet.
    #[error("a frame capture is already in flight")]
    CaptureInFlight,

    /// The runtime never delivered the requested frame callback.
    #[error("no AR frame delivered within {0} ms")]
    FrameTimeout(u64),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("not authorized; call authorize() before localizing")]
    MissingToken,

    #[error("transport error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },
}

impl LocalizeError {
    pub fn transport(message: impl Into<String>) -> Self {
        LocalizeError::Transport {
            status: None,
            message: message.into(),
        }
    }
}

/// Returns the taxonomy variant carried by `err`, if any.
pub fn classify(err: &anyhow::Error) -> Option<&LocalizeError> {
    err.downcast_ref::<LocalizeError>()
}
