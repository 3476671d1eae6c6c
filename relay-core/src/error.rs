//! Domain-specific error types for the frame relay.
//!
//! All fallible operations return `Result<T, RelayError>`.
//! Malformed input never panics; every rejection is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the relay pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// A raw frame message failed wire-format validation.
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    // ── Connection Errors ────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An endpoint string could not be parsed or is not usable here.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Render Errors ────────────────────────────────────────────
    /// No GPU adapter or device could be obtained.
    #[error("gpu unavailable: {0}")]
    GpuUnavailable(String),

    /// Shader compilation, pipeline linking or a GPU operation failed.
    #[error("gpu error: {0}")]
    Gpu(String),

    /// Drawing a decoded frame failed.
    #[error("render failed: {0}")]
    Render(String),

    // ── Session Errors ───────────────────────────────────────────
    /// A conferencing command was issued with no session attached.
    #[error("no conferencing session attached")]
    NoSession,

    /// The conferencing session rejected a forwarded command.
    #[error("session command failed: {0}")]
    Session(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── FrameError ───────────────────────────────────────────────────

/// Why a raw frame message was rejected by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer than 8 bytes: the width/height header is incomplete.
    #[error("header too short: {actual} bytes (need 8)")]
    HeaderTooShort { actual: usize },

    /// The buffer cannot hold the three planes announced by the header.
    #[error("truncated {width}x{height} frame: expected {expected} bytes, got {actual}")]
    Truncated {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// 4:2:0 chroma needs both dimensions to be even.
    #[error("odd dimensions {width}x{height}")]
    OddDimensions { width: u32, height: u32 },

    /// A zero-sized frame has nothing to draw.
    #[error("zero-sized frame")]
    ZeroDimensions,

    /// The plane sizes overflow the platform's address space.
    #[error("plane size overflow for {width}x{height}")]
    SizeOverflow { width: u32, height: u32 },
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for RelayError {
    fn from(s: String) -> Self {
        RelayError::Other(s)
    }
}

impl From<&str> for RelayError {
    fn from(s: &str) -> Self {
        RelayError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::ChannelClosed
    }
}
