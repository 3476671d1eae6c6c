//! # relay-core
//!
//! Live video frame relay: raw I420 frames arrive on a local socket and
//! are drawn into an RGBA render target without ever falling behind.
//!
//! This crate contains:
//! - **Codec**: `FrameCodec` for the I420 wire format, `RelayCodec` for
//!   length-prefixed socket framing via `tokio_util`
//! - **Network**: `TransportClient`, a reconnecting TCP / Unix socket reader
//! - **Pipeline**: `BackpressureQueue` (single slot, latest wins), the
//!   render worker, `TelemetryAggregator` and the `PipelineController`
//! - **Render**: `GpuRenderer` (wgpu) and `CpuRenderer`
//! - **State**: the transport `ConnectionState` machine
//! - **Error**: `RelayError`, a typed `thiserror` hierarchy

pub mod codec;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod render;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::frame::{DecodedFrame, FRAME_HEADER_SIZE, FrameCodec, PlaneLayout, encode_frame};
pub use codec::{MAX_MESSAGE_SIZE, RelayCodec};
pub use error::{FrameError, RelayError};
pub use network::{Endpoint, FrameSink, TransportClient, TransportConfig};
pub use pipeline::{
    Admission, BackpressureQueue, ConferenceSession, FrameReceiver, PipelineConfig,
    PipelineController, PipelineEvent, PipelineStats, SessionCommand, TelemetryAggregator,
};
pub use render::{
    CpuRenderer, FrameRenderer, GpuRenderer, RenderBackend, RenderConfig, RenderedFrame,
};
pub use state::ConnectionState;
