//! The frame path from socket to render target, and its accounting.

pub mod backpressure;
pub mod controller;
pub mod event;
pub mod relay;
pub mod session;
pub mod telemetry;

pub use backpressure::{Admission, BackpressureQueue};
pub use controller::{PipelineConfig, PipelineController};
pub use event::PipelineEvent;
pub use relay::{FrameReceiver, FrameRelay};
pub use session::{ConferenceSession, SessionCommand};
pub use telemetry::{PipelineStats, TelemetryAggregator};
