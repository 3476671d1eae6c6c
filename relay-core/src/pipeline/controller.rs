//! Composition root: transport → backpressure → codec → render → telemetry.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::network::{FrameSink, TransportClient, TransportConfig};
use crate::pipeline::event::PipelineEvent;
use crate::pipeline::relay::{FrameReceiver, FrameRelay, lock};
use crate::pipeline::session::{ConferenceSession, SessionCommand};
use crate::pipeline::telemetry::{PipelineStats, TelemetryAggregator};
use crate::render::{FrameRenderer, RenderConfig, create_renderer};
use crate::state::ConnectionState;

/// Buffered notifications per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub transport: TransportConfig,
    pub render: RenderConfig,
}

// ── PipelineController ───────────────────────────────────────────

/// Owns every pipeline stage and exposes the host-facing surface.
pub struct PipelineController {
    relay: Arc<FrameRelay>,
    transport: TransportClient,
    telemetry: Arc<Mutex<TelemetryAggregator>>,
    events: broadcast::Sender<PipelineEvent>,
    session: Option<Arc<dyn ConferenceSession>>,
}

impl PipelineController {
    /// Initialise the configured renderer and wire the stages together.
    ///
    /// Fails if the render backend cannot be brought up; nothing falls
    /// back silently.
    pub async fn start(config: PipelineConfig) -> Result<Self, RelayError> {
        let renderer = create_renderer(&config.render).await?;
        info!(
            "{} renderer ready at {}x{}",
            renderer.backend(),
            config.render.width,
            config.render.height
        );
        Ok(Self::with_renderer(config, renderer))
    }

    /// Wire the stages around an already constructed renderer.
    ///
    /// Must be called inside a Tokio runtime; the transport actor and the
    /// render worker are spawned immediately.
    pub fn with_renderer(config: PipelineConfig, renderer: Box<dyn FrameRenderer>) -> Self {
        let (width, height) = renderer.dimensions();
        let mut telemetry = TelemetryAggregator::new();
        telemetry.set_resolution(width, height);
        let telemetry = Arc::new(Mutex::new(telemetry));

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let relay = Arc::new(FrameRelay::spawn(
            renderer,
            Arc::clone(&telemetry),
            events.clone(),
            config.render.publish_frames,
        ));

        let sink: Arc<dyn FrameSink> = relay.clone();
        let transport = TransportClient::spawn(config.transport, sink);

        Self {
            relay,
            transport,
            telemetry,
            events,
            session: None,
        }
    }

    /// Attach the conferencing session commands are forwarded to.
    pub fn with_session(mut self, session: Arc<dyn ConferenceSession>) -> Self {
        self.session = Some(session);
        self
    }

    // ── Control ──────────────────────────────────────────────────

    /// Connect the transport. Idempotent.
    pub fn connect(&self) -> Result<(), RelayError> {
        self.transport.connect()
    }

    /// Reconfigure the render target ahead of the next frame.
    pub fn set_resolution(&self, width: u32, height: u32) -> Result<(), RelayError> {
        debug!("resolution requested: {width}x{height}");
        self.relay.request_resize(width, height)
    }

    /// Forward a conferencing command unchanged.
    pub async fn execute(&self, command: SessionCommand) -> Result<(), RelayError> {
        let session = self.session.as_deref().ok_or(RelayError::NoSession)?;
        debug!("forwarding {command:?}");
        command.forward(session).await
    }

    /// Stop the transport, then let the render worker finish its frame.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
        self.relay.shutdown().await;
        info!("pipeline stopped");
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn get_stats(&self) -> PipelineStats {
        lock(&self.telemetry).snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Rendered frames, when `publish_frames` is on.
    pub fn frame_receiver(&self) -> FrameReceiver {
        self.relay.frame_receiver()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Entry point for frames that do not come through the socket.
    pub fn sink(&self) -> Arc<dyn FrameSink> {
        self.relay.clone()
    }
}

// ── Tests ────────────────────────────────────────────────────────
