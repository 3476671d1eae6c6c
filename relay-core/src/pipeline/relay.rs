//! Backpressure-gated render worker.
//!
//! [`FrameRelay::submit`] runs on the transport's read loop: it records
//! the arrival, asks the [`BackpressureQueue`] for admission and, when the
//! queue was idle, hands the message to the render worker. The worker
//! lives on a blocking thread, decodes and draws, then drains the pending
//! slot iteratively before waiting for the next hand-off.
//!
//! A requested target size is parked in its own slot and applied before
//! the next frame, even while the drain keeps finding pending frames.
//!
//! Lock order is queue, then telemetry. The resize slot is never held
//! together with either.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::frame::FrameCodec;
use crate::error::RelayError;
use crate::network::FrameSink;
use crate::pipeline::backpressure::{Admission, BackpressureQueue};
use crate::pipeline::event::PipelineEvent;
use crate::pipeline::telemetry::TelemetryAggregator;
use crate::render::{FrameRenderer, RenderedFrame, check_target_size};

/// Latest rendered frame, `None` until the first draw.
pub type FrameReceiver = watch::Receiver<Option<Arc<RenderedFrame>>>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

enum WorkItem {
    Frame(Bytes),
    /// Wake-up for an idle worker; the size itself sits in `Shared::resize`.
    Resize,
    Shutdown,
}

struct Shared {
    queue: Mutex<BackpressureQueue<Bytes>>,
    /// Latest requested target size not yet applied.
    resize: Mutex<Option<(u32, u32)>>,
    telemetry: Arc<Mutex<TelemetryAggregator>>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Shared {
    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ── FrameRelay ───────────────────────────────────────────────────

pub struct FrameRelay {
    shared: Arc<Shared>,
    work_tx: mpsc::UnboundedSender<WorkItem>,
    frames: FrameReceiver,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl FrameRelay {
    /// Start the render worker on a blocking thread.
    pub fn spawn(
        renderer: Box<dyn FrameRenderer>,
        telemetry: Arc<Mutex<TelemetryAggregator>>,
        events: broadcast::Sender<PipelineEvent>,
        publish_frames: bool,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BackpressureQueue::new()),
            resize: Mutex::new(None),
            telemetry,
            events,
        });
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (frame_tx, frames) = watch::channel(None);

        let worker = RenderWorker {
            renderer,
            shared: Arc::clone(&shared),
            frame_tx,
            publish_frames,
        };
        let handle = tokio::task::spawn_blocking(move || worker.run(work_rx));

        Self {
            shared,
            work_tx,
            frames,
            worker: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Admit one raw frame message. Never blocks on rendering.
    pub fn submit(&self, msg: Bytes) {
        let len = msg.len();
        let mut queue = lock(&self.shared.queue);
        let admission = queue.submit(msg);
        {
            let mut telemetry = lock(&self.shared.telemetry);
            telemetry.record_arrival(len);
            if admission.arrived_while_busy() {
                telemetry.record_busy_arrival();
            }
            if matches!(admission, Admission::Replaced(_)) {
                telemetry.record_backpressure_drop();
            }
        }

        match admission {
            Admission::Process(msg) => {
                if self.work_tx.send(WorkItem::Frame(msg)).is_err() {
                    let _ = queue.complete();
                    debug!("render worker stopped, frame discarded");
                }
            }
            Admission::Pending => debug!("frame pending behind in-flight frame"),
            Admission::Replaced(_) => debug!("pending frame replaced by newer arrival"),
        }
    }

    /// Reconfigure the render target before the next frame.
    pub fn request_resize(&self, width: u32, height: u32) -> Result<(), RelayError> {
        check_target_size(width, height)?;
        *lock(&self.shared.resize) = Some((width, height));
        self.work_tx
            .send(WorkItem::Resize)
            .map_err(|_| RelayError::ChannelClosed)
    }

    pub fn frame_receiver(&self) -> FrameReceiver {
        self.frames.clone()
    }

    pub fn is_processing(&self) -> bool {
        lock(&self.shared.queue).is_processing()
    }

    /// Stop the worker once the frames already handed to it are done.
    pub async fn shutdown(&self) {
        let _ = self.work_tx.send(WorkItem::Shutdown);
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                error!("render worker ended abnormally: {e}");
            }
        }
    }
}

impl FrameSink for FrameRelay {
    fn submit(&self, msg: Bytes) {
        FrameRelay::submit(self, msg);
    }

    fn connection_changed(&self, connected: bool) {
        lock(&self.shared.telemetry).set_transport_connected(connected);
        self.shared.emit(if connected {
            PipelineEvent::TransportConnected
        } else {
            PipelineEvent::TransportDisconnected
        });
    }
}

// ── RenderWorker ─────────────────────────────────────────────────

struct RenderWorker {
    renderer: Box<dyn FrameRenderer>,
    shared: Arc<Shared>,
    frame_tx: watch::Sender<Option<Arc<RenderedFrame>>>,
    publish_frames: bool,
}

/// What a successful draw produced.
struct Drawn {
    width: u32,
    height: u32,
    resized: bool,
    decode: Duration,
    pixels: Option<RenderedFrame>,
}

impl RenderWorker {
    fn run(mut self, mut work_rx: mpsc::UnboundedReceiver<WorkItem>) {
        debug!("render worker started ({})", self.renderer.backend());
        while let Some(item) = work_rx.blocking_recv() {
            match item {
                WorkItem::Frame(msg) => self.drain(msg),
                WorkItem::Resize => self.apply_resize(),
                WorkItem::Shutdown => break,
            }
        }
        debug!("render worker stopped");
    }

    fn drain(&mut self, first: Bytes) {
        let mut next = Some(first);
        while let Some(msg) = next {
            self.apply_resize();
            self.process(msg);
            next = lock(&self.shared.queue).complete();
        }
    }

    /// Run `f` against the renderer. Errors and panics become a
    /// `FrameError` notification and `None`; the worker carries on.
    fn guarded<T>(
        &mut self,
        context: &str,
        f: impl FnOnce(&mut dyn FrameRenderer) -> Result<T, RelayError>,
    ) -> Option<T> {
        let renderer = &mut self.renderer;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(renderer.as_mut())));

        let message = match outcome {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("{context} panicked: {}", panic_message(&*payload)),
        };
        error!("{context} failed: {message}");
        self.shared.emit(PipelineEvent::FrameError { message });
        None
    }

    /// Decode and draw one message. Whatever happens, the frame counts
    /// as handled so the drain continues.
    fn process(&mut self, msg: Bytes) {
        let started = Instant::now();
        let publish = self.publish_frames;
        let drawn = self.guarded("render", |renderer| {
            draw_message(renderer, &msg, started, publish)
        });
        if let Some(Some(drawn)) = drawn {
            self.finish(drawn);
        }
    }

    fn finish(&mut self, drawn: Drawn) {
        {
            let mut telemetry = lock(&self.shared.telemetry);
            telemetry.record_draw(drawn.decode);
            if drawn.resized {
                telemetry.set_resolution(drawn.width, drawn.height);
            }
        }
        if drawn.resized {
            info!("render target resized to {}x{}", drawn.width, drawn.height);
            self.shared.emit(PipelineEvent::ResolutionChanged {
                width: drawn.width,
                height: drawn.height,
            });
        }
        if let Some(pixels) = drawn.pixels {
            self.frame_tx.send_replace(Some(Arc::new(pixels)));
        }
    }

    fn apply_resize(&mut self) {
        let Some((width, height)) = lock(&self.shared.resize).take() else {
            return;
        };
        if self
            .guarded("resize", |renderer| renderer.resize(width, height))
            .is_none()
        {
            return;
        }
        lock(&self.shared.telemetry).set_resolution(width, height);
        info!("render target set to {width}x{height}");
        self.shared
            .emit(PipelineEvent::ResolutionChanged { width, height });
    }
}

/// `Ok(None)` means the codec rejected the message.
fn draw_message(
    renderer: &mut dyn FrameRenderer,
    msg: &Bytes,
    started: Instant,
    publish: bool,
) -> Result<Option<Drawn>, RelayError> {
    let frame = match FrameCodec::decode(msg) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("dropping frame: {e}");
            return Ok(None);
        }
    };
    let resized = renderer.render(&frame)?;
    let decode = started.elapsed();
    let pixels = if publish {
        Some(renderer.read_pixels()?)
    } else {
        None
    };
    Ok(Some(Drawn {
        width: frame.width,
        height: frame.height,
        resized,
        decode,
        pixels,
    }))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────
