//! Local-socket frame transport with fixed-delay reconnect.
//!
//! A single actor task owns the [`ConnectionState`] and the reconnect
//! timer. Each connection attempt runs in its own task tagged with a
//! generation number and reports lifecycle events back to the actor
//! over a channel; events from a superseded attempt are ignored.
//!
//! Inbound messages go straight from the read loop to the
//! [`FrameSink`], which must not block.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::RelayCodec;
use crate::error::RelayError;
use crate::state::ConnectionState;

/// Well-known loopback port for frame delivery.
pub const DEFAULT_FRAME_PORT: u16 = 9301;

/// Delay between a close and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

// ── Endpoint ─────────────────────────────────────────────────────

/// Where the frame producer listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    /// Native IPC socket; written as `unix:/path/to/socket`.
    Unix(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::LOCALHOST,
            DEFAULT_FRAME_PORT,
        )))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{addr}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(RelayError::InvalidEndpoint("empty unix socket path".into()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        s.parse::<SocketAddr>()
            .map(Endpoint::Tcp)
            .map_err(|e| RelayError::InvalidEndpoint(format!("{s}: {e}")))
    }
}

// ── TransportConfig ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: Endpoint,
    pub reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

// ── FrameSink ────────────────────────────────────────────────────

/// Receiver of everything the transport produces.
pub trait FrameSink: Send + Sync + 'static {
    /// One raw frame message. Called on the read loop; must not block.
    fn submit(&self, msg: Bytes);

    /// The link came up (`true`) or went down (`false`).
    fn connection_changed(&self, _connected: bool) {}
}

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug)]
enum TransportCommand {
    Connect,
}

#[derive(Debug)]
enum LinkEvent {
    Opened,
    Closed,
    Error(String),
}

// ── TransportClient ──────────────────────────────────────────────

/// Handle to the transport actor.
pub struct TransportClient {
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TransportClient {
    /// Spawn the actor. Nothing connects until [`connect`](Self::connect).
    pub fn spawn(config: TransportConfig, sink: Arc<dyn FrameSink>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let actor = TransportActor {
            config,
            sink,
            state: ConnectionState::Disconnected,
            generation: 0,
            state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(actor.run(cmd_rx));

        Self {
            cmd_tx,
            state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Open the socket unless connected or an attempt is already in flight.
    pub fn connect(&self) -> Result<(), RelayError> {
        self.cmd_tx.send(TransportCommand::Connect)?;
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Watch every state transition.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Close the socket, cancel any scheduled reconnect and stop the actor.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── TransportActor ───────────────────────────────────────────────

struct TransportActor {
    config: TransportConfig,
    sink: Arc<dyn FrameSink>,
    state: ConnectionState,
    /// Incremented per attempt; only the latest attempt's events count.
    generation: u64,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl TransportActor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>) {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut reconnect: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                cmd = cmd_rx.recv() => match cmd {
                    Some(TransportCommand::Connect) => {
                        if self.state.is_disconnected() {
                            // An explicit connect supersedes the scheduled one.
                            reconnect = None;
                            self.start_attempt(&event_tx);
                        } else {
                            debug!("connect ignored while {}", self.state);
                        }
                    }
                    None => break,
                },

                Some((generation, event)) = event_rx.recv() => {
                    if generation != self.generation {
                        debug!("ignoring {event:?} from stale attempt {generation}");
                        continue;
                    }
                    match event {
                        LinkEvent::Opened => self.on_opened(),
                        LinkEvent::Error(e) => {
                            warn!("transport error on {}: {e}", self.config.endpoint);
                            self.on_closed(&mut reconnect);
                        }
                        LinkEvent::Closed => self.on_closed(&mut reconnect),
                    }
                }

                () = wait_for(&mut reconnect) => {
                    reconnect = None;
                    if self.state.is_disconnected() {
                        info!("reconnecting to {}", self.config.endpoint);
                        self.start_attempt(&event_tx);
                    }
                }
            }
        }

        if !self.state.disconnect().is_disconnected() {
            self.sink.connection_changed(false);
        }
        self.publish();
        debug!("transport stopped");
    }

    fn start_attempt(&mut self, event_tx: &mpsc::UnboundedSender<(u64, LinkEvent)>) {
        if let Err(e) = self.state.begin_connect() {
            warn!("{e}");
            return;
        }
        self.generation += 1;
        self.publish();
        debug!(
            "connecting to {} (attempt {})",
            self.config.endpoint, self.generation
        );

        tokio::spawn(run_link(
            self.config.endpoint.clone(),
            self.generation,
            event_tx.clone(),
            Arc::clone(&self.sink),
            self.cancel.child_token(),
        ));
    }

    fn on_opened(&mut self) {
        if let Err(e) = self.state.complete_connect() {
            warn!("{e}");
            return;
        }
        info!("transport connected to {}", self.config.endpoint);
        self.sink.connection_changed(true);
        self.publish();
    }

    /// Error and close both land here; the second call for the same
    /// attempt is a no-op apart from the timer check. Every attempt that
    /// ends, established or refused, notifies the sink once, before
    /// watchers see the new state.
    fn on_closed(&mut self, reconnect: &mut Option<Pin<Box<Sleep>>>) {
        let previous = self.state.disconnect();
        if previous.is_connected() {
            info!("transport disconnected from {}", self.config.endpoint);
        }
        if !previous.is_disconnected() {
            self.sink.connection_changed(false);
        }
        self.publish();

        if reconnect.is_none() {
            debug!("reconnect scheduled in {:?}", self.config.reconnect_delay);
            *reconnect = Some(Box::pin(tokio::time::sleep(self.config.reconnect_delay)));
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

// ── Link task ────────────────────────────────────────────────────

type FrameStream = Box<dyn AsyncRead + Send + Unpin>;

async fn open(endpoint: &Endpoint) -> std::io::Result<FrameStream> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix sockets are not available on this platform",
        )),
    }
}

/// One connection attempt: open, read until close, report.
async fn run_link(
    endpoint: Endpoint,
    generation: u64,
    events: mpsc::UnboundedSender<(u64, LinkEvent)>,
    sink: Arc<dyn FrameSink>,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = open(&endpoint) => result,
    };
    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = events.send((generation, LinkEvent::Error(e.to_string())));
            let _ = events.send((generation, LinkEvent::Closed));
            return;
        }
    };
    let _ = events.send((generation, LinkEvent::Opened));

    let mut frames = FramedRead::new(stream, RelayCodec::new());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = frames.next() => match next {
                Some(Ok(msg)) => sink.submit(msg),
                Some(Err(e)) => {
                    let _ = events.send((generation, LinkEvent::Error(e.to_string())));
                    break;
                }
                None => break,
            },
        }
    }
    let _ = events.send((generation, LinkEvent::Closed));
}

// ── Tests ────────────────────────────────────────────────────────
