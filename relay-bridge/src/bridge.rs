//! Bridge lifecycle.
//!
//! Starts the pipeline, connects the transport and then services two
//! things until asked to stop: pipeline notifications and the periodic
//! stats report.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, warn};

use relay_core::{PipelineController, PipelineEvent, PipelineStats, RelayError};

use crate::config::BridgeConfig;

// ── RelayBridge ──────────────────────────────────────────────────

pub struct RelayBridge {
    config: BridgeConfig,
}

impl RelayBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Only initialisation errors are returned; transport trouble is
    /// retried by the pipeline itself.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), RelayError> {
        let controller = PipelineController::start(self.config.to_pipeline_config()?).await?;
        let mut events = controller.subscribe();
        controller.connect()?;
        info!("relaying frames from {}", self.config.transport.endpoint);

        let mut ticker = match self.config.stats.interval_secs {
            0 => None,
            secs => {
                let mut interval = tokio::time::interval(Duration::from_secs(secs));
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip the immediate first tick.
                interval.reset();
                Some(interval)
            }
        };

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(n)) => warn!("missed {n} pipeline notifications"),
                    Err(RecvError::Closed) => break,
                },
                _ = tick(&mut ticker) => self.report(&controller.get_stats()),
            }
        }

        self.report(&controller.get_stats());
        controller.shutdown().await;
        Ok(())
    }

    fn report(&self, stats: &PipelineStats) {
        if self.config.stats.json {
            match serde_json::to_string(stats) {
                Ok(line) => info!("{line}"),
                Err(e) => warn!("stats serialization failed: {e}"),
            }
            return;
        }
        info!(
            resolution = %stats.resolution,
            fps = stats.fps,
            bitrate_kbps = stats.bitrate_kbps,
            received = stats.total_frames_received,
            drawn = stats.frames_drawn,
            dropped = stats.frames_dropped_on_backpressure,
            busy = stats.frames_arrived_while_busy,
            drop_rate = stats.drop_rate_percent,
            avg_decode_ms = stats.avg_decode_ms,
            avg_arrival_ms = stats.avg_arrival_ms,
            connected = stats.transport_connected,
            "pipeline stats"
        );
    }
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::FrameError { .. } => warn!("{event}"),
        _ => info!("{event}"),
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────
