//! Frame accounting from arrival to draw.
//!
//! Every counter is updated synchronously with the event it describes,
//! so a [`PipelineStats`] snapshot is always internally consistent.
//! All entry points take an explicit `Instant` (the `*_at` variants) so
//! the rate windows can be driven deterministically in tests.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Inter-arrival intervals kept for `avg_arrival_ms`.
pub const ARRIVAL_WINDOW: usize = 100;

/// How often the windowed fps / bitrate are recomputed.
pub const RATE_WINDOW: Duration = Duration::from_millis(1000);

// ── PipelineStats ────────────────────────────────────────────────

/// Point-in-time snapshot returned by `get_stats()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub resolution: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u64,
    pub total_frames_received: u64,
    pub frames_drawn: u64,
    pub frames_dropped_on_backpressure: u64,
    pub frames_arrived_while_busy: u64,
    pub drop_rate_percent: u32,
    pub last_decode_ms: f64,
    pub avg_decode_ms: u64,
    pub avg_arrival_ms: f64,
    pub total_bytes_received: u64,
    pub transport_connected: bool,
}

// ── TelemetryAggregator ──────────────────────────────────────────

/// Running counters plus the derived rate state.
#[derive(Debug)]
pub struct TelemetryAggregator {
    total_frames_received: u64,
    frames_drawn: u64,
    frames_dropped_on_backpressure: u64,
    frames_arrived_while_busy: u64,
    total_bytes_received: u64,
    total_decode_time_ms: f64,
    last_decode_ms: f64,

    /// Last `ARRIVAL_WINDOW` gaps between arrivals, in milliseconds.
    arrival_intervals: VecDeque<f64>,
    last_arrival: Option<Instant>,

    /// Baseline for the windowed rates.
    rate_started: Instant,
    rate_frames_drawn: u64,
    rate_bytes: u64,
    fps: u32,
    bitrate_kbps: u64,

    width: u32,
    height: u32,
    transport_connected: bool,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create an aggregator whose first rate window opens at `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self {
            total_frames_received: 0,
            frames_drawn: 0,
            frames_dropped_on_backpressure: 0,
            frames_arrived_while_busy: 0,
            total_bytes_received: 0,
            total_decode_time_ms: 0.0,
            last_decode_ms: 0.0,
            arrival_intervals: VecDeque::with_capacity(ARRIVAL_WINDOW + 1),
            last_arrival: None,
            rate_started: now,
            rate_frames_drawn: 0,
            rate_bytes: 0,
            fps: 0,
            bitrate_kbps: 0,
            width: 0,
            height: 0,
            transport_connected: false,
        }
    }

    // ── Events ───────────────────────────────────────────────────

    /// A message of `bytes` length arrived from the transport.
    pub fn record_arrival(&mut self, bytes: usize) {
        self.record_arrival_at(Instant::now(), bytes);
    }

    pub fn record_arrival_at(&mut self, now: Instant, bytes: usize) {
        self.total_frames_received += 1;
        self.total_bytes_received += bytes as u64;

        if let Some(prev) = self.last_arrival {
            let gap = as_millis_f64(now.saturating_duration_since(prev));
            self.arrival_intervals.push_back(gap);
            if self.arrival_intervals.len() > ARRIVAL_WINDOW {
                self.arrival_intervals.pop_front();
            }
        }
        self.last_arrival = Some(now);
        self.refresh_rates(now);
    }

    /// A message arrived while a frame was already being processed.
    pub fn record_busy_arrival(&mut self) {
        self.frames_arrived_while_busy += 1;
    }

    /// A pending message was replaced by a newer one.
    pub fn record_backpressure_drop(&mut self) {
        self.frames_dropped_on_backpressure += 1;
    }

    /// A frame was drawn; `decode` is the time from decode start to draw.
    pub fn record_draw(&mut self, decode: Duration) {
        self.record_draw_at(Instant::now(), decode);
    }

    pub fn record_draw_at(&mut self, now: Instant, decode: Duration) {
        let ms = as_millis_f64(decode);
        self.frames_drawn += 1;
        self.last_decode_ms = ms;
        self.total_decode_time_ms += ms;
        self.refresh_rates(now);
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_transport_connected(&mut self, connected: bool) {
        self.transport_connected = connected;
    }

    // ── Derived values ───────────────────────────────────────────

    /// Mean decode time over every drawn frame, rounded; 0 before the first draw.
    pub fn avg_decode_ms(&self) -> u64 {
        if self.frames_drawn == 0 {
            return 0;
        }
        (self.total_decode_time_ms / self.frames_drawn as f64).round() as u64
    }

    /// Share of received frames dropped by backpressure, rounded percent.
    pub fn drop_rate_percent(&self) -> u32 {
        if self.total_frames_received == 0 {
            return 0;
        }
        (self.frames_dropped_on_backpressure as f64 * 100.0 / self.total_frames_received as f64)
            .round() as u32
    }

    /// Mean of the retained inter-arrival intervals.
    pub fn avg_arrival_ms(&self) -> f64 {
        if self.arrival_intervals.is_empty() {
            return 0.0;
        }
        self.arrival_intervals.iter().sum::<f64>() / self.arrival_intervals.len() as f64
    }

    pub fn arrival_sample_count(&self) -> usize {
        self.arrival_intervals.len()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn total_frames_received(&self) -> u64 {
        self.total_frames_received
    }

    /// Snapshot the counters as of now.
    pub fn snapshot(&mut self) -> PipelineStats {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&mut self, now: Instant) -> PipelineStats {
        self.refresh_rates(now);
        PipelineStats {
            resolution: format!("{}x{}", self.width, self.height),
            width: self.width,
            height: self.height,
            fps: self.fps,
            bitrate_kbps: self.bitrate_kbps,
            total_frames_received: self.total_frames_received,
            frames_drawn: self.frames_drawn,
            frames_dropped_on_backpressure: self.frames_dropped_on_backpressure,
            frames_arrived_while_busy: self.frames_arrived_while_busy,
            drop_rate_percent: self.drop_rate_percent(),
            last_decode_ms: self.last_decode_ms,
            avg_decode_ms: self.avg_decode_ms(),
            avg_arrival_ms: self.avg_arrival_ms(),
            total_bytes_received: self.total_bytes_received,
            transport_connected: self.transport_connected,
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Recompute fps / bitrate once a full rate window has elapsed.
    fn refresh_rates(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.rate_started);
        if elapsed < RATE_WINDOW {
            return;
        }
        let dt_ms = as_millis_f64(elapsed);
        let frames = self.frames_drawn - self.rate_frames_drawn;
        let bytes = self.total_bytes_received - self.rate_bytes;

        self.fps = (frames as f64 * 1000.0 / dt_ms).round() as u32;
        self.bitrate_kbps = (bytes as f64 * 8.0 / dt_ms).round() as u64;

        self.rate_started = now;
        self.rate_frames_drawn = self.frames_drawn;
        self.rate_bytes = self.total_bytes_received;
    }
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aggregator_derives_zero() {
        let mut t = TelemetryAggregator::new();
        assert_eq!(t.avg_decode_ms(), 0);
        assert_eq!(t.drop_rate_percent(), 0);
        assert_eq!(t.avg_arrival_ms(), 0.0);

        let stats = t.snapshot();
        assert_eq!(stats.resolution, "0x0");
        assert_eq!(stats.fps, 0);
        assert!(!stats.transport_connected);
    }

    #[test]
    fn fps_and_bitrate_over_one_second() {
        let t0 = Instant::now();
        let mut t = TelemetryAggregator::starting_at(t0);

        // 24 draws and 76 800 bytes inside the window.
        for i in 0..24u64 {
            let at = t0 + Duration::from_millis(i * 40);
            t.record_arrival_at(at, 3200);
            t.record_draw_at(at, Duration::from_millis(2));
        }

        let stats = t.snapshot_at(t0 + Duration::from_millis(1000));
        assert_eq!(stats.fps, 24);
        assert_eq!(stats.bitrate_kbps, 614);
        assert_eq!(stats.total_bytes_received, 76_800);
    }

    #[test]
    fn rates_hold_until_window_elapses() {
        let t0 = Instant::now();
        let mut t = TelemetryAggregator::starting_at(t0);
        t.record_draw_at(t0 + Duration::from_millis(10), Duration::ZERO);

        let stats = t.snapshot_at(t0 + Duration::from_millis(999));
        assert_eq!(stats.fps, 0);

        let stats = t.snapshot_at(t0 + Duration::from_millis(1000));
        assert_eq!(stats.fps, 1);

        // Next window starts empty.
        let stats = t.snapshot_at(t0 + Duration::from_millis(2000));
        assert_eq!(stats.fps, 0);
    }

    #[test]
    fn arrival_window_evicts_oldest() {
        let t0 = Instant::now();
        let mut t = TelemetryAggregator::starting_at(t0);

        // First gap is 1000 ms, the following 100 gaps are 10 ms.
        t.record_arrival_at(t0, 1);
        t.record_arrival_at(t0 + Duration::from_millis(1000), 1);
        for i in 1..=100u64 {
            t.record_arrival_at(t0 + Duration::from_millis(1000 + i * 10), 1);
        }

        assert_eq!(t.arrival_sample_count(), ARRIVAL_WINDOW);
        assert!((t.avg_arrival_ms() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn decode_average_and_drop_rate() {
        let mut t = TelemetryAggregator::new();
        t.record_draw(Duration::from_millis(4));
        t.record_draw(Duration::from_millis(7));
        assert_eq!(t.avg_decode_ms(), 6); // 5.5 rounds up

        for _ in 0..3 {
            t.record_arrival(100);
        }
        t.record_backpressure_drop();
        assert_eq!(t.drop_rate_percent(), 33);
    }

    #[test]
    fn snapshot_reports_resolution_and_link() {
        let mut t = TelemetryAggregator::new();
        t.set_resolution(1280, 720);
        t.set_transport_connected(true);
        t.record_busy_arrival();

        let stats = t.snapshot();
        assert_eq!(stats.resolution, "1280x720");
        assert_eq!((stats.width, stats.height), (1280, 720));
        assert!(stats.transport_connected);
        assert_eq!(stats.frames_arrived_while_busy, 1);
    }

    #[test]
    fn stats_serialize_with_camel_case_keys() {
        let stats = TelemetryAggregator::new().snapshot();
        let json = serde_json::to_value(&stats).unwrap();
        for key in [
            "resolution",
            "bitrateKbps",
            "totalFramesReceived",
            "framesDroppedOnBackpressure",
            "framesArrivedWhileBusy",
            "dropRatePercent",
            "lastDecodeMs",
            "avgDecodeMs",
            "avgArrivalMs",
            "totalBytesReceived",
            "transportConnected",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
