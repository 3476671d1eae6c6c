//! Configuration for the relay bridge.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use relay_core::{Endpoint, PipelineConfig, RelayError, RenderBackend, RenderConfig, TransportConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub transport: TransportSection,
    pub render: RenderSection,
    pub stats: StatsSection,
    pub logging: LoggingSection,
}

/// Frame socket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// `host:port` for TCP, `unix:/path` for a Unix socket.
    pub endpoint: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay_ms: u64,
}

/// Render stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSection {
    /// "gpu" or "cpu". There is no automatic fallback between them.
    pub backend: RenderBackend,
    pub width: u32,
    pub height: u32,
    /// Read each drawn frame back for downstream consumers.
    pub publish_frames: bool,
}

/// Periodic stats reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSection {
    /// Seconds between reports; 0 disables them.
    pub interval_secs: u64,
    /// Log each report as a JSON line.
    pub json: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for TransportSection {
    fn default() -> Self {
        let defaults = TransportConfig::default();
        Self {
            endpoint: defaults.endpoint.to_string(),
            reconnect_delay_ms: defaults.reconnect_delay.as_millis() as u64,
        }
    }
}

impl Default for RenderSection {
    fn default() -> Self {
        let defaults = RenderConfig::default();
        Self {
            backend: defaults.backend,
            width: defaults.width,
            height: defaults.height,
            publish_frames: defaults.publish_frames,
        }
    }
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            json: false,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Build the pipeline settings, parsing the endpoint.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, RelayError> {
        let endpoint: Endpoint = self.transport.endpoint.parse()?;
        Ok(PipelineConfig {
            transport: TransportConfig {
                endpoint,
                reconnect_delay: Duration::from_millis(self.transport.reconnect_delay_ms.max(1)),
            },
            render: RenderConfig {
                backend: self.render.backend,
                width: self.render.width,
                height: self.render.height,
                publish_frames: self.render.publish_frames,
            },
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&BridgeConfig::default()).unwrap();
        assert!(text.contains("[transport]"));
        assert!(text.contains("endpoint = \"127.0.0.1:9301\""));
        assert!(text.contains("backend = \"gpu\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&BridgeConfig::default()).unwrap();
        let parsed: BridgeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.transport.reconnect_delay_ms, 2000);
        assert_eq!((parsed.render.width, parsed.render.height), (640, 480));
        assert_eq!(parsed.stats.interval_secs, 5);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: BridgeConfig = toml::from_str(
            r#"
            [render]
            backend = "cpu"

            [stats]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(parsed.render.backend, RenderBackend::Cpu);
        assert_eq!(parsed.render.width, 640);
        assert!(parsed.stats.json);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn to_pipeline_config_parses_endpoint() {
        let mut cfg = BridgeConfig::default();
        cfg.transport.endpoint = "unix:/run/frames.sock".into();
        let pipeline = cfg.to_pipeline_config().unwrap();
        assert_eq!(pipeline.transport.endpoint.to_string(), "unix:/run/frames.sock");
        assert_eq!(pipeline.transport.reconnect_delay, Duration::from_millis(2000));

        cfg.transport.endpoint = "not an address".into();
        assert!(matches!(
            cfg.to_pipeline_config(),
            Err(RelayError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = BridgeConfig::load(Path::new("/nonexistent/relay-bridge.toml"));
        assert_eq!(cfg.transport.endpoint, "127.0.0.1:9301");
    }

    #[test]
    fn write_default_then_load() {
        let path = std::env::temp_dir().join(format!("relay-bridge-{}.toml", std::process::id()));
        BridgeConfig::write_default(&path).unwrap();
        let cfg = BridgeConfig::load(&path);
        assert_eq!(cfg.render.backend, RenderBackend::Gpu);
        let _ = std::fs::remove_file(&path);
    }
}
