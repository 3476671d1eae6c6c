//! Notifications emitted to the host.

use serde::Serialize;

/// Everything the pipeline reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    TransportConnected,
    TransportDisconnected,
    /// The render target now has this size.
    ResolutionChanged { width: u32, height: u32 },
    /// A frame failed to render; the pipeline carried on.
    FrameError { message: String },
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportConnected => write!(f, "transport connected"),
            Self::TransportDisconnected => write!(f, "transport disconnected"),
            Self::ResolutionChanged { width, height } => {
                write!(f, "resolution changed to {width}x{height}")
            }
            Self::FrameError { message } => write!(f, "frame error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_value(PipelineEvent::ResolutionChanged {
            width: 1280,
            height: 720,
        })
        .unwrap();
        assert_eq!(json["type"], "resolutionChanged");
        assert_eq!(json["width"], 1280);

        let json = serde_json::to_value(PipelineEvent::TransportConnected).unwrap();
        assert_eq!(json["type"], "transportConnected");
    }
}
