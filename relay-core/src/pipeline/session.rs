//! Boundary to the conferencing session.
//!
//! The pipeline does not run a session itself. Control commands from the
//! host are forwarded unchanged to whatever [`ConferenceSession`] is
//! attached and only success or failure comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Conferencing collaborator that consumes the rendered video.
#[async_trait]
pub trait ConferenceSession: Send + Sync {
    async fn join(&self, room: &str) -> Result<(), RelayError>;

    async fn leave(&self) -> Result<(), RelayError>;

    async fn set_audio_muted(&self, muted: bool) -> Result<(), RelayError>;

    async fn set_video_muted(&self, muted: bool) -> Result<(), RelayError>;

    /// Toggle end-to-end encryption on the session's tracks.
    async fn set_encryption(&self, enabled: bool) -> Result<(), RelayError>;
}

/// A host command destined for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum SessionCommand {
    Join { room: String },
    Leave,
    SetAudioMuted { muted: bool },
    SetVideoMuted { muted: bool },
    SetEncryption { enabled: bool },
}

impl SessionCommand {
    /// Hand the command to `session` without interpreting it.
    pub async fn forward(&self, session: &dyn ConferenceSession) -> Result<(), RelayError> {
        match self {
            Self::Join { room } => session.join(room).await,
            Self::Leave => session.leave().await,
            Self::SetAudioMuted { muted } => session.set_audio_muted(*muted).await,
            Self::SetVideoMuted { muted } => session.set_video_muted(*muted).await,
            Self::SetEncryption { enabled } => session.set_encryption(*enabled).await,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, call: String) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl ConferenceSession for Recorder {
        async fn join(&self, room: &str) -> Result<(), RelayError> {
            if room.is_empty() {
                return Err(RelayError::Session("empty room".into()));
            }
            self.push(format!("join {room}"))
        }
        async fn leave(&self) -> Result<(), RelayError> {
            self.push("leave".into())
        }
        async fn set_audio_muted(&self, muted: bool) -> Result<(), RelayError> {
            self.push(format!("audio {muted}"))
        }
        async fn set_video_muted(&self, muted: bool) -> Result<(), RelayError> {
            self.push(format!("video {muted}"))
        }
        async fn set_encryption(&self, enabled: bool) -> Result<(), RelayError> {
            self.push(format!("e2ee {enabled}"))
        }
    }

    #[tokio::test]
    async fn forwards_each_command() {
        let session = Recorder::default();
        let commands = [
            SessionCommand::Join { room: "standup".into() },
            SessionCommand::SetAudioMuted { muted: true },
            SessionCommand::SetVideoMuted { muted: false },
            SessionCommand::SetEncryption { enabled: true },
            SessionCommand::Leave,
        ];
        for cmd in &commands {
            cmd.forward(&session).await.unwrap();
        }
        assert_eq!(
            *session.calls.lock().unwrap(),
            ["join standup", "audio true", "video false", "e2ee true", "leave"]
        );
    }

    #[test]
    fn failure_is_passed_through() {
        let session = Recorder::default();
        let result =
            tokio_test::block_on(SessionCommand::Join { room: String::new() }.forward(&session));
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, RelayError::Session(_)));
        assert!(session.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn command_json_shape() {
        let cmd: SessionCommand =
            serde_json::from_str(r#"{"command":"setAudioMuted","muted":true}"#).unwrap();
        assert_eq!(cmd, SessionCommand::SetAudioMuted { muted: true });
    }
}
