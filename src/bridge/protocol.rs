//! JSON frames exchanged between the hub and the browser extension.
//!
//! The extension sends events tagged by `type`; the hub sends commands
//! tagged by `action`.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meeting::MeetingControl;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionEvent {
    #[serde(rename_all = "camelCase")]
    MeetingJoined {
        meeting_id: String,
        meeting_url: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    MeetingLeft {
        meeting_id: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    ParticipantJoined {
        participant: ParticipantInfo,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    ParticipantLeft {
        participant: ParticipantInfo,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    Transcript {
        speaker: String,
        text: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    AudioChunk {
        data: Vec<f32>,
        sample_rate: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    RecordingComplete {
        /// `data:<mime>;base64,<payload>`
        data: String,
        mime_type: String,
    },
    StatusUpdate {
        #[serde(flatten)]
        details: serde_json::Map<String, serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    TabClosed { tab_id: i64 },
}

impl ExtensionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MeetingJoined { .. } => "MEETING_JOINED",
            Self::MeetingLeft { .. } => "MEETING_LEFT",
            Self::ParticipantJoined { .. } => "PARTICIPANT_JOINED",
            Self::ParticipantLeft { .. } => "PARTICIPANT_LEFT",
            Self::Transcript { .. } => "TRANSCRIPT",
            Self::AudioChunk { .. } => "AUDIO_CHUNK",
            Self::RecordingComplete { .. } => "RECORDING_COMPLETE",
            Self::StatusUpdate { .. } => "STATUS_UPDATE",
            Self::TabClosed { .. } => "TAB_CLOSED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeCommand {
    #[serde(rename_all = "camelCase")]
    JoinMeeting {
        meeting_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    LeaveMeeting,
    MuteMicrophone,
    UnmuteMicrophone,
    TurnOffCamera,
    TurnOnCamera,
    GetParticipants,
    StartRecording,
    StopRecording,
}

impl From<MeetingControl> for BridgeCommand {
    fn from(control: MeetingControl) -> Self {
        match control {
            MeetingControl::Mute => Self::MuteMicrophone,
            MeetingControl::Unmute => Self::UnmuteMicrophone,
            MeetingControl::CameraOn => Self::TurnOnCamera,
            MeetingControl::CameraOff => Self::TurnOffCamera,
            MeetingControl::StartRecording => Self::StartRecording,
            MeetingControl::StopRecording => Self::StopRecording,
            MeetingControl::Participants => Self::GetParticipants,
        }
    }
}

/// Notices the hub sends outside the command stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HubNotice {
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished { client_id: String },
}

/// Anything a relay can receive from the hub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HubFrame {
    Command(BridgeCommand),
    Notice(HubNotice),
}

/// Decode the payload of a base64 `data:` URL. A bare base64 string is accepted too.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>> {
    let payload = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| anyhow!("Data URL has no payload"))?;
            if !header.ends_with(";base64") {
                return Err(anyhow!("Data URL is not base64 encoded"));
            }
            payload
        }
        None => data,
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("Invalid base64 audio payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_meeting_joined() {
        let raw = r#"{"type":"MEETING_JOINED","meetingId":"abc-defg-hij",
            "meetingUrl":"https://meet.google.com/abc-defg-hij","timestamp":"2024-05-01T10:00:00.000Z"}"#;
        let event: ExtensionEvent = serde_json::from_str(raw).unwrap();
        match event {
            ExtensionEvent::MeetingJoined {
                meeting_id,
                timestamp,
                ..
            } => {
                assert_eq!(meeting_id, "abc-defg-hij");
                assert_eq!(timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_audio_chunk_and_status() {
        let chunk: ExtensionEvent = serde_json::from_value(json!({
            "type": "AUDIO_CHUNK", "data": [0.0, 0.25, -0.5], "sampleRate": 48000
        }))
        .unwrap();
        assert!(matches!(
            chunk,
            ExtensionEvent::AudioChunk { ref data, sample_rate: 48000, .. } if data.len() == 3
        ));

        let status: ExtensionEvent = serde_json::from_value(json!({
            "type": "STATUS_UPDATE", "muted": true, "camera": false
        }))
        .unwrap();
        match status {
            ExtensionEvent::StatusUpdate { details } => assert_eq!(details["muted"], true),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_or_malformed_events_fail() {
        assert!(serde_json::from_str::<ExtensionEvent>(r#"{"type":"DANCE"}"#).is_err());
        assert!(serde_json::from_str::<ExtensionEvent>(r#"{"type":"TRANSCRIPT"}"#).is_err());
        assert!(serde_json::from_str::<ExtensionEvent>("not json").is_err());
    }

    #[test]
    fn test_command_wire_format() {
        let join = BridgeCommand::JoinMeeting {
            meeting_url: "https://meet.google.com/abc-defg-hij".into(),
            display_name: Some("Agent".into()),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({"action": "JOIN_MEETING", "meetingUrl": "https://meet.google.com/abc-defg-hij", "displayName": "Agent"})
        );
        assert_eq!(
            serde_json::to_value(BridgeCommand::TurnOffCamera).unwrap(),
            json!({"action": "TURN_OFF_CAMERA"})
        );
        assert_eq!(
            BridgeCommand::from(MeetingControl::Participants),
            BridgeCommand::GetParticipants
        );
    }

    #[test]
    fn test_hub_frames() {
        let frame: HubFrame =
            serde_json::from_str(r#"{"type":"CONNECTION_ESTABLISHED","clientId":"c1"}"#).unwrap();
        assert_eq!(
            frame,
            HubFrame::Notice(HubNotice::ConnectionEstablished {
                client_id: "c1".into()
            })
        );

        let frame: HubFrame = serde_json::from_str(r#"{"action":"LEAVE_MEETING"}"#).unwrap();
        assert_eq!(frame, HubFrame::Command(BridgeCommand::LeaveMeeting));
    }

    #[test]
    fn test_decode_data_url() {
        assert_eq!(
            decode_data_url("data:audio/webm;codecs=opus;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert_eq!(decode_data_url("aGVsbG8=").unwrap(), b"hello");
        assert!(decode_data_url("data:audio/webm,plain").is_err());
        assert!(decode_data_url("data:audio/webm;base64,!!!").is_err());
    }
}
