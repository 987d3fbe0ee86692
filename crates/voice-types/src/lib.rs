use serde::{Deserialize, Serialize};

/// Reason why a playback stream ended on the player side.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Every queued buffer played after the producer declared end-of-stream.
    Eof,
    /// The output engine could not be started or failed mid-stream.
    Error,
    /// Playback was interrupted by the caller.
    Stopped,
}

/// Point-in-time view of a streaming player's queue.
///
/// Counters are per stream: a reset starts a new `generation` with zeroed counters.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamStatus {
    /// Stream generation, bumped on every reset.
    pub generation: u64,
    /// Buffers handed to the output engine (including ones lost to a failed engine start).
    pub scheduled: u64,
    /// Buffers whose playback finished.
    pub completed: u64,
    /// Scheduled buffers dropped because the output engine failed to start; they never finish.
    #[serde(default)]
    pub lost: u64,
    /// `true` once the producer declared that no further chunks will arrive.
    pub stream_complete: bool,
    /// `true` once the stream was interrupted.
    pub interrupted: bool,
    /// `true` once `playback_finished` was emitted for this stream.
    pub finished: bool,
    /// Whether the output engine is currently running.
    pub engine_running: bool,
    /// Samples held in the accumulated history (interleaved when stereo).
    pub history_samples: u64,
}

impl StreamStatus {
    /// Buffers submitted but not yet finished playing.
    pub fn backlog(&self) -> u64 {
        self.scheduled.saturating_sub(self.completed)
    }

    /// Everything that can still play has played, but buffers lost to a failed engine start
    /// keep the backlog from draining.
    pub fn drained_with_losses(&self) -> bool {
        self.lost > 0 && self.backlog() == self.lost
    }
}

/// Client events sent to a conversation-style realtime API.
///
/// Pure data: the player never sends these itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Append a single item to the conversation.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item: ConversationItem,
    },
}

impl ClientEvent {
    /// A user message carrying base64-encoded PCM16 audio.
    pub fn user_audio(audio_base64: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            event_id: None,
            item: ConversationItem::user(ContentPart::InputAudio {
                audio: audio_base64.into(),
            }),
        }
    }

    /// A user message carrying plain text.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            event_id: None,
            item: ConversationItem::user(ContentPart::InputText { text: text.into() }),
        }
    }
}

/// Conversation item payload of `conversation.item.create`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    fn user(part: ContentPart) -> Self {
        Self {
            kind: ItemKind::Message,
            role: Role::User,
            content: vec![part],
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One content part of a conversation message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Base64-encoded PCM16 audio.
    InputAudio { audio: String },
    /// Plain user text.
    InputText { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_audio_serializes_with_type_tags() {
        let event = ClientEvent::user_audio("AAAA");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{ "type": "input_audio", "audio": "AAAA" }]
                }
            })
        );
    }

    #[test]
    fn user_text_keeps_event_id_when_present() {
        let raw = r#"{
            "type": "conversation.item.create",
            "event_id": "evt_1",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{ "type": "input_text", "text": "hello" }]
            }
        }"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        let ClientEvent::ConversationItemCreate { event_id, item } = event;
        assert_eq!(event_id.as_deref(), Some("evt_1"));
        assert_eq!(item.role, Role::User);
        assert_eq!(
            item.content,
            vec![ContentPart::InputText {
                text: "hello".to_string()
            }]
        );
    }

    #[test]
    fn stream_status_backlog_never_negative() {
        let status = StreamStatus {
            scheduled: 2,
            completed: 3,
            ..StreamStatus::default()
        };
        assert_eq!(status.backlog(), 0);
    }

    #[test]
    fn drained_with_losses_needs_a_lost_buffer() {
        let mut status = StreamStatus {
            scheduled: 3,
            completed: 2,
            lost: 1,
            ..StreamStatus::default()
        };
        assert!(status.drained_with_losses());
        status.completed = 1;
        assert!(!status.drained_with_losses());
        status.lost = 0;
        status.completed = 3;
        assert!(!status.drained_with_losses());
    }

    #[test]
    fn end_reason_uses_snake_case() {
        let json = serde_json::to_string(&PlaybackEndReason::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
    }
}
