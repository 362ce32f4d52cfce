/// Realtime event protocol for the voice chat service
///
/// Every message carries a `type` discriminator and type-specific fields.
/// Dispatch is purely on the discriminator; beyond field presence no
/// schema validation is performed. Unknown discriminators deserialize to
/// [`ServerEvent::Unknown`] so a newer server cannot break the client.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

// ============================================================================
// Client -> Server Events
// ============================================================================

/// Events sent from the client
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session options (e.g. the transcription model)
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// New session options
        session: SessionOptions,
    },

    /// Ask the model to produce a response
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response options
        response: ResponseOptions,
    },

    /// A finished user utterance, transcribed client-side
    #[serde(rename = "user_transcript")]
    UserTranscript {
        /// Transcribed text
        text: String,
    },

    /// Base64-encoded PCM audio chunk
    #[serde(rename = "input_audio_chunk")]
    InputAudioChunk {
        /// Base64-encoded little-endian PCM samples
        audio: String,

        /// Sample rate in Hz, sent with the first chunk
        #[serde(skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
    },

    /// Liveness probe
    #[serde(rename = "ping")]
    Ping,
}

impl ClientEvent {
    /// Encode raw PCM bytes as an audio chunk event
    pub fn audio_chunk(samples: &[u8]) -> Self {
        Self::InputAudioChunk {
            audio: STANDARD.encode(samples),
            sample_rate: None,
        }
    }
}

/// Session options carried by a `session.update` event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SessionOptions {
    /// Input audio transcription options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionOptions>,
}

/// Transcription model selection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TranscriptionOptions {
    /// Model identifier (e.g. "whisper-1")
    pub model: String,
}

/// Response options carried by a `response.create` event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResponseOptions {
    /// Requested output modalities (e.g. "text", "audio")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<String>,

    /// Free-form instructions for this response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ============================================================================
// Server -> Client Events
// ============================================================================

/// Events received from the server
///
/// Deserialized via serde's tagged enum support on the `type` field.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A session was created
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session metadata
        session: SessionInfo,
    },

    /// Session options were updated
    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// A conversation was created
    #[serde(rename = "conversation.created")]
    ConversationCreated {
        /// Conversation metadata
        conversation: ConversationInfo,
    },

    /// A conversation item was appended server-side
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        /// The new item
        item: ConversationItem,

        /// Item this one follows, if any
        #[serde(default)]
        previous_item_id: Option<String>,
    },

    /// Voice activity started in the input buffer
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Voice activity stopped in the input buffer
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Input audio transcription finished
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Transcribed text
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Incremental model response transcript
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseTranscriptDelta {
        /// The new fragment
        #[serde(default)]
        delta: Option<ResponseDelta>,
    },

    /// Final model response transcript
    #[serde(rename = "response.audio_transcript.done")]
    ResponseTranscriptDone {
        /// Complete transcript
        #[serde(default)]
        transcript: Option<String>,
    },

    /// A content part was added to the response
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        /// The added part
        #[serde(default)]
        content: Option<ContentPart>,
    },

    /// Base64-encoded audio chunk for playback
    #[serde(rename = "audio_chunk")]
    AudioChunk {
        /// Base64-encoded audio data
        #[serde(default)]
        chunk: Option<String>,
    },

    /// Rate limit headroom update
    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated {
        /// Current limits
        #[serde(default)]
        rate_limits: Option<RateLimits>,
    },

    /// Server-side error report
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Acknowledgment of a liveness probe
    #[serde(rename = "pong")]
    Pong,

    /// Any discriminator this client does not handle
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Parse an inbound JSON payload
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Check if this is a heartbeat acknowledgment
    pub fn is_pong(&self) -> bool {
        matches!(self, Self::Pong)
    }

    /// Check if this is a server error report
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Session ID carried by a `session.created` event
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionCreated { session } => Some(&session.id),
            _ => None,
        }
    }

    /// Response text, whichever field carries it for this event type
    pub fn response_text(&self) -> Option<&str> {
        match self {
            Self::ResponseTranscriptDelta { delta } => {
                delta.as_ref().and_then(|d| d.text.as_deref())
            }
            Self::ResponseTranscriptDone { transcript } => transcript.as_deref(),
            Self::ContentPartAdded { content } => content.as_ref().and_then(|c| c.text.as_deref()),
            _ => None,
        }
    }

    /// Error message carried by an `error` event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => error.message.as_deref(),
            _ => None,
        }
    }

    /// Decode the audio payload of an `audio_chunk` event
    pub fn audio_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::AudioChunk { chunk } => chunk
                .as_deref()
                .and_then(|data| STANDARD.decode(data).ok()),
            _ => None,
        }
    }
}

// ============================================================================
// Supporting Types
// ============================================================================

/// Session metadata
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Unique session identifier
    pub id: String,
}

/// Conversation metadata
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConversationInfo {
    /// Unique conversation identifier
    pub id: String,
}

/// One conversation item as reported by the server
///
/// Content is kept as raw JSON; the client only stores and echoes it.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConversationItem {
    /// Unique item identifier
    pub id: String,

    /// Speaker role ("user", "assistant", ...)
    pub role: String,

    /// Content parts, passed through untouched
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Fragment of an incremental response transcript
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseDelta {
    /// Text fragment
    #[serde(default)]
    pub text: Option<String>,
}

/// A content part of a model response
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ContentPart {
    /// Text content, when the part is textual
    #[serde(default)]
    pub text: Option<String>,
}

/// Rate limit headroom as reported by the server
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RateLimits {
    /// Requests remaining in the current window
    #[serde(default)]
    pub remaining: Option<i64>,

    /// Window size
    #[serde(default)]
    pub limit: Option<i64>,

    /// When the window resets
    #[serde(default)]
    pub reset: Option<String>,
}

/// Server-side error details
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,

    /// Machine-readable code
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_serialization() {
        let json = serde_json::to_string(&ClientEvent::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_session_update_serialization() {
        let event = ClientEvent::SessionUpdate {
            session: SessionOptions {
                input_audio_transcription: Some(TranscriptionOptions {
                    model: "whisper-1".to_string(),
                }),
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"session.update""#));
        assert!(json.contains(r#""model":"whisper-1""#));
    }

    #[test]
    fn test_response_create_serialization() {
        let event = ClientEvent::ResponseCreate {
            response: ResponseOptions {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: Some("Only say hi.".to_string()),
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"response.create""#));
        assert!(json.contains(r#""modalities":["text","audio"]"#));
        assert!(json.contains("Only say hi."));
    }

    #[test]
    fn test_audio_chunk_round_trip() {
        let samples = vec![0u8, 1, 2, 255];
        let event = ClientEvent::audio_chunk(&samples);

        match &event {
            ClientEvent::InputAudioChunk { audio, sample_rate } => {
                assert_eq!(STANDARD.decode(audio).unwrap(), samples);
                assert_eq!(*sample_rate, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"input_audio_chunk""#));
        assert!(!json.contains("sample_rate"));
    }

    #[test]
    fn test_session_created_parse() {
        let json = r#"{"type":"session.created","session":{"id":"sess-42"}}"#;
        let event = ServerEvent::parse(json).unwrap();

        assert_eq!(event.session_id(), Some("sess-42"));
    }

    #[test]
    fn test_conversation_item_created_parse() {
        let json = r#"{
            "type": "conversation.item.created",
            "item": {
                "id": "item-1",
                "role": "user",
                "content": [{"type": "input_text", "text": "hello"}]
            },
            "previous_item_id": "item-0"
        }"#;

        let event = ServerEvent::parse(json).unwrap();
        match event {
            ServerEvent::ConversationItemCreated {
                item,
                previous_item_id,
            } => {
                assert_eq!(item.id, "item-1");
                assert_eq!(item.role, "user");
                assert!(item.content.is_array());
                assert_eq!(previous_item_id.as_deref(), Some("item-0"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_response_text_extraction() {
        let delta = ServerEvent::parse(
            r#"{"type":"response.audio_transcript.delta","delta":{"text":"Hel"}}"#,
        )
        .unwrap();
        assert_eq!(delta.response_text(), Some("Hel"));

        let done = ServerEvent::parse(
            r#"{"type":"response.audio_transcript.done","transcript":"Hello there"}"#,
        )
        .unwrap();
        assert_eq!(done.response_text(), Some("Hello there"));

        let part = ServerEvent::parse(
            r#"{"type":"response.content_part.added","content":{"text":"Hi"}}"#,
        )
        .unwrap();
        assert_eq!(part.response_text(), Some("Hi"));
    }

    #[test]
    fn test_error_event_parse() {
        let json = r#"{"type":"error","error":{"message":"rate limited","code":"429"}}"#;
        let event = ServerEvent::parse(json).unwrap();

        assert!(event.is_error());
        assert_eq!(event.error_message(), Some("rate limited"));
    }

    #[test]
    fn test_pong_parse() {
        let event = ServerEvent::parse(r#"{"type":"pong"}"#).unwrap();
        assert!(event.is_pong());
    }

    #[test]
    fn test_unknown_type_tolerated() {
        let event =
            ServerEvent::parse(r#"{"type":"response.output_item.done","weird":true}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(ServerEvent::parse("not json at all").is_err());
        assert!(ServerEvent::parse(r#"{"no_type_field":1}"#).is_err());
    }

    #[test]
    fn test_audio_chunk_decoding() {
        let encoded = STANDARD.encode([10u8, 20, 30]);
        let json = format!(r#"{{"type":"audio_chunk","chunk":"{}"}}"#, encoded);
        let event = ServerEvent::parse(&json).unwrap();

        assert_eq!(event.audio_bytes(), Some(vec![10, 20, 30]));

        // Missing or invalid payloads decode to nothing.
        let empty = ServerEvent::parse(r#"{"type":"audio_chunk"}"#).unwrap();
        assert_eq!(empty.audio_bytes(), None);
    }

    #[test]
    fn test_rate_limits_parse() {
        let json = r#"{
            "type": "rate_limits.updated",
            "rate_limits": {"remaining": 17, "limit": 100, "reset": "60s"}
        }"#;

        let event = ServerEvent::parse(json).unwrap();
        match event {
            ServerEvent::RateLimitsUpdated { rate_limits } => {
                let limits = rate_limits.unwrap();
                assert_eq!(limits.remaining, Some(17));
                assert_eq!(limits.limit, Some(100));
                assert_eq!(limits.reset.as_deref(), Some("60s"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_speech_markers_parse() {
        let started =
            ServerEvent::parse(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap();
        assert_eq!(started, ServerEvent::SpeechStarted);

        let stopped =
            ServerEvent::parse(r#"{"type":"input_audio_buffer.speech_stopped"}"#).unwrap();
        assert_eq!(stopped, ServerEvent::SpeechStopped);
    }
}
