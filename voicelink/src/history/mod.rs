/// Conversation history tracking
///
/// Mirrors what the server has seen so a refreshed session can be
/// restored with full context. Records are append-only and never mutated
/// after insertion; history survives reconnects and credential refreshes
/// and is cleared only when the session is torn down.

use serde::Serialize;
use tracing::debug;

use crate::protocol::ServerEvent;

/// One conversation item as reported by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    /// Server-assigned item identifier
    pub id: String,

    /// Speaker role ("user", "assistant", ...)
    pub role: String,

    /// Content parts, passed through untouched
    pub content: serde_json::Value,

    /// Item this one follows, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_item_id: Option<String>,
}

/// Append-only record of one conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    session_id: Option<String>,
    conversation_id: Option<String>,
    records: Vec<MessageRecord>,
}

impl ConversationHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Track ids and items from an inbound event
    ///
    /// Only `session.created`, `conversation.created` and
    /// `conversation.item.created` affect the history; everything else is
    /// ignored.
    pub fn record(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::SessionCreated { session } => {
                debug!(session_id = %session.id, "session created");
                self.session_id = Some(session.id.clone());
            }
            ServerEvent::ConversationCreated { conversation } => {
                debug!(conversation_id = %conversation.id, "conversation created");
                self.conversation_id = Some(conversation.id.clone());
            }
            ServerEvent::ConversationItemCreated {
                item,
                previous_item_id,
            } => {
                self.records.push(MessageRecord {
                    id: item.id.clone(),
                    role: item.role.clone(),
                    content: item.content.clone(),
                    previous_item_id: previous_item_id.clone(),
                });
            }
            _ => {}
        }
    }

    /// Current session ID, once the server has reported one
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Current conversation ID, once the server has reported one
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// All recorded items, oldest first
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Number of recorded items
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no items have been recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records and ids; called on session teardown only
    pub fn clear(&mut self) {
        self.session_id = None;
        self.conversation_id = None;
        self.records.clear();
    }
}
