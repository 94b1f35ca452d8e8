//! Conversation identifier state.

/// Opaque server-issued identifiers that let a follow-up request
/// reference prior conversational state.
///
/// Treated as an immutable value: the client snapshots it at the start of
/// a call and replaces the whole value when a response echoes a new pair,
/// so concurrent calls never observe a half-updated state.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionState {
    pub conversation_id: Option<String>,
    pub response_id: Option<String>,
}

impl SessionState {
    pub fn new(conversation_id: impl Into<String>, response_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            response_id: Some(response_id.into()),
        }
    }

    /// Whether any prior conversation is referenced.
    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_none() && self.response_id.is_none()
    }
}
