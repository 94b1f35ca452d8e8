//! Request envelope encoding.
//!
//! The frontend expects a doubly-JSON-encoded positional array in a
//! single form field named `f.req`. Field order and array arity are fixed
//! by the undocumented contract; any deviation is rejected server-side.

use serde_json::json;

use crate::session::SessionState;

/// Form field carrying the envelope.
pub const FORM_FIELD: &str = "f.req";

/// Build the `f.req` value for one user message.
///
/// The message is inserted verbatim (standard JSON string escaping only,
/// no validation); the identifier pair degenerates to `[null, null]` when
/// no conversation is referenced.
pub fn form_value(message: &str, session: &SessionState) -> String {
    let inner = json!([
        [message, 0, null, null, null, null, 0],
        ["en-US"],
        [&session.conversation_id, &session.response_id],
    ]);
    json!([null, inner.to_string()]).to_string()
}
