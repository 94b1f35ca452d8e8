//! Response envelope decoding.
//!
//! The endpoint answers with a line-oriented batch envelope: an optional
//! anti-hijacking guard prefix, then a JSON array on the first line. The
//! answer sits several positional layers deep, one of them re-encoded as
//! a JSON string. Everything here is best-effort: a shape mismatch
//! anywhere is "no match at this branch", never an error, so callers
//! cannot distinguish "service returned nothing" from "shape changed".

use serde_json::Value;

/// Guard prefix some Google endpoints emit to break naive cross-site
/// script inclusion; must be stripped before parsing.
pub const GUARD_PREFIX: &str = ")]}'";

/// Tag of the batch element boxing one logical response fragment.
const MARKER_TAG: &str = "wrb.fr";

const FENCE: &str = "```";

/// A decoded reply.
///
/// `text` is empty when nothing recognizable was found; callers must
/// treat that as "no answer extracted", not as an error. The identifier
/// pair is echoed by the server when it opened or continued a
/// conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub conversation_id: Option<String>,
    pub response_id: Option<String>,
}

/// Decode a raw response body. Never fails.
pub fn decode(raw: &str) -> Reply {
    first_fragment(raw).unwrap_or_default()
}

/// First marker fragment in the batch that yields an answer.
fn first_fragment(raw: &str) -> Option<Reply> {
    let text = raw.strip_prefix(GUARD_PREFIX).unwrap_or(raw);
    let line = text.trim().lines().next()?;
    let batch: Value = serde_json::from_str(line).ok()?;
    batch.as_array()?.iter().find_map(fragment_reply)
}

/// Decode one batch element, if it is a marker tuple carrying an answer.
fn fragment_reply(item: &Value) -> Option<Reply> {
    let tuple = item.as_array()?;
    if tuple.len() < 3 || tuple[0].as_str()? != MARKER_TAG {
        return None;
    }
    // The fragment payload is itself JSON, re-encoded as a string.
    let payload = tuple[2].as_str().filter(|s| !s.is_empty())?;
    let payload: Value = serde_json::from_str(payload).ok()?;
    let parts = payload.get(4)?.as_array()?;
    let text = parts.iter().find_map(part_text)?;
    let (conversation_id, response_id) = conversation_pair(&payload);
    Some(Reply {
        text,
        conversation_id,
        response_id,
    })
}

/// Candidate text of one part: slot 1, or the first element of a nested
/// list in slot 1. Fenced content only matches once at least three
/// fence-delimited segments exist; the text after the final fence wins.
fn part_text(part: &Value) -> Option<String> {
    let part = part.as_array()?;
    if part.len() < 2 {
        return None;
    }
    let candidate = match &part[1] {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let content = candidate.as_str()?;
    if content.trim().is_empty() {
        return None;
    }
    if content.contains(FENCE) {
        let segments: Vec<&str> = content.split(FENCE).collect();
        if segments.len() >= 3 {
            return Some(segments.last()?.trim().to_string());
        }
        return None;
    }
    Some(content.to_string())
}

/// Echoed conversation identifiers at payload slot 1, best-effort.
fn conversation_pair(payload: &Value) -> (Option<String>, Option<String>) {
    let Some(pair) = payload.get(1).and_then(Value::as_array) else {
        return (None, None);
    };
    let id = |slot: usize| {
        pair.get(slot)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    (id(0), id(1))
}
