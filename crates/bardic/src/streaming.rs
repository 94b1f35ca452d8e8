//! Cosmetic word-by-word pacing over a completed answer.
//!
//! The endpoint is consumed in one shot; this re-exposes the final text
//! as a finite stream of word tokens with an artificial delay, the way
//! the web app appears to type. Dropping the stream abandons the
//! remaining tokens.

use std::time::Duration;

use futures_util::stream::{self, Stream};
use tokio::time::sleep;

/// Split `text` on single spaces and emit each word with one trailing
/// space, sleeping `pace` between successive tokens (not before the
/// first, not after the last).
pub fn words(text: String, pace: Duration) -> impl Stream<Item = String> {
    let tokens: Vec<String> = text.split(' ').map(|word| format!("{word} ")).collect();
    stream::unfold(
        (tokens.into_iter(), true),
        move |(mut tokens, first)| async move {
            let token = tokens.next()?;
            if !first {
                sleep(pace).await;
            }
            Some((token, (tokens, false)))
        },
    )
}
