//! Peer string formatting.

use std::borrow::Cow;

const ABBREVIATION: &str = "...";

/// Shorten a peer list so it fits in `max_length` characters.
///
/// Limits too small to hold the abbreviation are filled with dots.
pub fn shorten_peer(peer: &str, max_length: usize) -> Cow<'_, str> {
    if peer.chars().count() <= max_length {
        return Cow::Borrowed(peer);
    }
    if max_length < ABBREVIATION.len() {
        return Cow::Borrowed(&ABBREVIATION[..max_length]);
    }
    let keep = max_length.saturating_sub(ABBREVIATION.len());
    let mut shortened: String = peer.chars().take(keep).collect();
    shortened.push_str(ABBREVIATION);
    Cow::Owned(shortened)
}
