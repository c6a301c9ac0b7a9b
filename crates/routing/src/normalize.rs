//! Canonical spelling of inbound chat sources.
//!
//! The sheet and the live update stream describe the same chat in different
//! shapes (`news_ch`, `@news_ch`, `https://t.me/news_ch`, `-100123`). Every
//! spelling is folded into one [`SourceKey`] before it touches the route table.

use std::fmt;

/// Path fragments that introduce a public handle inside a Telegram link.
const LINK_MARKERS: &[&str] = &["t.me/", "telegram.me/"];

/// Prefix marking a public handle.
pub const HANDLE_MARKER: char = '@';

/// Normalized identifier of an inbound chat source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(String);

impl SourceKey {
    /// Key taken verbatim, bypassing [`normalize`]. Used for the legacy
    /// link-style lookup spelling.
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty keys are never valid routing keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the key is a public handle (as opposed to a numeric chat id).
    pub fn is_handle(&self) -> bool {
        self.0.starts_with(HANDLE_MARKER)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fold a raw source spelling into its canonical [`SourceKey`].
///
/// Links are reduced to the handle that follows the last link marker, bare
/// handles gain the `@` marker, and numeric chat ids are kept verbatim.
/// The function is idempotent.
pub fn normalize(raw: &str) -> SourceKey {
    let mut text = raw.trim();

    if let Some(rest) = strip_link(text) {
        text = rest.trim();
    }

    if text.is_empty() || text == "@" {
        return SourceKey::default();
    }

    if is_numeric_id(text) || text.starts_with(HANDLE_MARKER) {
        SourceKey(text.to_string())
    } else {
        SourceKey(format!("{HANDLE_MARKER}{text}"))
    }
}

/// Returns the handle segment of a Telegram link, or `None` when `text` is
/// not a link.
fn strip_link(text: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets stable.
    let lower = text.to_ascii_lowercase();
    let end = LINK_MARKERS
        .iter()
        .filter_map(|marker| lower.rfind(marker).map(|idx| idx + marker.len()))
        .max()?;
    let mut tail = &text[end..];
    // Web preview links read `t.me/s/<name>`.
    if tail.get(..2).is_some_and(|seg| seg.eq_ignore_ascii_case("s/")) {
        tail = &tail[2..];
    }
    let cut = tail.find(['/', '?', '#']).unwrap_or(tail.len());
    Some(&tail[..cut])
}

/// Digits with an optional leading sign.
pub fn is_numeric_id(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Link-style spelling of a handle, as older sheets sometimes store it.
pub fn link_spelling(handle: &str) -> String {
    let bare = handle.trim().trim_start_matches(HANDLE_MARKER);
    format!("t.me/{bare}")
}
