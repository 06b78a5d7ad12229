//! Stream tag type and ICY metadata-block parsing
//!
//! Pure data types and parsing functions for ICY (Icecast/Shoutcast)
//! metadata blocks.

/// Tag snapshot emitted by a stream: the current `StreamTitle` and the
/// station name announced in the response headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamTag {
    pub title: Option<String>,
    pub name: Option<String>,
}

impl StreamTag {
    /// Tag carrying only a station name, from the `icy-name` family of
    /// response headers.
    pub fn from_station_name(name: &str) -> Self {
        Self {
            title: None,
            name: Some(name.to_string()),
        }
    }

    /// Tag carrying only a title, from an inline metadata block.
    pub fn from_title(title: String) -> Self {
        Self {
            title: Some(title),
            name: None,
        }
    }
}

/// Parse an ICY metadata string to extract the StreamTitle value.
///
/// ICY metadata format: `StreamTitle='Artist - Song';StreamUrl='...';`
pub fn parse_title(metadata: &str) -> Option<String> {
    let start = metadata.find("StreamTitle='")? + "StreamTitle='".len();
    let end = metadata[start..].find("';")?;
    let title = metadata[start..start + end].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Extract the title from a raw metadata block.
///
/// Raw blocks are NUL-padded to a multiple of 16 bytes; the padding is
/// stripped before parsing.  A malformed block (no `StreamTitle`, missing
/// closing quote) yields `None` and is thereby discarded.
pub fn parse_icy_block(raw: &[u8]) -> Option<String> {
    let end = raw
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    if end == 0 {
        return None;
    }

    let text = String::from_utf8_lossy(&raw[..end]);
    parse_title(&text)
}
