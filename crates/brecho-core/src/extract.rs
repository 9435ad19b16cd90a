//! Pull a JSON object out of free-form oracle text.
//!
//! Models wrap their answer in prose or markdown fences. The first
//! balanced `{...}` span is located (braces inside string literals do not
//! count) and decoded strictly.

use serde_json::{Map, Value};

use crate::proposal::Proposal;

/// Why no object could be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractFailure {
    /// No balanced `{...}` span in the text.
    NoObject,
    /// The span was found but is not valid JSON.
    Malformed(String),
}

impl std::fmt::Display for ExtractFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoObject => write!(f, "no JSON object in response"),
            Self::Malformed(e) => write!(f, "malformed JSON object: {}", e),
        }
    }
}

/// Locate the first balanced `{...}` span.
///
/// Scanning restarts at the next `{` when a candidate never closes.
pub fn find_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        if let Some(close) = balanced_end(&bytes[open..]) {
            return Some(&text[open..=open + close]);
        }
        start = open + 1;
    }
    None
}

/// Index of the brace closing the one at `bytes[0]`.
fn balanced_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and strictly decode the first JSON object in `text`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ExtractFailure> {
    let span = find_json_object(text).ok_or(ExtractFailure::NoObject)?;
    serde_json::from_str::<Map<String, Value>>(span)
        .map_err(|e| ExtractFailure::Malformed(e.to_string()))
}

/// Parse-or-empty: any failure yields an empty proposal.
pub fn parse_proposal(text: &str) -> Proposal {
    match extract_json_object(text) {
        Ok(object) => Proposal::from_json_object(object),
        Err(failure) => {
            tracing::debug!("Oracle response not usable: {}", failure);
            Proposal::default()
        }
    }
}
