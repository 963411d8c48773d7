//! Response Validator: turns raw model text into a typed report or an explicit "no result".
//!
//! Never panics on any input: empty text, whitespace, truncated JSON and JSON of the
//! wrong shape all come back as `ReplyError`.

use thiserror::Error;
use tracing::warn;

use crate::analysis::mode::{AnalysisMode, KnowledgeGapReport};

const EXCERPT_CHARS: usize = 200;
const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("the model returned an empty reply")]
    Empty,

    #[error("reply is not valid JSON ({source}); excerpt: {excerpt:?}")]
    Malformed {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },

    #[error("reply JSON does not fit the {mode} schema ({reason}); excerpt: {excerpt:?}")]
    Shape {
        mode: AnalysisMode,
        reason: String,
        excerpt: String,
    },
}

/// Strips a leading fence (with an optional language tag) and a trailing fence.
/// Text without fences is returned unchanged; applying this twice equals applying it once.
pub fn strip_code_fences(text: &str) -> &str {
    let mut current = text;
    loop {
        let next = strip_fence_once(current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_fence_once(text: &str) -> &str {
    let trimmed = text.trim();
    let mut body = trimmed;
    let mut stripped = false;

    if let Some(rest) = body.strip_prefix(FENCE) {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
            .unwrap_or(rest.len());
        let after_tag = &rest[tag_len..];
        // a tag ends the opening line, except `json` which may run into the body
        let tag = &rest[..tag_len];
        let has_tag = tag.eq_ignore_ascii_case("json")
            || (tag_len > 0
                && (after_tag.is_empty() || after_tag.starts_with(char::is_whitespace)));
        body = (if has_tag { after_tag } else { rest }).trim_start();
        stripped = true;
    }

    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest.trim_end();
        stripped = true;
    }

    if stripped {
        body
    } else {
        text
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Validates one reply against the active mode.
///
/// A reply that parses but carries none of the mode's keys is returned as `Ok`;
/// callers check `KnowledgeGapReport::is_usable`.
pub fn parse_reply(
    raw: Option<&str>,
    mode: AnalysisMode,
) -> Result<KnowledgeGapReport, ReplyError> {
    let text = match raw.map(str::trim) {
        Some(text) if !text.is_empty() => strip_code_fences(text),
        _ => {
            warn!("Analysis reply was empty");
            return Err(ReplyError::Empty);
        }
    };
    if text.is_empty() {
        warn!("Analysis reply held only an empty code fence");
        return Err(ReplyError::Empty);
    }

    let value: serde_json::Value = serde_json::from_str(text).map_err(|source| {
        let err = ReplyError::Malformed {
            source,
            excerpt: excerpt(text),
        };
        warn!("Error parsing analysis reply: {err}");
        err
    })?;

    let serde_json::Value::Object(object) = value else {
        let err = ReplyError::Shape {
            mode,
            reason: "top level is not an object".to_string(),
            excerpt: excerpt(text),
        };
        warn!("{err}");
        return Err(err);
    };

    mode.read_report(object).map_err(|e| {
        let err = ReplyError::Shape {
            mode,
            reason: e.to_string(),
            excerpt: excerpt(text),
        };
        warn!("{err}");
        err
    })
}
