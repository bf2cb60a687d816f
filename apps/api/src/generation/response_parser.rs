//! Response parser: pulls one JSON document out of free-text model output.
//!
//! Locating the payload (`locate_payload`) is separate from decoding it
//! (`parse_model_output`) so each step can be tested on its own. Only code
//! fences are recognised; prose outside a fence is left in place and will fail
//! to decode. No schema checks happen here; see `validation`.

use serde_json::Value;
use thiserror::Error;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Which fence, if any, the payload was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceKind {
    Json,
    Generic,
    NotFound,
}

/// The slice of model output that should hold the JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub fence: FenceKind,
    pub body: &'a str,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model output contained no JSON payload (fence: {fence:?})")]
    Empty { fence: FenceKind },

    #[error("model output is not valid JSON (fence: {fence:?}): {source}")]
    Decode {
        fence: FenceKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Finds the payload: the first ```` ```json ```` fence wins, then the first
/// bare ```` ``` ```` fence, else the whole text. A fence with no closing
/// marker runs to the end of the text.
pub fn locate_payload(text: &str) -> Candidate<'_> {
    for (marker, fence) in [(JSON_FENCE, FenceKind::Json), (FENCE, FenceKind::Generic)] {
        if let Some((_, after)) = text.split_once(marker) {
            let body = after.split_once(FENCE).map_or(after, |(inner, _)| inner);
            return Candidate {
                fence,
                body: body.trim(),
            };
        }
    }

    Candidate {
        fence: FenceKind::NotFound,
        body: text.trim(),
    }
}

/// Locates and strictly decodes the JSON payload.
pub fn parse_model_output(text: &str) -> Result<Value, ParseError> {
    let candidate = locate_payload(text);
    if candidate.body.is_empty() {
        return Err(ParseError::Empty {
            fence: candidate.fence,
        });
    }

    serde_json::from_str(candidate.body).map_err(|source| ParseError::Decode {
        fence: candidate.fence,
        source,
    })
}
