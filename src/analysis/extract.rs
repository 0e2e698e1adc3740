//! Model response extraction and validation.
//!
//! Turns the raw text returned by the model into validated widgets.
//! Unparsable text is a hard failure; individual widgets that are
//! malformed or of an unknown kind are dropped with a warning.

use crate::models::{AnalysisResult, RawWidget, WidgetKind, WidgetSpec};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

/// A text wrapper the model may put around its JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    pub open: &'static str,
    pub close: &'static str,
}

/// Recognized wrappers, most specific first.
pub const FENCES: &[Fence] = &[
    Fence {
        open: "```json",
        close: "```",
    },
    Fence {
        open: "```JSON",
        close: "```",
    },
    Fence {
        open: "```",
        close: "```",
    },
];

impl Fence {
    /// Remove this fence's markers from `text`, leaving the interior untouched.
    ///
    /// The opening marker must be followed by whitespace or the start of the
    /// payload. A missing closing marker (truncated output) is tolerated.
    pub fn strip<'a>(&self, text: &'a str) -> Option<&'a str> {
        let body = text.strip_prefix(self.open)?;
        if !body.starts_with(|c: char| c.is_whitespace() || c == '{' || c == '[') {
            return None;
        }

        let body = body.trim_end();
        let body = body.strip_suffix(self.close).unwrap_or(body);
        Some(body.trim())
    }
}

/// Trim the text and remove the first recognized fence, if any.
pub fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim();

    for fence in FENCES {
        if let Some(inner) = fence.strip(trimmed) {
            debug!("Stripped {} fence from model response", fence.open);
            return inner;
        }
    }

    trimmed
}

/// Why a model response could not be turned into widgets.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("model response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model response has no 'widgets' list")]
    MissingWidgets,

    #[error("model response contains no valid explanation widget")]
    NoExplanation,
}

/// Extract widgets, folding any failure into a degraded result.
pub fn extract(raw: &str) -> AnalysisResult {
    match extract_widgets(raw) {
        Ok(widgets) => AnalysisResult::success(widgets),
        Err(e) => {
            error!("Failed to extract widgets: {}", e);
            AnalysisResult::degraded(e.to_string())
        }
    }
}

/// Parse and validate the widgets in a raw model response.
pub fn extract_widgets(raw: &str) -> Result<Vec<WidgetSpec>, ExtractionError> {
    let value: Value = serde_json::from_str(normalize(raw))?;

    let items = match value {
        Value::Object(mut map) => match map.remove("widgets") {
            Some(Value::Array(items)) => items,
            _ => return Err(ExtractionError::MissingWidgets),
        },
        _ => return Err(ExtractionError::MissingWidgets),
    };

    let received = items.len();
    let mut widgets: Vec<WidgetSpec> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| validate_widget(index, item))
        .collect();

    if widgets.len() < received {
        warn!("Kept {} of {} widgets from model response", widgets.len(), received);
    }

    explanation_first(&mut widgets)?;
    Ok(widgets)
}

fn validate_widget(index: usize, item: Value) -> Option<WidgetSpec> {
    let raw: RawWidget = match serde_json::from_value(item) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Dropping widget #{}: {}", index, e);
            return None;
        }
    };

    let title = raw.title.clone();
    match WidgetSpec::try_from(raw) {
        Ok(widget) => Some(widget),
        Err(e) => {
            warn!("Dropping widget #{} '{}': {}", index, title, e);
            None
        }
    }
}

/// Move the first explanation to the front; fail if there is none.
fn explanation_first(widgets: &mut Vec<WidgetSpec>) -> Result<(), ExtractionError> {
    let position = widgets
        .iter()
        .position(|w| w.kind == WidgetKind::Explanation)
        .ok_or(ExtractionError::NoExplanation)?;

    if position > 0 {
        warn!("Explanation widget was at position {}, moving it first", position);
        let explanation = widgets.remove(position);
        widgets.insert(0, explanation);
    }

    Ok(())
}
