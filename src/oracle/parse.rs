//! Verdict parsing for language-model output.
//!
//! Models wrap JSON in markdown fences or surround it with prose often enough
//! that a strict `serde_json::from_str` loses verdicts. The parser tries, in
//! order: the whole text, the first fenced block, then the outermost braces.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::OracleError;
use crate::discovery::{Cardinality, ValidationVerdict};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(alias = "is_foreign_key")]
    accepted: bool,
    confidence: f64,
    #[serde(default)]
    cardinality: Option<String>,
    #[serde(default, alias = "reason")]
    reasoning: String,
    #[serde(default, alias = "semantic_role", alias = "role")]
    source_role: Option<String>,
}

/// Parse raw oracle output into a verdict.
pub fn parse_verdict(raw: &str) -> Result<ValidationVerdict, OracleError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OracleError::EmptyResponse);
    }

    let parsed = candidates(trimmed)
        .into_iter()
        .find_map(|text| serde_json::from_str::<RawVerdict>(text).ok())
        .ok_or_else(|| OracleError::Unparsable(excerpt(trimmed)))?;

    into_verdict(parsed)
}

fn candidates(text: &str) -> Vec<&str> {
    let mut out = vec![text];
    if let Some(block) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        out.push(block.as_str());
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            out.push(&text[start..=end]);
        }
    }
    out
}

fn into_verdict(raw: RawVerdict) -> Result<ValidationVerdict, OracleError> {
    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(OracleError::Unparsable(format!(
            "confidence {} outside 0..1",
            raw.confidence
        )));
    }

    let cardinality = match raw.cardinality.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => label
            .parse::<Cardinality>()
            .map_err(|e| OracleError::Unparsable(e.to_string()))?,
        // A rejection often omits cardinality; it is never persisted anyway.
        _ if !raw.accepted => Cardinality::ManyToOne,
        _ => {
            return Err(OracleError::Unparsable(
                "accepted verdict without cardinality".to_string(),
            ))
        }
    };

    let source_role = raw
        .source_role
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("null"));

    Ok(ValidationVerdict {
        accepted: raw.accepted,
        confidence: raw.confidence,
        cardinality,
        reasoning: raw.reasoning.trim().to_string(),
        source_role,
    })
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
