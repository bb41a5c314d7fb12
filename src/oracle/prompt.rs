//! Prompt text sent to language-model oracles.

use super::{OracleError, OracleRequest};

/// Instructions for the model. The answer format matches [`super::parse_verdict`].
pub const SYSTEM_PROMPT: &str = r#"You are a database analyst deciding whether one column is a foreign key to another.

You receive a JSON description of a source column, a target column and join statistics
measured on the live database:
- matched_rows: source rows whose value exists in the target column
- matched_source_distinct / matched_target_distinct: distinct values on each side that matched
- orphan_count: distinct source values with no target row
- reverse_orphan_count: distinct target values never referenced
A null statistic means it could not be measured.

Judge from meaning as well as numbers. Identically named or typed columns are not enough.

Answer with a single JSON object and nothing else:
{
  "accepted": true | false,
  "confidence": number between 0 and 1,
  "cardinality": "1:1" | "N:1" | "1:N" | "N:M",
  "reasoning": "one or two sentences",
  "source_role": "semantic role of the source column such as owner or creator, or null"
}"#;

/// Render the user message for one request.
pub fn render_user_message(request: &OracleRequest) -> Result<String, OracleError> {
    let body = serde_json::to_string_pretty(request)
        .map_err(|e| OracleError::Config(format!("cannot encode request: {}", e)))?;
    Ok(format!("{}\n\n{}", request.question, body))
}
