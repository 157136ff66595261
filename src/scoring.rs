//! Quality scoring for batched API fetch responses.

use serde::Serialize;
use serde_json::Value;

/// Response time at or above which the speed score is zero.
const SLOW_RESPONSE_MS: f64 = 5_000.0;

/// Average payload length considered full quality.
const GOOD_CONTENT_CHARS: f64 = 100.0;

/// Score for one tool response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseScore {
    pub overall_score: f64,
    pub completeness: f64,
    pub response_time: f64,
    pub data_quality: f64,
    /// Fraction of successful results (1.0 means no errors).
    pub error_rate: f64,
    /// Average payload length of successful results.
    pub content_size: f64,
}

impl Default for ResponseScore {
    fn default() -> Self {
        Self {
            overall_score: 0.5,
            completeness: 0.0,
            response_time: 0.0,
            data_quality: 0.0,
            error_rate: 1.0,
            content_size: 0.0,
        }
    }
}

impl ResponseScore {
    /// One-line summary for hook output.
    pub fn summary(&self) -> String {
        format!(
            "API Response Score: {:.2} (completeness: {:.2}, speed: {:.2}, quality: {:.2})",
            self.overall_score, self.completeness, self.response_time, self.data_quality
        )
    }
}

/// Score a tool response of the form
/// `{"content": [{"text": "{\"results\": [...]}"}]}`.
///
/// Missing or unparseable content yields the base score.
pub fn score_response(tool_response: &Value) -> ResponseScore {
    let mut score = ResponseScore::default();

    let results = match extract_results(tool_response) {
        Some(results) if !results.is_empty() => results,
        _ => {
            if !is_empty_response(tool_response) {
                score.overall_score = weighted(&score);
            }
            return score;
        }
    };

    let total = results.len() as f64;
    let mut successful = 0usize;
    let mut content_chars = 0usize;
    let mut response_ms = 0.0;

    for result in &results {
        if result.get("success").and_then(Value::as_bool).unwrap_or(false) {
            successful += 1;
            content_chars += match result.get("data") {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Null) | None => 0,
                Some(other) => other.to_string().chars().count(),
            };
            response_ms += result
                .get("response_time")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
        }
    }

    score.error_rate = successful as f64 / total;
    score.completeness = (successful as f64 / total).min(1.0);

    if successful > 0 {
        let successful = successful as f64;
        score.response_time = (1.0 - (response_ms / successful) / SLOW_RESPONSE_MS).max(0.0);
        score.content_size = content_chars as f64 / successful;
        score.data_quality = (score.content_size / GOOD_CONTENT_CHARS).min(1.0);
    }

    score.overall_score = weighted(&score);
    score
}

fn weighted(score: &ResponseScore) -> f64 {
    score.completeness * 0.3
        + score.response_time * 0.2
        + score.data_quality * 0.3
        + score.error_rate * 0.2
}

fn is_empty_response(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn extract_results(tool_response: &Value) -> Option<Vec<Value>> {
    let text = tool_response
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()?;
    let parsed: Value = serde_json::from_str(text).ok()?;
    parsed.get("results")?.as_array().cloned()
}
