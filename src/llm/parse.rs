//! Response parsing and Euro normalization.
//!
//! Providers are asked for strict JSON but routinely wrap it in fences,
//! surround it with prose, or ignore the schema entirely. The parser walks
//! an ordered list of recovery strategies and always produces a value;
//! only the confidence tells the caller how much trust to put in it.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::types::{DEFAULT_CONFIDENCE, FALLBACK_CONFIDENCE, NO_REASONING};

/// Candidate keys for the estimated amount, in priority order.
const VALUE_KEYS: &[&str] = &["value", "price", "estimated_value", "estimate"];
/// Candidate keys for the explanation, in priority order.
const REASONING_KEYS: &[&str] = &["reasoning", "reason", "explanation"];

/// Fallback reasoning is cut to this many characters.
const MAX_FALLBACK_REASONING_CHARS: usize = 500;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^```(?:json)?\n(.*?)\n```$").expect("valid regex"));
static JSON_VALUE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"value"\s*:\s*(-?\d[\d.,]*)"#).expect("valid regex"));
static VALUE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""value"\s*:"#).expect("valid regex"));
static VALUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*VALUE\s*[:\-]\s*(€?\s*\d[\d.,]*)").expect("valid regex"));
static EURO_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"€\s*\d[\d.,]*").expect("valid regex"));
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d[\d.,]{1,}\b").expect("valid regex"));
static REASONING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*REASONING\s*[:\-]\s*(.+)$").expect("valid regex"));
static NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?(?:\d+\.?\d*|\.\d+)").expect("valid regex"));
static DOT_GROUPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}(?:\.\d{3})+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Parsed result
// ---------------------------------------------------------------------------

/// Which recovery step produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    StrictJson,
    EmbeddedJson,
    ValueField,
    ValueLine,
    EuroAmount,
    BareNumber,
    /// Nothing numeric found; value defaults to 0.
    Nothing,
}

impl ParseStrategy {
    /// True for anything beyond a clean JSON decode.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ParseStrategy::StrictJson | ParseStrategy::EmbeddedJson)
    }
}

/// Output of [`parse_response`], before provider details are stamped on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEstimate {
    pub value: f64,
    pub reasoning: String,
    pub confidence: f64,
    pub strategy: ParseStrategy,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Turn arbitrary provider text into a value, reasoning and confidence.
///
/// Strategies, first hit wins:
/// 1. strict JSON of the whole (unfenced) text
/// 2. the first balanced `{...}` block, only when (1) did not parse at all
/// 3. a `"value": <n>` field in otherwise broken JSON
/// 4. a `VALUE: <n>` line
/// 5. the first `€<n>`
/// 6. the first multi-digit number
///
/// Steps 3–6 report [`FALLBACK_CONFIDENCE`]. Numbers in the reasoning text
/// (years, capacities) can win steps 5–6; that is a known weakness.
pub fn parse_response(response: &str) -> ParsedEstimate {
    let text = strip_code_fences(response.trim());

    match serde_json::from_str::<Value>(&text) {
        Ok(obj) => {
            if let Some(parsed) = from_json_object(&obj, ParseStrategy::StrictJson) {
                return parsed;
            }
        }
        Err(_) => {
            if let Some(candidate) = extract_first_json_object(&text) {
                if let Ok(obj) = serde_json::from_str::<Value>(candidate) {
                    if let Some(parsed) = from_json_object(&obj, ParseStrategy::EmbeddedJson) {
                        return parsed;
                    }
                }
            }
        }
    }

    if let Some(value) = JSON_VALUE_FIELD
        .captures(&text)
        .and_then(|c| parse_numeric_euro(&c[1]))
    {
        return ParsedEstimate {
            value,
            reasoning: NO_REASONING.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            strategy: ParseStrategy::ValueField,
        };
    }

    let (value, strategy) = scan_for_amount(&text);

    ParsedEstimate {
        value: value.unwrap_or(0.0),
        reasoning: fallback_reasoning(&text),
        confidence: FALLBACK_CONFIDENCE,
        strategy,
    }
}

/// Steps 4–6: labelled line, Euro sign, then any multi-digit number.
fn scan_for_amount(text: &str) -> (Option<f64>, ParseStrategy) {
    if let Some(v) = VALUE_LINE
        .captures(text)
        .and_then(|c| parse_numeric_euro(&c[1]))
    {
        return (Some(v), ParseStrategy::ValueLine);
    }
    if let Some(v) = EURO_AMOUNT
        .find(text)
        .and_then(|m| parse_numeric_euro(m.as_str()))
    {
        return (Some(v), ParseStrategy::EuroAmount);
    }
    if let Some(v) = BARE_NUMBER
        .find(text)
        .and_then(|m| parse_numeric_euro(m.as_str()))
    {
        return (Some(v), ParseStrategy::BareNumber);
    }
    (None, ParseStrategy::Nothing)
}

fn fallback_reasoning(text: &str) -> String {
    let reasoning = match REASONING_LINE.captures(text) {
        Some(c) => c[1].trim().to_string(),
        None => truncate_chars(text, MAX_FALLBACK_REASONING_CHARS),
    };
    if reasoning.is_empty() {
        NO_REASONING.to_string()
    } else {
        reasoning
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Read the candidate keys from a decoded JSON object.
///
/// Returns `None` when no usable numeric value is present so the caller
/// can move on to the regex strategies.
fn from_json_object(obj: &Value, strategy: ParseStrategy) -> Option<ParsedEstimate> {
    let map = obj.as_object()?;

    let raw_value = first_present(map, VALUE_KEYS)?;
    let value = match raw_value {
        Value::Number(n) => n.as_f64().and_then(round_to_cents),
        Value::String(s) => parse_numeric_euro(s),
        _ => None,
    }?;

    let reasoning = match first_present(map, REASONING_KEYS) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let confidence = map
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 100.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    Some(ParsedEstimate {
        value,
        reasoning: if reasoning.is_empty() {
            NO_REASONING.to_string()
        } else {
            reasoning
        },
        confidence,
        strategy,
    })
}

/// First key whose value is present and not `null`.
fn first_present<'a>(map: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

/// Round to 2 decimals, dropping non-finite input.
fn round_to_cents(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some((value * 100.0).round() / 100.0)
    } else {
        None
    }
}

/// Parse a Euro amount written in German or English notation.
///
/// `"1.234,56"`, `"€ 1.234,56"` and `"1,234.56"` all give `1234.56`;
/// `"123,45"` gives `123.45`. A comma after the last dot is the decimal
/// separator; otherwise dots are. A dot-only string grouped in threes
/// (`"2.200"`, `"1.250.000"`) is read as thousands grouping since prices
/// never carry three decimals.
pub fn parse_numeric_euro(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let kept: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let last_comma = kept.rfind(',');
    let last_dot = kept.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(comma), dot) if dot.map_or(true, |d| comma > d) => {
            kept.replace('.', "").replacen(',', ".", 1)
        }
        _ => {
            let without_commas = kept.replace(',', "");
            if DOT_GROUPED.is_match(&without_commas) {
                without_commas.replace('.', "")
            } else {
                without_commas
            }
        }
    };

    let number = NUMBER_PREFIX.find(&normalized)?.as_str().parse::<f64>().ok()?;
    round_to_cents(number)
}

/// Unwrap a single Markdown code block (```` ```json ```` or bare ```` ``` ````).
pub fn strip_code_fences(text: &str) -> String {
    match CODE_FENCE.captures(text) {
        Some(c) if !c[1].is_empty() => c[1].trim().to_string(),
        _ => text.to_string(),
    }
}

/// The first balanced `{...}` substring, found by brace-depth counting.
///
/// Braces inside JSON strings are counted too; that matches how providers
/// actually format their answers well enough.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].trim());
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether the text mentions a `"value":` key at all.
pub fn has_value_key(text: &str) -> bool {
    VALUE_KEY.is_match(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
