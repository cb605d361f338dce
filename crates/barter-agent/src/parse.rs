//! Lenient parsing of model output and loosely-typed server payloads.
//!
//! Models rarely return clean JSON. [`parse_verdict`] tries, in order:
//! 1. Direct `serde_json` deserialization
//! 2. Extract JSON from a markdown code block
//! 3. Strip trailing commas and retry
//! 4. Code block, then strip commas
//! 5. The first balanced `{...}` span in the text
//!
//! If every strategy fails the caller treats the message as informational.
//! Counts are coerced from numbers or numeric strings; anything that is not
//! an object where a bundle is expected yields an empty bundle.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use barter_types::{ResourceBundle, Terms};

/// Keys always treated as gold, in addition to the configured key.
const GOLD_ALIASES: &[&str] = &["gold", "oro", "coins", "monedas"];

/// What the model said about a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictLabel {
    /// Accepts one of our proposals.
    Acceptance,
    /// Makes an offer.
    CounterOffer,
    /// Declines.
    Rejection,
    /// Fraud attempt.
    Scam,
    /// Nothing actionable.
    Informational,
}

/// Typed model verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Primary label.
    pub label: VerdictLabel,
    /// Extracted terms, from the sender's perspective.
    pub terms: Terms,
    /// Whether the model flagged fraud, independent of `label`.
    pub scam: bool,
    /// The model's one-line justification, for logs.
    pub reason: Option<String>,
}

/// The verdict shape requested from the model.
///
/// Field aliases accept the Spanish schema older prompts used.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    label: Option<String>,
    #[serde(default, alias = "es_aceptacion")]
    acceptance: Value,
    #[serde(default, alias = "es_estafa")]
    scam: Value,
    #[serde(default, alias = "ofrecen")]
    offered: Value,
    #[serde(default, alias = "piden")]
    requested: Value,
    #[serde(default)]
    offered_gold: Value,
    #[serde(default)]
    requested_gold: Value,
    #[serde(default, alias = "razon")]
    reason: Option<String>,
}

/// Parse a model reply into a [`Verdict`], or `None` when nothing usable
/// could be recovered.
pub fn parse_verdict(raw: &str, gold_key: &str) -> Option<Verdict> {
    match parse_lenient::<RawVerdict>(raw) {
        Some(parsed) => Some(convert_verdict(parsed, gold_key)),
        None => {
            warn!(raw_response = raw, "failed to parse model verdict");
            None
        }
    }
}

fn convert_verdict(raw: RawVerdict, gold_key: &str) -> Verdict {
    let (offered, mut offered_gold) = coerce_bundle(&raw.offered, gold_key);
    let (requested, mut requested_gold) = coerce_bundle(&raw.requested, gold_key);
    offered_gold = offered_gold.saturating_add(coerce_count(&raw.offered_gold).map_or(0, u64::from));
    requested_gold =
        requested_gold.saturating_add(coerce_count(&raw.requested_gold).map_or(0, u64::from));
    let terms = Terms {
        offered,
        offered_gold,
        requested,
        requested_gold,
    };

    let scam = coerce_flag(&raw.scam);
    let acceptance = coerce_flag(&raw.acceptance);

    let label = match raw.label.as_deref().map(|l| l.trim().to_lowercase()) {
        Some(l) if l.starts_with("accept") || l.starts_with("acept") => VerdictLabel::Acceptance,
        Some(l) if l.starts_with("counter") || l == "offer" || l == "proposal" => {
            VerdictLabel::CounterOffer
        }
        Some(l) if l.starts_with("reject") || l.starts_with("rechaz") => VerdictLabel::Rejection,
        Some(l) if l == "scam" || l == "estafa" => VerdictLabel::Scam,
        Some(l) if l.starts_with("info") => VerdictLabel::Informational,
        _ if scam => VerdictLabel::Scam,
        _ if acceptance => VerdictLabel::Acceptance,
        _ if !terms.is_empty() => VerdictLabel::CounterOffer,
        _ => VerdictLabel::Informational,
    };

    Verdict {
        label,
        terms,
        scam: scam || label == VerdictLabel::Scam,
        reason: raw.reason,
    }
}

/// Deserialize `raw` through every recovery strategy.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let trimmed = raw.trim();

    // Strategy 1: direct parse
    if let Ok(parsed) = serde_json::from_str::<T>(trimmed) {
        return Some(parsed);
    }

    // Strategy 2: extract from markdown code block
    if let Some(json_str) = extract_json_from_codeblock(trimmed)
        && let Ok(parsed) = serde_json::from_str::<T>(json_str)
    {
        return Some(parsed);
    }

    // Strategy 3: strip trailing commas and retry
    let cleaned = strip_trailing_commas(trimmed);
    if let Ok(parsed) = serde_json::from_str::<T>(&cleaned) {
        return Some(parsed);
    }

    // Strategy 4: extract from code block then strip commas
    if let Some(json_str) = extract_json_from_codeblock(trimmed)
        && let Ok(parsed) = serde_json::from_str::<T>(&strip_trailing_commas(json_str))
    {
        return Some(parsed);
    }

    // Strategy 5: first balanced object embedded in prose
    let span = first_object_span(trimmed)?;
    serde_json::from_str::<T>(span)
        .ok()
        .or_else(|| serde_json::from_str::<T>(&strip_trailing_commas(span)).ok())
}

/// Extract the contents of the first fenced code block.
fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = text.get(start.checked_add(3)?..)?;
    let body_start = after_fence.find('\n').map_or(0, |i| i.saturating_add(1));
    let body = after_fence.get(body_start..)?;
    let end = body.find("```")?;
    body.get(..end).map(str::trim)
}

/// Remove commas that directly precede a closing brace or bracket.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_comma = false;
    let mut pending_ws = String::new();
    for ch in text.chars() {
        if pending_comma {
            if ch.is_whitespace() {
                pending_ws.push(ch);
                continue;
            }
            if ch != '}' && ch != ']' {
                out.push(',');
            }
            out.push_str(&pending_ws);
            pending_ws.clear();
            pending_comma = false;
        }
        if ch == ',' {
            pending_comma = true;
        } else {
            out.push(ch);
        }
    }
    if pending_comma {
        out.push(',');
    }
    out.push_str(&pending_ws);
    out
}

/// The first `{...}` span with balanced braces, ignoring braces in strings.
fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_u32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text.get(start..)?.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth = depth.saturating_add(1),
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start.checked_add(offset)?.checked_add(1)?;
                    return text.get(start..end);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Coerce a JSON count: non-negative integers, integral floats, or numeric
/// strings.
pub fn coerce_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .or_else(|| parse_integral(&n.to_string())),
        Value::String(s) => parse_integral(s),
        _ => None,
    }
}

fn parse_integral(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.split_once('.') {
        Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole.parse().ok(),
        Some(_) => None,
        None => text.parse().ok(),
    }
}

/// Coerce a JSON object into a bundle, moving gold keys into the returned
/// gold amount. Non-objects yield an empty bundle.
pub fn coerce_bundle(value: &Value, gold_key: &str) -> (ResourceBundle, u64) {
    let Some(object) = value.as_object() else {
        return (ResourceBundle::new(), 0);
    };
    let mut bundle = ResourceBundle::new();
    let mut gold = 0_u64;
    for (name, count) in object {
        let Some(qty) = coerce_count(count) else {
            continue;
        };
        if is_gold_key(name, gold_key) {
            gold = gold.saturating_add(u64::from(qty));
        } else {
            bundle.add(name.as_str(), qty);
        }
    }
    (bundle, gold)
}

/// Whether `name` denotes gold.
pub fn is_gold_key(name: &str, gold_key: &str) -> bool {
    let name = name.trim();
    name.eq_ignore_ascii_case(gold_key) || GOLD_ALIASES.iter().any(|g| name.eq_ignore_ascii_case(g))
}

fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "si" | "sí" | "1"
        ),
        Value::Number(n) => n.as_u64().is_some_and(|v| v > 0),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Free text
// ---------------------------------------------------------------------------

/// Strip reasoning blocks (`<think>...</think>`) and surrounding whitespace
/// from generated text.
///
/// An unterminated `<think>` swallows the rest of the text.
pub fn clean_generated_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<think>") {
        out.push_str(rest.get(..start).unwrap_or_default());
        let after = rest.get(start.saturating_add("<think>".len())..).unwrap_or_default();
        match after.find("</think>") {
            Some(end) => {
                rest = after
                    .get(end.saturating_add("</think>".len())..)
                    .unwrap_or_default();
            }
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_owned()
}
