//! Turn raw classifier output into a validated [`Intent`].
//!
//! Classifier output is unreliable: sometimes a clean JSON object, sometimes
//! JSON buried in prose or markdown fences, sometimes `key: value` lines.
//! Structured extraction is tried first and a line-oriented fallback second.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::{Action, Context, ElementType, Intent};

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(action|target|value|url|element_type)\s*[:=]\s*"?([^,\n"]*)"?"#)
        .expect("valid regex")
});

/// Loosely typed record pulled out of classifier text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawIntent {
    pub action: Option<String>,
    pub target: Option<String>,
    pub value: Option<String>,
    pub url: Option<String>,
    pub element_type: Option<String>,
}

impl RawIntent {
    fn set(&mut self, key: &str, value: Option<String>) {
        let slot = match key.to_ascii_lowercase().as_str() {
            "action" => &mut self.action,
            "target" => &mut self.target,
            "value" => &mut self.value,
            "url" => &mut self.url,
            "element_type" => &mut self.element_type,
            _ => return,
        };
        *slot = value.and_then(present);
    }
}

/// A validated intent plus the context it would install on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub intent: Intent,
    pub staged: Option<Context>,
}

/// Treat blanks and "none"/"null" literals as absent.
fn present(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("null")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First balanced `{...}` object containing an `action` key, scanning left to right.
pub fn extract_structured(raw: &str) -> Option<RawIntent> {
    let bytes = raw.as_bytes();
    let mut start = 0;
    while let Some(offset) = raw[start..].find('{') {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open) {
            if let Some(record) = parse_object(&raw[open..=close]) {
                return Some(record);
            }
        }
        start = open + 1;
    }
    None
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
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
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(candidate: &str) -> Option<RawIntent> {
    let cleaned = TRAILING_COMMA.replace_all(candidate, "$1");
    let map: Map<String, Value> = serde_json::from_str(&cleaned).ok()?;
    if !map.contains_key("action") {
        return None;
    }
    let mut record = RawIntent::default();
    for (key, value) in map {
        let text = match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        };
        record.set(&key, text);
    }
    Some(record)
}

/// `key: value` pairs separated by newlines or commas.
pub fn extract_key_values(raw: &str) -> Option<RawIntent> {
    let mut record = RawIntent::default();
    let mut saw_action = false;
    for caps in KEY_VALUE.captures_iter(raw) {
        let key = caps[1].to_ascii_lowercase();
        saw_action |= key == "action";
        // first occurrence wins, as with the structured path
        let already = match key.as_str() {
            "action" => record.action.is_some(),
            "target" => record.target.is_some(),
            "value" => record.value.is_some(),
            "url" => record.url.is_some(),
            _ => record.element_type.is_some(),
        };
        if !already {
            record.set(&key, Some(caps[2].trim_matches('\'').to_string()));
        }
    }
    saw_action.then_some(record)
}

/// Prefix `https://` unless the URL already names a scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Parse, derive defaults, carry context over and validate.
pub fn normalize(raw: &str, context: &Context) -> Result<Normalized> {
    let record = match extract_structured(raw) {
        Some(record) => record,
        None => {
            debug!("[Normalizer] no structured record, trying key/value fallback");
            extract_key_values(raw).ok_or_else(|| {
                EngineError::Parse("classifier output contained no recognizable intent".into())
            })?
        }
    };
    normalize_record(record, context)
}

pub fn normalize_record(record: RawIntent, context: &Context) -> Result<Normalized> {
    let action = match record.action.as_deref() {
        Some(label) => Action::parse(label).map_err(EngineError::Parse)?,
        None => None,
    };
    let Some(action) = action else {
        return Err(EngineError::Validation(
            "no valid action found in command".into(),
        ));
    };

    let element_type = match record.element_type.as_deref() {
        Some(label) => Some(ElementType::parse(label).ok_or_else(|| {
            EngineError::Parse(format!("unrecognized element type '{}'", label))
        })?),
        None => None,
    };

    let mut intent = Intent {
        action,
        target: record.target,
        value: record.value,
        url: record.url.as_deref().map(normalize_url),
        element_type,
    };

    derive_element_type(&mut intent);

    if intent.action == Action::Search && intent.url.is_none() {
        intent.url = context.current_url.clone();
    }
    let staged = match (intent.action, &intent.url) {
        (Action::Navigate, Some(url)) => Some(Context::at(url.clone())),
        _ => None,
    };

    validate(&intent)?;
    Ok(Normalized { intent, staged })
}

fn derive_element_type(intent: &mut Intent) {
    match intent.action {
        Action::Search if intent.element_type.is_none() => {
            intent.element_type = Some(ElementType::SearchInput);
        }
        Action::Click if intent.element_type.is_none() => {
            let target = intent.target.as_deref().unwrap_or_default().to_ascii_lowercase();
            let kind = [
                ("video", ElementType::Video),
                ("product", ElementType::Product),
                ("link", ElementType::Link),
            ]
            .into_iter()
            .find(|(keyword, _)| target.contains(keyword))
            .map(|(_, kind)| kind)
            .unwrap_or(ElementType::Button);
            intent.element_type = Some(kind);
        }
        Action::Type => intent.element_type = Some(ElementType::Input),
        _ => {}
    }
}

/// Check the per-action required fields. Returns the first violated rule.
pub fn validate(intent: &Intent) -> Result<()> {
    let reason = match intent.action {
        Action::Click | Action::Type if intent.target.is_none() => Some(format!(
            "{} command requires a target element",
            intent.action
        )),
        Action::Type if intent.value.is_none() => {
            Some("type command requires text to enter".to_string())
        }
        Action::Navigate if intent.url.is_none() => {
            Some("navigate command requires a URL".to_string())
        }
        Action::Search if intent.value.is_none() && intent.target.is_none() => {
            Some("search command requires a query".to_string())
        }
        _ => None,
    };
    match reason {
        Some(reason) => Err(EngineError::Validation(reason)),
        None => Ok(()),
    }
}
