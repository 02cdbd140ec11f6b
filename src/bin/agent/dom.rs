//! Page-side scripts used by the Chrome driver.
//!
//! Every script is an arrow function. [`call_expression`] applies it to
//! JSON-encoded arguments and stringifies the result, so values come back
//! through `Runtime.evaluate` as plain strings regardless of how the
//! protocol serializes objects.

use serde_json::Value;

/// Finds the first match of `css` (whose text contains `text`, when given),
/// tags it with `data-nlb-ref` and returns a selector for the tag.
pub const LOCATE_JS: &str = r#"(css, text, ref) => {
  const needle = text ? text.toLowerCase() : null;
  for (const el of document.querySelectorAll(css)) {
    if (needle && !(el.textContent || el.value || '').toLowerCase().includes(needle)) continue;
    el.setAttribute('data-nlb-ref', ref);
    return '[data-nlb-ref="' + ref + '"]';
  }
  return null;
}"#;

/// Rendered, not hidden by style, and has a box.
pub const VISIBLE_JS: &str = r#"(ref) => {
  const el = document.querySelector(ref);
  if (!el) return false;
  if (el.offsetParent === null && el.tagName !== 'BODY' && getComputedStyle(el).position !== 'fixed') return false;
  const s = getComputedStyle(el);
  if (s.display === 'none' || s.visibility === 'hidden' || s.opacity === '0') return false;
  const r = el.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
}"#;

pub const CLEAR_JS: &str = r#"(ref) => {
  const el = document.querySelector(ref);
  if (!el) throw new Error('element detached');
  if (el.isContentEditable) el.textContent = '';
  else el.value = '';
  el.dispatchEvent(new Event('input', { bubbles: true }));
  return true;
}"#;

pub const SCROLL_BY_JS: &str = r#"(dx, dy) => {
  window.scrollBy(dx, dy);
  return window.scrollY;
}"#;

/// `JSON.stringify((script)(args...))`, awaiting promises.
pub fn call_expression(script: &str, args: &[Value]) -> String {
    let args = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "(async () => JSON.stringify(await ({})({})))()",
        script.trim(),
        args
    )
}

/// Decode what [`call_expression`] produced. `undefined` becomes `null`.
pub fn decode_result(raw: Option<Value>) -> Value {
    match raw {
        Some(Value::String(json)) => serde_json::from_str(&json).unwrap_or(Value::String(json)),
        _ => Value::Null,
    }
}
