//! Command classifiers.
//!
//! A classifier maps one command string to raw text that the normalizer
//! understands. Implementations may be remote models returning prose; the
//! engine never trusts the shape of what comes back.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::types::Action;

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, command: &str) -> anyhow::Result<String>;
}

/// Verb prefixes per action, checked in order. Longer phrases come first.
const VERBS: &[(Action, &[&str])] = &[
    (Action::Exit, &["exit", "quit", "close browser"]),
    (Action::Help, &["help"]),
    (Action::Navigate, &["navigate to", "go to", "visit", "open"]),
    (Action::Search, &["search for", "search", "look for", "find"]),
    (Action::Type, &["type", "enter", "input", "write", "fill"]),
    (Action::Click, &["click on", "click", "press", "tap", "select"]),
    (Action::Wait, &["wait", "pause"]),
    (Action::Scroll, &["scroll", "move down", "move up"]),
    (Action::Extract, &["extract", "scrape", "get all", "get"]),
];

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“']([^"”']+)["”']"#).expect("valid regex"));
static TYPE_INTO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+(?:in|into|on)\s+(?:the\s+)?(.+)$").expect("valid regex"));
static SEARCH_ON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+on\s+([\w.-]+)$").expect("valid regex"));
/// Bare words accepted as the site in "search for X on Y".
const KNOWN_SITES: &[&str] = &[
    "youtube", "google", "amazon", "github", "wikipedia", "reddit", "bing",
];

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Offline classifier built from verb patterns.
///
/// Always answers with a JSON record so its output takes the structured
/// path through the normalizer. Unknown commands yield `"action": null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_sync(&self, command: &str) -> String {
        let command = command.trim();
        let lower = command.to_ascii_lowercase();

        let Some((action, rest)) = match_verb(command, &lower) else {
            return record(None, None, None, None);
        };
        let rest = rest.trim().trim_end_matches(['.', '!', '?']);

        match action {
            Action::Navigate => record(Some(action), None, None, Some(site_url(rest))),
            Action::Search => {
                let site_of = |c: &regex::Captures<'_>| {
                    let site = c[2].to_ascii_lowercase();
                    (site.contains('.') || KNOWN_SITES.contains(&site.as_str()))
                        .then(|| (c[1].to_string(), site_url(&site)))
                };
                let (query, site) = match SEARCH_ON.captures(rest).as_ref().and_then(site_of) {
                    Some((query, site)) => (query, Some(site)),
                    None => (rest.to_string(), None),
                };
                let query = unquote(&query);
                record(Some(action), None, Some(query), site)
            }
            Action::Type => {
                let (text, field) = match TYPE_INTO.captures(rest) {
                    Some(c) => (unquote(&c[1]), Some(c[2].to_string())),
                    None => (unquote(rest), None),
                };
                record(Some(action), field, Some(text), None)
            }
            Action::Click => record(Some(action), Some(strip_article(rest)), None, None),
            Action::Scroll => {
                let direction = ["top", "bottom", "up", "down"]
                    .into_iter()
                    .find(|d| lower.split_whitespace().any(|w| w == *d))
                    .unwrap_or("down");
                record(Some(action), None, Some(direction.to_string()), None)
            }
            Action::Wait => {
                let seconds = NUMBER.find(rest).map(|m| m.as_str().to_string());
                record(Some(action), None, seconds, None)
            }
            Action::Extract => record(Some(action), Some(strip_article(rest)), None, None),
            Action::Help | Action::Exit => record(Some(action), None, None, None),
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, command: &str) -> anyhow::Result<String> {
        Ok(self.classify_sync(command))
    }
}

fn match_verb<'a>(command: &'a str, lower: &str) -> Option<(Action, &'a str)> {
    for (action, verbs) in VERBS {
        for verb in *verbs {
            let whole_word = lower
                .strip_prefix(verb)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '));
            if whole_word {
                return Some((*action, &command[verb.len()..]));
            }
        }
    }
    None
}

fn record(
    action: Option<Action>,
    target: Option<String>,
    value: Option<String>,
    url: Option<String>,
) -> String {
    let blank = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
    json!({
        "action": action.map(|a| a.as_str()),
        "target": blank(target),
        "value": blank(value),
        "url": blank(url),
    })
    .to_string()
}

fn unquote(text: &str) -> String {
    QUOTED
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| text.trim().to_string())
}

fn strip_article(text: &str) -> String {
    let text = text.trim();
    for article in ["the ", "a ", "an ", "all "] {
        let rest = text
            .get(..article.len())
            .filter(|head| head.eq_ignore_ascii_case(article))
            .and_then(|_| text.get(article.len()..));
        if let Some(rest) = rest.filter(|r| !r.trim().is_empty()) {
            return rest.trim().to_string();
        }
    }
    text.to_string()
}

/// "youtube" -> "youtube.com"; anything with a dot or scheme is left alone.
fn site_url(site: &str) -> String {
    let site = strip_article(site);
    let site = site.trim_end_matches('/');
    if site.contains('.') || site.contains("://") || site.is_empty() || site.contains(':') {
        site.to_string()
    } else {
        format!("{}.com", site.to_ascii_lowercase().replace(' ', ""))
    }
}
