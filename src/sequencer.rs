//! Splits compound commands into atomic steps.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, Result};
use crate::types::AtomicCommand;

static DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:then|and)\b").expect("valid regex"));

/// Split on the whole words "then" and "and", in source order.
///
/// Fragments are trimmed of whitespace and `,;.` and empty ones dropped.
/// Quoted text is not protected: "search for salt and pepper" is two steps.
pub fn split(command: &str) -> Result<Vec<AtomicCommand>> {
    let steps: Vec<AtomicCommand> = DELIMITER
        .split(command)
        .map(|fragment| {
            fragment.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.'))
        })
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| AtomicCommand(fragment.to_string()))
        .collect();

    if steps.is_empty() {
        return Err(EngineError::Sequencing(command.trim().to_string()));
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(command: &str) -> Vec<String> {
        split(command).unwrap().into_iter().map(|c| c.0).collect()
    }

    #[test]
    fn splits_on_then_and_and() {
        assert_eq!(
            texts("go to youtube then search for cats"),
            vec!["go to youtube", "search for cats"]
        );
        assert_eq!(
            texts("Open github.com, then search for tokio and click the first link."),
            vec!["Open github.com", "search for tokio", "click the first link"]
        );
    }

    #[test]
    fn delimiters_must_be_whole_words() {
        assert_eq!(texts("click the brand link"), vec!["click the brand link"]);
        assert_eq!(texts("go to thenews.com"), vec!["go to thenews.com"]);
    }

    #[test]
    fn single_command_passes_through() {
        assert_eq!(texts("  scroll down  "), vec!["scroll down"]);
    }

    #[test]
    fn nothing_but_delimiters_is_an_error() {
        for input in ["", "   ", "then and", " , then ; "] {
            let err = split(input).unwrap_err();
            assert_eq!(err.kind(), "sequencing");
        }
    }
}
