use serde::{Deserialize, Serialize};
use std::fmt;

/// What a single command asks the browser to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Navigate,
    Search,
    Type,
    Click,
    Wait,
    Scroll,
    Extract,
    Help,
    Exit,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Navigate => "navigate",
            Action::Search => "search",
            Action::Type => "type",
            Action::Click => "click",
            Action::Wait => "wait",
            Action::Scroll => "scroll",
            Action::Extract => "extract",
            Action::Help => "help",
            Action::Exit => "exit",
        }
    }

    /// Parse a classifier label. `Ok(None)` means the classifier said "none".
    pub fn parse(raw: &str) -> Result<Option<Action>, String> {
        let label = raw.trim().to_ascii_lowercase();
        let action = match label.as_str() {
            "" | "none" | "null" => return Ok(None),
            "navigate" => Action::Navigate,
            "search" => Action::Search,
            "type" => Action::Type,
            "click" => Action::Click,
            "wait" => Action::Wait,
            "scroll" => Action::Scroll,
            "extract" => Action::Extract,
            "help" => Action::Help,
            "exit" => Action::Exit,
            _ => return Err(format!("unrecognized action '{}'", raw.trim())),
        };
        Ok(Some(action))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of page element an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    SearchInput,
    Button,
    Link,
    Video,
    Form,
    Input,
    Product,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::SearchInput => "search_input",
            ElementType::Button => "button",
            ElementType::Link => "link",
            ElementType::Video => "video",
            ElementType::Form => "form",
            ElementType::Input => "input",
            ElementType::Product => "product",
        }
    }

    /// Accepts the canonical label plus plain-English plurals ("videos", "search box").
    pub fn parse(raw: &str) -> Option<ElementType> {
        let label = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let kind = match label.as_str() {
            "search_input" | "search_box" | "search_field" | "searchbox" | "search" => {
                ElementType::SearchInput
            }
            "button" | "buttons" | "btn" => ElementType::Button,
            "link" | "links" => ElementType::Link,
            "video" | "videos" => ElementType::Video,
            "form" | "forms" => ElementType::Form,
            "input" | "inputs" | "field" | "fields" | "textbox" | "text_field" => {
                ElementType::Input
            }
            "product" | "products" => ElementType::Product,
            _ => return None,
        };
        Some(kind)
    }

    /// Categories a click or anchor-text lookup can land on.
    pub fn is_clickable(&self) -> bool {
        matches!(
            self,
            ElementType::Button | ElementType::Link | ElementType::Product | ElementType::Video
        )
    }

    /// Generic tag used as the last-resort selector.
    pub fn bare_tag(&self) -> &'static str {
        match self {
            ElementType::SearchInput | ElementType::Input => "input",
            ElementType::Button => "button",
            ElementType::Link | ElementType::Product => "a",
            ElementType::Video => "video",
            ElementType::Form => "form",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, typed command. Built by the normalizer, never mutated after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: Action,
    pub target: Option<String>,
    pub value: Option<String>,
    pub url: Option<String>,
    pub element_type: Option<ElementType>,
}

impl Intent {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            target: None,
            value: None,
            url: None,
            element_type: None,
        }
    }

    /// Text the intent is about, for log lines and failure messages.
    pub fn subject(&self) -> &str {
        self.target
            .as_deref()
            .or(self.value.as_deref())
            .or(self.url.as_deref())
            .unwrap_or("page")
    }
}

/// Session state carried from one command to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub current_url: Option<String>,
}

impl Context {
    pub fn at(url: impl Into<String>) -> Self {
        Self {
            current_url: Some(url.into()),
        }
    }

    pub fn hostname(&self) -> Option<String> {
        self.current_url.as_deref().and_then(hostname_of)
    }
}

/// Lower-cased host of an absolute URL.
pub fn hostname_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// Plain CSS selector; the first match in document order is used.
    Css(String),
    /// First element matching `css` whose text contains `text`, case-insensitive.
    Text { css: String, text: String },
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Selector::Css(css.into())
    }

    pub fn text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::Text {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn css_part(&self) -> &str {
        match self {
            Selector::Css(css) | Selector::Text { css, .. } => css,
        }
    }

    pub fn text_part(&self) -> Option<&str> {
        match self {
            Selector::Css(_) => None,
            Selector::Text { text, .. } => Some(text),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => f.write_str(css),
            Selector::Text { css, text } => {
                write!(f, "{}:has-text(\"{}\")", css, text.replace('"', "\\\""))
            }
        }
    }
}

/// One entry of the resolution waterfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub selector: Selector,
    pub strategy_rank: u8,
}

/// Outcome of one atomic command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<serde_json::Value>,
}

impl ExecutionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            artifact: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: serde_json::Value) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// A trimmed, non-empty fragment of a compound instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicCommand(pub String);

impl AtomicCommand {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AtomicCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const HELP_TEXT: &str = "\
Available commands:
1. navigate to [url] - Navigate to a website (e.g., 'go to youtube')
2. search for [query] - Search on the current site (e.g., 'search for 3blue1brown')
3. type [text] in [element] - Type text into an input field
4. click [element] - Click on an element
5. wait - Wait for a moment
6. scroll [up|down|top|bottom] - Scroll the page
7. extract [links|images|videos|css selector] - Extract information from the page
8. help - Show this help message
9. exit - Close the browser and exit
Chain steps with 'then' or 'and' (e.g., 'go to youtube then search for cats').";
