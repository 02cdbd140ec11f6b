//! Selector resolution waterfall.
//!
//! Four tiers in fixed priority order:
//! 1. SiteSpecific - known-good selectors for well-known hosts
//! 2. AnchorText - clickable tags whose text contains the anchor
//! 3. AttributeHeuristic - category-specific attribute selectors
//! 4. BareTag - the category's generic tag
//!
//! Tiers generate candidates lazily; the first candidate whose first match
//! exists and is visible wins. Each attempt's outcome is recorded so callers
//! can see why resolution failed without a live page.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::driver::{Driver, ElementHandle};
use crate::error::DriverError;
use crate::types::{ElementType, Selector, SelectorCandidate};

/// Search-box selectors for hosts whose markup is known. Matched by substring.
pub const SITE_SEARCH_INPUTS: &[(&str, &str)] = &[
    ("youtube.com", "input[name='search_query']"),
    ("amazon", "#twotabsearchtextbox"),
    ("google.com", "input[name='q']"),
    ("github.com", "input[name='q']"),
];

/// Tags tried, in order, for anchor-text candidates.
const ANCHOR_TAGS: &[&str] = &["button", "a", "[role='button']", "[role='link']"];

const SEARCH_INPUT_SELECTORS: &[&str] = &[
    "input[type='search']",
    "input[placeholder*='search' i]",
    "input[name*='search' i]",
    "input[aria-label*='search' i]",
    "[role='search'] input",
    "input.search",
    "input#search",
];

/// Words stripped from a click target to get its anchor text.
const LEADING_FILLERS: &[&str] = &["the", "a", "an", "on"];
const TRAILING_NOUNS: &[&str] = &[
    "button", "btn", "link", "video", "product", "field", "box", "input",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    SiteSpecific,
    AnchorText,
    AttributeHeuristic,
    BareTag,
}

/// Resolution order. Earlier tiers always win over later ones.
pub const WATERFALL: [Tier; 4] = [
    Tier::SiteSpecific,
    Tier::AnchorText,
    Tier::AttributeHeuristic,
    Tier::BareTag,
];

/// What to resolve and where.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub element_type: ElementType,
    pub anchor: Option<&'a str>,
    pub hostname: Option<&'a str>,
}

impl<'a> Query<'a> {
    pub fn new(element_type: ElementType) -> Self {
        Self {
            element_type,
            anchor: None,
            hostname: None,
        }
    }

    pub fn anchor(mut self, anchor: Option<&'a str>) -> Self {
        self.anchor = anchor.map(str::trim).filter(|a| !a.is_empty());
        self
    }

    pub fn hostname(mut self, hostname: Option<&'a str>) -> Self {
        self.hostname = hostname;
        self
    }
}

impl Tier {
    pub fn rank(self) -> u8 {
        match self {
            Tier::SiteSpecific => 1,
            Tier::AnchorText => 2,
            Tier::AttributeHeuristic => 3,
            Tier::BareTag => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::SiteSpecific => "site-specific",
            Tier::AnchorText => "anchor-text",
            Tier::AttributeHeuristic => "attribute-heuristic",
            Tier::BareTag => "bare-tag",
        }
    }

    /// Candidates this tier contributes for `query`, in try order.
    pub fn candidates(self, query: &Query<'_>) -> Vec<SelectorCandidate> {
        let selectors = match self {
            Tier::SiteSpecific => site_specific(query),
            Tier::AnchorText => anchor_text(query),
            Tier::AttributeHeuristic => attribute_heuristics(query),
            Tier::BareTag => vec![Selector::css(query.element_type.bare_tag())],
        };
        selectors
            .into_iter()
            .map(|selector| SelectorCandidate {
                selector,
                strategy_rank: self.rank(),
            })
            .collect()
    }
}

fn site_specific(query: &Query<'_>) -> Vec<Selector> {
    if query.element_type != ElementType::SearchInput {
        return Vec::new();
    }
    let Some(host) = query.hostname else {
        return Vec::new();
    };
    SITE_SEARCH_INPUTS
        .iter()
        .find(|(needle, _)| host.contains(needle))
        .map(|(_, css)| vec![Selector::css(*css)])
        .unwrap_or_default()
}

fn anchor_text(query: &Query<'_>) -> Vec<Selector> {
    let Some(anchor) = query.anchor else {
        return Vec::new();
    };
    if !query.element_type.is_clickable() {
        return Vec::new();
    }
    let category: &[&str] = match query.element_type {
        ElementType::Product => &["[data-testid*='product']", ".product"],
        ElementType::Video => &["a#video-title", "[id*='video']"],
        _ => &[],
    };
    ANCHOR_TAGS
        .iter()
        .chain(category)
        .map(|css| Selector::text(*css, anchor))
        .collect()
}

fn attribute_heuristics(query: &Query<'_>) -> Vec<Selector> {
    let generic: &[&str] = match (query.element_type, query.anchor) {
        (ElementType::SearchInput, _) => SEARCH_INPUT_SELECTORS,
        (ElementType::Input, Some(anchor)) => return input_patterns(anchor),
        (ElementType::Input, None) => &["input[type='text']", "textarea", "[contenteditable='true']"],
        (ElementType::Form, _) => &["form[role='search']"],
        // clickable categories with an anchor already had their turn
        (_, Some(_)) => &[],
        (ElementType::Button, None) => &["button", "[role='button']", "input[type='submit']"],
        (ElementType::Link, None) => &["a", "[role='link']"],
        (ElementType::Product, None) => &[
            "[data-testid*='product']",
            ".product",
            "a[href*='product']",
        ],
        (ElementType::Video, None) => &[
            "a#video-title",
            "[id*='video']",
            "[id*='player']",
            "[id*='watch']",
        ],
    };
    generic.iter().map(|css| Selector::css(*css)).collect()
}

fn input_patterns(anchor: &str) -> Vec<Selector> {
    let needle = css_string(anchor);
    [
        "input[name*={} i]",
        "input[placeholder*={} i]",
        "input[aria-label*={} i]",
        "input[id*={} i]",
        "textarea[name*={} i]",
        "textarea[placeholder*={} i]",
    ]
    .iter()
    .map(|pattern| Selector::css(pattern.replace("{}", &needle)))
    .collect()
}

/// Quote `raw` as a single-quoted CSS string literal.
fn css_string(raw: &str) -> String {
    format!("'{}'", raw.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Every candidate the waterfall would try, in order. Pure; no page access.
pub fn plan(query: &Query<'_>) -> Vec<SelectorCandidate> {
    WATERFALL
        .iter()
        .flat_map(|tier| tier.candidates(query))
        .collect()
}

/// Reduce a free-form click target ("the submit button") to anchor text ("submit").
pub fn anchor_text_of(target: &str) -> Option<String> {
    let mut words: Vec<&str> = target.split_whitespace().collect();
    while words
        .first()
        .is_some_and(|w| LEADING_FILLERS.contains(&w.to_ascii_lowercase().as_str()))
    {
        words.remove(0);
    }
    while words
        .last()
        .is_some_and(|w| TRAILING_NOUNS.contains(&w.to_ascii_lowercase().as_str()))
    {
        words.pop();
    }
    let anchor = words.join(" ");
    let anchor = anchor.trim_matches(|c: char| c == '"' || c == '\'').trim();
    (!anchor.is_empty()).then(|| anchor.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    Missing,
    Hidden,
    Failed(String),
}

/// One candidate and what happened when it was tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub candidate: SelectorCandidate,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub selector: Option<Selector>,
    pub handle: Option<ElementHandle>,
    pub attempts: Vec<Attempt>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.selector.is_some()
    }

    pub fn rank(&self) -> Option<u8> {
        self.attempts
            .iter()
            .find(|p| p.outcome == AttemptOutcome::Accepted)
            .map(|p| p.candidate.strategy_rank)
    }
}

/// Run the waterfall against the live page.
///
/// Each check is bounded by `check_timeout` and the whole run by `budget`;
/// once the budget is spent the remaining candidates are skipped. Only a
/// lost session is returned as an error; any other failed check is recorded
/// and the next candidate is tried.
pub async fn resolve(
    driver: &dyn Driver,
    query: &Query<'_>,
    check_timeout: Duration,
    budget: Duration,
) -> Result<Resolution, DriverError> {
    let deadline = Instant::now() + budget;
    let mut resolution = Resolution::default();

    for tier in WATERFALL {
        for candidate in tier.candidates(query) {
            if Instant::now() >= deadline {
                warn!(
                    "[Resolver] gave up on {} after {:?} ({} candidates tried)",
                    query.element_type,
                    budget,
                    resolution.attempts.len()
                );
                return Ok(resolution);
            }
            let (outcome, handle) = check(driver, &candidate.selector, check_timeout, deadline).await?;
            debug!(
                "[Resolver] {} {} -> {:?}",
                tier.name(),
                candidate.selector,
                outcome
            );
            let accepted = outcome == AttemptOutcome::Accepted;
            let selector = candidate.selector.clone();
            resolution.attempts.push(Attempt { candidate, outcome });
            if accepted {
                info!(
                    "[Resolver] {} resolved via {} tier: {}",
                    query.element_type,
                    tier.name(),
                    selector
                );
                resolution.selector = Some(selector);
                resolution.handle = handle;
                return Ok(resolution);
            }
        }
    }

    info!(
        "[Resolver] no visible {} after {} candidates",
        query.element_type,
        resolution.attempts.len()
    );
    Ok(resolution)
}

/// Locate `selector` and test the first match for visibility.
///
/// Neither call waits past `deadline`.
async fn check(
    driver: &dyn Driver,
    selector: &Selector,
    timeout: Duration,
    deadline: Instant,
) -> Result<(AttemptOutcome, Option<ElementHandle>), DriverError> {
    let limit = || timeout.min(deadline.saturating_duration_since(Instant::now()));

    let wait = limit();
    let located = match tokio::time::timeout(wait, driver.locate(selector)).await {
        Ok(Ok(found)) => found,
        Ok(Err(e)) if e.is_fatal() => return Err(e),
        Ok(Err(e)) => return Ok((AttemptOutcome::Failed(e.to_string()), None)),
        Err(_) => return Ok((timed_out(wait), None)),
    };
    let Some(handle) = located else {
        return Ok((AttemptOutcome::Missing, None));
    };
    let wait = limit();
    match tokio::time::timeout(wait, driver.is_visible(&handle)).await {
        Ok(Ok(true)) => Ok((AttemptOutcome::Accepted, Some(handle))),
        Ok(Ok(false)) => Ok((AttemptOutcome::Hidden, None)),
        Ok(Err(e)) if e.is_fatal() => Err(e),
        Ok(Err(e)) => Ok((AttemptOutcome::Failed(e.to_string()), None)),
        Err(_) => Ok((timed_out(wait), None)),
    }
}

fn timed_out(after: Duration) -> AttemptOutcome {
    AttemptOutcome::Failed(DriverError::Timeout(after).to_string())
}
