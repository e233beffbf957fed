pub mod indeed;
pub mod linkedin;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::{debug, warn};

use crate::models::{RawJobRecord, Source};

pub use indeed::IndeedParser;
pub use linkedin::LinkedInParser;

/// Turns the HTML body of one alert email into job records.
pub trait SourceParser {
    fn source(&self) -> Source;
    /// Sender address this parser handles.
    fn sender(&self) -> &str;
    fn parse(&self, html: &str) -> Result<Vec<RawJobRecord>>;
}

/// Routes an email to the parser registered for its sender.
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn SourceParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn register(&mut self, parser: Box<dyn SourceParser>) {
        let sender = normalize_sender(parser.sender());
        if let Some(previous) = self.parsers.insert(sender.clone(), parser) {
            warn!("Replaced {} parser registered for {}", previous.source(), sender);
        }
    }

    pub fn senders(&self) -> Vec<String> {
        let mut senders: Vec<String> = self.parsers.keys().cloned().collect();
        senders.sort();
        senders
    }

    pub fn handles(&self, sender: &str) -> bool {
        self.parsers.contains_key(&normalize_sender(sender))
    }

    /// Parses `html` with the parser for `sender`. Unknown senders and
    /// parser failures both yield an empty list so one bad email never
    /// stops a batch.
    ///
    /// A panicking parser is contained here, but the process panic hook
    /// still runs first, so its message reaches stderr ahead of the warning.
    /// The hook is process-wide and is left alone.
    pub fn dispatch_and_parse(&self, sender: &str, html: &str) -> Vec<RawJobRecord> {
        let sender = normalize_sender(sender);
        let Some(parser) = self.parsers.get(&sender) else {
            debug!("No parser registered for sender {}", sender);
            return Vec::new();
        };

        match panic::catch_unwind(AssertUnwindSafe(|| parser.parse(html))) {
            Ok(Ok(records)) => {
                debug!("{} parser found {} jobs", parser.source(), records.len());
                records
            }
            Ok(Err(e)) => {
                warn!("{} parser failed: {:#}", parser.source(), e);
                Vec::new()
            }
            Err(_) => {
                warn!("{} parser panicked; skipping email", parser.source());
                Vec::new()
            }
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(IndeedParser));
        registry.register(Box::new(LinkedInParser));
        registry
    }
}

pub fn normalize_sender(sender: &str) -> String {
    sender
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_lowercase()
}

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Collapses runs of whitespace (including non-breaking spaces) and trims.
pub(crate) fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Visible text of an element, or `None` when it is blank.
pub(crate) fn element_text(element: &ElementRef) -> Option<String> {
    let text = clean_text(&element.text().collect::<String>());
    if text.is_empty() { None } else { Some(text) }
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {:?}: {:?}", css, e))
}

/// Borrows a selector set compiled on first use. A set that failed to
/// compile fails every parse that needs it.
pub(crate) fn compiled<T>(set: &'static LazyLock<Result<T>>) -> Result<&'static T> {
    match &**set {
        Ok(selectors) => Ok(selectors),
        Err(e) => Err(anyhow!("{:#}", e)),
    }
}
