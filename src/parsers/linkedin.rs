use std::sync::LazyLock;

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

use super::{compiled, element_text, selector, SourceParser};
use crate::classify::{classify_experience_level, classify_job_type};
use crate::models::{RawJobRecord, Source, NOT_AVAILABLE};

pub const LINKEDIN_SENDER: &str = "jobalerts-noreply@linkedin.com";
pub const LINKEDIN_ORIGIN: &str = "https://www.linkedin.com";

const SEPARATOR: char = '·';

pub struct LinkedInParser;

struct Selectors {
    card: Selector,
    title: Selector,
    descriptor: Selector,
}

static SELECTORS: LazyLock<Result<Selectors>> = LazyLock::new(|| {
    Ok(Selectors {
        card: selector("[data-test-id='job-card']")?,
        title: selector("a.font-bold.text-md")?,
        descriptor: selector("p[class*='text-system-gray-100']")?,
    })
});

impl SourceParser for LinkedInParser {
    fn source(&self) -> Source {
        Source::LinkedIn
    }

    fn sender(&self) -> &str {
        LINKEDIN_SENDER
    }

    fn parse(&self, html: &str) -> Result<Vec<RawJobRecord>> {
        let selectors = compiled(&SELECTORS)?;
        let document = Html::parse_document(html);

        let jobs = document
            .select(&selectors.card)
            .filter_map(|card| parse_card(&card, selectors))
            .collect();
        Ok(jobs)
    }
}

fn parse_card(card: &ElementRef, selectors: &Selectors) -> Option<RawJobRecord> {
    let anchor = card.select(&selectors.title).next()?;
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }
    let title = element_text(&anchor)?;

    let (company_name, location) = card
        .select(&selectors.descriptor)
        .next()
        .and_then(|p| element_text(&p))
        .map(|text| split_company_location(&text))
        .unwrap_or_else(|| (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()));

    Some(RawJobRecord {
        experience_level: classify_experience_level(&title),
        job_type: classify_job_type(&location),
        title,
        company_name,
        location,
        salary: None,
        job_url: absolute_url(href),
        job_description_snippet: None,
        source: Source::LinkedIn,
    })
}

/// Splits "Company · City, ST · Remote" into the company and the rest of the
/// line; locations may themselves contain the separator.
pub fn split_company_location(text: &str) -> (String, String) {
    let mut parts = text.split(SEPARATOR).map(str::trim);
    let company = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    let location = if rest.is_empty() {
        String::new()
    } else {
        let separator = format!(" {} ", SEPARATOR);
        rest.join(separator.as_str()).trim().to_string()
    };

    (or_sentinel(company), or_sentinel(&location))
}

pub fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with('/') {
        format!("{}{}", LINKEDIN_ORIGIN, href)
    } else {
        format!("{}/{}", LINKEDIN_ORIGIN, href)
    }
}

fn or_sentinel(value: &str) -> String {
    if value.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value.to_string()
    }
}
