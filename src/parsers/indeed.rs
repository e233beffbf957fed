use std::sync::LazyLock;

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

use super::{clean_text, compiled, element_text, selector, SourceParser};
use crate::classify::{classify_experience_level, classify_job_type};
use crate::models::{RawJobRecord, Source, DESCRIPTION_UNAVAILABLE, NOT_AVAILABLE};

pub const INDEED_SENDER: &str = "alert@indeed.com";

/// Path segment of Indeed's tracked job links; one per listed job.
const ENTRY_LINK_MARKER: &str = "rc/clk/dl";
const COMPANY_CELL_STYLE: &str = "padding:0 12px 0 0";
const DETAIL_CELL_STYLE: &str = "font-size:14px;line-height:21px";
const SNIPPET_CELL_STYLE: &str = "font-size:13px;line-height:20px";
const SALARY_TABLE_BGCOLOR: &str = "#f3f2f1";
const HEADINGS: [&str; 4] = ["h1", "h2", "h3", "h4"];

pub struct IndeedParser;

struct Selectors {
    entry: Selector,
    title: Selector,
    cell: Selector,
    salary: Selector,
}

static SELECTORS: LazyLock<Result<Selectors>> = LazyLock::new(|| {
    Ok(Selectors {
        entry: selector(&format!("a[href*='{}']", ENTRY_LINK_MARKER))?,
        title: selector("h1 a, h2 a, h3 a, h4 a")?,
        cell: selector("td[style]")?,
        salary: selector(&format!("table[bgcolor='{}'] strong", SALARY_TABLE_BGCOLOR))?,
    })
});

impl SourceParser for IndeedParser {
    fn source(&self) -> Source {
        Source::Indeed
    }

    fn sender(&self) -> &str {
        INDEED_SENDER
    }

    fn parse(&self, html: &str) -> Result<Vec<RawJobRecord>> {
        let selectors = compiled(&SELECTORS)?;
        let document = Html::parse_document(html);

        let jobs = document
            .select(&selectors.entry)
            .filter_map(|entry| parse_entry(&entry, selectors))
            .collect();
        Ok(jobs)
    }
}

fn parse_entry(entry: &ElementRef, selectors: &Selectors) -> Option<RawJobRecord> {
    let job_url = entry.value().attr("href")?.trim().to_string();
    // Without a title the link is a banner or footer, not a job
    let (title, scope) = match extract_title(entry, selectors) {
        Some(title) => (title, vec![*entry]),
        None => heading_entry(entry, selectors)?,
    };

    let cells: Vec<ElementRef> = scope
        .iter()
        .flat_map(|root| root.select(&selectors.cell))
        .collect();
    let company_idx = cells.iter().position(|cell| has_style(cell, COMPANY_CELL_STYLE));
    let company_name = company_idx.and_then(|idx| element_text(&cells[idx]));
    let location = company_idx.and_then(|idx| extract_location(&cells[idx + 1..]));

    let salary = scope
        .iter()
        .flat_map(|root| root.select(&selectors.salary))
        .find_map(|strong| element_text(&strong));
    let snippet = cells
        .iter()
        .find(|cell| has_style(cell, SNIPPET_CELL_STYLE))
        .and_then(element_text);

    let location = location.unwrap_or_else(|| NOT_AVAILABLE.to_string());
    Some(RawJobRecord {
        experience_level: classify_experience_level(&title),
        job_type: classify_job_type(&location),
        title,
        company_name: company_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        location,
        salary: Some(salary.unwrap_or_else(|| NOT_AVAILABLE.to_string())),
        job_url,
        job_description_snippet: Some(snippet.unwrap_or_else(|| DESCRIPTION_UNAVAILABLE.to_string())),
        source: Source::Indeed,
    })
}

fn extract_title(entry: &ElementRef, selectors: &Selectors) -> Option<String> {
    entry
        .select(&selectors.title)
        .next()
        .and_then(|anchor| element_text(&anchor))
}

/// A job link that is itself the heading anchor. HTML parsers produce this
/// when the entry link wraps the heading's own link directly: the outer link
/// is closed early and the details end up after the heading. The details
/// run up to the next element holding another job link.
fn heading_entry<'a>(
    entry: &ElementRef<'a>,
    selectors: &Selectors,
) -> Option<(String, Vec<ElementRef<'a>>)> {
    let heading = entry
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|parent| HEADINGS.contains(&parent.value().name()))?;
    // Nested inside a job link that was already parsed with its title
    let nested = entry
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| selectors.entry.matches(&ancestor));
    if nested {
        return None;
    }

    let title = element_text(entry)?;
    let details = heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|sibling| {
            !selectors.entry.matches(sibling) && sibling.select(&selectors.entry).next().is_none()
        })
        .collect();
    Some((title, details))
}

/// Location is the first detail cell after the company cell.
fn extract_location(cells_after_company: &[ElementRef]) -> Option<String> {
    let cell = cells_after_company
        .iter()
        .find(|cell| has_style(cell, DETAIL_CELL_STYLE))?;
    let raw = cell.text().collect::<Vec<_>>().join(" ");
    let location = clean_text(&raw.replace('•', " "));
    if location.is_empty() { None } else { Some(location) }
}

fn has_style(cell: &ElementRef, fragment: &str) -> bool {
    cell.value()
        .attr("style")
        .is_some_and(|style| style.to_lowercase().contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExperienceLevel, JobType};

    fn entry_html(href: &str, body: &str) -> String {
        format!(r#"<a href="{href}" style="text-decoration:none"><table><tbody>{body}</tbody></table></a>"#)
    }

    fn full_entry(href: &str, title: &str, company: &str, location: &str) -> String {
        entry_html(
            href,
            &format!(
                r##"<tr><td><h2 style="margin:0"><a href="{href}">{title}</a></h2></td></tr>
                <tr><td style="padding:0 12px 0 0;font-size:14px;line-height:21px">{company}</td>
                    <td style="font-size:14px;line-height:21px">&bull;&nbsp;{location}</td></tr>
                <tr><td><table bgcolor="#f3f2f1"><tr><td><strong>$120,000 - $150,000 a year</strong></td></tr></table></td></tr>
                <tr><td style="font-size:13px;line-height:20px;color:#595959">Build and run   data pipelines.</td></tr>"##
            ),
        )
    }

    fn wrap(entries: &[String]) -> String {
        format!(
            r#"<html><body><table><tr><td>{}</td></tr>
            <tr><td><a href="https://www.indeed.com/jobs?q=engineer">See all jobs</a></td></tr></table></body></html>"#,
            entries.join("\n")
        )
    }

    #[test]
    fn test_parse_full_entry() {
        let html = wrap(&[full_entry(
            "https://cts.indeed.com/v3/rc/clk/dl?jk=abc123",
            "Senior Data Engineer",
            "Acme Analytics",
            "Hybrid remote in Austin, TX",
        )]);

        let jobs = IndeedParser.parse(&html).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.title, "Senior Data Engineer");
        assert_eq!(job.job_url, "https://cts.indeed.com/v3/rc/clk/dl?jk=abc123");
        assert_eq!(job.company_name, "Acme Analytics");
        assert_eq!(job.location, "Hybrid remote in Austin, TX");
        assert_eq!(job.salary.as_deref(), Some("$120,000 - $150,000 a year"));
        assert_eq!(job.job_description_snippet.as_deref(), Some("Build and run data pipelines."));
        assert_eq!(job.job_type, JobType::HybridRemote);
        assert_eq!(job.experience_level, ExperienceLevel::Senior);
        assert_eq!(job.source, Source::Indeed);
    }

    #[test]
    fn test_multiple_entries_in_document_order() {
        let html = wrap(&[
            full_entry("https://cts.indeed.com/rc/clk/dl?jk=1", "Junior Analyst", "Globex", "Remote"),
            full_entry("https://cts.indeed.com/rc/clk/dl?jk=2", "Office Manager", "Initech", "Austin, TX"),
        ]);

        let jobs = IndeedParser.parse(&html).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].company_name, "Globex");
        assert_eq!(jobs[0].experience_level, ExperienceLevel::Junior);
        assert_eq!(jobs[0].job_type, JobType::Remote);
        assert_eq!(jobs[1].job_url, "https://cts.indeed.com/rc/clk/dl?jk=2");
        assert_eq!(jobs[1].experience_level, ExperienceLevel::MidLevel);
        assert_eq!(jobs[1].job_type, JobType::InPerson);
    }

    #[test]
    fn test_entry_without_title_anchor_is_dropped() {
        let untitled = entry_html(
            "https://cts.indeed.com/rc/clk/dl?jk=notitle",
            r#"<tr><td><h2>Not a link</h2></td></tr>
            <tr><td style="padding:0 12px 0 0">Ghost Co</td></tr>"#,
        );
        let html = wrap(&[
            untitled,
            full_entry("https://cts.indeed.com/rc/clk/dl?jk=ok", "Support Specialist", "Umbrella", "Denver, CO"),
        ]);

        let jobs = IndeedParser.parse(&html).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "Support Specialist");
    }

    #[test]
    fn test_entry_without_company_keeps_sentinels() {
        let html = wrap(&[entry_html(
            "https://cts.indeed.com/rc/clk/dl?jk=bare",
            r#"<tr><td><h2><a href="https://cts.indeed.com/rc/clk/dl?jk=bare">Warehouse Associate</a></h2></td></tr>
            <tr><td style="font-size:14px;line-height:21px">Reno, NV</td></tr>"#,
        )]);

        let jobs = IndeedParser.parse(&html).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.company_name, "N/A");
        // Location is only read relative to the company cell
        assert_eq!(job.location, "N/A");
        assert_eq!(job.job_type, JobType::Unknown);
        assert_eq!(job.salary.as_deref(), Some("N/A"));
        assert_eq!(job.job_description_snippet.as_deref(), Some("Description unavailable..."));
        assert_eq!(job.experience_level, ExperienceLevel::Junior);
    }

    #[test]
    fn test_non_job_links_are_ignored() {
        let html = r#"<html><body>
            <a href="https://www.indeed.com/jobs?q=rust">Rust jobs</a>
            <a href="https://www.indeed.com/unsubscribe">Unsubscribe</a>
        </body></html>"#;
        assert!(IndeedParser.parse(html).unwrap().is_empty());
        assert!(IndeedParser.parse("").unwrap().is_empty());
    }

    #[test]
    fn test_selectors_are_compiled_once() {
        let first = compiled(&SELECTORS).unwrap();
        IndeedParser.parse("<p>no jobs</p>").unwrap();
        assert!(std::ptr::eq(first, compiled(&SELECTORS).unwrap()));
    }

    #[test]
    fn test_heading_link_directly_inside_entry_link() {
        let href = "https://cts.indeed.com/rc/clk/dl?jk=flat";
        let flat = format!(
            r##"<a href="{href}"><h2><a href="{href}">Data Analyst</a></h2><table><tbody>
            <tr><td style="padding:0 12px 0 0">Hooli</td>
                <td style="font-size:14px;line-height:21px">Remote</td></tr>
            <tr><td><table bgcolor="#f3f2f1"><tr><td><strong>$90,000 a year</strong></td></tr></table></td></tr>
            </tbody></table></a>"##
        );
        let html = wrap(&[
            flat,
            full_entry("https://cts.indeed.com/rc/clk/dl?jk=next", "Office Manager", "Initech", "Austin, TX"),
        ]);

        let jobs = IndeedParser.parse(&html).unwrap();
        assert_eq!(jobs.len(), 2);
        let job = &jobs[0];
        assert_eq!(job.title, "Data Analyst");
        assert_eq!(job.job_url, href);
        assert_eq!(job.company_name, "Hooli");
        assert_eq!(job.location, "Remote");
        assert_eq!(job.job_type, JobType::Remote);
        assert_eq!(job.salary.as_deref(), Some("$90,000 a year"));
        // Details stop before the next job's markup
        assert_eq!(job.job_description_snippet.as_deref(), Some("Description unavailable..."));
        assert_eq!(jobs[1].title, "Office Manager");
        assert_eq!(jobs[1].company_name, "Initech");
    }

    #[test]
    fn test_location_strips_bullets() {
        let html = wrap(&[full_entry(
            "https://cts.indeed.com/rc/clk/dl?jk=b",
            "Field Technician",
            "Wayne Enterprises",
            "Gotham, NJ &bull; On-site",
        )]);

        let jobs = IndeedParser.parse(&html).unwrap();
        assert_eq!(jobs[0].location, "Gotham, NJ On-site");
        assert_eq!(jobs[0].job_type, JobType::OnSite);
    }
}
