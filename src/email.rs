use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use mailparse::{addrparse, parse_mail, MailAddr, MailHeaderMap, ParsedMail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::db::{format_timestamp, Database};
use crate::ingest::ingest;
use crate::models::{EmailRef, JobCandidate, User};
use crate::parsers::{normalize_sender, ParserRegistry};

/// One retrieved email.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub html_body: String,
}

/// Where alert emails come from.
pub trait MailSource {
    /// Up to `limit` messages sent by any of `senders`.
    fn fetch(&self, senders: &[String], limit: usize) -> Result<Vec<MailMessage>>;
}

/// A directory of RFC 822 `.eml` files, e.g. a mailbox export.
pub struct EmlDirectory {
    root: PathBuf,
}

impl EmlDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn eml_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read mail directory: {}", self.root.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_eml = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"));
            if path.is_file() && is_eml {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl MailSource for EmlDirectory {
    fn fetch(&self, senders: &[String], limit: usize) -> Result<Vec<MailMessage>> {
        let senders: Vec<String> = senders.iter().map(|s| normalize_sender(s)).collect();
        let mut messages = Vec::new();

        for path in self.eml_files()? {
            if messages.len() >= limit {
                break;
            }
            let message = match read_message(&path) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    continue;
                }
            };
            if senders.contains(&normalize_sender(&message.sender)) {
                messages.push(message);
            } else {
                debug!("Ignoring {} from {}", path.display(), message.sender);
            }
        }

        Ok(messages)
    }
}

fn read_message(path: &Path) -> Result<MailMessage> {
    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = parse_mail(&raw)?;

    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let id = parsed
        .headers
        .get_first_value("Message-ID")
        .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .ok_or_else(|| anyhow!("No message id"))?;
    let thread_id = parsed
        .headers
        .get_first_value("X-GM-THRID")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    Ok(MailMessage {
        id,
        thread_id,
        subject,
        sender: sender_address(&from),
        html_body: get_email_body(&parsed)?,
    })
}

/// Bare address from a `From` header such as `"Jobs" <alert@indeed.com>`.
fn sender_address(from: &str) -> String {
    let address = addrparse(from).ok().and_then(|list| {
        list.iter().find_map(|addr| match addr {
            MailAddr::Single(info) => Some(info.addr.clone()),
            MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
        })
    });
    address.unwrap_or_else(|| from.to_string()).trim().to_lowercase()
}

fn get_email_body(parsed: &ParsedMail) -> Result<String> {
    // Prefer HTML anywhere in the tree, then plain text
    if let Some(part) = find_part(parsed, "text/html") {
        return Ok(part.get_body()?);
    }
    if let Some(part) = find_part(parsed, "text/plain") {
        return Ok(part.get_body()?);
    }
    Ok(parsed.get_body()?)
}

fn find_part<'m, 'a>(mail: &'m ParsedMail<'a>, mimetype: &str) -> Option<&'m ParsedMail<'a>> {
    if mail.subparts.is_empty() {
        return mail.ctype.mimetype.eq_ignore_ascii_case(mimetype).then_some(mail);
    }
    mail.subparts.iter().find_map(|part| find_part(part, mimetype))
}

#[derive(Debug, Default)]
pub struct ScanStats {
    pub emails_found: usize,
    pub jobs_parsed: usize,
    pub jobs_added: usize,
    pub duplicates: usize,
}

/// Pulls alert emails from a source, parses them and stores the jobs.
pub struct EmailIngester {
    source: Box<dyn MailSource>,
    registry: ParserRegistry,
}

impl EmailIngester {
    pub fn new(source: Box<dyn MailSource>, registry: ParserRegistry) -> Self {
        Self { source, registry }
    }

    pub fn fetch_job_alerts(
        &self,
        db: &Database,
        user: &User,
        limit: usize,
        dry_run: bool,
    ) -> Result<ScanStats> {
        let messages = self.source.fetch(&self.registry.senders(), limit)?;
        let mut stats = ScanStats {
            emails_found: messages.len(),
            ..Default::default()
        };
        info!("Found {} job alert emails", messages.len());

        let fetched_at = format_timestamp(&Utc::now());
        let mut candidates = Vec::new();
        for message in messages {
            let jobs = self.registry.dispatch_and_parse(&message.sender, &message.html_body);
            debug!("{:?}: {} jobs", message.subject, jobs.len());
            stats.jobs_parsed += jobs.len();

            let email = EmailRef {
                message_id: message.id,
                thread_id: message.thread_id,
                fetched_at: fetched_at.clone(),
            };
            for job in jobs {
                if dry_run {
                    println!(
                        "[DRY RUN] Would add: {} at {} ({})",
                        job.title, job.company_name, job.source
                    );
                } else {
                    candidates.push(JobCandidate::from_record(job, &email));
                }
            }
        }

        if !candidates.is_empty() {
            let ingested = ingest(db, user, candidates)?;
            stats.jobs_added = ingested.saved_count;
            stats.duplicates = ingested.duplicates;
        }

        Ok(stats)
    }
}
