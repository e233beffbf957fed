use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder for any text field a parser could not extract.
pub const NOT_AVAILABLE: &str = "N/A";

/// Default snippet for Indeed entries without a description cell.
pub const DESCRIPTION_UNAVAILABLE: &str = "Description unavailable...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Indeed,
    LinkedIn,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Indeed => "Indeed",
            Source::LinkedIn => "LinkedIn",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A category name outside the fixed set.
#[derive(Debug, Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownLabel {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "Hybrid Remote")]
    HybridRemote,
    Hybrid,
    Remote,
    #[serde(rename = "On-site")]
    OnSite,
    #[serde(rename = "In Person")]
    InPerson,
    Unknown,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::HybridRemote,
        JobType::Hybrid,
        JobType::Remote,
        JobType::OnSite,
        JobType::InPerson,
        JobType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::HybridRemote => "Hybrid Remote",
            JobType::Hybrid => "Hybrid",
            JobType::Remote => "Remote",
            JobType::OnSite => "On-site",
            JobType::InPerson => "In Person",
            JobType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = UnknownLabel;

    /// Accepts the display names, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|job_type| job_type.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLabel {
                kind: "job type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceLevel {
    Intern,
    Junior,
    #[serde(rename = "Mid-Level")]
    MidLevel,
    Senior,
    Unknown,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 5] = [
        ExperienceLevel::Intern,
        ExperienceLevel::Junior,
        ExperienceLevel::MidLevel,
        ExperienceLevel::Senior,
        ExperienceLevel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Intern => "Intern",
            ExperienceLevel::Junior => "Junior",
            ExperienceLevel::MidLevel => "Mid-Level",
            ExperienceLevel::Senior => "Senior",
            ExperienceLevel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ExperienceLevel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLabel {
                kind: "experience level",
                value: s.to_string(),
            })
    }
}

/// One job extracted from an alert email, before it is tied to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawJobRecord {
    pub title: String,
    pub company_name: String,
    pub location: String,
    pub salary: Option<String>, // Indeed only
    pub job_url: String,
    pub job_description_snippet: Option<String>, // Indeed only
    pub job_type: JobType,
    pub experience_level: ExperienceLevel,
    pub source: Source,
}

/// One entry of an ingestion batch. Everything is optional on the wire;
/// the ingestion engine decides what is fatal for the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobCandidate {
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub job_url: Option<String>,
    pub job_description_snippet: Option<String>,
    pub job_type: Option<String>,
    pub experience_level: Option<String>,
    pub source: Option<String>,
    pub gmail_message_id: Option<String>,
    pub gmail_thread_id: Option<String>,
    pub fetched_at: Option<String>,
    pub date_posted: Option<String>,
    pub application_deadline: Option<String>,
}

impl JobCandidate {
    pub fn from_record(record: RawJobRecord, email: &EmailRef) -> Self {
        Self {
            title: Some(record.title),
            company_name: Some(record.company_name),
            location: Some(record.location),
            salary: record.salary,
            job_url: Some(record.job_url),
            job_description_snippet: record.job_description_snippet,
            job_type: Some(record.job_type.as_str().to_string()),
            experience_level: Some(record.experience_level.as_str().to_string()),
            source: Some(record.source.as_str().to_string()),
            gmail_message_id: Some(email.message_id.clone()),
            gmail_thread_id: email.thread_id.clone(),
            fetched_at: Some(email.fetched_at.clone()),
            date_posted: None,
            application_deadline: None,
        }
    }
}

/// Correlation fields for the email a record came from.
#[derive(Debug, Clone)]
pub struct EmailRef {
    pub message_id: String,
    pub thread_id: Option<String>,
    pub fetched_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub company_name: String,
    pub location: String,
    pub salary: Option<String>,
    pub job_url: String,
    pub job_description_snippet: Option<String>,
    pub job_type: JobType,
    pub experience_level: ExperienceLevel,
    pub source: String,
    pub gmail_message_id: String,
    pub gmail_thread_id: Option<String>,
    pub fetched_at: String,
    pub date_posted: Option<String>,
    pub application_deadline: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A posting ready to be inserted; the store fills in id and bookkeeping.
#[derive(Debug, Clone)]
pub struct NewJobPosting {
    pub user_id: i64,
    pub title: String,
    pub company_name: String,
    pub location: String,
    pub salary: Option<String>,
    pub job_url: String,
    pub job_description_snippet: Option<String>,
    pub job_type: JobType,
    pub experience_level: ExperienceLevel,
    pub source: String,
    pub gmail_message_id: String,
    pub gmail_thread_id: Option<String>,
    pub fetched_at: String,
    pub date_posted: Option<String>,
    pub application_deadline: Option<String>,
}
