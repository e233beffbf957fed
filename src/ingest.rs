//! Ingestion of parsed job records into a user's postings.
//!
//! Each record is checked on its own: a missing message id, a bad
//! `fetched_at` or an already active posting skips that record and the
//! batch carries on. Only payload and identity problems fail the request.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{classify_experience_level, classify_job_type};
use crate::db::{format_timestamp, Database};
use crate::error::{AppError, AppResult};
use crate::models::{JobCandidate, NewJobPosting, User, NOT_AVAILABLE};
use crate::postings::resolve_user;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub job_postings: Vec<JobCandidate>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub saved_count: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Parses a JSON payload, resolves its user and ingests its postings.
pub fn ingest_payload(db: &Database, payload: &str) -> AppResult<IngestStats> {
    let request: IngestRequest = serde_json::from_str(payload)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))?;

    if request.user_email.trim().is_empty() {
        return Err(AppError::BadRequest("user_email is required".to_string()));
    }
    if request.job_postings.is_empty() {
        return Err(AppError::BadRequest("job_postings must not be empty".to_string()));
    }

    let user = resolve_user(db, &request.user_email)?;
    ingest(db, &user, request.job_postings)
}

pub fn ingest(db: &Database, user: &User, candidates: Vec<JobCandidate>) -> AppResult<IngestStats> {
    let mut stats = IngestStats::default();
    info!("Ingesting {} job postings for {}", candidates.len(), user.email);

    for candidate in candidates {
        let Some(message_id) = non_blank(candidate.gmail_message_id.as_deref()) else {
            warn!("Skipping job posting without gmail_message_id: {:?}", candidate.title);
            stats.skipped += 1;
            continue;
        };
        let message_id = message_id.to_string();
        let job_url = text_or_sentinel(candidate.job_url.as_deref());

        if db.find_active_posting(user.id, &message_id, &job_url)?.is_some() {
            debug!("Duplicate job posting: {} {}", message_id, job_url);
            stats.duplicates += 1;
            continue;
        }

        let fetched_at_raw = candidate.fetched_at.as_deref().unwrap_or_default();
        let Some(fetched_at) = parse_timestamp(fetched_at_raw) else {
            warn!("Invalid fetched_at format for {}: {:?}", message_id, fetched_at_raw);
            stats.skipped += 1;
            continue;
        };

        let posting = build_posting(user.id, candidate, message_id, job_url, &fetched_at);
        match db.insert_posting(&posting)? {
            Some(id) => {
                debug!("Saved job posting #{}: {}", id, posting.title);
                stats.saved_count += 1;
            }
            None => {
                // Lost a race with another writer on the same key
                debug!("Duplicate job posting on insert: {}", posting.gmail_message_id);
                stats.duplicates += 1;
            }
        }
    }

    info!(
        "Saved {} job postings ({} duplicates, {} skipped)",
        stats.saved_count, stats.duplicates, stats.skipped
    );
    Ok(stats)
}

fn build_posting(
    user_id: i64,
    candidate: JobCandidate,
    gmail_message_id: String,
    job_url: String,
    fetched_at: &DateTime<Utc>,
) -> NewJobPosting {
    let title = text_or_sentinel(candidate.title.as_deref());
    let location = text_or_sentinel(candidate.location.as_deref());

    // Labels outside the fixed sets are re-derived like missing ones
    let job_type = known_label(candidate.job_type.as_deref())
        .unwrap_or_else(|| classify_job_type(&location));
    let experience_level = known_label(candidate.experience_level.as_deref())
        .unwrap_or_else(|| classify_experience_level(&title));

    NewJobPosting {
        user_id,
        company_name: text_or_sentinel(candidate.company_name.as_deref()),
        salary: candidate.salary,
        job_description_snippet: candidate.job_description_snippet,
        source: non_blank(candidate.source.as_deref())
            .unwrap_or("Unknown")
            .to_string(),
        gmail_thread_id: non_blank(candidate.gmail_thread_id.as_deref()).map(str::to_string),
        fetched_at: format_timestamp(fetched_at),
        date_posted: optional_timestamp(candidate.date_posted.as_deref()),
        application_deadline: optional_timestamp(candidate.application_deadline.as_deref()),
        title,
        location,
        job_url,
        job_type,
        experience_level,
        gmail_message_id,
    }
}

/// Parses an ISO-8601 style timestamp. Values without an offset are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // Offsets written as +hhmm or +hh, which RFC 3339 does not allow
    const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn known_label<T>(value: Option<&str>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = non_blank(value)?;
    match value.parse() {
        Ok(label) => Some(label),
        Err(e) => {
            debug!("{}; deriving it instead", e);
            None
        }
    }
}

fn optional_timestamp(value: Option<&str>) -> Option<String> {
    value
        .and_then(parse_timestamp)
        .map(|dt| format_timestamp(&dt))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn text_or_sentinel(value: Option<&str>) -> String {
    non_blank(value).unwrap_or(NOT_AVAILABLE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExperienceLevel, JobType};
    use crate::postings::{list_active_postings, soft_delete};

    fn setup() -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db.get_or_create_user("ada@example.com", Some("ada")).unwrap();
        let user = db.find_user_by_email("ada@example.com").unwrap().unwrap();
        (db, user)
    }

    fn candidate(message_id: &str, url: &str, fetched_at: &str) -> JobCandidate {
        JobCandidate {
            title: Some("Senior Software Engineer".to_string()),
            company_name: Some("Acme Corp".to_string()),
            location: Some("Remote · United States".to_string()),
            job_url: Some(url.to_string()),
            source: Some("LinkedIn".to_string()),
            gmail_message_id: Some(message_id.to_string()),
            fetched_at: Some(fetched_at.to_string()),
            ..Default::default()
        }
    }

    fn batch() -> Vec<JobCandidate> {
        vec![
            candidate("m1", "https://www.linkedin.com/jobs/view/1", "2025-01-30T19:15:00Z"),
            candidate("m1", "https://www.linkedin.com/jobs/view/2", "2025-01-30T19:15:00Z"),
            candidate("m2", "https://www.linkedin.com/jobs/view/1", "2025-01-31T08:00:00+02:00"),
        ]
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let (db, user) = setup();

        let first = ingest(&db, &user, batch()).unwrap();
        assert_eq!(first.saved_count, 3);

        let second = ingest(&db, &user, batch()).unwrap();
        assert_eq!(second.saved_count, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(list_active_postings(&db, &user).unwrap().len(), 3);
    }

    #[test]
    fn test_duplicates_within_one_batch() {
        let (db, user) = setup();
        let mut jobs = batch();
        jobs.push(jobs[0].clone());

        let stats = ingest(&db, &user, jobs).unwrap();
        assert_eq!(stats.saved_count, 3);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_records_without_message_id_or_valid_fetch_time_are_skipped() {
        let (db, user) = setup();
        let mut no_id = candidate("", "https://example.com/a", "2025-01-30T19:15:00Z");
        no_id.gmail_message_id = None;
        let blank_id = candidate("   ", "https://example.com/b", "2025-01-30T19:15:00Z");
        let bad_time = candidate("m9", "https://example.com/c", "yesterday");
        let mut no_time = candidate("m10", "https://example.com/d", "");
        no_time.fetched_at = None;
        let good = candidate("m11", "https://example.com/e", "2025-01-30 19:15:00");

        let stats = ingest(&db, &user, vec![no_id, blank_id, bad_time, no_time, good]).unwrap();
        assert_eq!(
            stats,
            IngestStats {
                saved_count: 1,
                duplicates: 0,
                skipped: 4
            }
        );
    }

    #[test]
    fn test_soft_deleted_posting_can_be_ingested_again() {
        let (db, user) = setup();
        let job = candidate("m1", "https://example.com/1", "2025-01-30T19:15:00Z");
        ingest(&db, &user, vec![job.clone()]).unwrap();

        let id = list_active_postings(&db, &user).unwrap()[0].id;
        soft_delete(&db, id).unwrap();
        assert!(list_active_postings(&db, &user).unwrap().is_empty());

        let stats = ingest(&db, &user, vec![job]).unwrap();
        assert_eq!(stats.saved_count, 1);
        let active = list_active_postings(&db, &user).unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, id);
    }

    #[test]
    fn test_missing_fields_get_sentinels_and_derived_categories() {
        let (db, user) = setup();
        let job = JobCandidate {
            title: Some("Junior Data Analyst".to_string()),
            location: Some("Hybrid Remote - NYC".to_string()),
            gmail_message_id: Some("m1".to_string()),
            gmail_thread_id: Some("  ".to_string()),
            fetched_at: Some("2025-01-30T19:15:00Z".to_string()),
            date_posted: Some("2025-01-28".to_string()),
            application_deadline: Some("soon".to_string()),
            ..Default::default()
        };
        ingest(&db, &user, vec![job]).unwrap();

        let saved = &list_active_postings(&db, &user).unwrap()[0];
        assert_eq!(saved.company_name, "N/A");
        assert_eq!(saved.job_url, "N/A");
        assert_eq!(saved.source, "Unknown");
        assert_eq!(saved.job_type, JobType::HybridRemote);
        assert_eq!(saved.experience_level, ExperienceLevel::Junior);
        assert_eq!(saved.gmail_thread_id, None);
        assert_eq!(saved.fetched_at, "2025-01-30T19:15:00.000000Z");
        assert_eq!(saved.date_posted.as_deref(), Some("2025-01-28T00:00:00.000000Z"));
        assert_eq!(saved.application_deadline, None);
        assert!(!saved.is_deleted);
    }

    #[test]
    fn test_fetched_at_is_normalized_to_utc() {
        let (db, user) = setup();
        ingest(&db, &user, batch()).unwrap();

        let postings = list_active_postings(&db, &user).unwrap();
        // 08:00+02:00 on the 31st is the newest
        assert_eq!(postings[0].gmail_message_id, "m2");
        assert_eq!(postings[0].fetched_at, "2025-01-31T06:00:00.000000Z");
    }

    #[test]
    fn test_ingest_payload_errors() {
        let (db, _user) = setup();

        assert!(matches!(ingest_payload(&db, "{not json"), Err(AppError::BadRequest(_))));
        assert!(matches!(
            ingest_payload(&db, r#"{"job_postings": [{"title": "x"}]}"#),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            ingest_payload(&db, r#"{"user_email": "ada@example.com", "job_postings": []}"#),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            ingest_payload(
                &db,
                r#"{"user_email": "ghost@example.com", "job_postings": [{"title": "x"}]}"#
            ),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_ingest_payload_saves_postings() {
        let (db, user) = setup();
        let payload = r#"{
            "user_email": "ADA@example.com",
            "job_postings": [
                {"title": "Data Analyst", "job_url": "https://example.com/1",
                 "gmail_message_id": "m1", "fetched_at": "2025-01-30T19:15:00Z"},
                {"title": "No id", "fetched_at": "2025-01-30T19:15:00Z"}
            ]
        }"#;

        let stats = ingest_payload(&db, payload).unwrap();
        assert_eq!(stats.saved_count, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(list_active_postings(&db, &user).unwrap()[0].title, "Data Analyst");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = "2025-01-30T19:15:00.000000Z";
        for value in [
            "2025-01-30T19:15:00Z",
            "2025-01-30T20:15:00+01:00",
            "2025-01-30T19:15:00",
            "2025-01-30 19:15:00.000",
            "2025-01-30T19:15",
            "2025-01-30T19:15:00+0000",
            "2025-01-30T19:15:00+00",
            "2025-01-30T20:15:00.000+0100",
            "2025-01-30 14:15:00-05",
            "2025-01-30 20:15:00+01:00",
        ] {
            let parsed = parse_timestamp(value).unwrap_or_else(|| panic!("{value}"));
            assert_eq!(format_timestamp(&parsed), expected);
        }
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("30/01/2025").is_none());
        assert!(parse_timestamp("2025-13-01T00:00:00Z").is_none());
    }

    #[test]
    fn test_out_of_set_categories_are_derived() {
        let (db, user) = setup();
        let payload = r#"{
            "user_email": "ada@example.com",
            "job_postings": [
                {"title": "Senior Platform Engineer", "location": "Remote",
                 "job_url": "https://example.com/1", "gmail_message_id": "m1",
                 "fetched_at": "2025-01-30T19:15:00Z",
                 "job_type": "Banana", "experience_level": "Wizard"},
                {"title": "Senior Platform Engineer", "location": "Remote",
                 "job_url": "https://example.com/2", "gmail_message_id": "m1",
                 "fetched_at": "2025-01-30T19:15:00Z",
                 "job_type": "on-site", "experience_level": "Intern"}
            ]
        }"#;

        let stats = ingest_payload(&db, payload).unwrap();
        assert_eq!(stats.saved_count, 2);

        let postings = list_active_postings(&db, &user).unwrap();
        let derived = postings.iter().find(|p| p.job_url.ends_with("/1")).unwrap();
        assert_eq!(derived.job_type, JobType::Remote);
        assert_eq!(derived.experience_level, ExperienceLevel::Senior);

        let given = postings.iter().find(|p| p.job_url.ends_with("/2")).unwrap();
        assert_eq!(given.job_type, JobType::OnSite);
        assert_eq!(given.experience_level, ExperienceLevel::Intern);
    }

    #[test]
    fn test_colonless_offsets_are_saved() {
        let (db, user) = setup();
        let stats = ingest(
            &db,
            &user,
            vec![
                candidate("m1", "https://example.com/1", "2025-01-30T19:15:00+0000"),
                candidate("m2", "https://example.com/2", "2025-01-30T21:15:00+02"),
            ],
        )
        .unwrap();
        assert_eq!(stats.saved_count, 2);
        assert_eq!(stats.skipped, 0);
        assert!(list_active_postings(&db, &user)
            .unwrap()
            .iter()
            .all(|p| p.fetched_at == "2025-01-30T19:15:00.000000Z"));
    }
}
