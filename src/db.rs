use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::models::{JobPosting, NewJobPosting, UnknownLabel, User};

const POSTING_COLUMNS: &str = "id, user_id, title, company_name, location, salary, job_url,
    job_description_snippet, job_type, experience_level, source, gmail_message_id,
    gmail_thread_id, fetched_at, date_posted, application_deadline, is_deleted, deleted_at,
    created_at, updated_at";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::configure(conn, path.to_path_buf())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, PathBuf::from(":memory:"))
    }

    fn configure(conn: Connection, path: PathBuf) -> Result<Self> {
        // Concurrent ingests from separate processes wait instead of failing
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobdigest") {
            proj_dirs.data_dir().join("jobdigest.db")
        } else {
            PathBuf::from("jobdigest.db")
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                username TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS job_postings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                company_name TEXT NOT NULL DEFAULT 'N/A',
                location TEXT NOT NULL DEFAULT 'N/A',
                salary TEXT,
                job_url TEXT NOT NULL,
                job_description_snippet TEXT,
                job_type TEXT NOT NULL DEFAULT 'Unknown' CHECK (job_type IN
                    ('Hybrid Remote', 'Hybrid', 'Remote', 'On-site', 'In Person', 'Unknown')),
                experience_level TEXT NOT NULL DEFAULT 'Unknown' CHECK (experience_level IN
                    ('Intern', 'Junior', 'Mid-Level', 'Senior', 'Unknown')),
                source TEXT NOT NULL DEFAULT 'Unknown',
                gmail_message_id TEXT NOT NULL,
                gmail_thread_id TEXT,
                fetched_at TEXT NOT NULL,
                date_posted TEXT,
                application_deadline TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Soft-deleted rows stay out of the key so a dismissed job can come back
            CREATE UNIQUE INDEX IF NOT EXISTS idx_postings_active_key
                ON job_postings(user_id, gmail_message_id, job_url) WHERE is_deleted = 0;
            CREATE INDEX IF NOT EXISTS idx_postings_user_fetched
                ON job_postings(user_id, is_deleted, fetched_at);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='job_postings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'jobdigest init' first."
            ));
        }
        Ok(())
    }

    // --- User operations ---

    pub fn get_or_create_user(&self, email: &str, username: Option<&str>) -> Result<i64> {
        if let Some(user) = self.find_user_by_email(email)? {
            return Ok(user.id);
        }

        self.conn.execute(
            "INSERT INTO users (email, username, created_at) VALUES (?1, ?2, ?3)",
            params![email.trim(), username, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, username, created_at FROM users WHERE email = ?1",
                [email.trim()],
                Self::row_to_user,
            )
            .optional()
            .context("Failed to look up user")
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, email, username, created_at FROM users ORDER BY email")?;
        let rows = stmt.query_map([], Self::row_to_user)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list users")
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    // --- Job posting operations ---

    /// Id of the active posting holding this dedup key, if any.
    pub fn find_active_posting(
        &self,
        user_id: i64,
        gmail_message_id: &str,
        job_url: &str,
    ) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM job_postings
                 WHERE user_id = ?1 AND gmail_message_id = ?2 AND job_url = ?3 AND is_deleted = 0",
                params![user_id, gmail_message_id, job_url],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up job posting")
    }

    /// Inserts a posting. Returns `None` when an active posting with the same
    /// key already exists.
    pub fn insert_posting(&self, posting: &NewJobPosting) -> Result<Option<i64>> {
        let now = now_timestamp();
        let result = self.conn.execute(
            "INSERT INTO job_postings (
                user_id, title, company_name, location, salary, job_url,
                job_description_snippet, job_type, experience_level, source,
                gmail_message_id, gmail_thread_id, fetched_at, date_posted,
                application_deadline, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
            params![
                posting.user_id,
                posting.title,
                posting.company_name,
                posting.location,
                posting.salary,
                posting.job_url,
                posting.job_description_snippet,
                posting.job_type.as_str(),
                posting.experience_level.as_str(),
                posting.source,
                posting.gmail_message_id,
                posting.gmail_thread_id,
                posting.fetched_at,
                posting.date_posted,
                posting.application_deadline,
                now,
            ],
        );

        match result {
            Ok(_) => Ok(Some(self.conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to insert job posting"),
        }
    }

    pub fn list_active_postings(&self, user_id: i64) -> Result<Vec<JobPosting>> {
        let sql = format!(
            "SELECT {} FROM job_postings
             WHERE user_id = ?1 AND is_deleted = 0
             ORDER BY fetched_at DESC, id DESC",
            POSTING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], Self::row_to_posting)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list job postings")
    }

    pub fn get_posting(&self, id: i64) -> Result<Option<JobPosting>> {
        let sql = format!("SELECT {} FROM job_postings WHERE id = ?1", POSTING_COLUMNS);
        self.conn
            .query_row(&sql, [id], Self::row_to_posting)
            .optional()
            .context("Failed to load job posting")
    }

    /// Marks an active posting deleted. Returns false when no active posting
    /// has this id.
    pub fn soft_delete_posting(&self, id: i64) -> Result<bool> {
        let now = now_timestamp();
        let changed = self.conn.execute(
            "UPDATE job_postings SET is_deleted = 1, deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND is_deleted = 0",
            params![now, id],
        )?;
        Ok(changed > 0)
    }

    fn row_to_posting(row: &rusqlite::Row) -> rusqlite::Result<JobPosting> {
        Ok(JobPosting {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            company_name: row.get(3)?,
            location: row.get(4)?,
            salary: row.get(5)?,
            job_url: row.get(6)?,
            job_description_snippet: row.get(7)?,
            job_type: label_column(row, 8)?,
            experience_level: label_column(row, 9)?,
            source: row.get(10)?,
            gmail_message_id: row.get(11)?,
            gmail_thread_id: row.get(12)?,
            fetched_at: row.get(13)?,
            date_posted: row.get(14)?,
            application_deadline: row.get(15)?,
            is_deleted: row.get(16)?,
            deleted_at: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
        })
    }
}

fn label_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownLabel>,
{
    let value: String = row.get(idx)?;
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Storage form of a timestamp: RFC 3339 in UTC, so text order is time order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}
