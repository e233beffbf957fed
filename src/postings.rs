use tracing::info;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{JobPosting, User};

pub fn resolve_user(db: &Database, email: &str) -> AppResult<User> {
    db.find_user_by_email(email)?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", email.trim())))
}

/// Postings the user has not dismissed, most recently fetched first.
pub fn list_active_postings(db: &Database, user: &User) -> AppResult<Vec<JobPosting>> {
    Ok(db.list_active_postings(user.id)?)
}

pub fn soft_delete(db: &Database, posting_id: i64) -> AppResult<()> {
    if !db.soft_delete_posting(posting_id)? {
        return Err(AppError::NotFound(format!(
            "Job posting #{} not found",
            posting_id
        )));
    }
    info!("Job posting #{} deleted", posting_id);
    Ok(())
}
