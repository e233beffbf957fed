use crate::models::{ExperienceLevel, JobType, NOT_AVAILABLE};

// First match wins, so more specific keywords come first.
static EXPERIENCE_LEVEL_KEYWORDS: &[(&str, ExperienceLevel)] = &[
    ("co-op", ExperienceLevel::Intern),
    ("intern", ExperienceLevel::Intern),
    ("junior", ExperienceLevel::Junior),
    ("associate", ExperienceLevel::Junior),
    ("assistant", ExperienceLevel::Junior),
    ("coordinator", ExperienceLevel::Junior),
    ("trainee", ExperienceLevel::Junior),
    ("entry", ExperienceLevel::Junior),
    ("senior", ExperienceLevel::Senior),
    ("lead", ExperienceLevel::Senior),
    ("principal", ExperienceLevel::Senior),
    ("head", ExperienceLevel::Senior),
    ("director", ExperienceLevel::Senior),
    ("vp", ExperienceLevel::Senior),
    ("chief", ExperienceLevel::Senior),
    ("executive", ExperienceLevel::Senior),
    ("manager", ExperienceLevel::MidLevel),
    ("supervisor", ExperienceLevel::MidLevel),
    ("consultant", ExperienceLevel::MidLevel),
    ("engineer", ExperienceLevel::MidLevel),
    ("analyst", ExperienceLevel::MidLevel),
    ("specialist", ExperienceLevel::MidLevel),
    ("intermediate", ExperienceLevel::MidLevel),
];

static JOB_TYPE_KEYWORDS: &[(&[&str], JobType)] = &[
    (&["hybrid remote"], JobType::HybridRemote),
    (&["hybrid"], JobType::Hybrid),
    (&["remote", "work from home", "wfh"], JobType::Remote),
    (&["on-site", "on site", "in-office"], JobType::OnSite),
    (&["in person", "office-based"], JobType::InPerson),
];

/// Maps a job title to an experience level by substring keyword match.
pub fn classify_experience_level(title: &str) -> ExperienceLevel {
    let title_lower = title.to_lowercase();
    EXPERIENCE_LEVEL_KEYWORDS
        .iter()
        .find(|(keyword, _)| title_lower.contains(keyword))
        .map(|(_, level)| *level)
        .unwrap_or(ExperienceLevel::Unknown)
}

/// Maps a location string to a job type. A known location without any
/// keyword is taken to be an in-person job.
pub fn classify_job_type(location: &str) -> JobType {
    let location = location.trim();
    if location.is_empty() || location == NOT_AVAILABLE {
        return JobType::Unknown;
    }

    let location_lower = location.to_lowercase();
    JOB_TYPE_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| location_lower.contains(k)))
        .map(|(_, job_type)| *job_type)
        .unwrap_or(JobType::InPerson)
}
