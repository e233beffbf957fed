mod classify;
mod config;
mod db;
mod email;
mod error;
mod ingest;
mod models;
mod parsers;
mod postings;

use anyhow::{anyhow, Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use config::Config;
use db::Database;
use email::{EmailIngester, EmlDirectory};
use parsers::ParserRegistry;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "jobdigest")]
#[command(about = "Collect job alert emails into a de-duplicated list of postings")]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Parse one alert email body and print the jobs found
    Parse {
        /// Sender address of the email (selects the parser)
        #[arg(short, long)]
        sender: String,

        /// Path to the HTML body
        file: PathBuf,
    },

    /// Save job postings from a JSON payload
    Ingest {
        /// Path to payload: {"user_email": ..., "job_postings": [...]}
        file: PathBuf,
    },

    /// Scan a directory of .eml files for job alerts
    Scan {
        /// Email address of the user who owns the postings
        #[arg(short, long)]
        user: String,

        /// Directory of .eml files (defaults to mail.directory in config)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Maximum number of emails to read
        #[arg(short, long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        limit: Option<usize>,

        /// Show what would be added without adding
        #[arg(long)]
        dry_run: bool,
    },

    /// List active job postings
    List {
        /// Email address of the user
        #[arg(short, long)]
        user: String,
    },

    /// Show job posting details
    Show {
        /// Job posting ID
        id: i64,
    },

    /// Dismiss a job posting
    Delete {
        /// Job posting ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        /// Email address
        email: String,

        #[arg(short, long)]
        username: Option<String>,
    },

    /// List users
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config.logging.filter);

    let db_path = config.database_path();
    debug!("Using database at {}", db_path.display());
    let db = Database::open(&db_path)?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::User { command } => {
            db.ensure_initialized()?;
            match command {
                UserCommands::Add { email, username } => {
                    let id = db.get_or_create_user(&email, username.as_deref())?;
                    println!("User '{}' (ID: {})", email.trim(), id);
                }

                UserCommands::List => {
                    let users = db.list_users()?;
                    if users.is_empty() {
                        println!("No users found.");
                    } else {
                        println!("{:<6} {:<36} {:<20}", "ID", "EMAIL", "USERNAME");
                        println!("{}", "-".repeat(62));
                        for user in users {
                            println!(
                                "{:<6} {:<36} {:<20}",
                                user.id,
                                truncate(&user.email, 34),
                                truncate(&user.username.unwrap_or_default(), 18)
                            );
                        }
                    }
                }
            }
        }

        Commands::Parse { sender, file } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let registry = ParserRegistry::default();
            if !registry.handles(&sender) {
                eprintln!(
                    "No parser for '{}'. Known senders: {}",
                    sender,
                    registry.senders().join(", ")
                );
            }
            let jobs = registry.dispatch_and_parse(&sender, &html);
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }

        Commands::Ingest { file } => {
            db.ensure_initialized()?;
            let payload = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let stats = ingest::ingest_payload(&db, &payload)?;
            println!("{}", serde_json::to_string(&stats)?);
        }

        Commands::Scan {
            user,
            dir,
            limit,
            dry_run,
        } => {
            db.ensure_initialized()?;
            let user = postings::resolve_user(&db, &user)?;
            let dir = dir
                .or_else(|| config.mail.directory.clone())
                .ok_or_else(|| anyhow!("No mail directory. Pass --dir or set mail.directory"))?;
            let limit = limit.unwrap_or(config.mail.max_messages);

            println!("Scanning {} for job alerts...", dir.display());
            let ingester = EmailIngester::new(
                Box::new(EmlDirectory::new(dir)),
                ParserRegistry::default(),
            );
            let stats = ingester.fetch_job_alerts(&db, &user, limit, dry_run)?;

            println!("\nResults:");
            println!("  Emails found: {}", stats.emails_found);
            println!("  Jobs parsed:  {}", stats.jobs_parsed);
            println!("  Jobs added:   {}", stats.jobs_added);
            if stats.duplicates > 0 {
                println!("  Duplicates:   {}", stats.duplicates);
            }

            if dry_run {
                println!("\n(Dry run - no jobs were actually added)");
            }
        }

        Commands::List { user } => {
            db.ensure_initialized()?;
            let user = postings::resolve_user(&db, &user)?;
            let jobs = postings::list_active_postings(&db, &user)?;
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<6} {:<14} {:<10} {:<30} {:<20} {:<10}",
                    "ID", "TYPE", "LEVEL", "TITLE", "COMPANY", "FETCHED"
                );
                println!("{}", "-".repeat(95));
                for job in jobs {
                    println!(
                        "{:<6} {:<14} {:<10} {:<30} {:<20} {:<10}",
                        job.id,
                        job.job_type,
                        job.experience_level,
                        truncate(&job.title, 28),
                        truncate(&job.company_name, 18),
                        job.fetched_at.get(..10).unwrap_or(job.fetched_at.as_str())
                    );
                }
            }
        }

        Commands::Show { id } => {
            db.ensure_initialized()?;
            match db.get_posting(id)? {
                Some(job) => {
                    println!("Job #{}", job.id);
                    println!("Title: {}", job.title);
                    println!("Company: {}", job.company_name);
                    println!("Location: {} ({})", job.location, job.job_type);
                    println!("Level: {}", job.experience_level);
                    if let Some(salary) = &job.salary {
                        println!("Salary: {}", salary);
                    }
                    println!("URL: {}", job.job_url);
                    println!("Source: {}", job.source);
                    println!("Fetched: {}", job.fetched_at);
                    if let Some(posted) = &job.date_posted {
                        println!("Posted: {}", posted);
                    }
                    if let Some(deadline) = &job.application_deadline {
                        println!("Apply by: {}", deadline);
                    }
                    if let Some(deleted_at) = &job.deleted_at {
                        println!("Deleted: {}", deleted_at);
                    }
                    if let Some(snippet) = &job.job_description_snippet {
                        println!("\n{}", textwrap::fill(snippet, 80));
                    }
                }
                None => {
                    println!("Job #{} not found.", id);
                }
            }
        }

        Commands::Delete { id } => {
            db.ensure_initialized()?;
            postings::soft_delete(&db, id)?;
            println!("Deleted job #{}.", id);
        }
    }

    Ok(())
}

fn init_logging(filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Acme", 10), "Acme");
        assert_eq!(truncate("Acme Corp · Remote", 10), "Acme Co...");
        assert_eq!(truncate("Zürich Zürich Zürich", 8), "Züric...");
    }

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from([
            "jobdigest", "scan", "--user", "ada@example.com", "--dir", "/tmp/mail", "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Scan { user, dir, limit, dry_run } => {
                assert_eq!(user, "ada@example.com");
                assert_eq!(dir, Some(PathBuf::from("/tmp/mail")));
                assert_eq!(limit, None);
                assert!(dry_run);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_scan_limit_must_be_positive() {
        let args = |limit: &str| {
            Cli::try_parse_from(["jobdigest", "scan", "--user", "ada@example.com", "--limit", limit])
        };
        assert!(args("0").is_err());
        assert!(args("-1").is_err());
        match args("5").unwrap().command {
            Commands::Scan { limit, .. } => assert_eq!(limit, Some(5)),
            _ => panic!("expected scan"),
        }
    }
}
