//! habitlens-scheduler - background analysis jobs
//!
//! Runs pattern refresh, cleanup, the nightly prediction batch and the
//! critical-risk check on the intervals from `[scheduler]` in the config.
//! Every job runs once at startup.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use habitlens_core::scheduler::{run_job, Job, Schedule};
use habitlens_core::{BehaviorService, Config, Database, Stores};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "habitlens-scheduler")]
#[command(about = "Run habitlens background analysis jobs")]
#[command(version)]
struct Args {
    /// Run every job once and exit
    #[arg(long)]
    once: bool,

    /// Override the poll interval in seconds
    #[arg(long)]
    poll: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        habitlens_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("habitlens-scheduler starting");

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    println!("Database: {}", db_path.display());
    println!("Log: {}", habitlens_core::logging::log_file_path().display());

    let service = BehaviorService::new(Stores::from_database(Arc::new(db)), &config);
    let mut schedule = Schedule::from_config(&config.scheduler);

    if args.once {
        for job in Job::ALL {
            run_and_report(&service, &mut schedule, job);
        }
        tracing::info!("habitlens-scheduler single run complete");
        return Ok(());
    }

    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let poll_seconds = args.poll.unwrap_or(config.scheduler.poll_seconds).max(1);
    println!(
        "Scheduler active (poll every {}s). Press Ctrl+C to stop.",
        poll_seconds
    );
    println!();

    // Sleep in short steps so Ctrl+C is handled promptly
    let step = Duration::from_millis(250);
    let poll = Duration::from_secs(poll_seconds);

    while running.load(Ordering::SeqCst) {
        for job in schedule.due_jobs(Utc::now()) {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            run_and_report(&service, &mut schedule, job);
        }

        let mut slept = Duration::ZERO;
        while slept < poll && running.load(Ordering::SeqCst) {
            thread::sleep(step);
            slept += step;
        }
    }

    println!("Scheduler stopped.");
    tracing::info!("habitlens-scheduler stopped");

    Ok(())
}

/// Run one job and print a timestamped summary.
///
/// A failed job is logged and retried on its next interval.
fn run_and_report(service: &BehaviorService, schedule: &mut Schedule, job: Job) {
    let now = Utc::now();
    let timestamp = chrono::Local::now().format("%H:%M:%S");

    match run_job(service, job, now) {
        Ok(report) => {
            println!("[{}] {}: {}", timestamp, job.as_str(), report.summary());
        }
        Err(e) => {
            eprintln!("[{}] {} failed: {}", timestamp, job.as_str(), e);
            tracing::error!(job = job.as_str(), error = %e, "Scheduled job failed");
        }
    }
    schedule.mark_ran(job, now);
}
