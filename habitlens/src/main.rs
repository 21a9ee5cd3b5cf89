//! habitlens - personal activity habit analytics
//!
//! Logs activities and runs pattern, suggestion, correlation and risk
//! analysis over them.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/habitlens/data.db (~/.local/share/habitlens/data.db)
//! - Logs: $XDG_STATE_HOME/habitlens/habitlens.log (~/.local/state/habitlens/habitlens.log)
//! - Config: $XDG_CONFIG_HOME/habitlens/config.toml (~/.config/habitlens/config.toml)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use habitlens_core::analytics::{CorrelationAnalysis, Prediction};
use habitlens_core::service::{BatchOutcome, BatchReport};
use habitlens_core::store::UserDirectory;
use habitlens_core::{
    ActivityRecord, ActivitySource, BehaviorService, Config, Database, Notification,
    NotificationFilter, NotificationType, Stores, Suggestion, UserProfile,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "habitlens")]
#[command(about = "Personal activity habit analytics")]
#[command(version)]
struct Args {
    /// User to operate on
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Output format: text (default) or json
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Log one activity
    Log {
        category: String,
        /// Duration in minutes
        minutes: f64,
        /// Start time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Import activities from a JSON array of {category, startedAt, durationMinutes}
    Import { path: PathBuf },
    /// Detect patterns and deviations, refreshing suggestions
    Patterns,
    /// Check today's routine and show suggestions
    Suggest,
    /// Update a suggestion
    Suggestion {
        #[command(subcommand)]
        action: SuggestionCommand,
    },
    /// Correlate categories and predict near-term effects
    Correlations,
    /// Run a habit degradation risk analysis
    Risk,
    /// Show the latest risk analysis and recent alerts
    RiskStatus,
    /// Manage alerts
    Alerts {
        #[command(subcommand)]
        action: AlertCommand,
    },
    /// Run risk analysis for every opted-in user
    Batch {
        /// Only alert on critical risk, without replacing stored predictions
        #[arg(long)]
        critical: bool,
    },
    /// Purge stale suggestions and old read alerts
    Cleanup,
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create or update a user
    Add {
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Exclude the user from scheduled predictions
        #[arg(long)]
        no_predictions: bool,
    },
    /// List users
    List,
}

#[derive(Subcommand)]
enum SuggestionCommand {
    /// List active suggestions without regenerating
    List,
    /// Mark a suggestion read
    Read { id: String },
    /// Act on a suggestion
    Act { id: String },
}

#[derive(Subcommand)]
enum AlertCommand {
    /// List alerts, newest first
    List {
        #[arg(long)]
        unread: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Alert counts
    Stats,
    /// Mark an alert read (or every alert with --all)
    Read {
        id: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Delete an alert
    Delete { id: String },
    /// Generate interventions for a habit degradation alert
    Intervene { id: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportEntry {
    category: String,
    started_at: DateTime<Utc>,
    duration_minutes: f64,
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

    // Open database at XDG-compliant path
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    let service = BehaviorService::new(Stores::from_database(db.clone()), &config);
    let json = args.format == "json";

    match &args.command {
        Command::User { action } => run_user(&db, action, json),
        Command::Log { category, minutes, at } => {
            let user_id = require_user(&args, &db)?;
            let started_at = match at {
                Some(at) => DateTime::parse_from_rfc3339(at)
                    .with_context(|| format!("invalid --at timestamp '{}'", at))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            let activity = ActivityRecord::new(user_id, category.as_str(), started_at, *minutes);
            db.insert_activity(&activity)
                .context("failed to log activity")?;
            if json {
                print_json(&activity)
            } else {
                println!(
                    "Logged {} ({:.0} min) at {}",
                    activity.category,
                    activity.duration_minutes,
                    activity.started_at.format("%Y-%m-%d %H:%M")
                );
                Ok(())
            }
        }
        Command::Import { path } => {
            let user_id = require_user(&args, &db)?;
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let entries: Vec<ImportEntry> =
                serde_json::from_str(&content).context("failed to parse import file")?;
            let activities: Vec<ActivityRecord> = entries
                .into_iter()
                .map(|e| {
                    ActivityRecord::new(user_id, e.category, e.started_at, e.duration_minutes)
                        .with_source(ActivitySource::Import)
                })
                .collect();
            let inserted = db
                .insert_activities(&activities)
                .context("failed to import activities")?;
            tracing::info!(user_id, inserted, "Imported activities");
            println!("Imported {} of {} activities", inserted, activities.len());
            Ok(())
        }
        Command::Patterns => {
            let user_id = require_user(&args, &db)?;
            let analysis = service.analyze_patterns(user_id)?;
            if json {
                return print_json(&analysis);
            }
            let p = &analysis.patterns;
            println!("Daily patterns:");
            for d in &p.daily {
                println!(
                    "  {:<16} {:02}:00  {} times, {:.0} min avg, confidence {:.2}",
                    d.category, d.hour, d.occurrence_count, d.average_duration, d.confidence
                );
            }
            println!("Weekly patterns:");
            for w in &p.weekly {
                println!(
                    "  {:<16} {:<10} {} times",
                    w.category,
                    w.day_of_week.to_string(),
                    w.occurrence_count
                );
            }
            println!("Sequences:");
            for s in &p.sequences {
                println!(
                    "  {} -> {}  {} times, {:.1}h apart",
                    s.from_category, s.to_category, s.occurrence_count, s.average_gap_hours
                );
            }
            println!("Deviations today: {}", analysis.deviations.len());
            print_suggestions(&analysis.suggestions);
            Ok(())
        }
        Command::Suggest => {
            let user_id = require_user(&args, &db)?;
            let check = service.check_patterns_and_suggest(user_id)?;
            if json {
                return print_json(&check);
            }
            println!("Pattern strength: {:.2}", check.pattern_strength);
            for d in &check.deviations {
                println!("  Deviation: {}", serde_json::to_string(d)?);
            }
            print_suggestions(&check.suggestions);
            Ok(())
        }
        Command::Suggestion { action } => {
            let user_id = require_user(&args, &db)?;
            match action {
                SuggestionCommand::List => {
                    let active = service.suggestions().active(user_id, Utc::now())?;
                    if json {
                        return print_json(&active);
                    }
                    print_suggestions(&active);
                }
                SuggestionCommand::Read { id } => {
                    let suggestion = service.suggestions().mark_read(user_id, id)?;
                    println!("Marked read: {}", suggestion.title);
                }
                SuggestionCommand::Act { id } => {
                    let acted = service.suggestions().act_on(user_id, id, Utc::now())?;
                    if json {
                        return print_json(&acted);
                    }
                    match acted.activity {
                        Some(a) => println!(
                            "Logged {} ({:.0} min) for '{}'",
                            a.category, a.duration_minutes, acted.suggestion.title
                        ),
                        None => println!("Acknowledged '{}'", acted.suggestion.title),
                    }
                }
            }
            Ok(())
        }
        Command::Correlations => {
            let user_id = require_user(&args, &db)?;
            let analysis = service.analyze_cross_correlations(user_id)?;
            if json {
                print_json(&analysis)
            } else {
                print_correlations(&analysis);
                Ok(())
            }
        }
        Command::Risk => {
            let user_id = require_user(&args, &db)?;
            let run = service.run_risk_analysis(user_id, Utc::now())?;
            if json {
                return print_json(&serde_json::json!({
                    "predictions": run.predictions,
                    "alert": run.alert,
                }));
            }
            print_predictions(&run.predictions);
            if let Some(alert) = &run.alert {
                println!("\nAlert created: {} ({})", alert.title, alert.id);
            }
            Ok(())
        }
        Command::RiskStatus => {
            let user_id = require_user(&args, &db)?;
            let status = service.get_current_risk_analysis(user_id)?;
            if json {
                return print_json(&status);
            }
            let summary = &status.risk_summary;
            println!(
                "Last analyzed: {}",
                status.last_analyzed.format("%Y-%m-%d %H:%M")
            );
            println!(
                "At risk: {} (critical {}, high {}, medium {})",
                summary.total_at_risk, summary.critical, summary.high, summary.medium
            );
            print_predictions(&status.predictions);
            print_alerts(&status.recent_alerts);
            Ok(())
        }
        Command::Alerts { action } => {
            let user_id = require_user(&args, &db)?;
            run_alerts(&service, user_id, action, json)
        }
        Command::Batch { critical } => {
            let report = if *critical {
                service.run_critical_check_at(Utc::now())?
            } else {
                run_batch_with_progress(&service)?
            };
            if json {
                print_json(&report)
            } else {
                print_batch(&report);
                Ok(())
            }
        }
        Command::Cleanup => {
            let report = service.cleanup_at(Utc::now())?;
            if json {
                return print_json(&report);
            }
            println!(
                "Expired {} suggestions, deleted {} alerts",
                report.expired_suggestions, report.deleted_notifications
            );
            if report.failures > 0 {
                println!("Failed for {} users (see log)", report.failures);
            }
            Ok(())
        }
    }
}

/// Resolve `--user` to an existing user id.
fn require_user<'a>(args: &'a Args, db: &Database) -> Result<&'a str> {
    let user_id = args
        .user
        .as_deref()
        .context("this command needs --user <ID>")?;
    db.require_user(user_id)?;
    Ok(user_id)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_user(db: &Database, action: &UserCommand, json: bool) -> Result<()> {
    match action {
        UserCommand::Add {
            id,
            name,
            no_predictions,
        } => {
            let mut user = db
                .get_user(id)?
                .unwrap_or_else(|| UserProfile::new(id.as_str()));
            if name.is_some() {
                user.display_name = name.clone();
            }
            user.predictions_enabled = !no_predictions;
            db.upsert_user(&user).context("failed to save user")?;
            println!("Saved user {}", user.id);
        }
        UserCommand::List => {
            let users = db.list_users()?;
            if json {
                return print_json(&users);
            }
            for user in users {
                println!(
                    "{:<20} {:<20} predictions {}",
                    user.id,
                    user.display_name.as_deref().unwrap_or("-"),
                    if user.predictions_enabled { "on" } else { "off" }
                );
            }
        }
    }
    Ok(())
}

fn run_alerts(
    service: &BehaviorService,
    user_id: &str,
    action: &AlertCommand,
    json: bool,
) -> Result<()> {
    let alerts = service.alerts();
    match action {
        AlertCommand::List { unread, limit } => {
            let list = alerts.list(
                user_id,
                &NotificationFilter {
                    unread_only: *unread,
                    limit: *limit,
                    ..Default::default()
                },
            )?;
            if json {
                return print_json(&list);
            }
            print_alerts(&list);
        }
        AlertCommand::Stats => {
            let stats = alerts.statistics(user_id, Utc::now())?;
            if json {
                return print_json(&stats);
            }
            println!("Total:        {}", stats.total);
            println!("Unread:       {}", stats.unread);
            println!("Habit alerts: {}", stats.habit_alerts);
            println!("Last 7 days:  {}", stats.last_7_days);
        }
        AlertCommand::Read { id, all } => match (id, all) {
            (_, true) => {
                let updated = alerts.mark_all_read(user_id)?;
                println!("Marked {} alerts read", updated);
            }
            (Some(id), false) => {
                let alert = alerts.mark_read(user_id, id)?;
                println!("Marked read: {}", alert.title);
            }
            (None, false) => anyhow::bail!("give an alert id or --all"),
        },
        AlertCommand::Delete { id } => {
            alerts.delete(user_id, id)?;
            println!("Deleted alert {}", id);
        }
        AlertCommand::Intervene { id } => {
            let plan = alerts.generate_interventions(user_id, id, Utc::now())?;
            if json {
                return print_json(&plan);
            }
            println!("{}", plan.notification.title);
            for intervention in &plan.interventions {
                println!("  - {}: {}", intervention.title, intervention.description);
            }
        }
    }
    Ok(())
}

/// Run the prediction batch with a progress bar
fn run_batch_with_progress(service: &BehaviorService) -> Result<BatchReport> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let report = service
        .run_prediction_batch_with(Utc::now(), |done, total, result| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
            pb.set_message(result.user_id.clone());
        })
        .context("prediction batch failed")?;

    pb.finish_and_clear();
    Ok(report)
}

fn print_suggestions(suggestions: &[Suggestion]) {
    if suggestions.is_empty() {
        println!("No suggestions right now.");
        return;
    }
    println!("Suggestions:");
    for s in suggestions {
        println!(
            "  [{}] {}: {}  ({})",
            s.priority.as_str(),
            s.title,
            s.message,
            s.id
        );
    }
}

fn print_correlations(analysis: &CorrelationAnalysis) {
    println!("Days analyzed: {}", analysis.data_points);
    if analysis.correlations.is_empty() {
        println!("No correlations found.");
    }
    for c in &analysis.correlations {
        println!(
            "  {} / {}: r = {:+.2} ({}, {})",
            c.category_a,
            c.category_b,
            c.coefficient,
            c.strength.as_str(),
            serde_json::to_value(c.significance)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        );
    }
    for p in &analysis.predictions {
        println!("  Prediction: {} {}", p.message, p.recommendation);
    }
}

fn print_predictions(predictions: &[Prediction]) {
    if predictions.is_empty() {
        println!("No habits at risk.");
        return;
    }
    for p in predictions {
        println!(
            "  {:<16} {:>3} {:<8} frequency {:+.0}%, duration {:+.0}%, consistency {:.0}%, {} days since last",
            p.category,
            p.risk_score,
            p.risk_level.as_str(),
            p.frequency_trend,
            p.duration_trend,
            p.consistency_score,
            p.days_since_last_activity
        );
        for r in &p.recommendations {
            println!("      - {}", r);
        }
    }
}

fn print_alerts(alerts: &[Notification]) {
    if alerts.is_empty() {
        println!("No alerts.");
        return;
    }
    for a in alerts {
        let kind = match a.notification_type {
            NotificationType::HabitDegradationAlert => "alert",
            NotificationType::InterventionSuggestions => "ideas",
        };
        println!(
            "{} [{}] {} {}  ({})",
            if a.read { " " } else { "*" },
            kind,
            a.created_at.format("%Y-%m-%d %H:%M"),
            a.title,
            a.id
        );
    }
}

fn print_batch(report: &BatchReport) {
    println!("\nBatch complete:");
    println!("  Users:     {}", report.users.len());
    println!("  Succeeded: {}", report.succeeded());
    println!("  Alerts:    {}", report.alerts());
    if report.failed() > 0 {
        println!("\nErrors ({}):", report.failed());
        for user in &report.users {
            if let BatchOutcome::Failed { error } = &user.outcome {
                println!("  {}: {}", user.user_id, error);
            }
        }
    }
}
