//! Interval scheduling for background jobs
//!
//! [`Schedule`] only decides which jobs are due; the caller owns the loop
//! and the clock. Every job is due on the first check.

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::service::{BatchReport, BehaviorService, CleanupReport, RefreshReport};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A recurring background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    PatternRefresh,
    Cleanup,
    PredictionBatch,
    CriticalCheck,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::PatternRefresh,
        Job::Cleanup,
        Job::PredictionBatch,
        Job::CriticalCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Job::PatternRefresh => "pattern_refresh",
            Job::Cleanup => "cleanup",
            Job::PredictionBatch => "prediction_batch",
            Job::CriticalCheck => "critical_check",
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    job: Job,
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
}

/// Tracks when each job last ran.
#[derive(Debug, Clone)]
pub struct Schedule {
    slots: Vec<Slot>,
}

impl Schedule {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let interval = |job: Job| match job {
            Job::PatternRefresh => Duration::minutes(config.pattern_refresh_minutes as i64),
            Job::Cleanup => Duration::minutes(config.cleanup_minutes as i64),
            Job::PredictionBatch => Duration::hours(config.prediction_batch_hours as i64),
            Job::CriticalCheck => Duration::hours(config.critical_check_hours as i64),
        };
        Self {
            slots: Job::ALL
                .iter()
                .map(|&job| Slot {
                    job,
                    interval: interval(job),
                    last_run: None,
                })
                .collect(),
        }
    }

    pub fn interval(&self, job: Job) -> Option<Duration> {
        self.slots.iter().find(|s| s.job == job).map(|s| s.interval)
    }

    /// Jobs whose interval has elapsed since their last run.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<Job> {
        self.slots
            .iter()
            .filter(|s| match s.last_run {
                Some(last) => now - last >= s.interval,
                None => true,
            })
            .map(|s| s.job)
            .collect()
    }

    pub fn mark_ran(&mut self, job: Job, now: DateTime<Utc>) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.job == job) {
            slot.last_run = Some(now);
        }
    }
}

/// What a job run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobReport {
    PatternRefresh(RefreshReport),
    Cleanup(CleanupReport),
    PredictionBatch(BatchReport),
    CriticalCheck(BatchReport),
}

impl JobReport {
    /// One-line summary for console output.
    pub fn summary(&self) -> String {
        match self {
            JobReport::PatternRefresh(r) => format!(
                "refreshed {} users, {} suggestions, {} failures",
                r.users, r.suggestions, r.failures
            ),
            JobReport::Cleanup(r) => format!(
                "expired {} suggestions, deleted {} alerts, {} failures",
                r.expired_suggestions, r.deleted_notifications, r.failures
            ),
            JobReport::PredictionBatch(r) | JobReport::CriticalCheck(r) => format!(
                "{} users, {} alerts, {} failures",
                r.users.len(),
                r.alerts(),
                r.failed()
            ),
        }
    }
}

pub fn run_job(service: &BehaviorService, job: Job, now: DateTime<Utc>) -> Result<JobReport> {
    tracing::info!(job = job.as_str(), "Running scheduled job");
    Ok(match job {
        Job::PatternRefresh => JobReport::PatternRefresh(service.refresh_all_patterns_at(now)?),
        Job::Cleanup => JobReport::Cleanup(service.cleanup_at(now)?),
        Job::PredictionBatch => JobReport::PredictionBatch(service.run_prediction_batch_at(now)?),
        Job::CriticalCheck => JobReport::CriticalCheck(service.run_critical_check_at(now)?),
    })
}
