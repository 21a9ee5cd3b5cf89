//! Habit degradation risk.
//!
//! Every category with enough recent activity is scored from four metrics:
//!
//! | Metric | Contribution |
//! |--------|--------------|
//! | frequency trend | < -30% → 40, < -15% → 25, < 0 → 10 |
//! | duration trend | < -40% → 30, < -20% → 20, < 0 → 10 |
//! | consistency (last 14 days) | < 30% → 20, < 50% → 15, < 70% → 10 |
//! | days since last activity | > 7 → 10, > 3 → 5 |
//!
//! The sum is capped at 100 and bucketed into a [`RiskLevel`]. Low-risk
//! categories are not reported.
//!
//! Trends compare the mean of the two most recent 7-day weeks against the
//! two weeks before. A zero baseline with any recent activity reports +100%;
//! this is an approximation rather than a true percentage.

use crate::error::Result;
use crate::store::ActivityRepository;
use crate::types::{ActivityRecord, RiskLevel};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const RISK_WINDOW_DAYS: i64 = 30;

/// Categories with fewer activities in the window are skipped.
pub const MIN_ACTIVITIES: usize = 5;

pub const TREND_WEEKS: usize = 4;

pub const CONSISTENCY_DAYS: i64 = 14;

const WEEK_SECONDS: i64 = 7 * 24 * 3600;

/// Activity in one trailing 7-day week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekStats {
    pub count: usize,
    pub hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMetrics {
    pub frequency_trend: f64,
    pub duration_trend: f64,
    pub consistency_score: f64,
    pub days_since_last_activity: i64,
}

/// Percentage change from `baseline` to `recent`.
pub fn trend_percent(baseline: f64, recent: f64) -> f64 {
    if baseline == 0.0 {
        if recent == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (recent - baseline) / baseline * 100.0
    }
}

pub fn risk_score(metrics: &RiskMetrics) -> u32 {
    let frequency = match metrics.frequency_trend {
        t if t < -30.0 => 40,
        t if t < -15.0 => 25,
        t if t < 0.0 => 10,
        _ => 0,
    };
    let duration = match metrics.duration_trend {
        t if t < -40.0 => 30,
        t if t < -20.0 => 20,
        t if t < 0.0 => 10,
        _ => 0,
    };
    let consistency = match metrics.consistency_score {
        c if c < 30.0 => 20,
        c if c < 50.0 => 15,
        c if c < 70.0 => 10,
        _ => 0,
    };
    let recency = match metrics.days_since_last_activity {
        d if d > 7 => 10,
        d if d > 3 => 5,
        _ => 0,
    };
    (frequency + duration + consistency + recency).min(100)
}

fn recommendations(level: RiskLevel) -> Vec<String> {
    let templates: &[&str] = match level {
        RiskLevel::Critical => &[
            "Schedule one short session today, even 10 minutes counts",
            "Shrink the habit to the smallest version you can keep",
            "Tell someone about your goal so they can check in",
        ],
        RiskLevel::High => &[
            "Put your next two sessions on the calendar",
            "Attach the habit to something you already do every day",
            "Look at what changed in your routine over the last two weeks",
        ],
        RiskLevel::Medium => &[
            "Keep an eye on this habit over the coming week",
            "Set a reminder for your usual time",
        ],
        RiskLevel::Low => &[],
    };
    templates.iter().map(|s| s.to_string()).collect()
}

fn describe(category: &str, level: RiskLevel, metrics: &RiskMetrics) -> String {
    format!(
        "Your {} habit is at {} risk: frequency {:+.0}%, duration {:+.0}%, active {:.0}% of the last {} days, last logged {} day(s) ago.",
        category,
        level.as_str(),
        metrics.frequency_trend,
        metrics.duration_trend,
        metrics.consistency_score,
        CONSISTENCY_DAYS,
        metrics.days_since_last_activity
    )
}

/// Risk assessment for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub category: String,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub frequency_trend: f64,
    pub duration_trend: f64,
    pub consistency_score: f64,
    pub days_since_last_activity: i64,
    pub total_activities: usize,
    /// Oldest week first
    pub weekly: Vec<WeekStats>,
    pub message: String,
    pub recommendations: Vec<String>,
}

/// Latest persisted predictions for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSnapshot {
    pub predictions: Vec<Prediction>,
    pub analyzed_at: DateTime<Utc>,
}

fn mean_of(weeks: &[WeekStats], value: impl Fn(&WeekStats) -> f64) -> f64 {
    weeks.iter().map(value).sum::<f64>() / weeks.len() as f64
}

/// Percentage of the last [`CONSISTENCY_DAYS`] calendar days, today included,
/// with at least one activity.
pub fn consistency_score(activities: &[&ActivityRecord], now: DateTime<Utc>) -> f64 {
    let today = now.date_naive();
    let active_days: BTreeSet<_> = activities
        .iter()
        .map(|a| a.started_at.date_naive())
        .filter(|day| (0..CONSISTENCY_DAYS).contains(&(today - *day).num_days()))
        .collect();
    active_days.len() as f64 / CONSISTENCY_DAYS as f64 * 100.0
}

/// Score one category's activities; `None` below [`MIN_ACTIVITIES`] or at low risk.
pub fn assess_category(
    category: &str,
    activities: &[&ActivityRecord],
    now: DateTime<Utc>,
) -> Option<Prediction> {
    if activities.len() < MIN_ACTIVITIES {
        return None;
    }

    let mut weekly = vec![WeekStats::default(); TREND_WEEKS];
    let mut last = None;

    for activity in activities {
        let elapsed = now - activity.started_at;
        let week = (elapsed.num_seconds() / WEEK_SECONDS) as usize;
        if week < TREND_WEEKS {
            let slot = &mut weekly[TREND_WEEKS - 1 - week];
            slot.count += 1;
            slot.hours += activity.duration_minutes / 60.0;
        }
        last = last.max(Some(activity.started_at));
    }

    let (baseline, recent) = weekly.split_at(TREND_WEEKS / 2);
    let count = |w: &WeekStats| w.count as f64;
    let hours = |w: &WeekStats| w.hours;

    let metrics = RiskMetrics {
        frequency_trend: trend_percent(mean_of(baseline, count), mean_of(recent, count)),
        duration_trend: trend_percent(mean_of(baseline, hours), mean_of(recent, hours)),
        consistency_score: consistency_score(activities, now),
        days_since_last_activity: last.map(|t| (now - t).num_days()).unwrap_or(RISK_WINDOW_DAYS),
    };

    let score = risk_score(&metrics);
    let level = RiskLevel::from_score(score);
    if level == RiskLevel::Low {
        return None;
    }

    Some(Prediction {
        category: category.to_string(),
        risk_score: score,
        risk_level: level,
        frequency_trend: metrics.frequency_trend,
        duration_trend: metrics.duration_trend,
        consistency_score: metrics.consistency_score,
        days_since_last_activity: metrics.days_since_last_activity,
        total_activities: activities.len(),
        weekly,
        message: describe(category, level, &metrics),
        recommendations: recommendations(level),
    })
}

/// Predictions for every at-risk category, highest score first.
pub fn predict_habit_degradation(
    activities: &[ActivityRecord],
    now: DateTime<Utc>,
) -> Vec<Prediction> {
    let mut by_category: BTreeMap<&str, Vec<&ActivityRecord>> = BTreeMap::new();
    for activity in activities.iter().filter(|a| a.started_at <= now) {
        by_category
            .entry(activity.category.as_str())
            .or_default()
            .push(activity);
    }

    let mut predictions: Vec<Prediction> = by_category
        .into_iter()
        .filter_map(|(category, records)| assess_category(category, &records, now))
        .collect();
    predictions.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
    predictions
}

pub struct RiskScorer {
    activities: Arc<dyn ActivityRepository>,
}

impl RiskScorer {
    pub fn new(activities: Arc<dyn ActivityRepository>) -> Self {
        Self { activities }
    }

    pub fn predict(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Prediction>> {
        let start = now - Duration::days(RISK_WINDOW_DAYS);
        let activities = self.activities.activities_in_range(user_id, start, now)?;
        let predictions = predict_habit_degradation(&activities, now);

        tracing::debug!(
            user_id,
            activities = activities.len(),
            at_risk = predictions.len(),
            "Scored habit degradation risk"
        );
        Ok(predictions)
    }
}
