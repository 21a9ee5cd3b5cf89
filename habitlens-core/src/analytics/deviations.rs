//! Deviations of today's activity from learned daily patterns.
//!
//! Stateless: recomputed on every call from today's activities and the
//! current [`DailyPattern`] set.

use super::patterns::DailyPattern;
use crate::types::ActivityRecord;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Patterns at or below this confidence are never reported as missed.
pub const MISSED_PATTERN_MIN_CONFIDENCE: f64 = 0.3;

/// Hours either side of a pattern hour that still count as on time.
pub const TIMING_TOLERANCE_HOURS: u32 = 2;

/// A departure from the user's usual routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Deviation {
    /// A confident daily habit whose hour has passed with no matching activity
    #[serde(rename_all = "camelCase")]
    MissedPattern {
        category: String,
        expected_hour: u32,
        confidence: f64,
    },
    /// An activity logged far from every usual hour of its category
    #[serde(rename_all = "camelCase")]
    UnusualTiming {
        category: String,
        actual_hour: u32,
        expected_hours: Vec<u32>,
    },
}

impl Deviation {
    pub fn category(&self) -> &str {
        match self {
            Deviation::MissedPattern { category, .. } => category,
            Deviation::UnusualTiming { category, .. } => category,
        }
    }
}

fn within_tolerance(a: u32, b: u32) -> bool {
    a.abs_diff(b) <= TIMING_TOLERANCE_HOURS
}

/// Compare today's activities against the daily patterns.
///
/// Activities not started on `now`'s calendar day are ignored, so callers may
/// pass a wider window.
pub fn detect_deviations(
    activities: &[ActivityRecord],
    daily: &[DailyPattern],
    now: DateTime<Utc>,
) -> Vec<Deviation> {
    let today = now.date_naive();
    let current_hour = now.hour();
    let todays: Vec<&ActivityRecord> = activities
        .iter()
        .filter(|a| a.started_at.date_naive() == today && a.started_at <= now)
        .collect();

    let mut deviations = Vec::new();

    for pattern in daily {
        if pattern.confidence <= MISSED_PATTERN_MIN_CONFIDENCE || pattern.hour > current_hour {
            continue;
        }
        let done = todays.iter().any(|a| {
            a.category == pattern.category && within_tolerance(a.started_at.hour(), pattern.hour)
        });
        if !done {
            deviations.push(Deviation::MissedPattern {
                category: pattern.category.clone(),
                expected_hour: pattern.hour,
                confidence: pattern.confidence,
            });
        }
    }

    for activity in &todays {
        let expected_hours: Vec<u32> = daily
            .iter()
            .filter(|p| p.category == activity.category)
            .map(|p| p.hour)
            .collect();
        if expected_hours.is_empty() {
            continue;
        }
        let actual_hour = activity.started_at.hour();
        if !expected_hours.iter().any(|h| within_tolerance(*h, actual_hour)) {
            deviations.push(Deviation::UnusualTiming {
                category: activity.category.clone(),
                actual_hour,
                expected_hours,
            });
        }
    }

    deviations
}
