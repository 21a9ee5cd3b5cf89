//! Near-term extrapolation from strong correlations.
//!
//! When a category's last week runs well above its usual daily average, the
//! linear relationship with its partner gives an expected daily amount for
//! the partner category.
//!
//! Daily figures are per active day, a day with any logged activity. This
//! matches the series the correlations were computed from.

use super::correlation::{Correlation, STRONG_CORRELATION};
use crate::types::ActivityRecord;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

/// Only this many of the strongest correlations are considered.
pub const PREDICTION_CANDIDATES: usize = 5;

/// Recent activity must exceed the historical average by this factor.
pub const SURGE_FACTOR: f64 = 1.2;

pub const MAX_PREDICTIONS: usize = 3;

pub const RECENT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outlook {
    /// The partner category is expected to rise along with the trigger
    Maintain,
    /// The partner category is expected to fall
    BeMindful,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveInsight {
    pub trigger_category: String,
    pub predicted_category: String,
    /// Minutes of the trigger category per active day over the last week
    pub recent_minutes: f64,
    /// Historical minutes of the trigger category per active day
    pub average_minutes: f64,
    /// Expected daily minutes of the predicted category, never negative
    pub predicted_minutes: f64,
    pub coefficient: f64,
    pub confidence: f64,
    pub message: String,
    pub recommendation: String,
    pub outlook: Outlook,
}

/// Minutes of `category` per active day over the week ending at `now`.
///
/// Zero when nothing at all was logged that week.
pub fn recent_daily_minutes(
    activities: &[ActivityRecord],
    category: &str,
    now: DateTime<Utc>,
) -> f64 {
    let start = now - Duration::days(RECENT_WINDOW_DAYS);
    let recent = activities
        .iter()
        .filter(|a| a.started_at >= start && a.started_at <= now);

    let mut active_days = BTreeSet::new();
    let mut total = 0.0;
    for activity in recent {
        active_days.insert(activity.started_at.date_naive());
        if activity.category == category {
            total += activity.duration_minutes;
        }
    }

    if active_days.is_empty() {
        0.0
    } else {
        total / active_days.len() as f64
    }
}

fn insight(correlation: &Correlation, recent: f64) -> PredictiveInsight {
    let r = correlation.coefficient;
    let predicted =
        (correlation.average_b + r * (recent - correlation.average_a)).max(0.0);
    let (a, b) = (&correlation.category_a, &correlation.category_b);

    let (outlook, message, recommendation) = if r >= 0.0 {
        (
            Outlook::Maintain,
            format!(
                "You've been doing more {} lately ({:.0} min/day vs {:.0} usual). Expect {} to rise to about {:.0} min/day.",
                a, recent, correlation.average_a, b, predicted
            ),
            format!("Maintain your {} routine; it tends to lift {}.", a, b),
        )
    } else {
        (
            Outlook::BeMindful,
            format!(
                "You've been doing more {} lately ({:.0} min/day vs {:.0} usual). {} may drop to about {:.0} min/day.",
                a, recent, correlation.average_a, b, predicted
            ),
            format!("Be mindful that extra {} tends to crowd out {}.", a, b),
        )
    };

    PredictiveInsight {
        trigger_category: a.clone(),
        predicted_category: b.clone(),
        recent_minutes: recent,
        average_minutes: correlation.average_a,
        predicted_minutes: predicted,
        coefficient: r,
        confidence: r.abs(),
        message,
        recommendation,
        outlook,
    }
}

/// Predictions for the strongest correlations whose trigger category surged.
///
/// `correlations` must be sorted by |r| descending. Only the
/// `category_a -> category_b` direction is checked.
pub fn generate_predictions(
    correlations: &[Correlation],
    activities: &[ActivityRecord],
    now: DateTime<Utc>,
) -> Vec<PredictiveInsight> {
    correlations
        .iter()
        .filter(|c| c.coefficient.abs() >= STRONG_CORRELATION)
        .take(PREDICTION_CANDIDATES)
        .filter_map(|c| {
            let recent = recent_daily_minutes(activities, &c.category_a, now);
            (recent > SURGE_FACTOR * c.average_a).then(|| insight(c, recent))
        })
        .take(MAX_PREDICTIONS)
        .collect()
}
