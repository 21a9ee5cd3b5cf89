//! Pairwise correlation between activity categories.
//!
//! Each category becomes a series of daily total minutes over the days the
//! user logged anything in the trailing [`CORRELATION_WINDOW_DAYS`]. Every
//! unordered pair of series is compared with the Pearson coefficient; pairs
//! below [`CORRELATION_THRESHOLD`] are discarded.

use super::predictive::{self, PredictiveInsight};
use crate::error::Result;
use crate::store::{ActivityRepository, CorrelationStore};
use crate::types::{ActivityRecord, CacheWrite};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const CORRELATION_WINDOW_DAYS: i64 = 60;

/// Minimum number of active days before any pair is analyzed.
pub const MIN_DATA_POINTS: usize = 10;

/// Pairs with a weaker absolute coefficient are discarded.
pub const CORRELATION_THRESHOLD: f64 = 0.3;

/// Absolute coefficient for the strong insight groups.
pub const STRONG_CORRELATION: f64 = 0.5;

const INSIGHT_GROUP_LIMIT: usize = 3;

const HEALTH_KEYWORDS: &[&str] = &[
    "exercise", "workout", "gym", "run", "walk", "yoga", "sleep", "meditat", "cycl", "swim",
    "stretch", "fitness", "health",
];

const PRODUCTIVITY_KEYWORDS: &[&str] = &[
    "work", "coding", "study", "read", "writ", "learn", "project", "meeting", "focus", "email",
    "plan",
];

/// Bucket of the absolute coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strength {
    #[serde(rename = "Very Weak")]
    VeryWeak,
    #[serde(rename = "Weak")]
    Weak,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Strong")]
    Strong,
    #[serde(rename = "Very Strong")]
    VeryStrong,
}

impl Strength {
    pub fn from_coefficient(r: f64) -> Self {
        match r.abs() {
            a if a >= 0.8 => Strength::VeryStrong,
            a if a >= 0.6 => Strength::Strong,
            a if a >= 0.4 => Strength::Moderate,
            a if a >= 0.2 => Strength::Weak,
            _ => Strength::VeryWeak,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::VeryWeak => "Very Weak",
            Strength::Weak => "Weak",
            Strength::Moderate => "Moderate",
            Strength::Strong => "Strong",
            Strength::VeryStrong => "Very Strong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

/// Approximate two-tailed significance from a t statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Significance {
    #[serde(rename = "p<0.01")]
    P01,
    #[serde(rename = "p<0.05")]
    P05,
    #[serde(rename = "p<0.10")]
    P10,
    #[serde(rename = "not significant")]
    NotSignificant,
}

impl Significance {
    /// `t = |r| * sqrt((n - 2) / (1 - r^2))`; a perfect fit counts as infinite t.
    pub fn test(r: f64, n: usize) -> Self {
        let r_squared = r * r;
        let t = if r_squared >= 1.0 {
            f64::INFINITY
        } else {
            r.abs() * ((n.saturating_sub(2)) as f64 / (1.0 - r_squared)).sqrt()
        };

        if t > 2.576 {
            Significance::P01
        } else if t > 1.96 {
            Significance::P05
        } else if t > 1.645 {
            Significance::P10
        } else {
            Significance::NotSignificant
        }
    }
}

/// One analyzed category pair. `category_a < category_b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub category_a: String,
    pub category_b: String,
    pub coefficient: f64,
    pub strength: Strength,
    pub direction: Direction,
    pub significance: Significance,
    /// Number of days in the aligned series
    pub data_points: usize,
    /// Mean daily minutes of `category_a` over the aligned days
    pub average_a: f64,
    pub average_b: f64,
    pub relationship: String,
}

/// Correlations grouped for display, each group the top 3 by |r|.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationInsights {
    pub strong_positive: Vec<Correlation>,
    pub strong_negative: Vec<Correlation>,
    pub health_related: Vec<Correlation>,
    pub productivity_related: Vec<Correlation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationAnalysis {
    pub correlations: Vec<Correlation>,
    pub insights: CorrelationInsights,
    pub predictions: Vec<PredictiveInsight>,
    pub analysis_date: DateTime<Utc>,
    /// Days with any activity in the window
    pub data_points: usize,
}

/// Minutes per category for each day with any activity.
#[derive(Debug, Default)]
pub struct DailyTotals {
    days: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
    categories: BTreeSet<String>,
}

impl DailyTotals {
    pub fn from_activities(activities: &[ActivityRecord]) -> Self {
        let mut totals = DailyTotals::default();
        for activity in activities {
            *totals
                .days
                .entry(activity.started_at.date_naive())
                .or_default()
                .entry(activity.category.clone())
                .or_insert(0.0) += activity.duration_minutes;
            totals.categories.insert(activity.category.clone());
        }
        totals
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    /// Daily minutes for `category`, zero on days it was not logged.
    pub fn series(&self, category: &str) -> Vec<f64> {
        self.days
            .values()
            .map(|day| day.get(category).copied().unwrap_or(0.0))
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Pearson correlation coefficient; `None` when either series is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(xs), mean(ys));

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

fn describe(a: &str, b: &str, strength: Strength, direction: Direction) -> String {
    match direction {
        Direction::Positive => format!(
            "{} positive relationship: days with more {} tend to have more {}",
            strength.as_str(),
            a,
            b
        ),
        Direction::Negative => format!(
            "{} negative relationship: days with more {} tend to have less {}",
            strength.as_str(),
            a,
            b
        ),
    }
}

/// Correlate two categories of `totals`; argument order does not matter.
///
/// Returns `None` below [`MIN_DATA_POINTS`] days or when a series is constant.
/// The threshold filter is applied by [`detect_cross_correlations`].
pub fn correlate(totals: &DailyTotals, first: &str, second: &str) -> Option<Correlation> {
    let n = totals.day_count();
    if n < MIN_DATA_POINTS || first == second {
        return None;
    }
    let (a, b) = if first < second {
        (first, second)
    } else {
        (second, first)
    };

    let series_a = totals.series(a);
    let series_b = totals.series(b);
    let r = pearson(&series_a, &series_b)?;

    let strength = Strength::from_coefficient(r);
    let direction = if r >= 0.0 {
        Direction::Positive
    } else {
        Direction::Negative
    };

    Some(Correlation {
        category_a: a.to_string(),
        category_b: b.to_string(),
        coefficient: r,
        strength,
        direction,
        significance: Significance::test(r, n),
        data_points: n,
        average_a: mean(&series_a),
        average_b: mean(&series_b),
        relationship: describe(a, b, strength, direction),
    })
}

/// All pairs with |r| >= [`CORRELATION_THRESHOLD`], strongest first.
pub fn detect_cross_correlations(activities: &[ActivityRecord]) -> Vec<Correlation> {
    let totals = DailyTotals::from_activities(activities);
    if totals.day_count() < MIN_DATA_POINTS {
        return Vec::new();
    }

    let categories: Vec<&str> = totals.categories().collect();
    let mut correlations = Vec::new();
    for (i, a) in categories.iter().enumerate() {
        for b in &categories[i + 1..] {
            if let Some(c) = correlate(&totals, a, b) {
                if c.coefficient.abs() >= CORRELATION_THRESHOLD {
                    correlations.push(c);
                }
            }
        }
    }

    correlations.sort_by(|x, y| y.coefficient.abs().total_cmp(&x.coefficient.abs()));
    correlations
}

/// True when a word of either category starts with one of `keywords`.
///
/// Words split on anything that is not alphanumeric, so "morning run" and
/// "running" match `run` but "brunch" does not.
fn matches_keywords(correlation: &Correlation, keywords: &[&str]) -> bool {
    [&correlation.category_a, &correlation.category_b]
        .iter()
        .any(|c| {
            let c = c.to_lowercase();
            c.split(|ch: char| !ch.is_alphanumeric())
                .any(|word| keywords.iter().any(|k| word.starts_with(k)))
        })
}

fn top(correlations: &[Correlation], keep: impl Fn(&Correlation) -> bool) -> Vec<Correlation> {
    correlations
        .iter()
        .filter(|c| keep(c))
        .take(INSIGHT_GROUP_LIMIT)
        .cloned()
        .collect()
}

/// Group correlations; input must already be sorted by |r| descending.
pub fn generate_insights(correlations: &[Correlation]) -> CorrelationInsights {
    CorrelationInsights {
        strong_positive: top(correlations, |c| {
            c.coefficient.abs() >= STRONG_CORRELATION && c.direction == Direction::Positive
        }),
        strong_negative: top(correlations, |c| {
            c.coefficient.abs() >= STRONG_CORRELATION && c.direction == Direction::Negative
        }),
        health_related: top(correlations, |c| matches_keywords(c, HEALTH_KEYWORDS)),
        productivity_related: top(correlations, |c| matches_keywords(c, PRODUCTIVITY_KEYWORDS)),
    }
}

pub struct CorrelationAnalyzer {
    activities: Arc<dyn ActivityRepository>,
    store: Arc<dyn CorrelationStore>,
}

impl CorrelationAnalyzer {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        store: Arc<dyn CorrelationStore>,
    ) -> Self {
        Self { activities, store }
    }

    /// Analyze already-fetched activities from the correlation window.
    pub fn analyze_from(
        &self,
        user_id: &str,
        activities: &[ActivityRecord],
        now: DateTime<Utc>,
    ) -> (CorrelationAnalysis, CacheWrite) {
        let correlations = detect_cross_correlations(activities);
        let insights = generate_insights(&correlations);
        let predictions = predictive::generate_predictions(&correlations, activities, now);

        let analysis = CorrelationAnalysis {
            data_points: DailyTotals::from_activities(activities).day_count(),
            correlations,
            insights,
            predictions,
            analysis_date: now,
        };

        tracing::info!(
            user_id,
            days = analysis.data_points,
            correlations = analysis.correlations.len(),
            predictions = analysis.predictions.len(),
            "Correlation analysis complete"
        );

        let cache = CacheWrite::from_result(
            "correlations",
            user_id,
            self.store.upsert_correlations(user_id, &analysis),
        );
        (analysis, cache)
    }

    pub fn analyze(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(CorrelationAnalysis, CacheWrite)> {
        let start = now - Duration::days(CORRELATION_WINDOW_DAYS);
        let activities = self.activities.activities_in_range(user_id, start, now)?;
        Ok(self.analyze_from(user_id, &activities, now))
    }
}
