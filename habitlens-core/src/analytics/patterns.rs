//! Habit pattern mining over a trailing activity window.
//!
//! Four collections are produced from the same activity set:
//!
//! | Pattern | Grouping key | Kept when |
//! |---------|--------------|-----------|
//! | [`DailyPattern`] | (category, hour of day) | ≥ [`MIN_OCCURRENCES`] activities |
//! | [`WeeklyPattern`] | (category, weekday) | ≥ [`MIN_OCCURRENCES`] activities |
//! | [`CategoryPattern`] | category | always |
//! | [`SequencePattern`] | (from, to) same-day transition | ≥ [`MIN_OCCURRENCES`] transitions |
//!
//! Everything is recomputed from scratch on each call.

use crate::error::Result;
use crate::store::{ActivityRepository, PatternStore};
use crate::types::{ActivityRecord, CacheWrite};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Length of the trailing window patterns are mined from.
pub const PATTERN_WINDOW_DAYS: i64 = 30;

/// Minimum group size for a daily, weekly or sequence pattern.
pub const MIN_OCCURRENCES: usize = 3;

/// Transitions further apart than this are not considered a sequence.
pub const MAX_SEQUENCE_GAP_HOURS: f64 = 6.0;

const TOP_SLOTS: usize = 3;

/// A recurring (category, hour-of-day) habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPattern {
    pub category: String,
    /// Hour of day (UTC), 0-23
    pub hour: u32,
    pub occurrence_count: usize,
    /// Number of distinct calendar days the pattern was seen on
    pub distinct_days: usize,
    /// Average duration in minutes
    pub average_duration: f64,
    /// `min(occurrence_count / 30, 1.0)`
    pub confidence: f64,
}

/// A recurring (category, weekday) habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPattern {
    pub category: String,
    pub day_of_week: Weekday,
    pub occurrence_count: usize,
    pub average_duration: f64,
}

/// Aggregate behavior within one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPattern {
    pub category: String,
    pub total_activities: usize,
    pub average_duration: f64,
    /// Up to three most frequent hours, most frequent first
    pub top_hours: Vec<u32>,
    /// Up to three most frequent weekdays, most frequent first
    pub top_days: Vec<Weekday>,
    /// Activities per week over the window
    pub weekly_frequency: f64,
}

/// A same-day transition from one category to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencePattern {
    pub from_category: String,
    pub to_category: String,
    pub occurrence_count: usize,
    /// Average start-to-start gap in hours
    pub average_gap_hours: f64,
}

/// All pattern collections detected in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPatterns {
    pub daily: Vec<DailyPattern>,
    pub weekly: Vec<WeeklyPattern>,
    pub categories: Vec<CategoryPattern>,
    pub sequences: Vec<SequencePattern>,
}

impl DetectedPatterns {
    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
            && self.weekly.is_empty()
            && self.categories.is_empty()
            && self.sequences.is_empty()
    }

    /// Mean confidence of the daily patterns, 0.0 when there are none.
    pub fn strength(&self) -> f64 {
        if self.daily.is_empty() {
            return 0.0;
        }
        self.daily.iter().map(|p| p.confidence).sum::<f64>() / self.daily.len() as f64
    }
}

/// Cached copy of the latest detected patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSnapshot {
    pub patterns: DetectedPatterns,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Default)]
struct SlotStats {
    count: usize,
    total_duration: f64,
    days: BTreeSet<NaiveDate>,
}

impl SlotStats {
    fn add(&mut self, activity: &ActivityRecord) {
        self.count += 1;
        self.total_duration += activity.duration_minutes;
        self.days.insert(activity.started_at.date_naive());
    }

    fn average_duration(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_duration / self.count as f64
        }
    }
}

/// Confidence of a daily pattern seen `occurrences` times in the window.
pub fn daily_confidence(occurrences: usize) -> f64 {
    (occurrences as f64 / PATTERN_WINDOW_DAYS as f64).min(1.0)
}

/// Group by (category, hour) and keep recurring slots, most confident first.
pub fn daily_patterns(activities: &[ActivityRecord]) -> Vec<DailyPattern> {
    let mut slots: BTreeMap<(String, u32), SlotStats> = BTreeMap::new();
    for activity in activities {
        slots
            .entry((activity.category.clone(), activity.started_at.hour()))
            .or_default()
            .add(activity);
    }

    let mut patterns: Vec<DailyPattern> = slots
        .into_iter()
        .filter(|(_, stats)| stats.count >= MIN_OCCURRENCES)
        .map(|((category, hour), stats)| DailyPattern {
            category,
            hour,
            occurrence_count: stats.count,
            distinct_days: stats.days.len(),
            average_duration: stats.average_duration(),
            confidence: daily_confidence(stats.count),
        })
        .collect();

    patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    patterns
}

/// Group by (category, weekday) and keep recurring slots, most frequent first.
pub fn weekly_patterns(activities: &[ActivityRecord]) -> Vec<WeeklyPattern> {
    let mut slots: BTreeMap<(String, u32), (Weekday, SlotStats)> = BTreeMap::new();
    for activity in activities {
        let weekday = activity.started_at.weekday();
        slots
            .entry((activity.category.clone(), weekday.num_days_from_monday()))
            .or_insert_with(|| (weekday, SlotStats::default()))
            .1
            .add(activity);
    }

    let mut patterns: Vec<WeeklyPattern> = slots
        .into_iter()
        .filter(|(_, (_, stats))| stats.count >= MIN_OCCURRENCES)
        .map(|((category, _), (day_of_week, stats))| WeeklyPattern {
            category,
            day_of_week,
            occurrence_count: stats.count,
            average_duration: stats.average_duration(),
        })
        .collect();

    patterns.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
    patterns
}

/// Counts values in first-seen order so ties keep that order after a stable sort.
fn top_by_frequency<T: PartialEq + Copy>(values: impl Iterator<Item = T>) -> Vec<T> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(TOP_SLOTS).map(|(v, _)| v).collect()
}

/// Per-category aggregates, most active category first.
pub fn category_patterns(activities: &[ActivityRecord]) -> Vec<CategoryPattern> {
    let mut ordered: Vec<&ActivityRecord> = activities.iter().collect();
    ordered.sort_by_key(|a| a.started_at);

    let mut categories: Vec<&str> = Vec::new();
    for activity in &ordered {
        if !categories.contains(&activity.category.as_str()) {
            categories.push(&activity.category);
        }
    }

    let mut patterns: Vec<CategoryPattern> = categories
        .into_iter()
        .map(|category| {
            let in_category: Vec<&ActivityRecord> = ordered
                .iter()
                .copied()
                .filter(|a| a.category == category)
                .collect();
            let total = in_category.len();
            let total_duration: f64 = in_category.iter().map(|a| a.duration_minutes).sum();

            CategoryPattern {
                category: category.to_string(),
                total_activities: total,
                average_duration: total_duration / total as f64,
                top_hours: top_by_frequency(in_category.iter().map(|a| a.started_at.hour())),
                top_days: top_by_frequency(in_category.iter().map(|a| a.started_at.weekday())),
                weekly_frequency: total as f64 / PATTERN_WINDOW_DAYS as f64 * 7.0,
            }
        })
        .collect();

    patterns.sort_by(|a, b| b.total_activities.cmp(&a.total_activities));
    patterns
}

/// Same-day transitions between consecutive activities, most frequent first.
pub fn sequence_patterns(activities: &[ActivityRecord]) -> Vec<SequencePattern> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&ActivityRecord>> = BTreeMap::new();
    for activity in activities {
        by_day
            .entry(activity.started_at.date_naive())
            .or_default()
            .push(activity);
    }

    let mut transitions: BTreeMap<(String, String), (usize, f64)> = BTreeMap::new();
    for day in by_day.values_mut() {
        day.sort_by_key(|a| a.started_at);
        for pair in day.windows(2) {
            let gap_hours =
                (pair[1].started_at - pair[0].started_at).num_seconds() as f64 / 3600.0;
            if gap_hours > MAX_SEQUENCE_GAP_HOURS {
                continue;
            }
            let entry = transitions
                .entry((pair[0].category.clone(), pair[1].category.clone()))
                .or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += gap_hours;
        }
    }

    let mut patterns: Vec<SequencePattern> = transitions
        .into_iter()
        .filter(|(_, (count, _))| *count >= MIN_OCCURRENCES)
        .map(|((from_category, to_category), (count, total_gap))| SequencePattern {
            from_category,
            to_category,
            occurrence_count: count,
            average_gap_hours: total_gap / count as f64,
        })
        .collect();

    patterns.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
    patterns
}

/// Detect all pattern collections in an activity set.
pub fn detect_patterns(activities: &[ActivityRecord]) -> DetectedPatterns {
    DetectedPatterns {
        daily: daily_patterns(activities),
        weekly: weekly_patterns(activities),
        categories: category_patterns(activities),
        sequences: sequence_patterns(activities),
    }
}

/// Mines patterns for a user and caches the result.
pub struct PatternDetector {
    activities: Arc<dyn ActivityRepository>,
    store: Arc<dyn PatternStore>,
}

impl PatternDetector {
    pub fn new(activities: Arc<dyn ActivityRepository>, store: Arc<dyn PatternStore>) -> Self {
        Self { activities, store }
    }

    /// Activities in the trailing pattern window ending at `now`.
    pub fn window(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<ActivityRecord>> {
        self.activities
            .activities_in_range(user_id, now - Duration::days(PATTERN_WINDOW_DAYS), now)
    }

    /// Detect patterns from an already-fetched window and cache them.
    pub fn detect_from(
        &self,
        user_id: &str,
        activities: &[ActivityRecord],
        now: DateTime<Utc>,
    ) -> (DetectedPatterns, CacheWrite) {
        let patterns = detect_patterns(activities);

        tracing::debug!(
            user_id,
            activities = activities.len(),
            daily = patterns.daily.len(),
            weekly = patterns.weekly.len(),
            sequences = patterns.sequences.len(),
            "Detected patterns"
        );

        let snapshot = PatternSnapshot {
            patterns,
            analyzed_at: now,
        };
        let cache = CacheWrite::from_result(
            "patterns",
            user_id,
            self.store.upsert_patterns(user_id, &snapshot),
        );
        (snapshot.patterns, cache)
    }
}
