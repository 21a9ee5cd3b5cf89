//! Suggestion generation and lifecycle.
//!
//! Candidates come from four sources:
//!
//! | Source | Type | Priority | Timing |
//! |--------|------|----------|--------|
//! | missed-pattern deviation | `habit_resumption` | high | immediate |
//! | daily pattern due in 1-2h | `upcoming_habit` | medium | upcoming |
//! | sequence following the last activity | `sequence_suggestion` | medium | sequence |
//! | today's weekly pattern | `weekly_habit` | low | weekly |
//!
//! [`SuggestionEngine::refresh`] persists them with a TTL per timing class
//! and suppresses duplicates of still-active suggestions. Refreshes for the
//! same user are serialized so two concurrent callers cannot both pass the
//! duplicate check.

use super::deviations::Deviation;
use super::patterns::DetectedPatterns;
use crate::error::{Error, Result};
use crate::store::SuggestionStore;
use crate::types::{
    ActionType, ActivityRecord, ActivitySource, Priority, Suggestion, SuggestionFlags,
    SuggestionPurge, SuggestionType, Timing,
};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Default number of suggestions returned per refresh.
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// Existing suggestions younger than this are returned without regenerating.
pub const REGENERATION_COOLDOWN_MINUTES: i64 = 60;

/// Suggestions older than this are purged before regenerating.
pub const MAX_SUGGESTION_AGE_HOURS: i64 = 4;

/// Duration of the activity recorded when a suggestion is acted on.
pub const ACTED_ACTIVITY_MINUTES: f64 = 30.0;

const UPCOMING_MIN_CONFIDENCE: f64 = 0.4;
const SEQUENCE_SLACK_HOURS: f64 = 1.0;

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[allow(clippy::too_many_arguments)]
fn candidate(
    user_id: &str,
    suggestion_type: SuggestionType,
    category: &str,
    title: String,
    message: String,
    priority: Priority,
    timing: Timing,
    confidence: f64,
    now: DateTime<Utc>,
) -> Suggestion {
    Suggestion {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        suggestion_type,
        category: category.to_string(),
        title,
        message,
        priority,
        timing,
        confidence,
        action_type: ActionType::default(),
        created_at: now,
        expires_at: now + timing.ttl(),
        is_read: false,
        is_acted_on: false,
    }
}

/// Priority first, then confidence, both descending.
pub fn rank(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.confidence.total_cmp(&a.confidence))
    });
}

/// Build ranked candidates from patterns, deviations and recent activity.
///
/// `recent` is the pattern window; its latest activity drives sequence
/// suggestions. At most `limit` candidates are returned, unique on
/// (type, category, timing).
pub fn generate_candidates(
    user_id: &str,
    patterns: &DetectedPatterns,
    deviations: &[Deviation],
    recent: &[ActivityRecord],
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<Suggestion> {
    let mut candidates = Vec::new();
    let current_hour = now.hour();

    for deviation in deviations {
        if let Deviation::MissedPattern {
            category,
            expected_hour,
            confidence,
        } = deviation
        {
            candidates.push(candidate(
                user_id,
                SuggestionType::HabitResumption,
                category,
                format!("Time for {}", category),
                format!(
                    "You usually do {} around {:02}:00. There's still time today.",
                    category, expected_hour
                ),
                Priority::High,
                Timing::Immediate,
                *confidence,
                now,
            ));
        }
    }

    for pattern in &patterns.daily {
        let ahead = pattern.hour.checked_sub(current_hour);
        if matches!(ahead, Some(1..=2)) && pattern.confidence > UPCOMING_MIN_CONFIDENCE {
            candidates.push(candidate(
                user_id,
                SuggestionType::UpcomingHabit,
                &pattern.category,
                format!("{} coming up", pattern.category),
                format!(
                    "You usually start {} around {:02}:00.",
                    pattern.category, pattern.hour
                ),
                Priority::Medium,
                Timing::Upcoming,
                pattern.confidence,
                now,
            ));
        }
    }

    if let Some(last) = recent
        .iter()
        .filter(|a| a.started_at <= now)
        .max_by_key(|a| a.started_at)
    {
        let elapsed_hours = (now - last.started_at).num_seconds() as f64 / 3600.0;
        for sequence in patterns
            .sequences
            .iter()
            .filter(|s| s.from_category == last.category)
        {
            if elapsed_hours <= sequence.average_gap_hours + SEQUENCE_SLACK_HOURS {
                candidates.push(candidate(
                    user_id,
                    SuggestionType::SequenceSuggestion,
                    &sequence.to_category,
                    format!("Next up: {}", sequence.to_category),
                    format!(
                        "After {} you often move on to {} within {:.1} hours.",
                        sequence.from_category, sequence.to_category, sequence.average_gap_hours
                    ),
                    Priority::Medium,
                    Timing::Sequence,
                    sequence.occurrence_count as f64 / 10.0,
                    now,
                ));
            }
        }
    }

    let deviated: HashSet<&str> = deviations.iter().map(|d| d.category()).collect();
    let today = now.weekday();
    for pattern in patterns
        .weekly
        .iter()
        .filter(|p| p.day_of_week == today && !deviated.contains(p.category.as_str()))
    {
        candidates.push(candidate(
            user_id,
            SuggestionType::WeeklyHabit,
            &pattern.category,
            format!("{} {}", weekday_name(today), pattern.category),
            format!(
                "You often do {} on {}s.",
                pattern.category,
                weekday_name(today)
            ),
            Priority::Low,
            Timing::Weekly,
            (pattern.occurrence_count as f64 / 4.0).min(1.0),
            now,
        ));
    }

    rank(&mut candidates);

    let mut seen = HashSet::new();
    candidates.retain(|s| seen.insert((s.suggestion_type, s.category.clone(), s.timing)));
    candidates.truncate(limit);
    candidates
}

/// Result of acting on a suggestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActedSuggestion {
    pub suggestion: Suggestion,
    /// Activity recorded on the user's behalf, if the action logs one
    pub activity: Option<ActivityRecord>,
}

/// Owns persisted suggestions for all users.
pub struct SuggestionEngine {
    store: Arc<dyn SuggestionStore>,
    limit: usize,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SuggestionEngine {
    pub fn new(store: Arc<dyn SuggestionStore>) -> Self {
        Self {
            store,
            limit: DEFAULT_SUGGESTION_LIMIT,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    fn user_lock(&self, user_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.user_locks.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Drop the user's lock once no caller holds a handle to it.
    fn release_user_lock(&self, user_id: &str) {
        if let Ok(mut locks) = self.user_locks.lock() {
            if locks.get(user_id).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(user_id);
            }
        }
    }

    fn active_ranked(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Suggestion>> {
        let mut active = self.store.find_active_suggestions(user_id, now)?;
        rank(&mut active);
        Ok(active)
    }

    /// Purge stale suggestions, then store new non-duplicate candidates.
    ///
    /// Returns the user's full active set. If any active suggestion was
    /// created within the last hour the set is returned untouched.
    pub fn refresh(
        &self,
        user_id: &str,
        patterns: &DetectedPatterns,
        deviations: &[Deviation],
        recent: &[ActivityRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<Suggestion>> {
        let lock = self.user_lock(user_id)?;
        let result = match lock.lock() {
            Ok(_guard) => self.refresh_locked(user_id, patterns, deviations, recent, now),
            Err(_) => Err(Error::LockPoisoned),
        };
        drop(lock);
        self.release_user_lock(user_id);
        result
    }

    fn refresh_locked(
        &self,
        user_id: &str,
        patterns: &DetectedPatterns,
        deviations: &[Deviation],
        recent: &[ActivityRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<Suggestion>> {
        let active = self.active_ranked(user_id, now)?;
        let cooldown = Duration::minutes(REGENERATION_COOLDOWN_MINUTES);
        if active.iter().any(|s| now - s.created_at < cooldown) {
            tracing::debug!(user_id, active = active.len(), "Reusing recent suggestions");
            return Ok(active);
        }

        let purged = self.expire(user_id, now)?;
        let active = self.store.find_active_suggestions(user_id, now)?;
        let taken: HashSet<_> = active.iter().map(|s| s.dedup_key()).collect();

        let fresh: Vec<Suggestion> =
            generate_candidates(user_id, patterns, deviations, recent, now, self.limit)
                .into_iter()
                .filter(|c| !taken.contains(&c.dedup_key()))
                .collect();

        let created = if fresh.is_empty() {
            0
        } else {
            self.store.create_suggestions(&fresh)?
        };

        tracing::info!(
            user_id,
            purged,
            kept = active.len(),
            created,
            "Refreshed suggestions"
        );

        self.active_ranked(user_id, now)
    }

    /// Delete suggestions that are too old, expired, read or acted on.
    pub fn expire(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        self.store.delete_suggestions(
            user_id,
            &SuggestionPurge {
                created_before: Some(now - Duration::hours(MAX_SUGGESTION_AGE_HOURS)),
                expired_at: Some(now),
                read: true,
                acted_on: true,
            },
        )
    }

    /// Active suggestions, ranked.
    pub fn active(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Suggestion>> {
        self.active_ranked(user_id, now)
    }

    pub fn mark_read(&self, user_id: &str, suggestion_id: &str) -> Result<Suggestion> {
        self.store
            .update_suggestion_flags(
                user_id,
                suggestion_id,
                SuggestionFlags {
                    is_read: Some(true),
                    is_acted_on: None,
                },
            )?
            .ok_or_else(|| Error::SuggestionNotFound(suggestion_id.to_string()))
    }

    /// Mark a suggestion acted on and perform its action.
    ///
    /// Acting twice is a no-op the second time: no further activity is logged.
    pub fn act_on(
        &self,
        user_id: &str,
        suggestion_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActedSuggestion> {
        let existing = self
            .store
            .get_suggestion(user_id, suggestion_id)?
            .ok_or_else(|| Error::SuggestionNotFound(suggestion_id.to_string()))?;

        if existing.is_acted_on {
            return Ok(ActedSuggestion {
                suggestion: existing,
                activity: None,
            });
        }

        let record = match existing.action_type {
            ActionType::LogActivity => Some(
                ActivityRecord::new(
                    user_id,
                    existing.category.clone(),
                    now,
                    ACTED_ACTIVITY_MINUTES,
                )
                .with_source(ActivitySource::Suggestion),
            ),
            ActionType::Acknowledge => None,
        };

        let (suggestion, flipped) = self
            .store
            .mark_acted_on(user_id, suggestion_id, record.as_ref())?
            .ok_or_else(|| Error::SuggestionNotFound(suggestion_id.to_string()))?;
        let activity = if flipped { record } else { None };

        tracing::info!(
            user_id,
            suggestion_id,
            category = %suggestion.category,
            logged = activity.is_some(),
            "Suggestion acted on"
        );

        Ok(ActedSuggestion {
            suggestion,
            activity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::patterns::{DailyPattern, SequencePattern, WeeklyPattern};
    use crate::db::Database;
    use crate::store::ActivityRepository;
    use crate::types::UserProfile;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // Tuesday
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 30, 0).unwrap()
    }

    fn daily(category: &str, hour: u32, confidence: f64) -> DailyPattern {
        DailyPattern {
            category: category.to_string(),
            hour,
            occurrence_count: 10,
            distinct_days: 10,
            average_duration: 30.0,
            confidence,
        }
    }

    fn patterns() -> DetectedPatterns {
        DetectedPatterns {
            daily: vec![
                daily("exercise", 7, 0.8),
                daily("reading", 14, 0.6),
                daily("music", 13, 0.3),
            ],
            weekly: vec![
                WeeklyPattern {
                    category: "yoga".to_string(),
                    day_of_week: Weekday::Tue,
                    occurrence_count: 4,
                    average_duration: 45.0,
                },
                WeeklyPattern {
                    category: "exercise".to_string(),
                    day_of_week: Weekday::Tue,
                    occurrence_count: 4,
                    average_duration: 45.0,
                },
            ],
            categories: vec![],
            sequences: vec![SequencePattern {
                from_category: "coding".to_string(),
                to_category: "walk".to_string(),
                occurrence_count: 6,
                average_gap_hours: 1.5,
            }],
        }
    }

    fn missed_exercise() -> Vec<Deviation> {
        vec![Deviation::MissedPattern {
            category: "exercise".to_string(),
            expected_hour: 7,
            confidence: 0.8,
        }]
    }

    fn recent_coding() -> Vec<ActivityRecord> {
        vec![ActivityRecord::new(
            "user-1",
            "coding",
            Utc.with_ymd_and_hms(2026, 3, 10, 11, 0, 0).unwrap(),
            60.0,
        )]
    }

    #[test]
    fn test_candidates_from_all_sources_ranked() {
        let candidates = generate_candidates(
            "user-1",
            &patterns(),
            &missed_exercise(),
            &recent_coding(),
            now(),
            5,
        );

        let kinds: Vec<_> = candidates
            .iter()
            .map(|c| (c.suggestion_type, c.category.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (SuggestionType::HabitResumption, "exercise"),
                (SuggestionType::UpcomingHabit, "reading"),
                (SuggestionType::SequenceSuggestion, "walk"),
                // exercise deviated today, so only yoga gets a weekly nudge
                (SuggestionType::WeeklyHabit, "yoga"),
            ]
        );
        assert_eq!(candidates[0].priority, Priority::High);
        assert_eq!(candidates[0].expires_at, now() + Duration::hours(4));
        assert!((candidates[2].confidence - 0.6).abs() < 1e-9);
        assert_eq!(candidates[3].expires_at, now() + Duration::hours(24));
    }

    #[test]
    fn test_weak_upcoming_pattern_is_skipped() {
        let mut p = patterns();
        p.daily = vec![daily("music", 13, 0.4)];
        let candidates = generate_candidates("user-1", &p, &[], &[], now(), 5);
        assert!(candidates
            .iter()
            .all(|c| c.suggestion_type != SuggestionType::UpcomingHabit));
    }

    #[test]
    fn test_stale_sequence_is_skipped() {
        let old = vec![ActivityRecord::new(
            "user-1",
            "coding",
            Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
            60.0,
        )];
        let candidates = generate_candidates("user-1", &patterns(), &[], &old, now(), 5);
        assert!(candidates
            .iter()
            .all(|c| c.suggestion_type != SuggestionType::SequenceSuggestion));
    }

    #[test]
    fn test_candidates_truncated_to_limit() {
        let candidates = generate_candidates(
            "user-1",
            &patterns(),
            &missed_exercise(),
            &recent_coding(),
            now(),
            2,
        );
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].priority, Priority::High);
    }

    fn engine() -> (Arc<Database>, SuggestionEngine) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        db.upsert_user(&UserProfile::new("user-1")).unwrap();
        let engine = SuggestionEngine::new(db.clone());
        (db, engine)
    }

    #[test]
    fn test_refresh_is_idempotent_within_the_hour() {
        let (_db, engine) = engine();
        let first = engine
            .refresh(
                "user-1",
                &patterns(),
                &missed_exercise(),
                &recent_coding(),
                now(),
            )
            .unwrap();
        assert_eq!(first.len(), 4);

        let later = now() + Duration::minutes(10);
        let second = engine
            .refresh(
                "user-1",
                &patterns(),
                &missed_exercise(),
                &recent_coding(),
                later,
            )
            .unwrap();

        let ids = |s: &[Suggestion]| s.iter().map(|x| x.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_user_locks_are_released_after_refresh() {
        let (db, engine) = engine();
        db.upsert_user(&UserProfile::new("user-2")).unwrap();
        for user in ["user-1", "user-2"] {
            engine
                .refresh(user, &patterns(), &[], &[], now())
                .unwrap();
        }
        assert!(engine.user_locks.lock().unwrap().is_empty());

        // A handle still held elsewhere keeps its entry
        let held = engine.user_lock("user-1").unwrap();
        engine.release_user_lock("user-1");
        assert_eq!(engine.user_locks.lock().unwrap().len(), 1);
        drop(held);
        engine.release_user_lock("user-1");
        assert!(engine.user_locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_refresh_after_cooldown_suppresses_duplicates() {
        let (_db, engine) = engine();
        let first = engine
            .refresh("user-1", &patterns(), &missed_exercise(), &[], now())
            .unwrap();

        // Past the cooldown but before any TTL runs out
        let later = now() + Duration::minutes(90);
        let second = engine
            .refresh("user-1", &patterns(), &missed_exercise(), &[], later)
            .unwrap();

        let mut keys: Vec<_> = second
            .iter()
            .map(|s| (s.suggestion_type, s.category.clone(), s.timing))
            .collect();
        let total = keys.len();
        keys.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.as_str().cmp(b.0.as_str())));
        keys.dedup();
        assert_eq!(keys.len(), total, "no duplicate active suggestions");
        assert!(first.iter().all(|f| second.iter().any(|s| s.id == f.id)));
    }

    #[test]
    fn test_read_suggestion_is_purged_and_regenerated() {
        let (_db, engine) = engine();
        let first = engine
            .refresh("user-1", &patterns(), &missed_exercise(), &[], now())
            .unwrap();
        for s in &first {
            engine.mark_read("user-1", &s.id).unwrap();
        }

        let later = now() + Duration::minutes(5);
        let second = engine
            .refresh("user-1", &patterns(), &missed_exercise(), &[], later)
            .unwrap();
        assert_eq!(second.len(), first.len());
        assert!(second.iter().all(|s| first.iter().all(|f| f.id != s.id)));
    }

    #[test]
    fn test_act_on_logs_activity_once() {
        let (db, engine) = engine();
        let suggestions = engine
            .refresh("user-1", &patterns(), &missed_exercise(), &[], now())
            .unwrap();
        let target = &suggestions[0];

        let acted = engine.act_on("user-1", &target.id, now()).unwrap();
        assert!(acted.suggestion.is_acted_on);
        let activity = acted.activity.expect("activity recorded");
        assert_eq!(activity.category, "exercise");
        assert_eq!(activity.duration_minutes, 30.0);
        assert_eq!(activity.confidence, 1.0);
        assert_eq!(activity.source, ActivitySource::Suggestion);

        let again = engine.act_on("user-1", &target.id, now()).unwrap();
        assert!(again.activity.is_none());

        let stored = db
            .activities_in_range("user-1", now() - Duration::hours(1), now() + Duration::hours(1))
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_unknown_suggestion_is_an_error() {
        let (_db, engine) = engine();
        assert!(matches!(
            engine.mark_read("user-1", "missing"),
            Err(Error::SuggestionNotFound(_))
        ));
        assert!(matches!(
            engine.act_on("user-1", "missing", now()),
            Err(Error::SuggestionNotFound(_))
        ));
    }
}
