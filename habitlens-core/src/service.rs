//! Public analysis operations
//!
//! [`BehaviorService`] wires the analytics components to their stores and
//! exposes the operations the CLI and scheduler call. Every operation has an
//! `_at` form taking the clock value explicitly; the plain form uses
//! `Utc::now()`.

use crate::alerts::AlertManager;
use crate::analytics::correlation::{CorrelationAnalysis, CorrelationAnalyzer};
use crate::analytics::deviations::{detect_deviations, Deviation};
use crate::analytics::patterns::{DetectedPatterns, PatternDetector};
use crate::analytics::risk::{Prediction, PredictionSnapshot, RiskScorer};
use crate::analytics::suggestions::SuggestionEngine;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::store::{
    ActivityRepository, CorrelationStore, NotificationStore, PatternStore, PredictionStore,
    SuggestionStore, UserDirectory,
};
use crate::types::{
    CacheWrite, Notification, NotificationFilter, NotificationType, RiskLevel, Suggestion,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Window for `recentAlerts` in the current risk view.
const RECENT_ALERT_DAYS: i64 = 7;
const RECENT_ALERT_LIMIT: usize = 5;

/// The stores every component is built from.
#[derive(Clone)]
pub struct Stores {
    pub activities: Arc<dyn ActivityRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub patterns: Arc<dyn PatternStore>,
    pub suggestions: Arc<dyn SuggestionStore>,
    pub correlations: Arc<dyn CorrelationStore>,
    pub predictions: Arc<dyn PredictionStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// Every store backed by one SQLite database.
    pub fn from_database(db: Arc<Database>) -> Self {
        Self {
            activities: db.clone(),
            users: db.clone(),
            patterns: db.clone(),
            suggestions: db.clone(),
            correlations: db.clone(),
            predictions: db.clone(),
            notifications: db,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternAnalysis {
    pub patterns: DetectedPatterns,
    pub deviations: Vec<Deviation>,
    pub suggestions: Vec<Suggestion>,
    pub analysis_date: DateTime<Utc>,
    #[serde(skip)]
    pub cache: CacheWrite,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionCheck {
    pub has_deviations: bool,
    pub deviations: Vec<Deviation>,
    pub suggestions: Vec<Suggestion>,
    /// Mean confidence of the daily patterns
    pub pattern_strength: f64,
    pub last_analyzed: DateTime<Utc>,
}

/// One full risk analysis for a user.
#[derive(Debug, Clone)]
pub struct RiskRun {
    pub predictions: Vec<Prediction>,
    pub alert: Option<Notification>,
    pub cache: CacheWrite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    pub total_at_risk: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub highest_risk_category: Option<String>,
}

impl RiskSummary {
    pub fn from_predictions(predictions: &[Prediction]) -> Self {
        let count = |level: RiskLevel| predictions.iter().filter(|p| p.risk_level == level).count();
        Self {
            total_at_risk: predictions.len(),
            critical: count(RiskLevel::Critical),
            high: count(RiskLevel::High),
            medium: count(RiskLevel::Medium),
            highest_risk_category: predictions
                .iter()
                .max_by_key(|p| p.risk_score)
                .map(|p| p.category.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStatus {
    pub predictions: Vec<Prediction>,
    pub recent_alerts: Vec<Notification>,
    pub risk_summary: RiskSummary,
    pub last_analyzed: DateTime<Utc>,
}

/// Outcome of a batch job for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed { predictions: usize, alerts: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUserResult {
    pub user_id: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub users: Vec<BatchUserResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.users
            .iter()
            .filter(|u| matches!(u.outcome, BatchOutcome::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.users.len() - self.succeeded()
    }

    pub fn alerts(&self) -> usize {
        self.users
            .iter()
            .map(|u| match u.outcome {
                BatchOutcome::Completed { alerts, .. } => alerts,
                BatchOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub users: usize,
    pub suggestions: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub expired_suggestions: usize,
    pub deleted_notifications: usize,
    /// Users whose suggestions could not be purged
    pub failures: usize,
}

pub struct BehaviorService {
    detector: PatternDetector,
    suggestions: SuggestionEngine,
    correlations: CorrelationAnalyzer,
    risk: RiskScorer,
    alerts: AlertManager,
    users: Arc<dyn UserDirectory>,
    predictions: Arc<dyn PredictionStore>,
    batch_delay: std::time::Duration,
}

impl BehaviorService {
    pub fn new(stores: Stores, config: &Config) -> Self {
        Self {
            detector: PatternDetector::new(stores.activities.clone(), stores.patterns),
            suggestions: SuggestionEngine::new(stores.suggestions)
                .with_limit(config.analysis.suggestion_limit),
            correlations: CorrelationAnalyzer::new(stores.activities.clone(), stores.correlations),
            risk: RiskScorer::new(stores.activities),
            alerts: AlertManager::with_config(
                stores.notifications,
                &config.alerts,
                &config.analysis,
            ),
            users: stores.users,
            predictions: stores.predictions,
            batch_delay: std::time::Duration::from_millis(config.scheduler.batch_delay_ms),
        }
    }

    /// Pause between users in batch jobs.
    pub fn with_batch_delay(mut self, delay: std::time::Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn suggestions(&self) -> &SuggestionEngine {
        &self.suggestions
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    // ============================================
    // Patterns and suggestions
    // ============================================

    pub fn analyze_patterns(&self, user_id: &str) -> Result<PatternAnalysis> {
        self.analyze_patterns_at(user_id, Utc::now())
    }

    /// Detect patterns, today's deviations, and refresh suggestions.
    pub fn analyze_patterns_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<PatternAnalysis> {
        let window = self.detector.window(user_id, now)?;
        let (patterns, cache) = self.detector.detect_from(user_id, &window, now);
        let deviations = detect_deviations(&window, &patterns.daily, now);
        let suggestions = self
            .suggestions
            .refresh(user_id, &patterns, &deviations, &window, now)?;

        tracing::info!(
            user_id,
            daily = patterns.daily.len(),
            deviations = deviations.len(),
            suggestions = suggestions.len(),
            "Pattern analysis complete"
        );

        Ok(PatternAnalysis {
            patterns,
            deviations,
            suggestions,
            analysis_date: now,
            cache,
        })
    }

    pub fn check_patterns_and_suggest(&self, user_id: &str) -> Result<SuggestionCheck> {
        self.check_patterns_and_suggest_at(user_id, Utc::now())
    }

    pub fn check_patterns_and_suggest_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SuggestionCheck> {
        let analysis = self.analyze_patterns_at(user_id, now)?;
        Ok(SuggestionCheck {
            has_deviations: !analysis.deviations.is_empty(),
            pattern_strength: analysis.patterns.strength(),
            deviations: analysis.deviations,
            suggestions: analysis.suggestions,
            last_analyzed: analysis.analysis_date,
        })
    }

    // ============================================
    // Correlations
    // ============================================

    pub fn analyze_cross_correlations(&self, user_id: &str) -> Result<CorrelationAnalysis> {
        self.analyze_cross_correlations_at(user_id, Utc::now())
    }

    pub fn analyze_cross_correlations_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CorrelationAnalysis> {
        let (analysis, _cache) = self.correlations.analyze(user_id, now)?;
        Ok(analysis)
    }

    // ============================================
    // Risk
    // ============================================

    pub fn analyze_habit_degradation_risk(&self, user_id: &str) -> Result<Vec<Prediction>> {
        self.analyze_habit_degradation_risk_at(user_id, Utc::now())
    }

    pub fn analyze_habit_degradation_risk_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Prediction>> {
        Ok(self.run_risk_analysis(user_id, now)?.predictions)
    }

    /// Score risk, replace the prediction snapshot and raise alerts.
    pub fn run_risk_analysis(&self, user_id: &str, now: DateTime<Utc>) -> Result<RiskRun> {
        let predictions = self.risk.predict(user_id, now)?;

        let snapshot = PredictionSnapshot {
            predictions,
            analyzed_at: now,
        };
        let cache = CacheWrite::from_result(
            "predictions",
            user_id,
            self.predictions.upsert_predictions(user_id, &snapshot),
        );
        let alert = self
            .alerts
            .process_predictions(user_id, &snapshot.predictions, now)?;

        tracing::info!(
            user_id,
            at_risk = snapshot.predictions.len(),
            alerted = alert.is_some(),
            "Risk analysis complete"
        );

        Ok(RiskRun {
            predictions: snapshot.predictions,
            alert,
            cache,
        })
    }

    pub fn get_current_risk_analysis(&self, user_id: &str) -> Result<RiskStatus> {
        self.get_current_risk_analysis_at(user_id, Utc::now())
    }

    /// Latest stored predictions with recent alerts; runs a full analysis if
    /// nothing is stored yet.
    pub fn get_current_risk_analysis_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RiskStatus> {
        let (predictions, last_analyzed) = match self.predictions.latest_predictions(user_id)? {
            Some(snapshot) => (snapshot.predictions, snapshot.analyzed_at),
            None => (self.run_risk_analysis(user_id, now)?.predictions, now),
        };

        let recent_alerts = self.alerts.list(
            user_id,
            &NotificationFilter {
                notification_type: Some(NotificationType::HabitDegradationAlert),
                since: Some(now - Duration::days(RECENT_ALERT_DAYS)),
                limit: Some(RECENT_ALERT_LIMIT),
                ..Default::default()
            },
        )?;

        Ok(RiskStatus {
            risk_summary: RiskSummary::from_predictions(&predictions),
            predictions,
            recent_alerts,
            last_analyzed,
        })
    }

    // ============================================
    // Batch jobs
    // ============================================

    pub fn run_prediction_batch_at(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        self.run_prediction_batch_with(now, |_, _, _| {})
    }

    /// Full risk analysis for every opted-in user, one at a time.
    ///
    /// `progress` sees `(done, total, result)` after each user. A failing
    /// user is recorded and the batch moves on.
    pub fn run_prediction_batch_with(
        &self,
        now: DateTime<Utc>,
        progress: impl FnMut(usize, usize, &BatchUserResult),
    ) -> Result<BatchReport> {
        self.for_each_prediction_user(now, "prediction batch", progress, |user_id| {
            let run = self.run_risk_analysis(user_id, now)?;
            Ok((run.predictions.len(), usize::from(run.alert.is_some())))
        })
    }

    /// Critical-only pass: alerts for critical predictions, snapshot untouched.
    pub fn run_critical_check_at(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        self.for_each_prediction_user(now, "critical check", |_, _, _| {}, |user_id| {
            let critical: Vec<Prediction> = self
                .risk
                .predict(user_id, now)?
                .into_iter()
                .filter(|p| p.risk_level == RiskLevel::Critical)
                .collect();
            let alert = self.alerts.process_critical(user_id, &critical, now)?;
            Ok((critical.len(), usize::from(alert.is_some())))
        })
    }

    fn for_each_prediction_user(
        &self,
        now: DateTime<Utc>,
        job: &str,
        mut progress: impl FnMut(usize, usize, &BatchUserResult),
        run: impl Fn(&str) -> Result<(usize, usize)>,
    ) -> Result<BatchReport> {
        let users = self.users.list_prediction_users()?;
        let total = users.len();
        tracing::info!(job, users = total, "Batch started");

        let mut report = BatchReport {
            started_at: now,
            users: Vec::with_capacity(total),
        };

        for (i, user) in users.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                std::thread::sleep(self.batch_delay);
            }

            let outcome = match run(&user.id) {
                Ok((predictions, alerts)) => BatchOutcome::Completed {
                    predictions,
                    alerts,
                },
                Err(e) => {
                    tracing::warn!(job, user_id = %user.id, error = %e, "Batch user failed");
                    BatchOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            let result = BatchUserResult {
                user_id: user.id.clone(),
                outcome,
            };
            progress(i + 1, total, &result);
            report.users.push(result);
        }

        tracing::info!(
            job,
            succeeded = report.succeeded(),
            failed = report.failed(),
            alerts = report.alerts(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Re-run pattern analysis (and suggestion refresh) for every user.
    pub fn refresh_all_patterns_at(&self, now: DateTime<Utc>) -> Result<RefreshReport> {
        let users = self.users.list_users()?;
        let mut report = RefreshReport {
            users: users.len(),
            ..Default::default()
        };

        for user in &users {
            match self.analyze_patterns_at(&user.id, now) {
                Ok(analysis) => report.suggestions += analysis.suggestions.len(),
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Pattern refresh failed");
                    report.failures += 1;
                }
            }
        }
        Ok(report)
    }

    /// Purge stale suggestions for every user and old read notifications.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for user in self.users.list_users()? {
            match self.suggestions.expire(&user.id, now) {
                Ok(expired) => report.expired_suggestions += expired,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Suggestion cleanup failed");
                    report.failures += 1;
                }
            }
        }
        report.deleted_notifications = self.alerts.cleanup(now)?;

        tracing::info!(
            expired_suggestions = report.expired_suggestions,
            deleted_notifications = report.deleted_notifications,
            failures = report.failures,
            "Cleanup complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{ActivityRecord, SuggestionFlags, SuggestionPurge, UserProfile};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 29, 22, 0, 0).unwrap()
    }

    fn setup() -> (Arc<Database>, BehaviorService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        let service = BehaviorService::new(Stores::from_database(db.clone()), &Config::default())
            .with_batch_delay(std::time::Duration::ZERO);
        (db, service)
    }

    fn abandoned_guitar(db: &Database, user_id: &str) {
        db.upsert_user(&UserProfile::new(user_id)).unwrap();
        let activities: Vec<_> = [27, 26, 25, 24, 23, 20, 19, 18, 17, 16]
            .iter()
            .map(|d| ActivityRecord::new(user_id, "guitar", now() - Duration::days(*d), 45.0))
            .collect();
        db.insert_activities(&activities).unwrap();
    }

    #[test]
    fn test_risk_analysis_persists_snapshot_and_alerts_once() {
        let (db, service) = setup();
        abandoned_guitar(&db, "user-1");

        let run = service.run_risk_analysis("user-1", now()).unwrap();
        assert_eq!(run.predictions.len(), 1);
        assert_eq!(run.predictions[0].risk_level, RiskLevel::Critical);
        assert!(run.alert.is_some());
        assert!(run.cache.is_stored());

        let again = service
            .analyze_habit_degradation_risk_at("user-1", now() + Duration::hours(1))
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(service.alerts().statistics("user-1", now()).unwrap().habit_alerts, 1);

        let status = service
            .get_current_risk_analysis_at("user-1", now() + Duration::hours(2))
            .unwrap();
        assert_eq!(status.last_analyzed, now() + Duration::hours(1));
        assert_eq!(status.recent_alerts.len(), 1);
        assert_eq!(status.risk_summary.critical, 1);
        assert_eq!(
            status.risk_summary.highest_risk_category.as_deref(),
            Some("guitar")
        );
    }

    #[test]
    fn test_current_risk_without_snapshot_runs_analysis() {
        let (db, service) = setup();
        abandoned_guitar(&db, "user-1");

        let status = service.get_current_risk_analysis_at("user-1", now()).unwrap();
        assert_eq!(status.last_analyzed, now());
        assert_eq!(status.predictions.len(), 1);
        assert!(db.latest_predictions("user-1").unwrap().is_some());
    }

    #[test]
    fn test_batch_skips_opted_out_users() {
        let (db, service) = setup();
        abandoned_guitar(&db, "alice");
        abandoned_guitar(&db, "bob");
        let mut carol = UserProfile::new("carol");
        carol.predictions_enabled = false;
        db.upsert_user(&carol).unwrap();

        let mut seen = Vec::new();
        let report = service
            .run_prediction_batch_with(now(), |done, total, result| {
                seen.push((done, total, result.user_id.clone()));
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![(1, 2, "alice".to_string()), (2, 2, "bob".to_string())]
        );
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.alerts(), 2);
        assert_eq!(
            report.users[0].outcome,
            BatchOutcome::Completed {
                predictions: 1,
                alerts: 1
            }
        );
    }

    struct BrokenActivities;

    impl ActivityRepository for BrokenActivities {
        fn activities_in_range(
            &self,
            user_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<ActivityRecord>> {
            if user_id == "alice" {
                Err(Error::Validation("corrupt activity log".to_string()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn test_batch_continues_after_user_failure() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        db.upsert_user(&UserProfile::new("alice")).unwrap();
        db.upsert_user(&UserProfile::new("bob")).unwrap();

        let mut stores = Stores::from_database(db.clone());
        stores.activities = Arc::new(BrokenActivities);
        let service = BehaviorService::new(stores, &Config::default())
            .with_batch_delay(std::time::Duration::ZERO);

        let report = service.run_prediction_batch_at(now()).unwrap();
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.users[0].outcome,
            BatchOutcome::Failed { .. }
        ));
        assert_eq!(
            report.users[1].outcome,
            BatchOutcome::Completed {
                predictions: 0,
                alerts: 0
            }
        );
    }

    #[test]
    fn test_critical_check_alerts_without_touching_snapshot() {
        let (db, service) = setup();
        abandoned_guitar(&db, "user-1");

        let report = service.run_critical_check_at(now()).unwrap();
        assert_eq!(report.alerts(), 1);
        assert!(db.latest_predictions("user-1").unwrap().is_none());
    }

    #[test]
    fn test_check_patterns_reports_strength() {
        let (db, service) = setup();
        db.upsert_user(&UserProfile::new("user-1")).unwrap();
        let activities: Vec<_> = (1..=12)
            .map(|d| {
                let day = (now() - Duration::days(d)).date_naive();
                let at = Utc.from_utc_datetime(&day.and_hms_opt(7, 0, 0).unwrap());
                ActivityRecord::new("user-1", "exercise", at, 30.0)
            })
            .collect();
        db.insert_activities(&activities).unwrap();

        let check = service
            .check_patterns_and_suggest_at("user-1", now())
            .unwrap();
        assert!((check.pattern_strength - 0.4).abs() < 1e-9);
        // Exercise at 07:00 was skipped today
        assert!(check.has_deviations);
        assert_eq!(check.suggestions.len(), 1);

        let value = serde_json::to_value(&check).unwrap();
        assert!(value.get("patternStrength").is_some());
        assert!(value.get("lastAnalyzed").is_some());
    }

    #[test]
    fn test_cleanup_purges_read_suggestions() {
        let (db, service) = setup();
        db.upsert_user(&UserProfile::new("user-1")).unwrap();
        let activities: Vec<_> = (1..=12)
            .map(|d| {
                let day = (now() - Duration::days(d)).date_naive();
                let at = Utc.from_utc_datetime(&day.and_hms_opt(7, 0, 0).unwrap());
                ActivityRecord::new("user-1", "exercise", at, 30.0)
            })
            .collect();
        db.insert_activities(&activities).unwrap();

        let analysis = service.analyze_patterns_at("user-1", now()).unwrap();
        for s in &analysis.suggestions {
            service.suggestions().mark_read("user-1", &s.id).unwrap();
        }

        let report = service.cleanup_at(now()).unwrap();
        assert_eq!(report.expired_suggestions, analysis.suggestions.len());
        assert_eq!(report.deleted_notifications, 0);
        assert_eq!(report.failures, 0);
    }

    /// Suggestion storage that cannot purge alice's suggestions.
    struct StuckSuggestions(Arc<Database>);

    impl SuggestionStore for StuckSuggestions {
        fn delete_suggestions(&self, user_id: &str, purge: &SuggestionPurge) -> Result<usize> {
            if user_id == "alice" {
                Err(Error::Validation("suggestions locked".to_string()))
            } else {
                self.0.delete_suggestions(user_id, purge)
            }
        }

        fn find_active_suggestions(
            &self,
            user_id: &str,
            now: DateTime<Utc>,
        ) -> Result<Vec<Suggestion>> {
            self.0.find_active_suggestions(user_id, now)
        }

        fn create_suggestions(&self, suggestions: &[Suggestion]) -> Result<usize> {
            self.0.create_suggestions(suggestions)
        }

        fn get_suggestion(&self, user_id: &str, id: &str) -> Result<Option<Suggestion>> {
            self.0.get_suggestion(user_id, id)
        }

        fn update_suggestion_flags(
            &self,
            user_id: &str,
            id: &str,
            flags: SuggestionFlags,
        ) -> Result<Option<Suggestion>> {
            self.0.update_suggestion_flags(user_id, id, flags)
        }

        fn mark_acted_on(
            &self,
            user_id: &str,
            id: &str,
            activity: Option<&ActivityRecord>,
        ) -> Result<Option<(Suggestion, bool)>> {
            self.0.mark_acted_on(user_id, id, activity)
        }
    }

    #[test]
    fn test_cleanup_continues_after_user_failure() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        db.upsert_user(&UserProfile::new("alice")).unwrap();
        db.upsert_user(&UserProfile::new("bob")).unwrap();

        let mut stores = Stores::from_database(db.clone());
        stores.suggestions = Arc::new(StuckSuggestions(db.clone()));
        let service = BehaviorService::new(stores, &Config::default());

        let mut read = Notification::new(
            "bob",
            NotificationType::HabitDegradationAlert,
            "t",
            "m",
            serde_json::json!({}),
            now() - Duration::days(60),
        );
        read.read = true;
        db.create_notification(&read).unwrap();

        let report = service.cleanup_at(now()).unwrap();
        assert_eq!(report.failures, 1);
        assert_eq!(report.deleted_notifications, 1);
    }
}
