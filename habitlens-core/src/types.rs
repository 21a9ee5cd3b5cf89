//! Core domain types for habitlens
//!
//! These types represent the canonical data model: activity records logged
//! by a user, and the user-facing artifacts derived from them (suggestions
//! and notifications).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Activity** | One logged block of time in a category (e.g. 45 minutes of "exercise") |
//! | **Category** | The resolved category name an activity belongs to |
//! | **Suggestion** | A short-lived nudge derived from patterns and deviations |
//! | **Notification** | A persisted, user-facing message such as a habit degradation alert |
//!
//! Patterns, correlations and predictions are derived state and live in
//! [`crate::analytics`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Users
// ============================================

/// A user whose activity is analyzed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique identifier
    pub id: String,
    /// Human-friendly name (optional)
    pub display_name: Option<String>,
    /// Whether scheduled risk predictions run for this user
    pub predictions_enabled: bool,
    /// When the user was created
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            predictions_enabled: true,
            created_at: Utc::now(),
        }
    }
}

// ============================================
// Activities
// ============================================

/// How an activity record entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    /// Logged by hand
    Manual,
    /// Bulk imported from a file
    Import,
    /// Created by acting on a suggestion
    Suggestion,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::Manual => "manual",
            ActivitySource::Import => "import",
            ActivitySource::Suggestion => "suggestion",
        }
    }
}

impl std::str::FromStr for ActivitySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ActivitySource::Manual),
            "import" => Ok(ActivitySource::Import),
            "suggestion" => Ok(ActivitySource::Suggestion),
            _ => Err(format!("unknown activity source: {}", s)),
        }
    }
}

/// One logged activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Unique identifier
    pub id: String,
    /// Owner of the activity
    pub user_id: String,
    /// Resolved category name
    pub category: String,
    /// When the activity started
    pub started_at: DateTime<Utc>,
    /// Length of the activity in minutes
    pub duration_minutes: f64,
    /// Where the record came from
    pub source: ActivitySource,
    /// Confidence of the category resolution (1.0 for explicit entries)
    pub confidence: f64,
}

impl ActivityRecord {
    /// Create a manually logged activity with a fresh id.
    pub fn new(
        user_id: impl Into<String>,
        category: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_minutes: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            category: category.into(),
            started_at,
            duration_minutes,
            source: ActivitySource::Manual,
            confidence: 1.0,
        }
    }

    pub fn with_source(mut self, source: ActivitySource) -> Self {
        self.source = source;
        self
    }

    /// Reject records the analytics cannot use.
    pub fn validate(&self) -> crate::Result<()> {
        if self.category.trim().is_empty() {
            return Err(crate::Error::Validation(
                "activity category must not be empty".to_string(),
            ));
        }
        if !self.duration_minutes.is_finite() || self.duration_minutes <= 0.0 {
            return Err(crate::Error::Validation(format!(
                "activity duration must be positive, got {}",
                self.duration_minutes
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(crate::Error::Validation(format!(
                "activity confidence must be within 0..=1, got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

// ============================================
// Suggestions
// ============================================

/// What produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// A confident daily habit was missed today
    HabitResumption,
    /// A daily habit is due within the next two hours
    UpcomingHabit,
    /// The last activity usually leads into another one
    SequenceSuggestion,
    /// Today's weekday usually includes this category
    WeeklyHabit,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::HabitResumption => "habit_resumption",
            SuggestionType::UpcomingHabit => "upcoming_habit",
            SuggestionType::SequenceSuggestion => "sequence_suggestion",
            SuggestionType::WeeklyHabit => "weekly_habit",
        }
    }
}

impl std::str::FromStr for SuggestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "habit_resumption" => Ok(SuggestionType::HabitResumption),
            "upcoming_habit" => Ok(SuggestionType::UpcomingHabit),
            "sequence_suggestion" => Ok(SuggestionType::SequenceSuggestion),
            "weekly_habit" => Ok(SuggestionType::WeeklyHabit),
            _ => Err(format!("unknown suggestion type: {}", s)),
        }
    }
}

/// Suggestion priority. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// Timing class of a suggestion; controls its time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Immediate,
    Upcoming,
    Sequence,
    Weekly,
}

impl Timing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timing::Immediate => "immediate",
            Timing::Upcoming => "upcoming",
            Timing::Sequence => "sequence",
            Timing::Weekly => "weekly",
        }
    }

    /// How long a suggestion of this timing stays valid.
    pub fn ttl(&self) -> Duration {
        match self {
            Timing::Immediate => Duration::hours(4),
            Timing::Upcoming => Duration::hours(6),
            Timing::Sequence => Duration::hours(2),
            Timing::Weekly => Duration::hours(24),
        }
    }
}

impl std::str::FromStr for Timing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Timing::Immediate),
            "upcoming" => Ok(Timing::Upcoming),
            "sequence" => Ok(Timing::Sequence),
            "weekly" => Ok(Timing::Weekly),
            _ => Err(format!("unknown timing: {}", s)),
        }
    }
}

/// What acting on a suggestion does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Record an activity in the suggestion's category
    #[default]
    LogActivity,
    /// Only acknowledge; nothing is recorded
    Acknowledge,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::LogActivity => "log_activity",
            ActionType::Acknowledge => "acknowledge",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log_activity" => Ok(ActionType::LogActivity),
            "acknowledge" => Ok(ActionType::Acknowledge),
            _ => Err(format!("unknown action type: {}", s)),
        }
    }
}

/// An actionable nudge shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub category: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub timing: Timing,
    pub confidence: f64,
    pub action_type: ActionType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_acted_on: bool,
}

impl Suggestion {
    /// Whether the suggestion still counts toward deduplication.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_read && !self.is_acted_on && self.expires_at > now
    }

    /// The key active suggestions are unique on.
    pub fn dedup_key(&self) -> (SuggestionType, &str, Timing) {
        (self.suggestion_type, self.category.as_str(), self.timing)
    }
}

/// Conditions for deleting suggestions; a row matching any of them is removed.
#[derive(Debug, Clone, Default)]
pub struct SuggestionPurge {
    /// Delete suggestions created before this instant
    pub created_before: Option<DateTime<Utc>>,
    /// Delete suggestions whose `expires_at` is at or before this instant
    pub expired_at: Option<DateTime<Utc>>,
    /// Delete suggestions already read
    pub read: bool,
    /// Delete suggestions already acted on
    pub acted_on: bool,
}

/// Flag changes applied to a stored suggestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestionFlags {
    pub is_read: Option<bool>,
    pub is_acted_on: Option<bool>,
}

// ============================================
// Risk
// ============================================

/// Habit degradation risk bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a 0-100 risk score.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 70 => RiskLevel::Critical,
            s if s >= 50 => RiskLevel::High,
            s if s >= 30 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(format!("unknown risk level: {}", s)),
        }
    }
}

// ============================================
// Notifications
// ============================================

/// Kind of a persisted notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A category crossed the alert risk threshold
    HabitDegradationAlert,
    /// Follow-up interventions generated for an alert
    InterventionSuggestions,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::HabitDegradationAlert => "habit_degradation_alert",
            NotificationType::InterventionSuggestions => "intervention_suggestions",
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "habit_degradation_alert" => Ok(NotificationType::HabitDegradationAlert),
            "intervention_suggestions" => Ok(NotificationType::InterventionSuggestions),
            _ => Err(format!("unknown notification type: {}", s)),
        }
    }
}

/// A user-facing message derived from a prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    /// Structured payload (category, scores, recommendations, ...)
    pub action_data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        action_data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            notification_type,
            title: title.into(),
            message: message.into(),
            action_data,
            read: false,
            created_at,
        }
    }
}

/// Filter for listing and counting notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    /// Only unread notifications
    pub unread_only: bool,
    /// Only notifications of this type
    pub notification_type: Option<NotificationType>,
    /// Only notifications created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of results (newest first)
    pub limit: Option<usize>,
}

// ============================================
// Cache writes
// ============================================

/// Outcome of a best-effort write of derived state.
///
/// Derived state is always recomputable, so a failed write never fails the
/// analysis that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CacheWrite {
    Stored,
    Failed(String),
}

impl CacheWrite {
    /// Log and convert a store result.
    pub fn from_result(what: &str, user_id: &str, result: crate::Result<()>) -> Self {
        match result {
            Ok(()) => CacheWrite::Stored,
            Err(e) => {
                tracing::warn!(user_id, cache = what, error = %e, "Failed to write cache snapshot");
                CacheWrite::Failed(e.to_string())
            }
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, CacheWrite::Stored)
    }
}
