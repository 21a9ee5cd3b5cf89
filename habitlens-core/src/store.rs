//! Storage seams used by the analytics core
//!
//! Every analytics component receives the stores it needs at construction
//! time instead of reaching for a shared data-access object. [`Database`]
//! implements all of them on SQLite; tests substitute fakes where failure
//! injection is needed.
//!
//! [`Database`]: crate::db::Database

use crate::analytics::correlation::CorrelationAnalysis;
use crate::analytics::patterns::PatternSnapshot;
use crate::analytics::risk::PredictionSnapshot;
use crate::error::Result;
use crate::types::{
    ActivityRecord, Notification, NotificationFilter, NotificationType, Suggestion,
    SuggestionFlags, SuggestionPurge, UserProfile,
};
use chrono::{DateTime, Utc};

/// Read-only query surface over activity records.
pub trait ActivityRepository: Send + Sync {
    /// Activities for `user_id` with `start <= started_at < end`, oldest first.
    fn activities_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>>;
}

/// Enumerates users for scheduled batch work.
pub trait UserDirectory: Send + Sync {
    fn list_users(&self) -> Result<Vec<UserProfile>>;

    /// Users that opted into scheduled risk predictions.
    fn list_prediction_users(&self) -> Result<Vec<UserProfile>>;
}

/// Cache of the latest detected patterns per user.
pub trait PatternStore: Send + Sync {
    fn upsert_patterns(&self, user_id: &str, snapshot: &PatternSnapshot) -> Result<()>;

    fn latest_patterns(&self, user_id: &str) -> Result<Option<PatternSnapshot>>;
}

/// Persistent suggestion storage.
pub trait SuggestionStore: Send + Sync {
    /// Delete the user's suggestions matching any condition of `purge`.
    fn delete_suggestions(&self, user_id: &str, purge: &SuggestionPurge) -> Result<usize>;

    /// Unread, not-acted-on suggestions that have not expired at `now`.
    fn find_active_suggestions(&self, user_id: &str, now: DateTime<Utc>)
        -> Result<Vec<Suggestion>>;

    /// Insert suggestions, returning how many were stored.
    fn create_suggestions(&self, suggestions: &[Suggestion]) -> Result<usize>;

    fn get_suggestion(&self, user_id: &str, id: &str) -> Result<Option<Suggestion>>;

    /// Apply flag changes; returns the updated suggestion, `None` if unknown.
    fn update_suggestion_flags(
        &self,
        user_id: &str,
        id: &str,
        flags: SuggestionFlags,
    ) -> Result<Option<Suggestion>>;

    /// Set `is_acted_on` and record `activity` atomically.
    ///
    /// The activity is only stored when this call flipped the flag; the bool
    /// reports whether it did. `None` if the suggestion is unknown.
    fn mark_acted_on(
        &self,
        user_id: &str,
        id: &str,
        activity: Option<&ActivityRecord>,
    ) -> Result<Option<(Suggestion, bool)>>;
}

/// Cache of the latest correlation analysis per user.
pub trait CorrelationStore: Send + Sync {
    fn upsert_correlations(&self, user_id: &str, analysis: &CorrelationAnalysis) -> Result<()>;
}

/// Latest risk prediction snapshot per user.
pub trait PredictionStore: Send + Sync {
    fn upsert_predictions(&self, user_id: &str, snapshot: &PredictionSnapshot) -> Result<()>;

    fn latest_predictions(&self, user_id: &str) -> Result<Option<PredictionSnapshot>>;
}

/// Persistent notification storage.
pub trait NotificationStore: Send + Sync {
    fn create_notification(&self, notification: &Notification) -> Result<()>;

    fn get_notification(&self, user_id: &str, id: &str) -> Result<Option<Notification>>;

    /// Newest first.
    fn list_notifications(
        &self,
        user_id: &str,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>>;

    /// Replace the stored `read` flag and `action_data`; false if unknown.
    fn update_notification(&self, notification: &Notification) -> Result<bool>;

    fn delete_notification(&self, user_id: &str, id: &str) -> Result<bool>;

    fn count_notifications(&self, user_id: &str, filter: &NotificationFilter) -> Result<i64>;

    fn latest_notification_of_type(
        &self,
        user_id: &str,
        notification_type: NotificationType,
    ) -> Result<Option<Notification>>;

    /// Delete read notifications (all users) created before `cutoff`.
    fn delete_read_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
