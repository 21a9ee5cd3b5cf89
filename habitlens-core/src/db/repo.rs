//! Database repository layer
//!
//! Provides user and activity operations plus the SQLite implementation of
//! every storage trait in [`crate::store`].

use crate::analytics::correlation::CorrelationAnalysis;
use crate::analytics::patterns::PatternSnapshot;
use crate::analytics::risk::PredictionSnapshot;
use crate::error::{Error, Result};
use crate::store::{
    ActivityRepository, CorrelationStore, NotificationStore, PatternStore, PredictionStore,
    SuggestionStore, UserDirectory,
};
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// Fixed-precision RFC 3339 so stored timestamps sort as text.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, message.into())
}

fn get_ts(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(format!("{}: {}", column, e)))
}

fn get_enum<T: FromStr<Err = String>>(row: &Row, column: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    raw.parse().map_err(conversion_error)
}

fn get_json(row: &Row, column: &str) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(format!("{}: {}", column, e)))
}

/// Database handle (single connection behind a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        super::schema::run_migrations(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    // ============================================
    // User operations
    // ============================================

    /// Insert or update a user
    pub fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (id, display_name, predictions_enabled, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                predictions_enabled = excluded.predictions_enabled
            "#,
            params![
                user.id,
                user.display_name,
                user.predictions_enabled,
                ts(user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM users WHERE id = ?", [id], Self::row_to_user)
            .optional()
            .map_err(Error::from)
    }

    /// Like [`get_user`](Self::get_user), but a missing user is an error.
    pub fn require_user(&self, id: &str) -> Result<UserProfile> {
        self.get_user(id)?
            .ok_or_else(|| Error::UserNotFound(id.to_string()))
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<UserProfile> {
        Ok(UserProfile {
            id: row.get("id")?,
            display_name: row.get("display_name")?,
            predictions_enabled: row.get("predictions_enabled")?,
            created_at: get_ts(row, "created_at")?,
        })
    }

    // ============================================
    // Activity operations
    // ============================================

    pub fn insert_activity(&self, activity: &ActivityRecord) -> Result<()> {
        let conn = self.conn()?;
        Self::insert_activity_with(&conn, activity)?;
        Ok(())
    }

    /// Insert many activities in one transaction; returns how many were new.
    pub fn insert_activities(&self, activities: &[ActivityRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for activity in activities {
            inserted += Self::insert_activity_with(&tx, activity)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn insert_activity_with(conn: &Connection, activity: &ActivityRecord) -> Result<usize> {
        activity.validate()?;
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO activities
                (id, user_id, category, started_at, duration_minutes, source, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                activity.id,
                activity.user_id,
                activity.category,
                ts(activity.started_at),
                activity.duration_minutes,
                activity.source.as_str(),
                activity.confidence,
            ],
        )?;
        Ok(changed)
    }

    pub fn count_activities(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn row_to_activity(row: &Row) -> rusqlite::Result<ActivityRecord> {
        Ok(ActivityRecord {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            category: row.get("category")?,
            started_at: get_ts(row, "started_at")?,
            duration_minutes: row.get("duration_minutes")?,
            source: get_enum(row, "source")?,
            confidence: row.get("confidence")?,
        })
    }

    // ============================================
    // Suggestion helpers
    // ============================================

    fn get_suggestion_with(
        conn: &Connection,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Suggestion>> {
        conn.query_row(
            "SELECT * FROM suggestions WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
            Self::row_to_suggestion,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_suggestion(row: &Row) -> rusqlite::Result<Suggestion> {
        Ok(Suggestion {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            suggestion_type: get_enum(row, "suggestion_type")?,
            category: row.get("category")?,
            title: row.get("title")?,
            message: row.get("message")?,
            priority: get_enum(row, "priority")?,
            timing: get_enum(row, "timing")?,
            confidence: row.get("confidence")?,
            action_type: get_enum(row, "action_type")?,
            created_at: get_ts(row, "created_at")?,
            expires_at: get_ts(row, "expires_at")?,
            is_read: row.get("is_read")?,
            is_acted_on: row.get("is_acted_on")?,
        })
    }

    // ============================================
    // Notification helpers
    // ============================================

    fn notification_where(
        user_id: &str,
        filter: &NotificationFilter,
    ) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = String::from(" WHERE user_id = ?");
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.to_string())];

        if filter.unread_only {
            sql.push_str(" AND read = 0");
        }

        if let Some(notification_type) = filter.notification_type {
            sql.push_str(" AND notification_type = ?");
            params.push(Box::new(notification_type.as_str().to_string()));
        }

        if let Some(since) = filter.since {
            sql.push_str(" AND created_at >= ?");
            params.push(Box::new(ts(since)));
        }

        (sql, params)
    }

    fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
        Ok(Notification {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            notification_type: get_enum(row, "notification_type")?,
            title: row.get("title")?,
            message: row.get("message")?,
            action_data: get_json(row, "action_data")?,
            read: row.get("read")?,
            created_at: get_ts(row, "created_at")?,
        })
    }

    // ============================================
    // Snapshot helpers
    // ============================================

    fn upsert_snapshot(
        &self,
        table: &str,
        column: &str,
        user_id: &str,
        json: String,
        analyzed_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {table} (user_id, {column}, analyzed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     {column} = excluded.{column},
                     analyzed_at = excluded.analyzed_at"
            ),
            params![user_id, json, ts(analyzed_at)],
        )?;
        Ok(())
    }

    fn latest_snapshot(&self, table: &str, column: &str, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {column} FROM {table} WHERE user_id = ?"),
            [user_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(Error::from)
    }
}

impl ActivityRepository for Database {
    fn activities_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM activities
            WHERE user_id = ?1 AND started_at >= ?2 AND started_at < ?3
            ORDER BY started_at, id
            "#,
        )?;
        let activities = stmt
            .query_map(params![user_id, ts(start), ts(end)], Self::row_to_activity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(activities)
    }
}

impl UserDirectory for Database {
    fn list_users(&self) -> Result<Vec<UserProfile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn list_prediction_users(&self) -> Result<Vec<UserProfile>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM users WHERE predictions_enabled = 1 ORDER BY id")?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

impl PatternStore for Database {
    fn upsert_patterns(&self, user_id: &str, snapshot: &PatternSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.upsert_snapshot(
            "pattern_snapshots",
            "snapshot",
            user_id,
            json,
            snapshot.analyzed_at,
        )
    }

    fn latest_patterns(&self, user_id: &str) -> Result<Option<PatternSnapshot>> {
        match self.latest_snapshot("pattern_snapshots", "snapshot", user_id)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl CorrelationStore for Database {
    fn upsert_correlations(&self, user_id: &str, analysis: &CorrelationAnalysis) -> Result<()> {
        let json = serde_json::to_string(analysis)?;
        self.upsert_snapshot(
            "correlation_snapshots",
            "analysis",
            user_id,
            json,
            analysis.analysis_date,
        )
    }
}

impl PredictionStore for Database {
    fn upsert_predictions(&self, user_id: &str, snapshot: &PredictionSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.upsert_snapshot(
            "prediction_snapshots",
            "snapshot",
            user_id,
            json,
            snapshot.analyzed_at,
        )
    }

    fn latest_predictions(&self, user_id: &str) -> Result<Option<PredictionSnapshot>> {
        match self.latest_snapshot("prediction_snapshots", "snapshot", user_id)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl SuggestionStore for Database {
    fn delete_suggestions(&self, user_id: &str, purge: &SuggestionPurge) -> Result<usize> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.to_string())];

        if let Some(created_before) = purge.created_before {
            conditions.push("created_at < ?");
            params.push(Box::new(ts(created_before)));
        }
        if let Some(expired_at) = purge.expired_at {
            conditions.push("expires_at <= ?");
            params.push(Box::new(ts(expired_at)));
        }
        if purge.read {
            conditions.push("is_read = 1");
        }
        if purge.acted_on {
            conditions.push("is_acted_on = 1");
        }
        if conditions.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM suggestions WHERE user_id = ? AND ({})",
            conditions.join(" OR ")
        );
        let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let conn = self.conn()?;
        let deleted = conn.execute(&sql, params_refs.as_slice())?;
        Ok(deleted)
    }

    fn find_active_suggestions(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Suggestion>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM suggestions
            WHERE user_id = ?1 AND is_read = 0 AND is_acted_on = 0 AND expires_at > ?2
            ORDER BY created_at, id
            "#,
        )?;
        let suggestions = stmt
            .query_map(params![user_id, ts(now)], Self::row_to_suggestion)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(suggestions)
    }

    fn create_suggestions(&self, suggestions: &[Suggestion]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut created = 0;
        {
            // Rows colliding with an active suggestion are skipped by the unique index
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO suggestions
                    (id, user_id, suggestion_type, category, title, message, priority, timing,
                     confidence, action_type, created_at, expires_at, is_read, is_acted_on)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
            )?;
            for s in suggestions {
                created += stmt.execute(params![
                    s.id,
                    s.user_id,
                    s.suggestion_type.as_str(),
                    s.category,
                    s.title,
                    s.message,
                    s.priority.as_str(),
                    s.timing.as_str(),
                    s.confidence,
                    s.action_type.as_str(),
                    ts(s.created_at),
                    ts(s.expires_at),
                    s.is_read,
                    s.is_acted_on,
                ])?;
            }
        }
        tx.commit()?;
        Ok(created)
    }

    fn get_suggestion(&self, user_id: &str, id: &str) -> Result<Option<Suggestion>> {
        let conn = self.conn()?;
        Self::get_suggestion_with(&conn, user_id, id)
    }

    fn update_suggestion_flags(
        &self,
        user_id: &str,
        id: &str,
        flags: SuggestionFlags,
    ) -> Result<Option<Suggestion>> {
        let conn = self.conn()?;
        if let Some(is_read) = flags.is_read {
            conn.execute(
                "UPDATE suggestions SET is_read = ?1 WHERE user_id = ?2 AND id = ?3",
                params![is_read, user_id, id],
            )?;
        }
        if let Some(is_acted_on) = flags.is_acted_on {
            conn.execute(
                "UPDATE suggestions SET is_acted_on = ?1 WHERE user_id = ?2 AND id = ?3",
                params![is_acted_on, user_id, id],
            )?;
        }
        Self::get_suggestion_with(&conn, user_id, id)
    }

    fn mark_acted_on(
        &self,
        user_id: &str,
        id: &str,
        activity: Option<&ActivityRecord>,
    ) -> Result<Option<(Suggestion, bool)>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let flipped = tx.execute(
            "UPDATE suggestions SET is_acted_on = 1 WHERE user_id = ?1 AND id = ?2 AND is_acted_on = 0",
            params![user_id, id],
        )? > 0;
        if flipped {
            if let Some(activity) = activity {
                Self::insert_activity_with(&tx, activity)?;
            }
        }
        let suggestion = Self::get_suggestion_with(&tx, user_id, id)?;
        tx.commit()?;
        Ok(suggestion.map(|s| (s, flipped)))
    }
}

impl NotificationStore for Database {
    fn create_notification(&self, notification: &Notification) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO notifications
                (id, user_id, notification_type, title, message, action_data, read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                notification.id,
                notification.user_id,
                notification.notification_type.as_str(),
                notification.title,
                notification.message,
                notification.action_data.to_string(),
                notification.read,
                ts(notification.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_notification(&self, user_id: &str, id: &str) -> Result<Option<Notification>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM notifications WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
            Self::row_to_notification,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_notifications(
        &self,
        user_id: &str,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        let (clause, params) = Self::notification_where(user_id, filter);
        let mut sql = format!(
            "SELECT * FROM notifications{} ORDER BY created_at DESC, id DESC",
            clause
        );
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let notifications = stmt
            .query_map(params_refs.as_slice(), Self::row_to_notification)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    fn update_notification(&self, notification: &Notification) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET read = ?1, action_data = ?2 WHERE user_id = ?3 AND id = ?4",
            params![
                notification.read,
                notification.action_data.to_string(),
                notification.user_id,
                notification.id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_notification(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM notifications WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        Ok(changed > 0)
    }

    fn count_notifications(&self, user_id: &str, filter: &NotificationFilter) -> Result<i64> {
        let (clause, params) = Self::notification_where(user_id, filter);
        let sql = format!("SELECT COUNT(*) FROM notifications{}", clause);
        let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let conn = self.conn()?;
        let count = conn.query_row(&sql, params_refs.as_slice(), |r| r.get(0))?;
        Ok(count)
    }

    fn latest_notification_of_type(
        &self,
        user_id: &str,
        notification_type: NotificationType,
    ) -> Result<Option<Notification>> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT * FROM notifications
            WHERE user_id = ?1 AND notification_type = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            params![user_id, notification_type.as_str()],
            Self::row_to_notification,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_read_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM notifications WHERE read = 1 AND created_at < ?",
            [ts(cutoff)],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn create_test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.upsert_user(&UserProfile::new("user-1")).unwrap();
        db
    }

    fn create_test_suggestion(category: &str, created_at: DateTime<Utc>) -> Suggestion {
        Suggestion {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "user-1".to_string(),
            suggestion_type: SuggestionType::UpcomingHabit,
            category: category.to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            priority: Priority::Medium,
            timing: Timing::Upcoming,
            confidence: 0.5,
            action_type: ActionType::LogActivity,
            created_at,
            expires_at: created_at + Timing::Upcoming.ttl(),
            is_read: false,
            is_acted_on: false,
        }
    }

    #[test]
    fn test_user_round_trip() {
        let db = create_test_db();
        let mut user = UserProfile::new("user-2");
        user.display_name = Some("Sam".to_string());
        user.predictions_enabled = false;
        db.upsert_user(&user).unwrap();

        let loaded = db.get_user("user-2").unwrap().unwrap();
        assert_eq!(loaded.display_name.as_deref(), Some("Sam"));
        assert!(!loaded.predictions_enabled);
        assert!(matches!(
            db.require_user("nobody"),
            Err(Error::UserNotFound(_))
        ));

        let all: Vec<_> = db.list_users().unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(all, vec!["user-1", "user-2"]);
        let opted_in: Vec<_> = db
            .list_prediction_users()
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(opted_in, vec!["user-1"]);
    }

    #[test]
    fn test_activities_in_range_is_half_open_and_ordered() {
        let db = create_test_db();
        let activities = vec![
            ActivityRecord::new("user-1", "reading", at(3, 20), 30.0),
            ActivityRecord::new("user-1", "exercise", at(3, 7), 45.0),
            ActivityRecord::new("user-1", "exercise", at(5, 7), 45.0),
            ActivityRecord::new("user-1", "exercise", at(1, 7), 45.0),
        ];
        assert_eq!(db.insert_activities(&activities).unwrap(), 4);
        // Re-importing the same records is a no-op
        assert_eq!(db.insert_activities(&activities).unwrap(), 0);
        assert_eq!(db.count_activities("user-1").unwrap(), 4);

        let found = db.activities_in_range("user-1", at(1, 7), at(5, 7)).unwrap();
        let starts: Vec<_> = found.iter().map(|a| a.started_at).collect();
        assert_eq!(starts, vec![at(1, 7), at(3, 7), at(3, 20)]);
        assert_eq!(found[0], activities[3]);
    }

    #[test]
    fn test_activity_for_unknown_user_is_rejected() {
        let db = create_test_db();
        let orphan = ActivityRecord::new("ghost", "exercise", at(1, 7), 30.0);
        assert!(matches!(
            db.insert_activity(&orphan),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_invalid_activity_is_rejected_before_insert() {
        let db = create_test_db();
        let zero = ActivityRecord::new("user-1", "exercise", at(1, 7), 0.0);
        let blank = ActivityRecord::new("user-1", "  ", at(1, 7), 30.0);
        let valid = ActivityRecord::new("user-1", "exercise", at(2, 7), 30.0);

        assert!(matches!(db.insert_activity(&zero), Err(Error::Validation(_))));
        assert!(matches!(
            db.insert_activities(&[valid, blank]),
            Err(Error::Validation(_))
        ));
        // The failed batch is rolled back as a whole
        assert_eq!(db.count_activities("user-1").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_active_suggestion_is_ignored() {
        let db = create_test_db();
        let first = create_test_suggestion("reading", at(3, 12));
        let duplicate = create_test_suggestion("reading", at(3, 12));
        let other = create_test_suggestion("exercise", at(3, 12));

        assert_eq!(db.create_suggestions(&[first.clone()]).unwrap(), 1);
        assert_eq!(db.create_suggestions(&[duplicate, other]).unwrap(), 1);

        // Once read, the slot frees up
        db.update_suggestion_flags(
            "user-1",
            &first.id,
            SuggestionFlags {
                is_read: Some(true),
                is_acted_on: None,
            },
        )
        .unwrap();
        let again = create_test_suggestion("reading", at(3, 12));
        assert_eq!(db.create_suggestions(&[again]).unwrap(), 1);

        let active = db.find_active_suggestions("user-1", at(3, 13)).unwrap();
        assert_eq!(active.len(), 2);
        assert!(db.find_active_suggestions("user-1", at(3, 18)).unwrap().is_empty());
    }

    #[test]
    fn test_purge_matches_any_condition() {
        let db = create_test_db();
        let old = create_test_suggestion("a", at(3, 6));
        let read = create_test_suggestion("b", at(3, 11));
        let fresh = create_test_suggestion("c", at(3, 11));
        db.create_suggestions(&[old, read.clone(), fresh.clone()])
            .unwrap();
        db.update_suggestion_flags(
            "user-1",
            &read.id,
            SuggestionFlags {
                is_read: Some(true),
                is_acted_on: None,
            },
        )
        .unwrap();

        let deleted = db
            .delete_suggestions(
                "user-1",
                &SuggestionPurge {
                    created_before: Some(at(3, 8)),
                    expired_at: Some(at(3, 12)),
                    read: true,
                    acted_on: true,
                },
            )
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(db.get_suggestion("user-1", &fresh.id).unwrap().is_some());
        assert_eq!(
            db.delete_suggestions("user-1", &SuggestionPurge::default())
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_update_flags_for_unknown_suggestion() {
        let db = create_test_db();
        let updated = db
            .update_suggestion_flags(
                "user-1",
                "missing",
                SuggestionFlags {
                    is_read: Some(true),
                    is_acted_on: None,
                },
            )
            .unwrap();
        assert!(updated.is_none());
    }

    #[test]
    fn test_mark_acted_on_logs_activity_once() {
        let db = create_test_db();
        let suggestion = create_test_suggestion("reading", at(3, 12));
        db.create_suggestions(&[suggestion.clone()]).unwrap();

        // A failed activity insert leaves the flag unset
        let invalid = ActivityRecord::new("user-1", "reading", at(3, 13), 0.0);
        assert!(matches!(
            db.mark_acted_on("user-1", &suggestion.id, Some(&invalid)),
            Err(Error::Validation(_))
        ));
        let stored = db.get_suggestion("user-1", &suggestion.id).unwrap().unwrap();
        assert!(!stored.is_acted_on);
        assert_eq!(db.count_activities("user-1").unwrap(), 0);

        let record = ActivityRecord::new("user-1", "reading", at(3, 13), 30.0);
        let (acted, flipped) = db
            .mark_acted_on("user-1", &suggestion.id, Some(&record))
            .unwrap()
            .unwrap();
        assert!(acted.is_acted_on);
        assert!(flipped);

        let retry = ActivityRecord::new("user-1", "reading", at(3, 14), 30.0);
        let (_, flipped) = db
            .mark_acted_on("user-1", &suggestion.id, Some(&retry))
            .unwrap()
            .unwrap();
        assert!(!flipped);
        assert_eq!(db.count_activities("user-1").unwrap(), 1);

        assert!(db.mark_acted_on("user-1", "missing", None).unwrap().is_none());
    }

    #[test]
    fn test_notification_filters() {
        let db = create_test_db();
        let alert = |hours_ago: i64, kind: NotificationType| {
            Notification::new(
                "user-1",
                kind,
                "t",
                "m",
                serde_json::json!({"category": "guitar"}),
                at(10, 12) - Duration::hours(hours_ago),
            )
        };
        let newest = alert(1, NotificationType::HabitDegradationAlert);
        let mut older = alert(30, NotificationType::HabitDegradationAlert);
        older.read = true;
        let follow_up = alert(5, NotificationType::InterventionSuggestions);
        for n in [&older, &newest, &follow_up] {
            db.create_notification(n).unwrap();
        }

        let all = db
            .list_notifications("user-1", &NotificationFilter::default())
            .unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![newest.id.as_str(), follow_up.id.as_str(), older.id.as_str()]
        );
        assert_eq!(all[0].action_data["category"], "guitar");

        let unread_habit = NotificationFilter {
            unread_only: true,
            notification_type: Some(NotificationType::HabitDegradationAlert),
            ..Default::default()
        };
        assert_eq!(db.count_notifications("user-1", &unread_habit).unwrap(), 1);

        let limited = NotificationFilter {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(db.list_notifications("user-1", &limited).unwrap().len(), 1);

        let latest = db
            .latest_notification_of_type("user-1", NotificationType::HabitDegradationAlert)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, newest.id);

        assert_eq!(
            db.delete_read_notifications_before(at(10, 12)).unwrap(),
            1
        );
        assert!(db.delete_notification("user-1", &newest.id).unwrap());
        assert!(!db.delete_notification("user-1", &newest.id).unwrap());
    }

    #[test]
    fn test_prediction_snapshot_replaces_previous() {
        let db = create_test_db();
        assert!(db.latest_predictions("user-1").unwrap().is_none());

        for analyzed_at in [at(1, 0), at(2, 0)] {
            db.upsert_predictions(
                "user-1",
                &PredictionSnapshot {
                    predictions: vec![],
                    analyzed_at,
                },
            )
            .unwrap();
        }
        let latest = db.latest_predictions("user-1").unwrap().unwrap();
        assert_eq!(latest.analyzed_at, at(2, 0));
    }
}
