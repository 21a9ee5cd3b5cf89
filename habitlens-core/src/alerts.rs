//! Risk-driven alerts and follow-up interventions.
//!
//! Alerts are [`Notification`]s of type `habit_degradation_alert`. At most one
//! is raised per user and type within the throttle window, and read alerts
//! are deleted once they pass the retention horizon.

use crate::analytics::risk::Prediction;
use crate::config::{AlertConfig, AnalysisConfig};
use crate::error::{Error, Result};
use crate::store::NotificationStore;
use crate::types::{Notification, NotificationFilter, NotificationType, RiskLevel};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Score at or above which a critical-only pass raises an alert.
pub const CRITICAL_RISK_SCORE: u32 = 70;

const STATISTICS_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatistics {
    pub total: i64,
    pub unread: i64,
    pub habit_alerts: i64,
    pub last_7_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub title: String,
    pub description: String,
}

impl Intervention {
    fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
        }
    }
}

/// Interventions generated for one alert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionPlan {
    pub alert_id: String,
    pub category: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub interventions: Vec<Intervention>,
    /// The persisted `intervention_suggestions` notification
    pub notification: Notification,
}

fn base_interventions() -> Vec<Intervention> {
    vec![
        Intervention::new(
            "Reflect on what changed",
            "Write down one thing that got in the way of this habit recently.",
        ),
        Intervention::new(
            "Lower the barrier",
            "Prepare whatever the habit needs ahead of time so starting takes seconds.",
        ),
        Intervention::new(
            "Log small wins",
            "Record even short sessions so progress stays visible.",
        ),
    ]
}

fn level_interventions(level: Option<RiskLevel>) -> Vec<Intervention> {
    match level {
        Some(RiskLevel::Critical) => vec![
            Intervention::new(
                "Restart today",
                "Do a five-minute version of the habit before the day ends.",
            ),
            Intervention::new(
                "Find an accountability partner",
                "Share your goal with someone who will ask how it went.",
            ),
            Intervention::new(
                "Reset your goal",
                "Pick a target you can hit on your worst day and build up from there.",
            ),
        ],
        Some(RiskLevel::High) => vec![
            Intervention::new(
                "Schedule it",
                "Block time for the next three sessions in your calendar.",
            ),
            Intervention::new(
                "Stack the habit",
                "Do it right after something you already do every day.",
            ),
        ],
        Some(RiskLevel::Medium) => vec![Intervention::new(
            "Set a reminder",
            "Add a reminder at the time you usually do this.",
        )],
        Some(RiskLevel::Low) | None => Vec::new(),
    }
}

pub struct AlertManager {
    store: Arc<dyn NotificationStore>,
    throttle: Duration,
    retention: Duration,
    risk_threshold: u32,
}

impl AlertManager {
    /// Manager with default throttling (24h), retention (30 days) and threshold (50).
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self::with_config(store, &AlertConfig::default(), &AnalysisConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn NotificationStore>,
        alerts: &AlertConfig,
        analysis: &AnalysisConfig,
    ) -> Self {
        Self {
            store,
            throttle: Duration::hours(alerts.throttle_hours),
            retention: Duration::days(alerts.retention_days),
            risk_threshold: analysis.alert_risk_threshold,
        }
    }

    pub fn create(&self, notification: &Notification) -> Result<()> {
        self.store.create_notification(notification)
    }

    pub fn get(&self, user_id: &str, id: &str) -> Result<Notification> {
        self.store
            .get_notification(user_id, id)?
            .ok_or_else(|| Error::AlertNotFound(id.to_string()))
    }

    pub fn list(&self, user_id: &str, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        self.store.list_notifications(user_id, filter)
    }

    pub fn mark_read(&self, user_id: &str, id: &str) -> Result<Notification> {
        let mut notification = self.get(user_id, id)?;
        if !notification.read {
            notification.read = true;
            self.store.update_notification(&notification)?;
        }
        Ok(notification)
    }

    /// Mark every unread notification read; returns how many changed.
    pub fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let unread = self.store.list_notifications(
            user_id,
            &NotificationFilter {
                unread_only: true,
                ..Default::default()
            },
        )?;

        let mut updated = 0;
        for mut notification in unread {
            notification.read = true;
            if self.store.update_notification(&notification)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        if self.store.delete_notification(user_id, id)? {
            Ok(())
        } else {
            Err(Error::AlertNotFound(id.to_string()))
        }
    }

    /// False while an alert of this type is younger than the throttle window.
    pub fn should_send_alert(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let latest = self
            .store
            .latest_notification_of_type(user_id, notification_type)?;
        Ok(match latest {
            Some(previous) => now - previous.created_at >= self.throttle,
            None => true,
        })
    }

    /// Raise at most one alert for the highest-risk prediction at or above
    /// the configured threshold.
    pub fn process_predictions(
        &self,
        user_id: &str,
        predictions: &[Prediction],
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        self.alert_at_least(user_id, predictions, self.risk_threshold, now)
    }

    /// Like [`process_predictions`](Self::process_predictions), for critical predictions only.
    pub fn process_critical(
        &self,
        user_id: &str,
        predictions: &[Prediction],
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        self.alert_at_least(user_id, predictions, CRITICAL_RISK_SCORE, now)
    }

    fn alert_at_least(
        &self,
        user_id: &str,
        predictions: &[Prediction],
        min_score: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        let mut at_risk: Vec<&Prediction> = predictions
            .iter()
            .filter(|p| p.risk_score >= min_score)
            .collect();
        if at_risk.is_empty() {
            return Ok(None);
        }
        at_risk.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

        if !self.should_send_alert(user_id, NotificationType::HabitDegradationAlert, now)? {
            tracing::debug!(user_id, "Habit alert throttled");
            return Ok(None);
        }

        let top = at_risk[0];
        let others: Vec<_> = at_risk[1..]
            .iter()
            .map(|p| {
                json!({
                    "category": p.category,
                    "riskScore": p.risk_score,
                    "riskLevel": p.risk_level,
                })
            })
            .collect();

        let notification = Notification::new(
            user_id,
            NotificationType::HabitDegradationAlert,
            format!("Your {} habit needs attention", top.category),
            top.message.clone(),
            json!({
                "category": top.category,
                "riskScore": top.risk_score,
                "riskLevel": top.risk_level,
                "frequencyTrend": top.frequency_trend,
                "durationTrend": top.duration_trend,
                "consistencyScore": top.consistency_score,
                "daysSinceLastActivity": top.days_since_last_activity,
                "recommendations": top.recommendations,
                "otherAtRiskCategories": others,
            }),
            now,
        );
        self.store.create_notification(&notification)?;

        tracing::info!(
            user_id,
            category = %top.category,
            risk_score = top.risk_score,
            "Habit degradation alert created"
        );
        Ok(Some(notification))
    }

    pub fn statistics(&self, user_id: &str, now: DateTime<Utc>) -> Result<AlertStatistics> {
        let count = |filter: NotificationFilter| self.store.count_notifications(user_id, &filter);
        Ok(AlertStatistics {
            total: count(NotificationFilter::default())?,
            unread: count(NotificationFilter {
                unread_only: true,
                ..Default::default()
            })?,
            habit_alerts: count(NotificationFilter {
                notification_type: Some(NotificationType::HabitDegradationAlert),
                ..Default::default()
            })?,
            last_7_days: count(NotificationFilter {
                since: Some(now - Duration::days(STATISTICS_WINDOW_DAYS)),
                ..Default::default()
            })?,
        })
    }

    /// Build and persist interventions for a habit degradation alert.
    ///
    /// The original alert's payload gets `interventionTriggered: true`.
    pub fn generate_interventions(
        &self,
        user_id: &str,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> Result<InterventionPlan> {
        let mut alert = self.get(user_id, alert_id)?;
        if alert.notification_type != NotificationType::HabitDegradationAlert {
            return Err(Error::Validation(format!(
                "interventions need a {} notification, got {}",
                NotificationType::HabitDegradationAlert.as_str(),
                alert.notification_type.as_str()
            )));
        }

        let category = alert.action_data["category"].as_str().map(str::to_string);
        let risk_level = alert.action_data["riskLevel"]
            .as_str()
            .and_then(|s| s.parse::<RiskLevel>().ok());

        let mut interventions = base_interventions();
        interventions.extend(level_interventions(risk_level));

        let subject = category.as_deref().unwrap_or("your habit");
        let notification = Notification::new(
            user_id,
            NotificationType::InterventionSuggestions,
            format!("Ways to get back on track with {}", subject),
            format!(
                "{} ideas to help you rebuild {}.",
                interventions.len(),
                subject
            ),
            json!({
                "originalAlertId": alert.id,
                "category": category,
                "riskLevel": risk_level,
                "interventions": interventions,
            }),
            now,
        );
        self.store.create_notification(&notification)?;

        if !alert.action_data.is_object() {
            alert.action_data = json!({});
        }
        alert.action_data["interventionTriggered"] = json!(true);
        self.store.update_notification(&alert)?;

        tracing::info!(
            user_id,
            alert_id,
            interventions = interventions.len(),
            "Interventions generated"
        );

        Ok(InterventionPlan {
            alert_id: alert.id,
            category,
            risk_level,
            interventions,
            notification,
        })
    }

    /// Delete read notifications older than the retention horizon.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<usize> {
        let deleted = self
            .store
            .delete_read_notifications_before(now - self.retention)?;
        if deleted > 0 {
            tracing::info!(deleted, "Deleted old read notifications");
        }
        Ok(deleted)
    }
}
