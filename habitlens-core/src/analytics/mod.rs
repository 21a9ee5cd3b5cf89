//! Behavioral analytics for habitlens
//!
//! Provides:
//! - Daily, weekly, per-category and sequential pattern detection
//! - Deviations of today's activity from those patterns
//! - Suggestion generation and lifecycle
//! - Pairwise category correlation and predictive insights
//! - Habit degradation risk scoring
//!
//! ## Data flow
//!
//! Activity records feed [`patterns`] and [`correlation`] independently.
//! Detected patterns feed [`deviations`], and both feed [`suggestions`].
//! Correlations feed [`predictive`]. [`risk`] reads activity directly and
//! its predictions drive [`crate::alerts`].
//!
//! Everything here except the suggestion lifecycle is derived state:
//! stored snapshots are caches that can be rebuilt from activity at any time.

pub mod correlation;
pub mod deviations;
pub mod patterns;
pub mod predictive;
pub mod risk;
pub mod suggestions;

pub use correlation::{
    Correlation, CorrelationAnalysis, CorrelationAnalyzer, CorrelationInsights, Direction,
    Significance, Strength,
};
pub use deviations::{detect_deviations, Deviation};
pub use patterns::{
    CategoryPattern, DailyPattern, DetectedPatterns, PatternDetector, PatternSnapshot,
    SequencePattern, WeeklyPattern,
};
pub use predictive::{Outlook, PredictiveInsight};
pub use risk::{Prediction, PredictionSnapshot, RiskScorer, WeekStats};
pub use suggestions::{ActedSuggestion, SuggestionEngine};
