//! # habitlens-core
//!
//! Core library for habitlens - behavioral analytics over personal activity logs.
//!
//! This library provides:
//! - Domain types for users, activities, suggestions and notifications
//! - Pattern, deviation, correlation and risk analytics
//! - Alert management with throttling
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Activity:** Logged activity records, the only source of truth
//! - **Derived:** Pattern, correlation and prediction snapshots (regenerable caches)
//! - **User-facing:** Suggestions and alerts with their own read/acted lifecycle
//!
//! ## Example
//!
//! ```rust,no_run
//! use habitlens_core::{BehaviorService, Config, Database, Stores};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let service = BehaviorService::new(Stores::from_database(Arc::new(db)), &config);
//! let risk = service.analyze_habit_degradation_risk("alice").expect("analysis failed");
//! ```

// Re-export commonly used items at the crate root
pub use alerts::AlertManager;
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use service::{BehaviorService, Stores};
pub use types::*;

// Public modules
pub mod alerts;
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;
