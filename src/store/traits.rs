//! `Database` trait — the async interface to the external record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;

/// A feature users can star.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    pub star_count: i64,
}

/// Per-user email preferences, keyed by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPref {
    pub email: String,
    pub notify_as_starrer: bool,
    /// Set when mail to this address bounced. Never cleared here.
    pub bounced: bool,
    pub updated_at: DateTime<Utc>,
}

impl UserPref {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            notify_as_starrer: true,
            bounced: false,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Features ────────────────────────────────────────────────────

    /// Insert a feature and return it with its assigned id.
    async fn insert_feature(&self, name: &str) -> Result<Feature, DatabaseError>;

    /// Get a feature by id.
    async fn get_feature(&self, id: i64) -> Result<Option<Feature>, DatabaseError>;

    // ── Stars ───────────────────────────────────────────────────────

    /// Ids of features `email` has starred, ascending.
    async fn get_user_stars(&self, email: &str) -> Result<Vec<i64>, DatabaseError>;

    /// Star or unstar a feature. Only a change of state touches the
    /// feature's `star_count`.
    async fn set_star(
        &self,
        email: &str,
        feature_id: i64,
        starred: bool,
    ) -> Result<(), DatabaseError>;

    // ── User preferences ────────────────────────────────────────────

    /// Preferences for each address, creating default records for any that
    /// do not exist yet. Results follow the order of `emails`.
    async fn get_prefs_for_emails(&self, emails: &[String])
    -> Result<Vec<UserPref>, DatabaseError>;

    /// Insert or replace a preference record.
    async fn save_user_pref(&self, pref: &UserPref) -> Result<(), DatabaseError>;
}
