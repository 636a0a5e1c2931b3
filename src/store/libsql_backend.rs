//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, Feature, UserPref};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn find_user_pref(&self, email: &str) -> Result<Option<UserPref>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_PREF_COLUMNS} FROM user_prefs WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_user_pref: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user_pref(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_user_pref: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const FEATURE_COLUMNS: &str = "id, name, star_count";

const USER_PREF_COLUMNS: &str = "email, notify_as_starrer, bounced, updated_at";

fn row_to_feature(row: &libsql::Row) -> Result<Feature, libsql::Error> {
    Ok(Feature {
        id: row.get(0)?,
        name: row.get(1)?,
        star_count: row.get(2)?,
    })
}

fn row_to_user_pref(row: &libsql::Row) -> Result<UserPref, libsql::Error> {
    let notify: i64 = row.get(1)?;
    let bounced: i64 = row.get(2)?;
    let updated_str: String = row.get(3)?;
    Ok(UserPref {
        email: row.get(0)?,
        notify_as_starrer: notify != 0,
        bounced: bounced != 0,
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Features ────────────────────────────────────────────────────

    async fn insert_feature(&self, name: &str) -> Result<Feature, DatabaseError> {
        let conn = self.conn();
        conn.execute("INSERT INTO features (name) VALUES (?1)", params![name])
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_feature: {e}")))?;
        let id = conn.last_insert_rowid();
        debug!(id, name, "Feature inserted");
        Ok(Feature {
            id,
            name: name.to_string(),
            star_count: 0,
        })
    }

    async fn get_feature(&self, id: i64) -> Result<Option<Feature>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {FEATURE_COLUMNS} FROM features WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_feature: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_feature(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_feature: {e}"))),
        }
    }

    // ── Stars ───────────────────────────────────────────────────────

    async fn get_user_stars(&self, email: &str) -> Result<Vec<i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT feature_id FROM feature_stars
                 WHERE email = ?1 AND starred = 1
                 ORDER BY feature_id ASC",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_stars: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_stars: {e}")))?
        {
            let id: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn set_star(
        &self,
        email: &str,
        feature_id: i64,
        starred: bool,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        // Each statement reports one changed row only on an actual state
        // change, which is what gates the counter update below.
        let changed = if starred {
            conn.execute(
                "INSERT INTO feature_stars (email, feature_id, starred, updated_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(email, feature_id) DO UPDATE SET starred = 1, updated_at = ?3
                 WHERE feature_stars.starred = 0",
                params![email, feature_id, now],
            )
            .await
        } else {
            conn.execute(
                "UPDATE feature_stars SET starred = 0, updated_at = ?3
                 WHERE email = ?1 AND feature_id = ?2 AND starred = 1",
                params![email, feature_id, now],
            )
            .await
        }
        .map_err(|e| DatabaseError::Query(format!("set_star: {e}")))?;

        if changed == 0 {
            debug!(email, feature_id, starred, "Star unchanged");
            return Ok(());
        }

        let delta: i64 = if starred { 1 } else { -1 };
        conn.execute(
            "UPDATE features SET star_count = MAX(star_count + ?1, 0) WHERE id = ?2",
            params![delta, feature_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_star count: {e}")))?;

        debug!(email, feature_id, starred, "Star updated");
        Ok(())
    }

    // ── User preferences ────────────────────────────────────────────

    async fn get_prefs_for_emails(
        &self,
        emails: &[String],
    ) -> Result<Vec<UserPref>, DatabaseError> {
        let mut prefs = Vec::with_capacity(emails.len());
        for email in emails {
            match self.find_user_pref(email).await? {
                Some(pref) => prefs.push(pref),
                None => {
                    let pref = UserPref::new(email.clone());
                    self.conn()
                        .execute(
                            "INSERT OR IGNORE INTO user_prefs
                                (email, notify_as_starrer, bounced, updated_at)
                             VALUES (?1, ?2, ?3, ?4)",
                            params![
                                email.clone(),
                                i64::from(pref.notify_as_starrer),
                                i64::from(pref.bounced),
                                pref.updated_at.to_rfc3339(),
                            ],
                        )
                        .await
                        .map_err(|e| DatabaseError::Query(format!("get_prefs_for_emails: {e}")))?;
                    debug!(email = %email, "Created default user pref");
                    // A concurrent writer may have won the insert.
                    prefs.push(self.find_user_pref(email).await?.unwrap_or(pref));
                }
            }
        }
        Ok(prefs)
    }

    async fn save_user_pref(&self, pref: &UserPref) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO user_prefs (email, notify_as_starrer, bounced, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(email) DO UPDATE SET
                    notify_as_starrer = ?2, bounced = ?3, updated_at = ?4",
                params![
                    pref.email.clone(),
                    i64::from(pref.notify_as_starrer),
                    i64::from(pref.bounced),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_user_pref: {e}")))?;
        Ok(())
    }
}
