use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Identity;
use crate::store::{Loaded, RecordStore, keys, load_record, write_record};

/// Key-value record store backed by the `kv_records` table.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl RecordStore for SqliteStore {
    #[instrument(skip(self, value))]
    async fn write_raw(&self, key: &str, value: &str) -> Result<(), AppError> {
        info!("Writing record");
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO kv_records (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_raw(&self, key: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT value FROM kv_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), AppError> {
        info!("Deleting record");
        sqlx::query("DELETE FROM kv_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query("SELECT key FROM kv_records WHERE key LIKE ? ESCAPE '\\' ORDER BY key")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get::<String, _>("key")).collect())
    }
}

/// Writes the identity fields under their fixed keys at login.
#[instrument(skip(store))]
pub async fn save_identity(store: &dyn RecordStore, identity: &Identity) -> Result<(), AppError> {
    info!(roll = %identity.roll, "Saving student identity");
    store
        .write_raw(keys::STUDENT_NAME, &identity.display_name)
        .await?;
    store.write_raw(keys::STUDENT_ROLL, &identity.roll).await?;

    Ok(())
}

/// Reads the identity fields back. Both must be present; a partial
/// identity is treated as absent.
#[instrument(skip(store))]
pub async fn load_identity(store: &dyn RecordStore) -> Result<Option<Identity>, AppError> {
    let name = store.read_raw(keys::STUDENT_NAME).await?;
    let roll = store.read_raw(keys::STUDENT_ROLL).await?;

    match (name, roll) {
        (Some(display_name), Some(roll)) if !display_name.is_empty() && !roll.is_empty() => {
            Ok(Some(Identity { display_name, roll }))
        }
        _ => Ok(None),
    }
}

#[instrument(skip(store))]
pub async fn clear_identity(store: &dyn RecordStore) -> Result<(), AppError> {
    info!("Clearing student identity");
    store.delete(keys::STUDENT_NAME).await?;
    store.delete(keys::STUDENT_ROLL).await?;
    store.delete(keys::ADMIN_ROLL).await?;

    Ok(())
}

/// Collects every stored result record for the admin listing. Corrupt
/// entries are skipped rather than failing the whole listing.
#[instrument(skip(store))]
pub async fn load_all_results(
    store: &dyn RecordStore,
) -> Result<Vec<crate::models::ResultRecord>, AppError> {
    let mut results = Vec::new();

    if let Loaded::Valid(record) = load_record(store, keys::EXAM_RESULTS).await? {
        results.push(record);
    }

    Ok(results)
}

pub async fn save_progress(
    store: &dyn RecordStore,
    roll: &str,
    progress: &crate::models::SessionProgress,
) -> Result<(), AppError> {
    write_record(store, &keys::exam_progress(roll), progress).await
}

pub async fn load_progress(
    store: &dyn RecordStore,
    roll: &str,
) -> Result<Loaded<crate::models::SessionProgress>, AppError> {
    load_record(store, &keys::exam_progress(roll)).await
}
