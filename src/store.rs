use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Fixed string keys into the record namespace. There is no namespacing by
/// attempt id: a second exam attempt silently overwrites `EXAM_RESULTS`.
pub mod keys {
    pub const STUDENT_NAME: &str = "student_name";
    pub const STUDENT_ROLL: &str = "student_roll";
    pub const ADMIN_ROLL: &str = "admin_roll";
    pub const EXAM_RESULTS: &str = "exam_results";

    pub const EXAM_PROGRESS_PREFIX: &str = "exam_progress_";

    pub fn exam_progress(roll: &str) -> String {
        format!("{}{}", EXAM_PROGRESS_PREFIX, roll)
    }
}

/// Outcome of reading a stored record. Malformed JSON is an explicit,
/// testable branch rather than an unguarded parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    Valid(T),
    Missing,
    Corrupt { reason: String },
}

impl<T> Loaded<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Loaded::Valid(value) => Some(value),
            _ => None,
        }
    }

    /// Treats both missing and corrupt records as hard errors, attributed
    /// to the given key.
    pub fn require(self, key: &str) -> Result<T, AppError> {
        match self {
            Loaded::Valid(value) => Ok(value),
            Loaded::Missing => Err(AppError::NotFound(format!("No record under key '{key}'"))),
            Loaded::Corrupt { reason } => Err(AppError::CorruptRecord {
                key: key.to_string(),
                reason,
            }),
        }
    }
}

/// Narrow read/write interface over the key-value record namespace.
/// `write` overwrites unconditionally; last writer wins.
#[rocket::async_trait]
pub trait RecordStore: Send + Sync {
    async fn write_raw(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn read_raw(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError>;
}

pub type SharedStore = Arc<dyn RecordStore>;

pub async fn write_record<T: Serialize>(
    store: &dyn RecordStore,
    key: &str,
    record: &T,
) -> Result<(), AppError> {
    let text = serde_json::to_string(record)?;
    store.write_raw(key, &text).await
}

pub async fn load_record<T: DeserializeOwned>(
    store: &dyn RecordStore,
    key: &str,
) -> Result<Loaded<T>, AppError> {
    match store.read_raw(key).await? {
        None => Ok(Loaded::Missing),
        Some(text) => match serde_json::from_str(&text) {
            Ok(record) => Ok(Loaded::Valid(record)),
            Err(err) => Ok(Loaded::Corrupt {
                reason: err.to_string(),
            }),
        },
    }
}

/// In-memory store used by tests as a drop-in substitute for the SQLite
/// backed implementation.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl RecordStore for MemoryStore {
    async fn write_raw(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("Record store lock poisoned".to_string()))?;
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>, AppError> {
        let records = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("Record store lock poisoned".to_string()))?;
        Ok(records.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("Record store lock poisoned".to_string()))?;
        records.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let records = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("Record store lock poisoned".to_string()))?;
        Ok(records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
