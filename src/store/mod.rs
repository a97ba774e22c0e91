pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub meta: sled::Tree,
    pub courses: sled::Tree,
    pub containers: sled::Tree,
    pub course_containers: sled::Tree,
    pub units: sled::Tree,
    pub container_units: sled::Tree,
    pub variant_index: sled::Tree,
    pub completions: sled::Tree,
    pub attempt_history: sled::Tree,
    pub unit_views: sled::Tree,
    pub course_progress: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn conflict(entity: &str, key: &str) -> Self {
        Self::Conflict {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(error: TransactionError<StoreError>) -> Self {
        match error {
            TransactionError::Abort(store_error) => store_error,
            TransactionError::Storage(storage_error) => StoreError::Sled(storage_error),
        }
    }
}

/// 在事务闭包中终止事务并携带 StoreError
pub(crate) fn abort<T>(error: StoreError) -> Result<T, ConflictableTransactionError<StoreError>> {
    Err(ConflictableTransactionError::Abort(error))
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let meta = db.open_tree(trees::META)?;
        let courses = db.open_tree(trees::COURSES)?;
        let containers = db.open_tree(trees::CONTAINERS)?;
        let course_containers = db.open_tree(trees::COURSE_CONTAINERS)?;
        let units = db.open_tree(trees::UNITS)?;
        let container_units = db.open_tree(trees::CONTAINER_UNITS)?;
        let variant_index = db.open_tree(trees::VARIANT_INDEX)?;
        let completions = db.open_tree(trees::COMPLETIONS)?;
        let attempt_history = db.open_tree(trees::ATTEMPT_HISTORY)?;
        let unit_views = db.open_tree(trees::UNIT_VIEWS)?;
        let course_progress = db.open_tree(trees::COURSE_PROGRESS)?;

        Ok(Self {
            db,
            meta,
            courses,
            containers,
            course_containers,
            units,
            container_units,
            variant_index,
            completions,
            attempt_history,
            unit_views,
            course_progress,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// 事务内反序列化，错误转换为可终止事务的形式
    pub(crate) fn tx_deserialize<T: DeserializeOwned>(
        bytes: &[u8],
    ) -> Result<T, ConflictableTransactionError<StoreError>> {
        serde_json::from_slice(bytes)
            .map_err(|error| ConflictableTransactionError::Abort(StoreError::Serialization(error)))
    }

    pub(crate) fn tx_serialize<T: Serialize>(
        value: &T,
    ) -> Result<Vec<u8>, ConflictableTransactionError<StoreError>> {
        serde_json::to_vec(value)
            .map_err(|error| ConflictableTransactionError::Abort(StoreError::Serialization(error)))
    }
}
