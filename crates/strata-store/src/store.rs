//! Parameter store boundary

use crate::error::{StoreError, StoreResult};
use crate::key::ParameterKey;
use crate::stage::Stage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored value plus bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Full key path
    pub key: ParameterKey,
    /// Current value
    pub value: String,
    /// Incremented each time the value actually changes
    pub version: u64,
    /// Stage of the run that last wrote the value
    pub written_by: Stage,
    /// Time of the last change
    pub updated_at: DateTime<Utc>,
}

impl ParameterRecord {
    /// Compute the record an upsert of `value` produces
    ///
    /// Writing the same value from the same stage leaves version and
    /// timestamp untouched, so re-applying a unit is a no-op on its keys.
    #[must_use]
    pub fn upsert(
        existing: Option<&ParameterRecord>,
        key: &ParameterKey,
        value: &str,
        writer: &Stage,
    ) -> Self {
        match existing {
            Some(prev) if prev.value == value && prev.written_by == *writer => prev.clone(),
            Some(prev) => Self {
                key: key.clone(),
                value: value.to_string(),
                version: prev.version + 1,
                written_by: writer.clone(),
                updated_at: Utc::now(),
            },
            None => Self {
                key: key.clone(),
                value: value.to_string(),
                version: 1,
                written_by: writer.clone(),
                updated_at: Utc::now(),
            },
        }
    }
}

/// Shared hierarchical key-value service
///
/// Last write wins per key. There are no multi-key transactions: callers
/// must treat every key independently.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Idempotent upsert; returns the stored value
    async fn put(&self, key: &ParameterKey, value: &str, writer: &Stage) -> StoreResult<String>;

    /// Current record, or [`StoreError::NotFound`]
    async fn get(&self, key: &ParameterKey) -> StoreResult<ParameterRecord>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &ParameterKey) -> StoreResult<bool>;

    /// All records at or below `prefix`, sorted by key
    async fn list(&self, prefix: &ParameterKey) -> StoreResult<Vec<ParameterRecord>>;

    /// Value of `key`, rejecting values another stage wrote
    async fn get_for_stage(&self, key: &ParameterKey, stage: &Stage) -> StoreResult<String> {
        let record = self.get(key).await?;
        if record.written_by != *stage {
            return Err(StoreError::StaleDependency {
                key: record.key,
                expected: stage.clone(),
                found: record.written_by,
            });
        }
        Ok(record.value)
    }

    /// Whether `key` has been published
    async fn contains(&self, key: &ParameterKey) -> StoreResult<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn check_value(key: &ParameterKey, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::InvalidValue {
            key: key.clone(),
            reason: "value must not be empty",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ParameterKey {
        ParameterKey::parse("/app/vpc-id").unwrap()
    }

    #[test]
    fn upsert_same_value_keeps_version() {
        let dev = Stage::new("dev").unwrap();
        let first = ParameterRecord::upsert(None, &key(), "vpc-1", &dev);
        let again = ParameterRecord::upsert(Some(&first), &key(), "vpc-1", &dev);
        assert_eq!(first, again);
        assert_eq!(again.version, 1);
    }

    #[test]
    fn upsert_new_value_bumps_version() {
        let dev = Stage::new("dev").unwrap();
        let first = ParameterRecord::upsert(None, &key(), "vpc-1", &dev);
        let second = ParameterRecord::upsert(Some(&first), &key(), "vpc-2", &dev);
        assert_eq!(second.version, 2);
        assert_eq!(second.value, "vpc-2");
    }

    #[test]
    fn upsert_from_other_stage_bumps_version() {
        let dev = Stage::new("dev").unwrap();
        let prod = Stage::new("prod").unwrap();
        let first = ParameterRecord::upsert(None, &key(), "vpc-1", &dev);
        let second = ParameterRecord::upsert(Some(&first), &key(), "vpc-1", &prod);
        assert_eq!(second.version, 2);
        assert_eq!(second.written_by, prod);
    }
}
