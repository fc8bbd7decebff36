//! Error types for the parameter store

use crate::key::ParameterKey;
use crate::stage::Stage;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Parameter store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No unit has ever published this key
    #[error("parameter not found: {key}")]
    NotFound {
        /// The key that was looked up
        key: ParameterKey,
    },

    /// The key holds a value written by a different stage
    #[error("parameter {key} was written by stage '{found}', expected '{expected}'")]
    StaleDependency {
        /// The key that was looked up
        key: ParameterKey,
        /// Stage the caller is provisioning
        expected: Stage,
        /// Stage that last wrote the key
        found: Stage,
    },

    /// Key path failed validation
    #[error("invalid parameter key '{key}': {reason}")]
    InvalidKey {
        /// Raw key text
        key: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Stage name failed validation
    #[error("invalid stage '{stage}': {reason}")]
    InvalidStage {
        /// Raw stage text
        stage: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Value rejected by the store
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Target key
        key: ParameterKey,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Backing file could not be read or written
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file is not valid JSON
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the key simply has not been published yet
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Key the error refers to, if any
    #[must_use]
    pub fn key(&self) -> Option<&ParameterKey> {
        match self {
            Self::NotFound { key }
            | Self::StaleDependency { key, .. }
            | Self::InvalidValue { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_key() {
        let key = ParameterKey::parse("/app/vpc-id").unwrap();
        let err = StoreError::NotFound { key: key.clone() };
        assert!(err.to_string().contains("/app/vpc-id"));
        assert!(err.is_not_found());
        assert_eq!(err.key(), Some(&key));
    }
}
