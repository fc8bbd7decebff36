//! Deployment stage identifier

use crate::error::StoreError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

static STAGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,31}$").expect("stage pattern is valid"));

/// Named deployment environment partition (`dev`, `prod`, ...)
///
/// Selected once per provisioning run and immutable for that run. Stage
/// names appear in resource names, tags and (stage-scoped) parameter keys,
/// so they are restricted to lowercase alphanumerics and dashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Stage(String);

impl Stage {
    /// Validate and create a stage
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidStage`] for empty, uppercase, or
    /// otherwise non-conforming names.
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StoreError::InvalidStage {
                stage: name,
                reason: "stage must not be empty",
            });
        }
        if !STAGE_PATTERN.is_match(&name) {
            return Err(StoreError::InvalidStage {
                stage: name,
                reason: "expected lowercase letters, digits and '-', starting with a letter",
            });
        }
        Ok(Self(name))
    }

    /// Stage name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Stage {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Stage {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        stage.0
    }
}

impl AsRef<str> for Stage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conventional_names() {
        for name in ["dev", "prod", "qa-2", "feature-x"] {
            assert!(Stage::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["", "Dev", "2dev", "dev/prod", "dev_1", "dev prod"] {
            assert!(Stage::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn serde_roundtrip_validates() {
        let stage: Stage = serde_json::from_str("\"prod\"").unwrap();
        assert_eq!(stage.as_str(), "prod");
        assert!(serde_json::from_str::<Stage>("\"PROD\"").is_err());
    }
}
