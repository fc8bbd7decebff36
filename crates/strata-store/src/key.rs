//! Hierarchical parameter keys
//!
//! A [`ParameterKey`] is a `/`-separated path such as
//! `/sonarqube-fargate-cdk/dev/vpc-id`. Units never build key strings by
//! hand: they name a [`LogicalKey`] and let a [`KeyNamespace`] place it.

use crate::error::StoreError;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Path separator
pub const SEPARATOR: char = '/';

/// Validated hierarchical key path
///
/// Must start with `/`, contain at least one segment, and every segment
/// must be non-empty and made of `[A-Za-z0-9_.-]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParameterKey(String);

impl ParameterKey {
    /// Parse and validate a key path
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidKey`] describing the first violation.
    pub fn parse(raw: impl Into<String>) -> Result<Self, StoreError> {
        let raw = raw.into();
        if let Err(reason) = validate(&raw) {
            return Err(StoreError::InvalidKey { key: raw, reason });
        }
        Ok(Self(raw))
    }

    /// Key as a path string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, root first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split(SEPARATOR)
    }

    /// Number of path segments
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// Append a segment
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidKey`] if the segment is not valid.
    pub fn join(&self, segment: &str) -> Result<Self, StoreError> {
        Self::parse(format!("{}{SEPARATOR}{segment}", self.0))
    }

    /// Parent path, `None` for single-segment keys
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let idx = self.0.rfind(SEPARATOR)?;
        if idx == 0 {
            return None;
        }
        Some(Self(self.0[..idx].to_string()))
    }

    /// Segment-aware prefix check (`/a/b` is not a prefix of `/a/bc`)
    #[must_use]
    pub fn starts_with(&self, prefix: &ParameterKey) -> bool {
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0)
                && self.0.as_bytes().get(prefix.0.len()) == Some(&(SEPARATOR as u8)))
    }
}

fn validate(raw: &str) -> Result<(), &'static str> {
    let Some(rest) = raw.strip_prefix(SEPARATOR) else {
        return Err("must start with '/'");
    };
    if rest.is_empty() {
        return Err("must contain at least one segment");
    }
    for segment in rest.split(SEPARATOR) {
        if segment.is_empty() {
            return Err("empty path segment");
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err("segments may only contain [A-Za-z0-9_.-]");
        }
    }
    Ok(())
}

impl Display for ParameterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ParameterKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ParameterKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ParameterKey> for String {
    fn from(key: ParameterKey) -> Self {
        key.0
    }
}

/// Every key a unit may publish or resolve
///
/// Adding a variant here is the only way to introduce a new cross-unit
/// reference, which keeps typo-class wiring bugs out of unit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalKey {
    /// Shared network identifier
    VpcId,
    /// Execution identity used to pull images and ship logs
    TaskExecutionRoleArn,
    /// Runtime identity assumed by the running container
    DefaultTaskRoleArn,
    /// Compute cluster name
    ClusterName,
    /// Compute cluster ARN
    ClusterArn,
    /// Shared ingress boundary owned by the cluster unit
    ClusterSecurityGroupId,
    /// Image registry name
    EcrRepoName,
    /// Image registry ARN
    EcrRepoArn,
    /// Source repository ARN
    CodecommitArn,
}

impl LogicalKey {
    /// All logical keys in publication order
    pub const ALL: [LogicalKey; 9] = [
        LogicalKey::VpcId,
        LogicalKey::TaskExecutionRoleArn,
        LogicalKey::DefaultTaskRoleArn,
        LogicalKey::ClusterName,
        LogicalKey::ClusterArn,
        LogicalKey::ClusterSecurityGroupId,
        LogicalKey::EcrRepoName,
        LogicalKey::EcrRepoArn,
        LogicalKey::CodecommitArn,
    ];

    /// Final path segment of the key
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LogicalKey::VpcId => "vpc-id",
            LogicalKey::TaskExecutionRoleArn => "task-execution-role-arn",
            LogicalKey::DefaultTaskRoleArn => "default-task-role-arn",
            LogicalKey::ClusterName => "cluster-name",
            LogicalKey::ClusterArn => "cluster-arn",
            LogicalKey::ClusterSecurityGroupId => "cluster-securitygroup-id",
            LogicalKey::EcrRepoName => "ecr-repo-name",
            LogicalKey::EcrRepoArn => "ecr-repo-arn",
            LogicalKey::CodecommitArn => "codecommit-arn",
        }
    }
}

impl Display for LogicalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| StoreError::InvalidKey {
                key: s.to_string(),
                reason: "unknown logical key",
            })
    }
}

/// How logical keys are laid out under the prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyScheme {
    /// `<prefix>/<name>`: one value per key across all stages
    Global,
    /// `<prefix>/<stage>/<name>`: stages never collide
    #[default]
    StageScoped,
}

/// Prefix plus layout scheme; maps a logical key onto a concrete key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyNamespace {
    prefix: ParameterKey,
    scheme: KeyScheme,
}

impl KeyNamespace {
    /// Create a namespace rooted at `prefix`
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidKey`] if `prefix` is not a valid path.
    pub fn new(prefix: &str, scheme: KeyScheme) -> Result<Self, StoreError> {
        Ok(Self {
            prefix: ParameterKey::parse(prefix)?,
            scheme,
        })
    }

    /// Namespace root
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &ParameterKey {
        &self.prefix
    }

    /// Layout scheme
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    /// Concrete key for `logical` under `stage`
    #[must_use]
    pub fn key(&self, stage: &Stage, logical: LogicalKey) -> ParameterKey {
        // Stage names and logical names are valid segments by construction.
        ParameterKey(format!(
            "{}{SEPARATOR}{}",
            self.stage_root(stage),
            logical.as_str()
        ))
    }

    /// Root under which `stage` publishes its keys
    #[must_use]
    pub fn stage_root(&self, stage: &Stage) -> ParameterKey {
        match self.scheme {
            KeyScheme::Global => self.prefix.clone(),
            KeyScheme::StageScoped => {
                ParameterKey(format!("{}{SEPARATOR}{}", self.prefix, stage.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_malformed_paths() {
        assert!(ParameterKey::parse("vpc-id").is_err());
        assert!(ParameterKey::parse("/").is_err());
        assert!(ParameterKey::parse("/a//b").is_err());
        assert!(ParameterKey::parse("/a/b/").is_err());
        assert!(ParameterKey::parse("/a/b c").is_err());
        assert!(ParameterKey::parse("/sonarqube-fargate-cdk/vpc-id").is_ok());
    }

    #[test]
    fn segments_parent_and_name() {
        let key = ParameterKey::parse("/app/dev/vpc-id").unwrap();
        assert_eq!(key.segments().collect::<Vec<_>>(), vec!["app", "dev", "vpc-id"]);
        assert_eq!(key.depth(), 3);
        assert_eq!(key.name(), "vpc-id");
        assert_eq!(key.parent().unwrap().as_str(), "/app/dev");
        assert!(ParameterKey::parse("/app").unwrap().parent().is_none());
    }

    #[test]
    fn prefix_check_is_segment_aware() {
        let key = ParameterKey::parse("/app/devel/vpc-id").unwrap();
        let dev = ParameterKey::parse("/app/dev").unwrap();
        let devel = ParameterKey::parse("/app/devel").unwrap();
        assert!(!key.starts_with(&dev));
        assert!(key.starts_with(&devel));
        assert!(key.starts_with(&key));
    }

    #[test]
    fn global_scheme_ignores_stage() {
        let ns = KeyNamespace::new("/sonarqube-fargate-cdk", KeyScheme::Global).unwrap();
        let dev = Stage::new("dev").unwrap();
        let prod = Stage::new("prod").unwrap();
        assert_eq!(
            ns.key(&dev, LogicalKey::VpcId).as_str(),
            "/sonarqube-fargate-cdk/vpc-id"
        );
        assert_eq!(ns.key(&dev, LogicalKey::VpcId), ns.key(&prod, LogicalKey::VpcId));
    }

    #[test]
    fn stage_scoped_scheme_partitions_keys() {
        let ns = KeyNamespace::new("/sonarqube-fargate-cdk", KeyScheme::StageScoped).unwrap();
        let dev = Stage::new("dev").unwrap();
        assert_eq!(
            ns.key(&dev, LogicalKey::ClusterSecurityGroupId).as_str(),
            "/sonarqube-fargate-cdk/dev/cluster-securitygroup-id"
        );
    }

    #[test]
    fn logical_key_names_roundtrip() {
        for key in LogicalKey::ALL {
            assert_eq!(key.as_str().parse::<LogicalKey>().unwrap(), key);
        }
        assert!("vpc_id".parse::<LogicalKey>().is_err());
    }
}
