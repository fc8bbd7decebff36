//! Unit manifests: which keys a unit reads and which it writes

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use strata_store::LogicalKey;

/// The provisioning units of the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    /// Shared network
    Network,
    /// Execution and runtime identities
    AccessRoles,
    /// Image registry and source repository
    ArtifactRepository,
    /// Compute cluster and shared ingress boundary
    Cluster,
    /// Load-balanced autoscaled service
    Service,
}

impl UnitKind {
    /// Every unit, leaf first
    pub const ALL: [UnitKind; 5] = [
        UnitKind::Network,
        UnitKind::AccessRoles,
        UnitKind::ArtifactRepository,
        UnitKind::Cluster,
        UnitKind::Service,
    ];

    /// Command-line name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            UnitKind::Network => "network",
            UnitKind::AccessRoles => "access-roles",
            UnitKind::ArtifactRepository => "artifact-repository",
            UnitKind::Cluster => "cluster",
            UnitKind::Service => "service",
        }
    }
}

impl Display for UnitKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown unit '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Declared inputs and outputs of a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitManifest {
    /// Unit described
    pub kind: UnitKind,
    /// Keys that must be published before this unit can apply
    pub requires: Vec<LogicalKey>,
    /// Keys this unit publishes, in publication order
    pub produces: Vec<LogicalKey>,
    /// Units to apply first even without a data dependency
    pub after: Vec<UnitKind>,
}

impl UnitManifest {
    /// Manifest with no edges
    #[must_use]
    pub fn new(kind: UnitKind) -> Self {
        Self {
            kind,
            requires: Vec::new(),
            produces: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Declare required keys
    #[must_use]
    pub fn requires(mut self, keys: impl IntoIterator<Item = LogicalKey>) -> Self {
        self.requires.extend(keys);
        self
    }

    /// Declare produced keys
    #[must_use]
    pub fn produces(mut self, keys: impl IntoIterator<Item = LogicalKey>) -> Self {
        self.produces.extend(keys);
        self
    }

    /// Declare ordering-only predecessors
    #[must_use]
    pub fn after(mut self, units: impl IntoIterator<Item = UnitKind>) -> Self {
        self.after.extend(units);
        self
    }
}

/// A key published from an attribute of a created resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publication {
    /// Key written
    pub key: LogicalKey,
    /// Logical id of the source resource
    pub resource: &'static str,
    /// Attribute of the source resource
    pub attribute: &'static str,
}

impl Publication {
    /// Publish `resource.attribute` under `key`
    #[must_use]
    pub const fn new(key: LogicalKey, resource: &'static str, attribute: &'static str) -> Self {
        Self {
            key,
            resource,
            attribute,
        }
    }
}

/// Where an operator-facing output comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSource {
    /// Attribute of a created resource
    Attribute {
        /// Logical id
        resource: &'static str,
        /// Attribute name
        attribute: &'static str,
    },
    /// Value known before apply
    Static(String),
}

/// Operator-facing output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDecl {
    /// Output name
    pub label: String,
    /// Value source
    pub source: OutputSource,
}

impl OutputDecl {
    /// Output read from a created resource
    pub fn attribute(label: impl Into<String>, resource: &'static str, attribute: &'static str) -> Self {
        Self {
            label: label.into(),
            source: OutputSource::Attribute {
                resource,
                attribute,
            },
        }
    }

    /// Output with a fixed value
    pub fn fixed(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: OutputSource::Static(value.into()),
        }
    }
}
