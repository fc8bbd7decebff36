//! Provisioning engine contract

use crate::error::EngineResult;
use crate::resource::{ResourceGraph, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a graph is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployContext {
    /// Stage name
    pub stage: String,
    /// Target account
    pub account: String,
    /// Target region
    pub region: String,
}

impl DeployContext {
    /// Build a context
    pub fn new(
        stage: impl Into<String>,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            account: account.into(),
            region: region.into(),
        }
    }
}

/// A resource as it exists after apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedResource {
    /// Logical id from the graph
    pub logical_id: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Physical identifier
    pub physical_id: String,
    /// Exposed attributes (`Id`, `Arn`, `Name`, plus kind-specific ones)
    pub attributes: BTreeMap<String, String>,
    /// Properties with every reference resolved
    pub properties: BTreeMap<String, Value>,
    /// Effective tags
    pub tags: BTreeMap<String, String>,
}

impl CreatedResource {
    /// Attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Resolved property value
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Outcome of the last apply of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// Every declared resource exists
    Complete,
    /// Apply stopped part way; created resources are kept
    Partial,
}

/// Engine-side record of a stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedStack {
    /// Stack name
    pub stack_name: String,
    /// Stage it was applied for
    pub stage: String,
    /// Teardown requires explicit override
    pub termination_protection: bool,
    /// Last apply outcome
    pub status: StackStatus,
    /// Created resources in creation order
    pub resources: Vec<CreatedResource>,
}

impl AppliedStack {
    /// Resource by logical id
    #[must_use]
    pub fn resource(&self, logical_id: &str) -> Option<&CreatedResource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    /// Attribute of a resource by logical id
    #[must_use]
    pub fn attribute(&self, logical_id: &str, attribute: &str) -> Option<&str> {
        self.resource(logical_id)?.attribute(attribute)
    }

    /// Resources of one kind
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &CreatedResource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    /// Check if every declared resource was created
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == StackStatus::Complete
    }
}

/// Converts declared graphs into existing resources
///
/// Applying the same graph twice must converge on the same resources.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Create or update every resource in `graph`
    ///
    /// # Errors
    /// Graph errors, conflicts with resources owned by other stacks, and
    /// [`crate::EngineError::PartialApply`] when a resource fails mid-way.
    async fn apply(&self, ctx: &DeployContext, graph: &ResourceGraph) -> EngineResult<AppliedStack>;

    /// Remove a stack; returns whether it existed
    ///
    /// # Errors
    /// [`crate::EngineError::TerminationProtected`] unless `force` is set.
    async fn teardown(&self, ctx: &DeployContext, stack_name: &str, force: bool)
        -> EngineResult<bool>;

    /// Current record of a stack, if applied
    ///
    /// # Errors
    /// Propagates state access failures.
    async fn describe(&self, stack_name: &str) -> EngineResult<Option<AppliedStack>>;
}
