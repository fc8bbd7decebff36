//! Operator-facing results of orchestration commands

use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use strata_engine::StackStatus;
use strata_store::{ParameterKey, Stage};
use strata_units::UnitKind;

/// One published key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedKey {
    /// Concrete key
    pub key: ParameterKey,
    /// Stored value
    pub value: String,
}

/// One operator output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Output {
    /// Output name
    pub label: String,
    /// Value
    pub value: String,
}

/// Result of applying one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    /// Applied unit
    pub unit: UnitKind,
    /// Stage applied
    pub stage: Stage,
    /// Engine stack
    pub stack_name: String,
    /// Resources the stack holds
    pub resources: usize,
    /// Keys written, in manifest order
    pub published: Vec<PublishedKey>,
    /// Outputs for the operator
    pub outputs: Vec<Output>,
}

impl UnitReport {
    /// Output value by label
    #[must_use]
    pub fn output(&self, label: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.label == label)
            .map(|o| o.value.as_str())
    }

    /// Published value by key name (last path segment)
    #[must_use]
    pub fn published(&self, name: &str) -> Option<&str> {
        self.published
            .iter()
            .find(|p| p.key.name() == name)
            .map(|p| p.value.as_str())
    }
}

impl Display for UnitReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}) applied to stage {}: {} resources",
            self.unit, self.stack_name, self.stage, self.resources
        )?;
        for p in &self.published {
            writeln!(f, "  published {} = {}", p.key, p.value)?;
        }
        for o in &self.outputs {
            writeln!(f, "  {} = {}", o.label, o.value)?;
        }
        Ok(())
    }
}

/// Result of tearing down one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Removed unit
    pub unit: UnitKind,
    /// Engine stack
    pub stack_name: String,
    /// Whether the stack existed
    pub stack_removed: bool,
    /// Keys removed from the store
    pub deleted_keys: Vec<ParameterKey>,
}

/// Deployment and readiness of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    /// Unit
    pub unit: UnitKind,
    /// Engine stack
    pub stack_name: String,
    /// Last apply outcome, if the stack exists
    pub deployed: Option<StackStatus>,
    /// Required keys not yet published
    pub missing: Vec<ParameterKey>,
    /// Required key published by another stage
    pub stale: Option<ParameterKey>,
}

impl UnitStatus {
    /// Whether every required key resolves for this stage
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty() && self.stale.is_none()
    }
}

impl Display for UnitStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let deployed = match self.deployed {
            Some(StackStatus::Complete) => "deployed",
            Some(StackStatus::Partial) => "partial",
            None => "absent",
        };
        write!(f, "{:<20} {:<9} {}", self.unit, deployed, self.stack_name)?;
        if let Some(key) = &self.stale {
            write!(f, " (stale: {key})")?;
        } else if self.missing.is_empty() {
            write!(f, " (ready)")?;
        } else {
            let keys: Vec<_> = self.missing.iter().map(ParameterKey::as_str).collect();
            write!(f, " (waiting for {})", keys.join(", "))?;
        }
        Ok(())
    }
}
