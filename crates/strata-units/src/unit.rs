//! The provisioning unit contract
//!
//! Provides the [`Unit`] trait implemented by every provisioner, and the
//! [`ResolvedInputs`] handed to it once its dependency keys are resolved.

use crate::config::StrataConfig;
use crate::context::RunContext;
use crate::error::{UnitError, UnitResult};
use crate::manifest::{OutputDecl, Publication, UnitKind, UnitManifest};
use crate::{AccessRolesUnit, ArtifactRepositoryUnit, ClusterUnit, NetworkUnit, ServiceUnit};
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_engine::ResourceGraph;
use strata_store::LogicalKey;

/// Values of a unit's required keys for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    values: BTreeMap<LogicalKey, String>,
}

impl ResolvedInputs {
    /// No inputs
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved value
    pub fn insert(&mut self, key: LogicalKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    /// Builder form of [`Self::insert`]
    #[must_use]
    pub fn with(mut self, key: LogicalKey, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Resolved value, if any
    #[must_use]
    pub fn get(&self, key: LogicalKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Resolved value for a required key
    ///
    /// # Errors
    /// [`UnitError::MissingInput`] when `key` was not resolved.
    pub fn require(&self, unit: UnitKind, key: LogicalKey) -> UnitResult<&str> {
        self.get(key).ok_or(UnitError::MissingInput { unit, key })
    }

    /// Resolved pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (LogicalKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Number of resolved keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if nothing was resolved
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Independently applicable bundle of resource declarations
///
/// A unit exclusively owns what [`Unit::declare`] returns and only ever
/// refers to other units' resources through resolved keys.
pub trait Unit: Send + Sync + std::fmt::Debug {
    /// Keys read and written, and ordering hints
    fn manifest(&self) -> UnitManifest;

    /// Unit identity
    fn kind(&self) -> UnitKind {
        self.manifest().kind
    }

    /// Engine stack name for this stage
    fn stack_name(&self, ctx: &RunContext) -> String;

    /// Stack description
    fn description(&self) -> &'static str;

    /// Resource graph for this stage
    ///
    /// # Errors
    /// Validation failures and unresolved inputs; no resource exists yet
    /// when this fails.
    fn declare(&self, ctx: &RunContext, inputs: &ResolvedInputs) -> UnitResult<ResourceGraph>;

    /// Keys written after a successful apply, in manifest order
    fn publications(&self) -> Vec<Publication>;

    /// Operator-facing outputs
    fn outputs(&self, ctx: &RunContext) -> Vec<OutputDecl>;
}

/// Empty graph carrying the stack-wide settings of a unit
#[must_use]
pub fn stack_graph(unit: &dyn Unit, ctx: &RunContext) -> ResourceGraph {
    ResourceGraph::new(unit.stack_name(ctx))
        .with_description(unit.description())
        .protected(ctx.protected())
        .with_tag("Stage", ctx.stage().as_str())
}

/// The five units of the topology, leaf first
#[must_use]
pub fn standard_units(config: &StrataConfig) -> Vec<Arc<dyn Unit>> {
    vec![
        Arc::new(NetworkUnit::new(config)),
        Arc::new(AccessRolesUnit::new(config)),
        Arc::new(ArtifactRepositoryUnit::new(config)),
        Arc::new(ClusterUnit::new(config)),
        Arc::new(ServiceUnit::new(config)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_missing_key() {
        let inputs = ResolvedInputs::new().with(LogicalKey::VpcId, "vpc-123");
        assert_eq!(
            inputs.require(UnitKind::Cluster, LogicalKey::VpcId).unwrap(),
            "vpc-123"
        );
        assert!(matches!(
            inputs.require(UnitKind::Service, LogicalKey::ClusterName),
            Err(UnitError::MissingInput {
                unit: UnitKind::Service,
                key: LogicalKey::ClusterName
            })
        ));
    }

    #[test]
    fn manifests_match_publications() {
        for unit in standard_units(&StrataConfig::default()) {
            let manifest = unit.manifest();
            let published: Vec<_> = unit.publications().iter().map(|p| p.key).collect();
            assert_eq!(manifest.produces, published, "{}", manifest.kind);
        }
    }

    #[test]
    fn every_key_has_one_producer() {
        let units = standard_units(&StrataConfig::default());
        for key in LogicalKey::ALL {
            let producers = units
                .iter()
                .filter(|u| u.manifest().produces.contains(&key))
                .count();
            assert_eq!(producers, 1, "{key}");
        }
    }
}
