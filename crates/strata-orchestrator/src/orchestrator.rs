//! Dependency-checked apply and teardown of units
//!
//! The orchestrator never hands one unit's resources to another. It reads
//! a unit's inputs from the parameter store, lets the unit declare a stack,
//! applies it through the engine and publishes the unit's keys from the
//! created resources. Ordering between units follows from which keys exist.
//!
//! # Workflow
//! 1. Take the (stage, unit) apply slot
//! 2. Resolve every required key; report all missing keys at once
//! 3. Declare and validate the resource graph
//! 4. Apply the stack
//! 5. Publish keys, then compute outputs

use crate::error::{ProvisionError, ProvisionResult};
use crate::graph::UnitGraph;
use crate::locks::ApplyLocks;
use crate::report::{Output, PublishedKey, TeardownReport, UnitReport, UnitStatus};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_engine::{AppliedStack, ProvisioningEngine};
use strata_store::{LogicalKey, ParameterKey, ParameterRecord, ParameterStore, StoreError};
use strata_units::{
    standard_units, OutputSource, ResolvedInputs, RunContext, StrataConfig, Unit, UnitKind,
};
use tracing::{debug, info, warn};

/// Applies registered units against one store and one engine
pub struct Orchestrator {
    units: BTreeMap<UnitKind, Arc<dyn Unit>>,
    graph: UnitGraph,
    store: Arc<dyn ParameterStore>,
    engine: Arc<dyn ProvisioningEngine>,
    locks: ApplyLocks,
}

impl Orchestrator {
    /// Orchestrator over the five standard units
    ///
    /// # Errors
    /// [`ProvisionError::Graph`] if the unit manifests are inconsistent.
    pub fn new(
        config: &StrataConfig,
        store: Arc<dyn ParameterStore>,
        engine: Arc<dyn ProvisioningEngine>,
    ) -> ProvisionResult<Self> {
        Self::with_units(standard_units(config), store, engine)
    }

    /// Orchestrator over an explicit unit set
    ///
    /// # Errors
    /// [`ProvisionError::Graph`] on duplicate units, duplicate producers,
    /// unproduced requirements or cycles.
    pub fn with_units(
        units: Vec<Arc<dyn Unit>>,
        store: Arc<dyn ParameterStore>,
        engine: Arc<dyn ProvisioningEngine>,
    ) -> ProvisionResult<Self> {
        let manifests: Vec<_> = units.iter().map(|u| u.manifest()).collect();
        let graph = UnitGraph::build(&manifests)?;

        let mut registry = BTreeMap::new();
        for unit in units {
            let kind = unit.kind();
            if registry.insert(kind, unit).is_some() {
                return Err(ProvisionError::Graph(format!("unit {kind} registered twice")));
            }
        }

        Ok(Self {
            units: registry,
            graph,
            store,
            engine,
            locks: ApplyLocks::new(),
        })
    }

    /// Unit dependency graph
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &UnitGraph {
        &self.graph
    }

    /// Apply slots, shared with clones of this handle
    #[inline]
    #[must_use]
    pub fn locks(&self) -> &ApplyLocks {
        &self.locks
    }

    /// Registered unit of `kind`
    ///
    /// # Errors
    /// [`ProvisionError::UnknownUnit`] if none is registered.
    pub fn unit(&self, kind: UnitKind) -> ProvisionResult<&Arc<dyn Unit>> {
        self.units.get(&kind).ok_or(ProvisionError::UnknownUnit(kind))
    }

    /// Stack name `kind` uses in this run
    ///
    /// # Errors
    /// [`ProvisionError::UnknownUnit`] if none is registered.
    pub fn stack_name(&self, ctx: &RunContext, kind: UnitKind) -> ProvisionResult<String> {
        Ok(self.unit(kind)?.stack_name(ctx))
    }

    /// Apply waves for the registered units
    ///
    /// # Errors
    /// [`ProvisionError::Graph`] if the graph has a cycle.
    pub fn plan(&self) -> ProvisionResult<Vec<Vec<UnitKind>>> {
        self.graph.waves()
    }

    /// Resolve every key `kind` requires for the active stage
    ///
    /// The network id comes from the run's override when one is given.
    ///
    /// # Errors
    /// [`ProvisionError::DependencyNotReady`] listing every missing key, or
    /// [`ProvisionError::StaleDependency`] when a value belongs to another
    /// stage.
    pub async fn readiness(
        &self,
        ctx: &RunContext,
        kind: UnitKind,
    ) -> ProvisionResult<ResolvedInputs> {
        let unit = self.unit(kind)?;
        let params = ctx.params(self.store.as_ref());
        let mut inputs = ResolvedInputs::new();
        let mut missing = Vec::new();

        for key in unit.manifest().requires {
            if key == LogicalKey::VpcId {
                if let Some(vpc_id) = ctx.network_override() {
                    debug!(unit = %kind, vpc_id, "using network override");
                    inputs.insert(key, vpc_id);
                    continue;
                }
            }
            match params.get(key).await {
                Ok(value) => inputs.insert(key, value),
                Err(StoreError::NotFound { key }) => missing.push(key),
                Err(err) => return Err(ProvisionError::from_store(kind, err)),
            }
        }

        if missing.is_empty() {
            Ok(inputs)
        } else {
            Err(ProvisionError::DependencyNotReady {
                unit: kind,
                keys: missing,
            })
        }
    }

    /// Apply one unit for the active stage
    ///
    /// Re-applying an unchanged unit is a no-op on both its stack and its
    /// keys. Keys are only written once the whole stack exists.
    ///
    /// # Errors
    /// Readiness, validation, engine and store failures, classified per
    /// [`ProvisionError`]. Nothing is published on failure.
    pub async fn apply(&self, ctx: &RunContext, kind: UnitKind) -> ProvisionResult<UnitReport> {
        let unit = self.unit(kind)?;
        let _guard = self.locks.acquire(ctx.stage(), kind)?;
        let stack_name = unit.stack_name(ctx);
        info!(unit = %kind, stage = %ctx.stage(), stack = %stack_name, "applying unit");

        let inputs = self.readiness(ctx, kind).await?;
        let graph = unit
            .declare(ctx, &inputs)
            .map_err(|e| ProvisionError::from_unit(kind, e))?;
        debug!(unit = %kind, resources = graph.len(), "declared resource graph");

        let applied = self
            .engine
            .apply(ctx.deploy(), &graph)
            .await
            .map_err(|e| ProvisionError::from_engine(kind, e))?;

        let published = self.publish(ctx, unit.as_ref(), &applied).await?;
        let outputs = outputs(ctx, unit.as_ref(), &applied);
        info!(
            unit = %kind,
            stage = %ctx.stage(),
            published = published.len(),
            "unit applied"
        );

        Ok(UnitReport {
            unit: kind,
            stage: ctx.stage().clone(),
            stack_name: applied.stack_name.clone(),
            resources: applied.resources.len(),
            published,
            outputs,
        })
    }

    async fn publish(
        &self,
        ctx: &RunContext,
        unit: &dyn Unit,
        applied: &AppliedStack,
    ) -> ProvisionResult<Vec<PublishedKey>> {
        let kind = unit.kind();
        let mut values = Vec::new();
        for publication in unit.publications() {
            let value = applied
                .attribute(publication.resource, publication.attribute)
                .ok_or_else(|| {
                    ProvisionError::Graph(format!(
                        "unit {kind} publishes {} from {}.{}, which the stack does not expose",
                        publication.key, publication.resource, publication.attribute
                    ))
                })?;
            values.push((publication.key, value.to_string()));
        }

        let params = ctx.params(self.store.as_ref());
        let mut published = Vec::with_capacity(values.len());
        for (key, value) in values {
            let stored = params.put(key, &value).await?;
            let key = params.key(key);
            debug!(unit = %kind, key = %key, "published key");
            published.push(PublishedKey { key, value: stored });
        }
        Ok(published)
    }

    /// Apply every unit in dependency order
    ///
    /// Units of one wave run concurrently. The first failure stops the run
    /// and is returned; units already applied stay applied.
    ///
    /// # Errors
    /// The first unit failure.
    pub async fn apply_all(&self, ctx: &RunContext) -> ProvisionResult<Vec<UnitReport>> {
        let mut reports = Vec::with_capacity(self.units.len());
        for wave in self.plan()? {
            debug!(stage = %ctx.stage(), wave = ?wave, "applying wave");
            let applied = try_join_all(wave.iter().map(|kind| self.apply(ctx, *kind))).await?;
            reports.extend(applied);
        }
        Ok(reports)
    }

    /// Tear down one unit and withdraw its keys
    ///
    /// Refused while a unit that reads its keys is still deployed. Keys are
    /// only removed when the active stage wrote them.
    ///
    /// # Errors
    /// [`ProvisionError::DependentsStillApplied`],
    /// [`ProvisionError::TerminationProtected`] without `force`, or engine
    /// and store failures.
    pub async fn teardown(
        &self,
        ctx: &RunContext,
        kind: UnitKind,
        force: bool,
    ) -> ProvisionResult<TeardownReport> {
        let unit = self.unit(kind)?;
        let _guard = self.locks.acquire(ctx.stage(), kind)?;

        let mut dependents = Vec::new();
        for dependent in self.graph.dependents(kind) {
            let stack = self.stack_name(ctx, dependent)?;
            let described = self
                .engine
                .describe(&stack)
                .await
                .map_err(|e| ProvisionError::from_engine(kind, e))?;
            if described.is_some() {
                dependents.push(dependent);
            }
        }
        if !dependents.is_empty() {
            return Err(ProvisionError::DependentsStillApplied {
                unit: kind,
                dependents,
            });
        }

        let stack_name = unit.stack_name(ctx);
        info!(unit = %kind, stage = %ctx.stage(), stack = %stack_name, force, "tearing down unit");
        let stack_removed = self
            .engine
            .teardown(ctx.deploy(), &stack_name, force)
            .await
            .map_err(|e| ProvisionError::from_engine(kind, e))?;

        let mut deleted_keys = Vec::new();
        for logical in unit.manifest().produces {
            let key = ctx.namespace().key(ctx.stage(), logical);
            match self.store.get(&key).await {
                Ok(record) if record.written_by == *ctx.stage() => {
                    if self.store.delete(&key).await? {
                        debug!(unit = %kind, key = %key, "withdrew key");
                        deleted_keys.push(key);
                    }
                }
                Ok(record) => {
                    warn!(
                        unit = %kind,
                        key = %key,
                        writer = %record.written_by,
                        "key belongs to another stage; leaving it"
                    );
                }
                Err(StoreError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(TeardownReport {
            unit: kind,
            stack_name,
            stack_removed,
            deleted_keys,
        })
    }

    /// Deployment and readiness of every unit, in apply order
    ///
    /// # Errors
    /// Engine or store failures other than missing or stale keys.
    pub async fn status(&self, ctx: &RunContext) -> ProvisionResult<Vec<UnitStatus>> {
        let mut statuses = Vec::with_capacity(self.units.len());
        for kind in self.graph.order()? {
            let stack_name = self.stack_name(ctx, kind)?;
            let deployed = self
                .engine
                .describe(&stack_name)
                .await
                .map_err(|e| ProvisionError::from_engine(kind, e))?
                .map(|stack| stack.status);

            let (missing, stale) = match self.readiness(ctx, kind).await {
                Ok(_) => (Vec::new(), None),
                Err(ProvisionError::DependencyNotReady { keys, .. }) => (keys, None),
                Err(ProvisionError::StaleDependency { key, .. }) => (Vec::new(), Some(key)),
                Err(err) => return Err(err),
            };

            statuses.push(UnitStatus {
                unit: kind,
                stack_name,
                deployed,
                missing,
                stale,
            });
        }
        Ok(statuses)
    }

    /// Records under the active stage's part of the namespace
    ///
    /// # Errors
    /// Store failures.
    pub async fn published_keys(&self, ctx: &RunContext) -> ProvisionResult<Vec<ParameterRecord>> {
        let root: ParameterKey = ctx.namespace().stage_root(ctx.stage());
        Ok(self.store.list(&root).await?)
    }
}

fn outputs(ctx: &RunContext, unit: &dyn Unit, applied: &AppliedStack) -> Vec<Output> {
    unit.outputs(ctx)
        .into_iter()
        .filter_map(|decl| {
            let value = match decl.source {
                OutputSource::Static(value) => value,
                OutputSource::Attribute {
                    resource,
                    attribute,
                } => match applied.attribute(resource, attribute) {
                    Some(value) => value.to_string(),
                    None => {
                        warn!(unit = %unit.kind(), output = %decl.label, "output source missing");
                        return None;
                    }
                },
            };
            Some(Output {
                label: decl.label,
                value,
            })
        })
        .collect()
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}
