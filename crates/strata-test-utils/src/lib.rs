//! Testing utilities for the Strata workspace
//!
//! Shared fixtures: default configuration, run contexts, an orchestrator
//! over in-memory state, and helpers to seed published keys.

#![allow(missing_docs)]

use std::sync::Arc;
use strata_engine::LocalEngine;
use strata_orchestrator::Orchestrator;
use strata_store::{InMemoryParameterStore, LogicalKey, ParameterKey, ParameterStore};
use strata_units::{RunContext, StrataConfig};

pub const SEEDED_VPC: &str = "vpc-123";

/// Orchestrator plus handles on the state behind it
pub struct Harness {
    pub config: StrataConfig,
    pub store: Arc<InMemoryParameterStore>,
    pub engine: Arc<LocalEngine>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn context(&self, stage: &str) -> RunContext {
        context(&self.config, stage)
    }

    pub fn key(&self, ctx: &RunContext, logical: LogicalKey) -> ParameterKey {
        ctx.namespace().key(ctx.stage(), logical)
    }

    pub async fn value(&self, ctx: &RunContext, logical: LogicalKey) -> Option<String> {
        self.store
            .get(&self.key(ctx, logical))
            .await
            .ok()
            .map(|record| record.value)
    }

    pub async fn seed(&self, ctx: &RunContext, logical: LogicalKey, value: &str) {
        seed(self.store.as_ref(), ctx, logical, value).await;
    }
}

pub fn test_config() -> StrataConfig {
    StrataConfig::default()
}

pub fn context(config: &StrataConfig, stage: &str) -> RunContext {
    RunContext::resolve(config, Some(stage), None).unwrap()
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: StrataConfig) -> Harness {
    let store = Arc::new(InMemoryParameterStore::new());
    let engine = Arc::new(LocalEngine::new());
    let orchestrator = Orchestrator::new(&config, store.clone(), engine.clone()).unwrap();
    Harness {
        config,
        store,
        engine,
        orchestrator,
    }
}

pub async fn seed(store: &dyn ParameterStore, ctx: &RunContext, logical: LogicalKey, value: &str) {
    ctx.params(store).put(logical, value).await.unwrap();
}

/// Publish the keys the network and access-roles units would write
pub async fn seed_network_and_roles(store: &dyn ParameterStore, ctx: &RunContext) {
    seed(store, ctx, LogicalKey::VpcId, SEEDED_VPC).await;
    seed(
        store,
        ctx,
        LogicalKey::TaskExecutionRoleArn,
        "arn:local:iam:us-east-1:000000000000:role/seeded-execution",
    )
    .await;
    seed(
        store,
        ctx,
        LogicalKey::DefaultTaskRoleArn,
        "arn:local:iam:us-east-1:000000000000:role/seeded-task",
    )
    .await;
}
