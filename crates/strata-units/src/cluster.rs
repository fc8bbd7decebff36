//! Compute cluster unit
//!
//! Owns the shared ingress boundary that services later open to their load
//! balancers. Services never create a cluster-level boundary themselves.

use crate::config::StrataConfig;
use crate::context::RunContext;
use crate::error::UnitResult;
use crate::manifest::{OutputDecl, Publication, UnitKind, UnitManifest};
use crate::unit::{stack_graph, ResolvedInputs, Unit};
use serde_json::json;
use strata_engine::{attr, ResourceDecl, ResourceGraph, ResourceKind};
use strata_store::LogicalKey;

/// Logical id of the cluster
pub const CLUSTER: &str = "Cluster";
/// Logical id of the shared ingress boundary
pub const CLUSTER_SECURITY_GROUP: &str = "ClusterSecurityGroup";

/// Builds the cluster and its shared ingress boundary
#[derive(Debug, Clone)]
pub struct ClusterUnit {
    cluster_name: String,
    service_name: String,
}

impl ClusterUnit {
    /// Unit for the configured cluster
    #[must_use]
    pub fn new(config: &StrataConfig) -> Self {
        Self {
            cluster_name: config.deployment.cluster_name.clone(),
            service_name: config.deployment.service_name.clone(),
        }
    }

    /// Stage-qualified cluster name
    #[must_use]
    pub fn cluster_name(&self, ctx: &RunContext) -> String {
        format!("{}-{}", self.cluster_name, ctx.stage())
    }
}

impl Unit for ClusterUnit {
    fn manifest(&self) -> UnitManifest {
        UnitManifest::new(UnitKind::Cluster)
            .requires([LogicalKey::VpcId])
            .produces([
                LogicalKey::ClusterName,
                LogicalKey::ClusterArn,
                LogicalKey::ClusterSecurityGroupId,
            ])
            .after([UnitKind::AccessRoles, UnitKind::ArtifactRepository])
    }

    fn stack_name(&self, ctx: &RunContext) -> String {
        format!("ecs-{}-cluster-{}", self.service_name, self.cluster_name(ctx))
    }

    fn description(&self) -> &'static str {
        "ECS Fargate cluster"
    }

    fn declare(&self, ctx: &RunContext, inputs: &ResolvedInputs) -> UnitResult<ResourceGraph> {
        let vpc_id = inputs.require(UnitKind::Cluster, LogicalKey::VpcId)?;
        let cluster_name = self.cluster_name(ctx);
        let sg_name = format!("ecssg-{cluster_name}");
        let mut graph = stack_graph(self, ctx);

        graph.add(
            ResourceDecl::new(CLUSTER, ResourceKind::Cluster)
                .named(cluster_name.clone())
                .with("vpc", json!(vpc_id))
                .with("container_insights", json!(true)),
        )?;
        graph.add(
            ResourceDecl::new(CLUSTER_SECURITY_GROUP, ResourceKind::SecurityGroup)
                .named(sg_name.clone())
                .with("vpc", json!(vpc_id))
                .with("allow_all_outbound", json!(true))
                .with("description", json!(format!("ECS security group for {cluster_name}")))
                .with("ingress", json!([]))
                .tag("Name", sg_name),
        )?;

        tracing::debug!(stack = %graph.stack_name, vpc = %vpc_id, "cluster declared");
        Ok(graph)
    }

    fn publications(&self) -> Vec<Publication> {
        vec![
            Publication::new(LogicalKey::ClusterName, CLUSTER, attr::NAME),
            Publication::new(LogicalKey::ClusterArn, CLUSTER, attr::ARN),
            Publication::new(LogicalKey::ClusterSecurityGroupId, CLUSTER_SECURITY_GROUP, attr::ID),
        ]
    }

    fn outputs(&self, _ctx: &RunContext) -> Vec<OutputDecl> {
        vec![
            OutputDecl::attribute("Cluster", CLUSTER, attr::NAME),
            OutputDecl::attribute("ClusterArn", CLUSTER, attr::ARN),
            OutputDecl::attribute("ECS Security Group ID", CLUSTER_SECURITY_GROUP, attr::ID),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitError;

    #[test]
    fn cluster_is_placed_in_resolved_network() {
        let config = StrataConfig::default();
        let ctx = RunContext::resolve(&config, None, None).unwrap();
        let unit = ClusterUnit::new(&config);
        let inputs = ResolvedInputs::new().with(LogicalKey::VpcId, "vpc-123");
        let graph = unit.declare(&ctx, &inputs).unwrap();

        assert_eq!(
            unit.stack_name(&ctx),
            "ecs-sonarqube-cluster-sonarqube-fargate-dev"
        );
        let cluster = graph.get(CLUSTER).unwrap();
        assert_eq!(cluster.name.as_deref(), Some("sonarqube-fargate-dev"));
        assert_eq!(cluster.literal("vpc"), Some(&json!("vpc-123")));
        let sg = graph.get(CLUSTER_SECURITY_GROUP).unwrap();
        assert_eq!(sg.name.as_deref(), Some("ecssg-sonarqube-fargate-dev"));
    }

    #[test]
    fn missing_network_is_reported() {
        let config = StrataConfig::default();
        let ctx = RunContext::resolve(&config, None, None).unwrap();
        let err = ClusterUnit::new(&config)
            .declare(&ctx, &ResolvedInputs::new())
            .unwrap_err();
        assert!(matches!(
            err,
            UnitError::MissingInput {
                key: LogicalKey::VpcId,
                ..
            }
        ));
    }
}
