//! Shared network unit
//!
//! One network block per stage, a public and a private subnet per
//! availability zone, and NAT paths the private tier routes through.

use crate::config::{NetworkConfig, StrataConfig};
use crate::context::RunContext;
use crate::error::UnitResult;
use crate::manifest::{OutputDecl, Publication, UnitKind, UnitManifest};
use crate::unit::{stack_graph, ResolvedInputs, Unit};
use serde_json::json;
use strata_engine::{attr, PropertyValue, ResourceDecl, ResourceGraph, ResourceKind};
use strata_store::LogicalKey;

/// Logical id of the network block
pub const VPC: &str = "Vpc";

/// Builds the shared network and publishes its id
#[derive(Debug, Clone)]
pub struct NetworkUnit {
    network: NetworkConfig,
}

impl NetworkUnit {
    /// Unit for the configured layout
    #[must_use]
    pub fn new(config: &StrataConfig) -> Self {
        Self {
            network: config.network.clone(),
        }
    }
}

impl Unit for NetworkUnit {
    fn manifest(&self) -> UnitManifest {
        UnitManifest::new(UnitKind::Network).produces([LogicalKey::VpcId])
    }

    fn stack_name(&self, ctx: &RunContext) -> String {
        format!("ecs-vpc-{}", ctx.stage())
    }

    fn description(&self) -> &'static str {
        "Shared network for ECS stacks"
    }

    fn declare(&self, ctx: &RunContext, _inputs: &ResolvedInputs) -> UnitResult<ResourceGraph> {
        self.network.validate()?;
        let subnets = self.network.subnets()?;
        let mut graph = stack_graph(self, ctx);

        graph.add(
            ResourceDecl::new(VPC, ResourceKind::Vpc)
                .with("cidr", json!(self.network.cidr))
                .with("max_azs", json!(self.network.max_azs))
                .with("enable_dns_hostnames", json!(true)),
        )?;

        let nat_count = usize::from(self.network.nat_gateways);
        for (az, (public, _)) in subnets.iter().enumerate() {
            let public_id = format!("PublicSubnet{}", az + 1);
            graph.add(
                ResourceDecl::new(public_id.clone(), ResourceKind::Subnet)
                    .with("vpc", PropertyValue::reference(VPC))
                    .with("cidr", json!(public.to_string()))
                    .with("availability_zone", json!(az))
                    .with("tier", json!("public"))
                    .with("map_public_ip", json!(true))
                    .tag("Name", format!("public-{}", az + 1)),
            )?;
            if az < nat_count {
                graph.add(
                    ResourceDecl::new(format!("NatGateway{}", az + 1), ResourceKind::NatGateway)
                        .with("subnet", PropertyValue::reference(public_id)),
                )?;
            }
        }
        for (az, (_, private)) in subnets.iter().enumerate() {
            graph.add(
                ResourceDecl::new(format!("PrivateSubnet{}", az + 1), ResourceKind::Subnet)
                    .with("vpc", PropertyValue::reference(VPC))
                    .with("cidr", json!(private.to_string()))
                    .with("availability_zone", json!(az))
                    .with("tier", json!("private"))
                    .with(
                        "nat",
                        PropertyValue::reference(format!("NatGateway{}", az % nat_count + 1)),
                    )
                    .tag("Name", format!("private-{}", az + 1)),
            )?;
        }

        tracing::debug!(stack = %graph.stack_name, subnets = subnets.len() * 2, "network declared");
        Ok(graph)
    }

    fn publications(&self) -> Vec<Publication> {
        vec![Publication::new(LogicalKey::VpcId, VPC, attr::ID)]
    }

    fn outputs(&self, ctx: &RunContext) -> Vec<OutputDecl> {
        let key = ctx.namespace().key(ctx.stage(), LogicalKey::VpcId);
        vec![
            OutputDecl::attribute("VPC", VPC, attr::ID),
            OutputDecl::fixed("SSMParameter", key.as_str()),
            OutputDecl::attribute("SSMParameterValue", VPC, attr::ID),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn declare(config: &StrataConfig) -> ResourceGraph {
        let ctx = RunContext::resolve(config, None, None).unwrap();
        NetworkUnit::new(config)
            .declare(&ctx, &ResolvedInputs::new())
            .unwrap()
    }

    #[test]
    fn default_layout_spans_three_zones() {
        let graph = declare(&StrataConfig::default());
        assert_eq!(graph.stack_name, "ecs-vpc-dev");
        assert_eq!(graph.of_kind(ResourceKind::Subnet).count(), 6);
        assert_eq!(graph.of_kind(ResourceKind::NatGateway).count(), 3);
        assert!(!graph.termination_protection);
        assert_eq!(graph.tags.get("Stage").map(String::as_str), Some("dev"));
        graph.creation_order().unwrap();
    }

    #[test]
    fn private_subnets_share_fewer_nat_paths() {
        let mut config = StrataConfig::default();
        config.network.nat_gateways = 1;
        let graph = declare(&config);

        let routes: Vec<_> = graph
            .of_kind(ResourceKind::Subnet)
            .filter_map(|s| s.properties.get("nat"))
            .cloned()
            .collect();
        assert_eq!(routes, vec![PropertyValue::reference("NatGateway1"); 3]);
    }

    #[test]
    fn outputs_name_the_published_key() {
        let config = StrataConfig::default();
        let ctx = RunContext::resolve(&config, None, None).unwrap();
        let outputs = NetworkUnit::new(&config).outputs(&ctx);
        assert!(outputs.contains(&OutputDecl::fixed(
            "SSMParameter",
            "/sonarqube-fargate-cdk/dev/vpc-id"
        )));
    }
}
