//! Cross-unit declaration checks against a local engine

use pretty_assertions::assert_eq;
use strata_engine::{attr, DeployContext, LocalEngine, ProvisioningEngine, ResourceKind};
use strata_store::LogicalKey;
use strata_units::{standard_units, ResolvedInputs, RunContext, StrataConfig, UnitKind};

fn full_inputs() -> ResolvedInputs {
    ResolvedInputs::new()
        .with(LogicalKey::VpcId, "vpc-123")
        .with(LogicalKey::ClusterName, "sonarqube-fargate-dev")
        .with(LogicalKey::ClusterArn, "arn:local:compute:r:a:cluster/sonarqube-fargate-dev")
        .with(LogicalKey::ClusterSecurityGroupId, "sg-abc")
        .with(LogicalKey::TaskExecutionRoleArn, "arn:local:iam:r:a:role/exec")
        .with(LogicalKey::DefaultTaskRoleArn, "arn:local:iam:r:a:role/task")
}

#[tokio::test]
async fn every_unit_applies_and_exposes_its_publications() {
    let config = StrataConfig::default();
    let ctx = RunContext::resolve(&config, None, None).unwrap();
    let engine = LocalEngine::new();
    let deploy: &DeployContext = ctx.deploy();

    for unit in standard_units(&config) {
        let graph = unit.declare(&ctx, &full_inputs()).unwrap();
        let applied = engine.apply(deploy, &graph).await.unwrap();
        assert!(applied.is_complete(), "{}", unit.kind());

        for publication in unit.publications() {
            let value = applied.attribute(publication.resource, publication.attribute);
            assert!(
                value.is_some_and(|v| !v.is_empty()),
                "{} cannot publish {}",
                unit.kind(),
                publication.key
            );
        }
    }
    assert_eq!(engine.stack_names().len(), UnitKind::ALL.len());
}

#[tokio::test]
async fn service_wires_load_balancer_into_cluster_boundary() {
    let config = StrataConfig::default();
    let ctx = RunContext::resolve(&config, None, None).unwrap();
    let engine = LocalEngine::new();
    let service = standard_units(&config)
        .into_iter()
        .find(|u| u.kind() == UnitKind::Service)
        .unwrap();

    let graph = service.declare(&ctx, &full_inputs()).unwrap();
    let applied = engine.apply(ctx.deploy(), &graph).await.unwrap();

    let lb_sg = applied.of_kind(ResourceKind::SecurityGroup).next().unwrap();
    let rule = applied
        .of_kind(ResourceKind::SecurityGroupIngress)
        .next()
        .unwrap();
    assert_eq!(rule.property("group").unwrap(), "sg-abc");
    assert_eq!(rule.property("source").unwrap(), lb_sg.physical_id.as_str());
    assert_eq!(rule.property("port").unwrap(), 9000);

    let dns = applied.attribute("LoadBalancer", attr::DNS_NAME).unwrap();
    assert!(!dns.is_empty());
    let arn = applied.attribute("Service", attr::ARN).unwrap();
    assert!(arn.contains("sonarqube"));
}
