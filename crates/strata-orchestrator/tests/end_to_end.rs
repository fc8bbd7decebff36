//! Full topology runs against in-memory state

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use strata_engine::{attr, ProvisioningEngine, ResourceKind};
use strata_orchestrator::ProvisionError;
use strata_store::LogicalKey;
use strata_test_utils::{harness, seed_network_and_roles, test_config, SEEDED_VPC};
use strata_units::{RunContext, UnitKind};

#[tokio::test]
async fn cluster_then_service_wires_ingress_through_published_keys() {
    let h = harness();
    let ctx = h.context("dev");
    seed_network_and_roles(h.store.as_ref(), &ctx).await;

    let cluster = h.orchestrator.apply(&ctx, UnitKind::Cluster).await.unwrap();
    assert_eq!(cluster.published("cluster-name"), Some("sonarqube-fargate-dev"));
    let sg_id = cluster
        .published("cluster-securitygroup-id")
        .unwrap()
        .to_string();
    assert!(sg_id.starts_with("sg-"), "{sg_id}");
    assert_eq!(
        h.value(&ctx, LogicalKey::ClusterName).await.as_deref(),
        Some("sonarqube-fargate-dev")
    );

    let service = h.orchestrator.apply(&ctx, UnitKind::Service).await.unwrap();
    assert!(service.published.is_empty());
    assert!(service.output("Service").unwrap().contains("sonarqube"));
    assert!(!service.output("ALB").unwrap().is_empty());
    assert_eq!(service.output("TaskDefinition"), Some("sonarqube-task"));
    assert_eq!(service.output("LogGroup"), Some("sonarqube"));

    let stack = h
        .engine
        .describe(&service.stack_name)
        .await
        .unwrap()
        .unwrap();
    let lb_sg = stack.resource("LoadBalancerSecurityGroup").unwrap();
    let rules: Vec<_> = stack.of_kind(ResourceKind::SecurityGroupIngress).collect();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].property("group").unwrap(), sg_id.as_str());
    assert_eq!(rules[0].property("source").unwrap(), lb_sg.physical_id.as_str());
    assert_eq!(rules[0].property("port").unwrap(), 9000);

    let cluster_stack = h
        .engine
        .describe(&cluster.stack_name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        cluster_stack.resource("Cluster").unwrap().property("vpc").unwrap(),
        SEEDED_VPC
    );
}

#[tokio::test]
async fn apply_all_follows_waves_and_publishes_every_key() {
    let h = harness();
    let ctx = h.context("dev");

    let reports = h.orchestrator.apply_all(&ctx).await.unwrap();
    let order: Vec<_> = reports.iter().map(|r| r.unit).collect();
    assert_eq!(order.len(), UnitKind::ALL.len());
    assert_eq!(order.first(), Some(&UnitKind::Network));
    assert_eq!(order.last(), Some(&UnitKind::Service));

    for key in LogicalKey::ALL {
        assert!(h.value(&ctx, key).await.is_some(), "{key} not published");
    }

    let vpc_id = h.value(&ctx, LogicalKey::VpcId).await.unwrap();
    assert!(vpc_id.starts_with("vpc-"));
    let network = &reports[0];
    assert_eq!(network.output("VPC"), Some(vpc_id.as_str()));
    assert_eq!(
        network.output("SSMParameter"),
        Some("/sonarqube-fargate-cdk/dev/vpc-id")
    );

    let artifacts = reports
        .iter()
        .find(|r| r.unit == UnitKind::ArtifactRepository)
        .unwrap();
    assert!(artifacts.output("EcrUri").unwrap().ends_with("/sonarqube-dev"));
    assert!(artifacts
        .output("CodeCommitRepoUrl")
        .unwrap()
        .starts_with("https://"));

    let statuses = h.orchestrator.status(&ctx).await.unwrap();
    assert!(statuses.iter().all(|s| s.deployed.is_some() && s.is_ready()));
}

#[tokio::test]
async fn network_override_replaces_published_network() {
    let h = harness();
    let ctx = RunContext::resolve(&h.config, Some("dev"), Some("vpc-override".into())).unwrap();

    let cluster = h.orchestrator.apply(&ctx, UnitKind::Cluster).await.unwrap();
    let stack = h
        .engine
        .describe(&cluster.stack_name)
        .await
        .unwrap()
        .unwrap();
    let sg = stack.resource("ClusterSecurityGroup").unwrap();
    assert_eq!(sg.property("vpc").unwrap(), "vpc-override");
    assert!(h.value(&ctx, LogicalKey::VpcId).await.is_none());
}

#[tokio::test]
async fn stages_are_isolated_in_stage_scoped_namespace() {
    let h = harness();
    let dev = h.context("dev");
    let prod = h.context("prod");

    h.orchestrator.apply(&dev, UnitKind::Network).await.unwrap();
    let err = h
        .orchestrator
        .apply(&prod, UnitKind::Cluster)
        .await
        .unwrap_err();
    assert_eq!(
        err.missing_keys(),
        [prod.namespace().key(prod.stage(), LogicalKey::VpcId)].as_slice()
    );

    h.orchestrator.apply(&prod, UnitKind::Network).await.unwrap();
    let cluster = h.orchestrator.apply(&prod, UnitKind::Cluster).await.unwrap();
    assert_eq!(cluster.published("cluster-name"), Some("sonarqube-fargate-prod"));
    assert_ne!(
        h.value(&dev, LogicalKey::VpcId).await,
        h.value(&prod, LogicalKey::VpcId).await
    );

    let stack = h
        .engine
        .describe(&cluster.stack_name)
        .await
        .unwrap()
        .unwrap();
    assert!(stack.termination_protection);
    let tagged = stack.resource("Cluster").unwrap();
    assert_eq!(tagged.tags.get("Stage").map(String::as_str), Some("prod"));
}

#[tokio::test]
async fn published_keys_lists_only_the_active_stage() {
    let h = harness();
    let dev = h.context("dev");
    let prod = h.context("prod");
    h.orchestrator.apply(&dev, UnitKind::Network).await.unwrap();
    h.orchestrator.apply(&prod, UnitKind::Network).await.unwrap();

    let keys = h.orchestrator.published_keys(&dev).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key.as_str(), "/sonarqube-fargate-cdk/dev/vpc-id");
    assert_eq!(keys[0].written_by.as_str(), "dev");
}

#[tokio::test]
async fn role_arns_flow_into_task_definition() {
    let h = harness();
    let ctx = h.context("dev");
    h.orchestrator.apply(&ctx, UnitKind::Network).await.unwrap();
    h.orchestrator.apply(&ctx, UnitKind::AccessRoles).await.unwrap();
    h.orchestrator.apply(&ctx, UnitKind::Cluster).await.unwrap();
    let service = h.orchestrator.apply(&ctx, UnitKind::Service).await.unwrap();

    let execution = h.value(&ctx, LogicalKey::TaskExecutionRoleArn).await.unwrap();
    let stack = h
        .engine
        .describe(&service.stack_name)
        .await
        .unwrap()
        .unwrap();
    let task = stack.resource("TaskDefinition").unwrap();
    assert_eq!(task.property("execution_role").unwrap(), execution.as_str());
    assert_eq!(task.attribute(attr::FAMILY), Some("sonarqube-task"));

    assert!(matches!(
        h.orchestrator.teardown(&ctx, UnitKind::AccessRoles, false).await,
        Err(ProvisionError::DependentsStillApplied { .. })
    ));
}

#[tokio::test]
async fn service_opens_published_cluster_boundary_only_to_load_balancer() {
    let h = harness();
    let ctx = h.context("dev");
    seed_network_and_roles(h.store.as_ref(), &ctx).await;
    h.seed(&ctx, LogicalKey::ClusterName, "sonarqube-fargate-dev").await;
    h.seed(&ctx, LogicalKey::ClusterSecurityGroupId, "sg-abc").await;

    let service = h.orchestrator.apply(&ctx, UnitKind::Service).await.unwrap();
    let stack = h
        .engine
        .describe(&service.stack_name)
        .await
        .unwrap()
        .unwrap();

    let rule = stack
        .of_kind(ResourceKind::SecurityGroupIngress)
        .next()
        .unwrap();
    assert_eq!(rule.property("group").unwrap(), "sg-abc");
    assert_eq!(rule.property("port").unwrap(), 9000);

    let lb_sg = stack.resource("LoadBalancerSecurityGroup").unwrap();
    let public = lb_sg.property("ingress").unwrap().as_array().unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0]["port"], 80);
    assert_eq!(public[0]["cidr"], "0.0.0.0/0");

    let svc = stack.resource("Service").unwrap();
    assert_eq!(svc.property("cluster").unwrap(), "sonarqube-fargate-dev");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn any_stage_applies_in_dependency_order(stage in "[a-z][a-z0-9]{0,8}") {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = strata_test_utils::harness_with(test_config());
            let ctx = h.context(&stage);

            let early = h.orchestrator.apply(&ctx, UnitKind::Service).await.unwrap_err();
            assert!(matches!(early, ProvisionError::DependencyNotReady { .. }));

            for unit in [UnitKind::Network, UnitKind::AccessRoles, UnitKind::Cluster, UnitKind::Service] {
                h.orchestrator.apply(&ctx, unit).await.unwrap();
            }
            assert_eq!(
                h.value(&ctx, LogicalKey::ClusterName).await,
                Some(format!("sonarqube-fargate-{stage}"))
            );
        });
    }
}
