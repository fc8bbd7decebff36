//! Load-balanced, autoscaled service unit
//!
//! Every input is resolved by lookup: network, cluster, the cluster's
//! shared ingress boundary, and both task identities. The service adds one
//! rule to the shared boundary (load balancer boundary → container port)
//! and owns everything else it declares. It publishes no keys.

use crate::config::{ImageSource, ServiceConfig, StrataConfig};
use crate::context::RunContext;
use crate::error::UnitResult;
use crate::ingress::ServiceIngress;
use crate::manifest::{OutputDecl, Publication, UnitKind, UnitManifest};
use crate::unit::{stack_graph, ResolvedInputs, Unit};
use serde_json::{json, Value};
use strata_engine::{attr, PropertyValue, ResourceDecl, ResourceGraph, ResourceKind};
use strata_store::LogicalKey;

/// Logical id of the image built for the service
pub const CONTAINER_IMAGE: &str = "ContainerImage";
/// Logical id of the log group
pub const LOG_GROUP: &str = "LogGroup";
/// Logical id of the task definition
pub const TASK_DEFINITION: &str = "TaskDefinition";
/// Logical id of the service
pub const SERVICE: &str = "Service";
/// Logical id of the autoscaling target
pub const SCALABLE_TARGET: &str = "ScalableTarget";
/// Logical id of the cpu scaling policy
pub const CPU_SCALING: &str = "CpuScaling";
/// Logical id of the load balancer boundary
pub const LB_SECURITY_GROUP: &str = "LoadBalancerSecurityGroup";
/// Logical id of the rule added to the cluster boundary
pub const CLUSTER_INGRESS: &str = "ClusterIngressFromLoadBalancer";
/// Logical id of the load balancer
pub const LOAD_BALANCER: &str = "LoadBalancer";
/// Logical id of the listener
pub const LISTENER: &str = "Listener";
/// Logical id of the target group
pub const TARGET_GROUP: &str = "TargetGroup";

const REQUIRED: [LogicalKey; 5] = [
    LogicalKey::VpcId,
    LogicalKey::ClusterName,
    LogicalKey::ClusterSecurityGroupId,
    LogicalKey::TaskExecutionRoleArn,
    LogicalKey::DefaultTaskRoleArn,
];

struct Inputs<'a> {
    vpc_id: &'a str,
    cluster_name: &'a str,
    cluster_sg_id: &'a str,
    execution_role_arn: &'a str,
    task_role_arn: &'a str,
}

impl<'a> Inputs<'a> {
    fn resolve(inputs: &'a ResolvedInputs) -> UnitResult<Self> {
        let get = move |key| inputs.require(UnitKind::Service, key);
        Ok(Self {
            vpc_id: get(LogicalKey::VpcId)?,
            cluster_name: get(LogicalKey::ClusterName)?,
            cluster_sg_id: get(LogicalKey::ClusterSecurityGroupId)?,
            execution_role_arn: get(LogicalKey::TaskExecutionRoleArn)?,
            task_role_arn: get(LogicalKey::DefaultTaskRoleArn)?,
        })
    }
}

/// Builds the service, its load balancer and its autoscaling
#[derive(Debug, Clone)]
pub struct ServiceUnit {
    cluster_name: String,
    service_name: String,
    service: ServiceConfig,
}

impl ServiceUnit {
    /// Unit for the configured service
    #[must_use]
    pub fn new(config: &StrataConfig) -> Self {
        Self {
            cluster_name: config.deployment.cluster_name.clone(),
            service_name: config.deployment.service_name.clone(),
            service: config.service.clone(),
        }
    }

    /// Boundaries and rules the service wires, for a resolved cluster boundary
    #[must_use]
    pub fn ingress(&self, cluster_sg_id: &str) -> ServiceIngress {
        ServiceIngress::plan(
            cluster_sg_id,
            (LB_SECURITY_GROUP, &format!("albsg-{}", self.service_name)),
            self.service.container_port,
            self.service.load_balancer.listener_port,
        )
    }

    fn container_name(&self) -> String {
        format!("{}-container", self.service_name)
    }

    fn declare_task(&self, graph: &mut ResourceGraph, inputs: &Inputs<'_>) -> UnitResult<()> {
        let svc = &self.service;
        let image = match &svc.image {
            ImageSource::Build { directory } => {
                graph.add(
                    ResourceDecl::new(CONTAINER_IMAGE, ResourceKind::ImageAsset)
                        .with("directory", json!(directory)),
                )?;
                PropertyValue::attr(CONTAINER_IMAGE, attr::IMAGE_URI)
            }
            ImageSource::Registry { uri } => PropertyValue::literal(uri.clone()),
        };

        graph.add(
            ResourceDecl::new(LOG_GROUP, ResourceKind::LogGroup)
                .named(self.service_name.clone())
                .with("retention_days", json!(svc.logs.retention_days))
                .with(
                    "removal_policy",
                    json!(if svc.logs.destroy_with_unit { "destroy" } else { "retain" }),
                ),
        )?;

        graph.add(
            ResourceDecl::new(TASK_DEFINITION, ResourceKind::TaskDefinition)
                .with("family", json!(format!("{}-task", self.service_name)))
                .with("compatibility", json!("FARGATE"))
                .with("network_mode", json!("awsvpc"))
                .with("cpu", json!(svc.task_cpu))
                .with("memory_mib", json!(svc.task_memory_mib))
                .with("execution_role", json!(inputs.execution_role_arn))
                .with("task_role", json!(inputs.task_role_arn))
                .with("container_image", image)
                .with(
                    "container",
                    json!({
                        "name": self.container_name(),
                        "cpu": svc.container_cpu,
                        "memory_reservation_mib": svc.container_memory_reservation_mib,
                        "port_mappings": [{
                            "container_port": svc.container_port,
                            "host_port": svc.container_port,
                            "protocol": "tcp",
                        }],
                    }),
                )
                .with("log_group", PropertyValue::reference(LOG_GROUP)),
        )?;
        Ok(())
    }

    fn declare_ingress(
        &self,
        graph: &mut ResourceGraph,
        inputs: &Inputs<'_>,
        ingress: &ServiceIngress,
        ctx: &RunContext,
    ) -> UnitResult<()> {
        let lb_rules: Vec<Value> = ingress
            .load_balancer
            .rules
            .iter()
            .filter_map(|rule| rule.to_literal())
            .collect();
        graph.add(
            ResourceDecl::new(LB_SECURITY_GROUP, ResourceKind::SecurityGroup)
                .named(ingress.load_balancer.name.clone())
                .with("vpc", json!(inputs.vpc_id))
                .with("allow_all_outbound", json!(true))
                .with(
                    "description",
                    json!(format!("ALB security group for {} Service", self.service_name)),
                )
                .with("ingress", Value::Array(lb_rules))
                .tag("Name", ingress.load_balancer.name.clone()),
        )?;

        for (i, rule) in ingress.cluster.rules.iter().enumerate() {
            let logical_id = if i == 0 {
                CLUSTER_INGRESS.to_string()
            } else {
                format!("{CLUSTER_INGRESS}{}", i + 1)
            };
            graph.add(
                ResourceDecl::new(logical_id, ResourceKind::SecurityGroupIngress)
                    .with("group", ingress.cluster.reference.property())
                    .with("source", rule.source.property())
                    .with("protocol", json!(rule.protocol.as_str()))
                    .with("port", json!(rule.port))
                    .with("description", json!(rule.description))
                    .tag("Name", ingress.load_balancer.name.clone())
                    .tag("Stage", ctx.stage().as_str()),
            )?;
        }
        Ok(())
    }

    fn declare_load_balancer(&self, graph: &mut ResourceGraph, inputs: &Inputs<'_>) -> UnitResult<()> {
        let lb = &self.service.load_balancer;
        let check = &self.service.health_check;

        graph.add(
            ResourceDecl::new(LOAD_BALANCER, ResourceKind::LoadBalancer)
                .named(format!("alb-{}", self.service_name))
                .with("vpc", json!(inputs.vpc_id))
                .with("internet_facing", json!(lb.internet_facing))
                .with("deletion_protection", json!(false))
                .with("idle_timeout_secs", json!(lb.idle_timeout_secs))
                .with(
                    "security_groups",
                    PropertyValue::List(vec![PropertyValue::reference(LB_SECURITY_GROUP)]),
                ),
        )?;
        graph.add(
            ResourceDecl::new(TARGET_GROUP, ResourceKind::TargetGroup)
                .named(format!("tg-{}", self.service_name))
                .with("vpc", json!(inputs.vpc_id))
                .with("port", json!(self.service.container_port))
                .with("protocol", json!("HTTP"))
                .with("target_type", json!("ip"))
                .with("deregistration_delay_secs", json!(lb.deregistration_delay_secs))
                .with(
                    "health_check",
                    json!({
                        "path": check.path,
                        "healthy_threshold": check.healthy_threshold,
                        "unhealthy_threshold": check.unhealthy_threshold,
                        "interval_secs": check.interval_secs,
                        "timeout_secs": check.timeout_secs,
                    }),
                ),
        )?;
        graph.add(
            ResourceDecl::new(LISTENER, ResourceKind::Listener)
                .with("load_balancer", PropertyValue::attr(LOAD_BALANCER, attr::ARN))
                .with("port", json!(lb.listener_port))
                .with("protocol", json!("HTTP"))
                .with("open", json!(false))
                .with("default_target_group", PropertyValue::attr(TARGET_GROUP, attr::ARN)),
        )?;
        Ok(())
    }

    fn declare_service(&self, graph: &mut ResourceGraph, inputs: &Inputs<'_>) -> UnitResult<()> {
        let svc = &self.service;
        let scaling = &svc.scaling;

        graph.add(
            ResourceDecl::new(SERVICE, ResourceKind::Service)
                .named(self.service_name.clone())
                .with("cluster", json!(inputs.cluster_name))
                .with("task_definition", PropertyValue::attr(TASK_DEFINITION, attr::ARN))
                .with("launch_type", json!("FARGATE"))
                .with("desired_count", json!(scaling.min_capacity))
                .with("min_healthy_percent", json!(svc.min_healthy_percent))
                .with("max_healthy_percent", json!(svc.max_healthy_percent))
                .with("enable_execute_command", json!(svc.enable_execute_command))
                .with("health_check_grace_secs", json!(svc.health_check_grace_secs))
                .with("vpc", json!(inputs.vpc_id))
                .with("security_groups", json!([inputs.cluster_sg_id]))
                .with("target_group", PropertyValue::attr(TARGET_GROUP, attr::ARN))
                .with("container_name", json!(self.container_name()))
                .with("container_port", json!(svc.container_port))
                .after(LISTENER)
                .after(CLUSTER_INGRESS),
        )?;
        graph.add(
            ResourceDecl::new(SCALABLE_TARGET, ResourceKind::ScalableTarget)
                .with("service", PropertyValue::attr(SERVICE, attr::ARN))
                .with("min_capacity", json!(scaling.min_capacity))
                .with("max_capacity", json!(scaling.max_capacity)),
        )?;
        graph.add(
            ResourceDecl::new(CPU_SCALING, ResourceKind::ScalingPolicy)
                .with("target", PropertyValue::reference(SCALABLE_TARGET))
                .with("metric", json!("cpu-utilization"))
                .with("target_percent", json!(scaling.target_cpu_percent))
                .with("scale_out_cooldown_secs", json!(scaling.scale_out_cooldown_secs))
                .with("scale_in_cooldown_secs", json!(scaling.scale_in_cooldown_secs)),
        )?;
        Ok(())
    }
}

impl Unit for ServiceUnit {
    fn manifest(&self) -> UnitManifest {
        UnitManifest::new(UnitKind::Service).requires(REQUIRED)
    }

    fn stack_name(&self, ctx: &RunContext) -> String {
        format!("ecs-{}-{}", self.cluster_name, ctx.stage())
    }

    fn description(&self) -> &'static str {
        "ECS Fargate service with ALB and autoscaling"
    }

    fn declare(&self, ctx: &RunContext, inputs: &ResolvedInputs) -> UnitResult<ResourceGraph> {
        self.service.validate()?;
        let inputs = Inputs::resolve(inputs)?;
        let ingress = self.ingress(inputs.cluster_sg_id);
        ingress.verify()?;

        let mut graph = stack_graph(self, ctx);
        self.declare_task(&mut graph, &inputs)?;
        self.declare_ingress(&mut graph, &inputs, &ingress, ctx)?;
        self.declare_load_balancer(&mut graph, &inputs)?;
        self.declare_service(&mut graph, &inputs)?;

        tracing::debug!(
            stack = %graph.stack_name,
            cluster = %inputs.cluster_name,
            resources = graph.len(),
            "service declared"
        );
        Ok(graph)
    }

    fn publications(&self) -> Vec<Publication> {
        Vec::new()
    }

    fn outputs(&self, _ctx: &RunContext) -> Vec<OutputDecl> {
        vec![
            OutputDecl::attribute("Service", SERVICE, attr::ARN),
            OutputDecl::attribute("TaskDefinition", TASK_DEFINITION, attr::FAMILY),
            OutputDecl::attribute("LogGroup", LOG_GROUP, attr::NAME),
            OutputDecl::attribute("ALB", LOAD_BALANCER, attr::DNS_NAME),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{UnitError, ValidationError};
    use pretty_assertions::assert_eq;

    fn inputs() -> ResolvedInputs {
        ResolvedInputs::new()
            .with(LogicalKey::VpcId, "vpc-123")
            .with(LogicalKey::ClusterName, "sonarqube-fargate-dev")
            .with(LogicalKey::ClusterSecurityGroupId, "sg-abc")
            .with(LogicalKey::TaskExecutionRoleArn, "arn:local:iam::1:role/exec")
            .with(LogicalKey::DefaultTaskRoleArn, "arn:local:iam::1:role/task")
    }

    fn declare(config: &StrataConfig) -> UnitResult<ResourceGraph> {
        let ctx = RunContext::resolve(config, None, None).unwrap();
        ServiceUnit::new(config).declare(&ctx, &inputs())
    }

    #[test]
    fn shared_boundary_only_admits_load_balancer() {
        let graph = declare(&StrataConfig::default()).unwrap();

        let rule = graph.get(CLUSTER_INGRESS).unwrap();
        assert_eq!(rule.literal("group"), Some(&json!("sg-abc")));
        assert_eq!(
            rule.properties.get("source"),
            Some(&PropertyValue::reference(LB_SECURITY_GROUP))
        );
        assert_eq!(rule.literal("port"), Some(&json!(9000)));

        let lb_sg = graph.get(LB_SECURITY_GROUP).unwrap();
        assert_eq!(
            lb_sg.literal("ingress"),
            Some(&json!([{
                "cidr": "0.0.0.0/0",
                "protocol": "tcp",
                "port": 80,
                "description": "Allow any",
            }]))
        );
        assert_eq!(graph.of_kind(ResourceKind::SecurityGroupIngress).count(), 1);
    }

    #[test]
    fn service_never_declares_a_cluster_boundary() {
        let graph = declare(&StrataConfig::default()).unwrap();
        let groups: Vec<_> = graph
            .of_kind(ResourceKind::SecurityGroup)
            .map(|g| g.logical_id.as_str())
            .collect();
        assert_eq!(groups, vec![LB_SECURITY_GROUP]);
    }

    #[test]
    fn defaults_reach_the_declared_resources() {
        let graph = declare(&StrataConfig::default()).unwrap();
        assert_eq!(graph.stack_name, "ecs-sonarqube-fargate-dev");

        let task = graph.get(TASK_DEFINITION).unwrap();
        assert_eq!(task.literal("family"), Some(&json!("sonarqube-task")));
        assert_eq!(task.literal("container").unwrap()["name"], "sonarqube-container");

        let tg = graph.get(TARGET_GROUP).unwrap();
        assert_eq!(tg.name.as_deref(), Some("tg-sonarqube"));
        assert_eq!(tg.literal("health_check").unwrap()["path"], "/maintenance");

        let policy = graph.get(CPU_SCALING).unwrap();
        assert_eq!(policy.literal("scale_out_cooldown_secs"), Some(&json!(60)));
        assert_eq!(policy.literal("scale_in_cooldown_secs"), Some(&json!(120)));

        let order = graph.creation_order().unwrap();
        let pos = |id: &str| order.iter().position(|d| d.logical_id == id).unwrap();
        assert!(pos(CLUSTER_INGRESS) < pos(SERVICE));
        assert!(pos(LISTENER) < pos(SERVICE));
        assert!(pos(SERVICE) < pos(CPU_SCALING));
    }

    #[test]
    fn registry_image_skips_build() {
        let mut config = StrataConfig::default();
        config.service.image = ImageSource::Registry {
            uri: "registry.local/sonarqube:lts".into(),
        };
        let graph = declare(&config).unwrap();
        assert!(graph.get(CONTAINER_IMAGE).is_none());
        assert_eq!(
            graph.get(TASK_DEFINITION).unwrap().literal("container_image"),
            Some(&json!("registry.local/sonarqube:lts"))
        );
    }

    #[test]
    fn invalid_shape_fails_before_declaring() {
        let mut config = StrataConfig::default();
        config.service.container_memory_reservation_mib = 4096;
        assert!(matches!(
            declare(&config),
            Err(UnitError::Validation(ValidationError::ContainerExceedsTask { .. }))
        ));
    }

    #[test]
    fn cooldown_asymmetry_is_enforced() {
        let mut config = StrataConfig::default();
        config.service.scaling.scale_out_cooldown_secs = 120;
        assert!(matches!(
            declare(&config),
            Err(UnitError::Validation(ValidationError::CooldownOrder { .. }))
        ));
    }

    #[test]
    fn every_missing_input_is_fatal() {
        let config = StrataConfig::default();
        let ctx = RunContext::resolve(&config, None, None).unwrap();
        let unit = ServiceUnit::new(&config);
        for key in REQUIRED {
            let mut partial = ResolvedInputs::new();
            for (k, v) in inputs().iter().filter(|(k, _)| *k != key) {
                partial.insert(k, v);
            }
            assert!(matches!(
                unit.declare(&ctx, &partial),
                Err(UnitError::MissingInput { key: missing, .. }) if missing == key
            ));
        }
    }
}
