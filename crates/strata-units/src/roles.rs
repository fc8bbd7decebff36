//! Execution and runtime identities

use crate::config::StrataConfig;
use crate::context::RunContext;
use crate::error::UnitResult;
use crate::manifest::{OutputDecl, Publication, UnitKind, UnitManifest};
use crate::unit::{stack_graph, ResolvedInputs, Unit};
use serde_json::json;
use strata_engine::{attr, ResourceDecl, ResourceGraph, ResourceKind};
use strata_store::LogicalKey;

/// Logical id of the execution identity
pub const EXECUTION_ROLE: &str = "TaskExecutionRole";
/// Logical id of the runtime identity
pub const TASK_ROLE: &str = "DefaultTaskRole";

const EXECUTION_ACTIONS: [&str; 6] = [
    "ecr:GetAuthorizationToken",
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

const TASK_ACTIONS: [&str; 6] = [
    "logs:CreateLogStream",
    "logs:PutLogEvents",
    "ssmmessages:CreateControlChannel",
    "ssmmessages:CreateDataChannel",
    "ssmmessages:OpenControlChannel",
    "ssmmessages:OpenDataChannel",
];

/// Builds the identities tasks run under
#[derive(Debug, Clone)]
pub struct AccessRolesUnit {
    cluster_name: String,
}

impl AccessRolesUnit {
    /// Unit for the configured cluster
    #[must_use]
    pub fn new(config: &StrataConfig) -> Self {
        Self {
            cluster_name: config.deployment.cluster_name.clone(),
        }
    }

    fn role(logical_id: &str, name: String, purpose: &str, actions: &[&str]) -> ResourceDecl {
        ResourceDecl::new(logical_id, ResourceKind::Role)
            .named(name)
            .with("assumed_by", json!("ecs-tasks"))
            .with("purpose", json!(purpose))
            .with(
                "policy",
                json!({
                    "effect": "allow",
                    "actions": actions,
                    "resources": ["*"],
                }),
            )
    }
}

impl Unit for AccessRolesUnit {
    fn manifest(&self) -> UnitManifest {
        UnitManifest::new(UnitKind::AccessRoles)
            .produces([LogicalKey::TaskExecutionRoleArn, LogicalKey::DefaultTaskRoleArn])
            .after([UnitKind::Network])
    }

    fn stack_name(&self, ctx: &RunContext) -> String {
        format!("ecs-{}-iam-role-{}", self.cluster_name, ctx.stage())
    }

    fn description(&self) -> &'static str {
        "ECS Fargate IAM Role"
    }

    fn declare(&self, ctx: &RunContext, _inputs: &ResolvedInputs) -> UnitResult<ResourceGraph> {
        let mut graph = stack_graph(self, ctx);
        let base = format!("{}-{}", self.cluster_name, ctx.stage());
        graph.add(Self::role(
            EXECUTION_ROLE,
            format!("{base}-task-execution-role"),
            "pull images and ship logs",
            &EXECUTION_ACTIONS,
        ))?;
        graph.add(Self::role(
            TASK_ROLE,
            format!("{base}-default-task-role"),
            "runtime identity with execute-command channels",
            &TASK_ACTIONS,
        ))?;
        Ok(graph)
    }

    fn publications(&self) -> Vec<Publication> {
        vec![
            Publication::new(LogicalKey::TaskExecutionRoleArn, EXECUTION_ROLE, attr::ARN),
            Publication::new(LogicalKey::DefaultTaskRoleArn, TASK_ROLE, attr::ARN),
        ]
    }

    fn outputs(&self, _ctx: &RunContext) -> Vec<OutputDecl> {
        vec![
            OutputDecl::attribute("TaskExecutionRoleArn", EXECUTION_ROLE, attr::ARN),
            OutputDecl::attribute("DefaultTaskRoleArn", TASK_ROLE, attr::ARN),
        ]
    }
}
