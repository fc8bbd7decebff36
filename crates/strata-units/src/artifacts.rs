//! Image registry and source repository unit
//!
//! The registry keys are only published once the built image has been
//! copied into the registry, so "key present" implies "image present".

use crate::config::{ArtifactConfig, StrataConfig};
use crate::context::RunContext;
use crate::error::UnitResult;
use crate::manifest::{OutputDecl, Publication, UnitKind, UnitManifest};
use crate::unit::{stack_graph, ResolvedInputs, Unit};
use serde_json::json;
use strata_engine::{attr, PropertyValue, ResourceDecl, ResourceGraph, ResourceKind};
use strata_store::LogicalKey;

/// Logical id of the built image
pub const IMAGE_ASSET: &str = "ImageAsset";
/// Logical id of the registry
pub const REGISTRY: &str = "Registry";
/// Logical id of the image copy into the registry
pub const IMAGE_DEPLOYMENT: &str = "ImageDeployment";
/// Logical id of the source repository
pub const SOURCE_REPOSITORY: &str = "SourceRepository";

/// Builds the registry, pushes the image, creates the source repository
#[derive(Debug, Clone)]
pub struct ArtifactRepositoryUnit {
    service_name: String,
    artifacts: ArtifactConfig,
}

impl ArtifactRepositoryUnit {
    /// Unit for the configured service
    #[must_use]
    pub fn new(config: &StrataConfig) -> Self {
        Self {
            service_name: config.deployment.service_name.clone(),
            artifacts: config.artifacts.clone(),
        }
    }

    fn repository_name(&self, ctx: &RunContext) -> String {
        format!("{}-{}", self.service_name, ctx.stage())
    }
}

impl Unit for ArtifactRepositoryUnit {
    fn manifest(&self) -> UnitManifest {
        UnitManifest::new(UnitKind::ArtifactRepository)
            .produces([
                LogicalKey::CodecommitArn,
                LogicalKey::EcrRepoName,
                LogicalKey::EcrRepoArn,
            ])
            .after([UnitKind::Network])
    }

    fn stack_name(&self, ctx: &RunContext) -> String {
        format!("ecr-{}-{}", self.service_name, ctx.stage())
    }

    fn description(&self) -> &'static str {
        "ECR and CodeCommit repositories"
    }

    fn declare(&self, ctx: &RunContext, _inputs: &ResolvedInputs) -> UnitResult<ResourceGraph> {
        let name = self.repository_name(ctx);
        let mut graph = stack_graph(self, ctx);

        graph.add(
            ResourceDecl::new(IMAGE_ASSET, ResourceKind::ImageAsset)
                .with("directory", json!(self.artifacts.build_directory)),
        )?;
        graph.add(
            ResourceDecl::new(REGISTRY, ResourceKind::Registry)
                .named(name.clone())
                .tag("Stage", ctx.stage().as_str()),
        )?;
        graph.add(
            ResourceDecl::new(IMAGE_DEPLOYMENT, ResourceKind::ImageCopy)
                .with("source", PropertyValue::attr(IMAGE_ASSET, attr::IMAGE_URI))
                .with("destination", PropertyValue::attr(REGISTRY, attr::URI))
                .with("tag", json!(self.artifacts.image_tag)),
        )?;
        graph.add(
            ResourceDecl::new(SOURCE_REPOSITORY, ResourceKind::SourceRepository)
                .named(name)
                .with("description", json!(format!("{} source", self.service_name)))
                .tag("Stage", ctx.stage().as_str()),
        )?;
        Ok(graph)
    }

    fn publications(&self) -> Vec<Publication> {
        vec![
            Publication::new(LogicalKey::CodecommitArn, SOURCE_REPOSITORY, attr::ARN),
            Publication::new(LogicalKey::EcrRepoName, REGISTRY, attr::NAME),
            Publication::new(LogicalKey::EcrRepoArn, REGISTRY, attr::ARN),
        ]
    }

    fn outputs(&self, _ctx: &RunContext) -> Vec<OutputDecl> {
        vec![
            OutputDecl::attribute("EcrUri", REGISTRY, attr::URI),
            OutputDecl::attribute("CodeCommitRepoUrl", SOURCE_REPOSITORY, attr::CLONE_URL_HTTP),
        ]
    }
}
