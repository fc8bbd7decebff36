//! Local provisioning engine
//!
//! Simulates a cloud control plane: physical ids are derived from the stack
//! and logical id, so re-applying a graph converges on the same resources.
//! State optionally persists to a JSON file so separate runs see each
//! other's stacks. Every operation on a persisted engine holds an exclusive
//! lock on a sibling `.lock` file and re-reads the state first, so engines in
//! different processes merge their changes instead of overwriting them.

use crate::engine::{AppliedStack, CreatedResource, DeployContext, ProvisioningEngine, StackStatus};
use crate::error::{EngineError, EngineResult};
use crate::resource::{attr, PropertyValue, ResourceDecl, ResourceGraph, ResourceKind};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Serialize, Deserialize)]
struct EngineDocument {
    stacks: Vec<AppliedStack>,
}

/// Held for the duration of one engine operation; dropping it releases
/// both the in-process and the file lock
struct StateGuard<'a> {
    _local: MutexGuard<'a, ()>,
    _file: Option<File>,
}

/// In-process engine with optional file persistence
#[derive(Debug, Default)]
pub struct LocalEngine {
    stacks: RwLock<BTreeMap<String, AppliedStack>>,
    failures: RwLock<BTreeSet<String>>,
    state_path: Option<PathBuf>,
    io: Mutex<()>,
}

impl LocalEngine {
    /// Engine without persistence
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine persisted at `path`, loading existing state
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let stacks = read_state(&path).await?;
        Ok(Self {
            stacks: RwLock::new(stacks),
            state_path: Some(path),
            ..Self::default()
        })
    }

    /// Backing file, if persisted
    #[must_use]
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Make creation of `logical_id` fail in every later apply
    pub fn fail_on(&self, logical_id: impl Into<String>) {
        self.failures.write().insert(logical_id.into());
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Names of stacks known as of the last operation
    #[must_use]
    pub fn stack_names(&self) -> Vec<String> {
        self.stacks.read().keys().cloned().collect()
    }

    fn check_conflicts(&self, graph: &ResourceGraph) -> EngineResult<()> {
        let stacks = self.stacks.read();
        for decl in graph.resources() {
            let Some(name) = decl.name.as_deref() else {
                continue;
            };
            let owner = stacks.values().find(|stack| {
                stack.stack_name != graph.stack_name
                    && stack
                        .of_kind(decl.kind)
                        .any(|r| r.attribute(attr::NAME) == Some(name))
            });
            if let Some(owner) = owner {
                return Err(EngineError::ResourceConflict {
                    kind: decl.kind,
                    name: name.to_string(),
                    owner: owner.stack_name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Take the state lock and refresh the cached stacks from disk
    async fn lock(&self) -> EngineResult<StateGuard<'_>> {
        let local = self.io.lock().await;
        let file = match &self.state_path {
            Some(path) => {
                let file = lock_file(path).await?;
                let stacks = read_state(path).await?;
                *self.stacks.write() = stacks;
                Some(file)
            }
            None => None,
        };
        Ok(StateGuard {
            _local: local,
            _file: file,
        })
    }

    /// Write the cached stacks back; callers hold the state lock
    async fn persist(&self) -> EngineResult<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let doc = EngineDocument {
            stacks: self.stacks.read().values().cloned().collect(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    fn record(&self, stack: AppliedStack) {
        self.stacks.write().insert(stack.stack_name.clone(), stack);
    }
}

async fn read_state(path: &Path) -> EngineResult<BTreeMap<String, AppliedStack>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let doc: EngineDocument = serde_json::from_slice(&bytes)?;
            Ok(doc
                .stacks
                .into_iter()
                .map(|s| (s.stack_name.clone(), s))
                .collect())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Block (off the runtime) until the `.lock` sibling of `path` is ours
async fn lock_file(path: &Path) -> EngineResult<File> {
    let lock_path = path.with_extension("lock");
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(file)
}

fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"/");
    }
    hex::encode(hasher.finalize())[..8].to_string()
}

fn resolve(
    stack: &str,
    owner: &str,
    value: &PropertyValue,
    created: &BTreeMap<String, CreatedResource>,
) -> EngineResult<Value> {
    let lookup = |id: &str| {
        created.get(id).ok_or_else(|| EngineError::UnknownReference {
            stack: stack.to_string(),
            from: owner.to_string(),
            to: id.to_string(),
        })
    };
    match value {
        PropertyValue::Literal(v) => Ok(v.clone()),
        PropertyValue::Ref(id) => Ok(Value::String(lookup(id)?.physical_id.clone())),
        PropertyValue::Attr {
            resource,
            attribute,
        } => lookup(resource)?
            .attribute(attribute)
            .map(|v| Value::String(v.to_string()))
            .ok_or_else(|| EngineError::UnknownAttribute {
                stack: stack.to_string(),
                resource: resource.clone(),
                attribute: attribute.clone(),
            }),
        PropertyValue::List(items) => items
            .iter()
            .map(|item| resolve(stack, owner, item, created))
            .collect::<EngineResult<Vec<_>>>()
            .map(Value::Array),
    }
}

fn create(
    ctx: &DeployContext,
    graph: &ResourceGraph,
    decl: &ResourceDecl,
    created: &BTreeMap<String, CreatedResource>,
) -> EngineResult<CreatedResource> {
    let properties = decl
        .properties
        .iter()
        .map(|(k, v)| -> EngineResult<(String, Value)> {
            Ok((k.clone(), resolve(&graph.stack_name, &decl.logical_id, v, created)?))
        })
        .collect::<EngineResult<BTreeMap<_, _>>>()?;

    let hash = short_hash(&[&graph.stack_name, &decl.logical_id]);
    let physical_id = match (decl.kind.id_prefix(), &decl.name) {
        (Some(prefix), _) => format!("{prefix}-{hash}"),
        (None, Some(name)) => name.clone(),
        (None, None) => format!("{}-{hash}", decl.logical_id.to_lowercase()),
    };
    let name = decl.name.clone().unwrap_or_else(|| physical_id.clone());
    let arn = format!(
        "arn:local:{}:{}:{}:{}/{}",
        decl.kind.service(),
        ctx.region,
        ctx.account,
        decl.kind.arn_type(),
        name
    );

    let mut attributes = BTreeMap::from([
        (attr::ID.to_string(), physical_id.clone()),
        (attr::ARN.to_string(), arn),
        (attr::NAME.to_string(), name.clone()),
    ]);
    let host = format!("{}.registry.{}.local", ctx.account, ctx.region);
    match decl.kind {
        ResourceKind::Registry => {
            attributes.insert(attr::URI.to_string(), format!("{host}/{name}"));
        }
        ResourceKind::ImageAsset => {
            let source = properties
                .get("directory")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let digest = short_hash(&[&graph.stack_name, source]);
            attributes.insert(attr::IMAGE_URI.to_string(), format!("{host}/assets:{digest}"));
        }
        ResourceKind::SourceRepository => {
            attributes.insert(
                attr::CLONE_URL_HTTP.to_string(),
                format!("https://source.{}.local/v1/repos/{name}", ctx.region),
            );
        }
        ResourceKind::LoadBalancer => {
            attributes.insert(
                attr::DNS_NAME.to_string(),
                format!("{name}-{hash}.{}.elb.local", ctx.region),
            );
        }
        ResourceKind::TaskDefinition => {
            let family = properties
                .get("family")
                .and_then(Value::as_str)
                .map_or_else(|| name.clone(), str::to_string);
            attributes.insert(attr::FAMILY.to_string(), family);
        }
        _ => {}
    }

    let mut tags = graph.tags.clone();
    tags.extend(decl.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(CreatedResource {
        logical_id: decl.logical_id.clone(),
        kind: decl.kind,
        physical_id,
        attributes,
        properties,
        tags,
    })
}

#[async_trait]
impl ProvisioningEngine for LocalEngine {
    async fn apply(&self, ctx: &DeployContext, graph: &ResourceGraph) -> EngineResult<AppliedStack> {
        let order = graph.creation_order()?;
        let _state = self.lock().await?;
        self.check_conflicts(graph)?;
        let previous = self.stacks.read().get(&graph.stack_name).cloned();

        let mut created: BTreeMap<String, CreatedResource> = BTreeMap::new();
        let mut in_order: Vec<String> = Vec::with_capacity(order.len());
        let mut failure = None;
        for decl in order {
            if self.failures.read().contains(&decl.logical_id) {
                failure = Some((decl.logical_id.clone(), "injected failure".to_string()));
                break;
            }
            match create(ctx, graph, decl, &created) {
                Ok(resource) => {
                    tracing::debug!(stack = %graph.stack_name, resource = %decl.logical_id, id = %resource.physical_id, "resource created");
                    in_order.push(decl.logical_id.clone());
                    created.insert(decl.logical_id.clone(), resource);
                }
                Err(e) => {
                    failure = Some((decl.logical_id.clone(), e.to_string()));
                    break;
                }
            }
        }

        let mut resources: Vec<CreatedResource> = in_order
            .iter()
            .filter_map(|id| created.remove(id))
            .collect();
        if failure.is_some() {
            // an interrupted update leaves resources it never reached in place
            if let Some(previous) = previous {
                resources.extend(
                    previous
                        .resources
                        .into_iter()
                        .filter(|r| !in_order.contains(&r.logical_id)),
                );
            }
        }
        let stack = AppliedStack {
            stack_name: graph.stack_name.clone(),
            stage: ctx.stage.clone(),
            termination_protection: graph.termination_protection,
            status: if failure.is_some() {
                StackStatus::Partial
            } else {
                StackStatus::Complete
            },
            resources,
        };
        self.record(stack.clone());
        self.persist().await?;

        if let Some((failed, reason)) = failure {
            tracing::warn!(stack = %graph.stack_name, failed = %failed, "apply stopped part way");
            return Err(EngineError::PartialApply {
                stack: graph.stack_name.clone(),
                failed,
                created: in_order,
                reason,
            });
        }
        tracing::info!(stack = %graph.stack_name, stage = %ctx.stage, resources = stack.resources.len(), "stack applied");
        Ok(stack)
    }

    async fn teardown(
        &self,
        ctx: &DeployContext,
        stack_name: &str,
        force: bool,
    ) -> EngineResult<bool> {
        let _state = self.lock().await?;
        {
            let mut stacks = self.stacks.write();
            match stacks.get(stack_name) {
                None => return Ok(false),
                Some(stack) if stack.termination_protection && !force => {
                    return Err(EngineError::TerminationProtected {
                        stack: stack_name.to_string(),
                    });
                }
                Some(_) => {
                    stacks.remove(stack_name);
                }
            }
        }
        self.persist().await?;
        tracing::info!(stack = %stack_name, stage = %ctx.stage, "stack removed");
        Ok(true)
    }

    async fn describe(&self, stack_name: &str) -> EngineResult<Option<AppliedStack>> {
        let _state = self.lock().await?;
        Ok(self.stacks.read().get(stack_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx() -> DeployContext {
        DeployContext::new("dev", "123456789012", "us-east-1")
    }

    fn registry_graph(stack: &str) -> ResourceGraph {
        let mut graph = ResourceGraph::new(stack).with_tag("Stage", "dev");
        graph
            .add(
                ResourceDecl::new("ImageAsset", ResourceKind::ImageAsset)
                    .with("directory", json!("app")),
            )
            .unwrap();
        graph
            .add(ResourceDecl::new("Registry", ResourceKind::Registry).named("sonarqube-dev"))
            .unwrap();
        graph
            .add(
                ResourceDecl::new("ImageDeployment", ResourceKind::ImageCopy)
                    .with("source", PropertyValue::attr("ImageAsset", attr::IMAGE_URI))
                    .with("destination", PropertyValue::attr("Registry", attr::URI)),
            )
            .unwrap();
        graph
    }

    #[tokio::test]
    async fn apply_resolves_references_and_tags() {
        let engine = LocalEngine::new();
        let stack = engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();

        assert!(stack.is_complete());
        let copy = stack.resource("ImageDeployment").unwrap();
        assert_eq!(
            copy.property("destination").unwrap(),
            &json!("123456789012.registry.us-east-1.local/sonarqube-dev")
        );
        assert_eq!(copy.tags.get("Stage").map(String::as_str), Some("dev"));
        assert_eq!(
            stack.attribute("Registry", attr::ARN),
            Some("arn:local:registry:us-east-1:123456789012:repository/sonarqube-dev")
        );
    }

    #[tokio::test]
    async fn reapply_converges() {
        let engine = LocalEngine::new();
        let first = engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();
        let second = engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.stack_names(), vec!["ecr-dev".to_string()]);
    }

    #[tokio::test]
    async fn named_resource_owned_elsewhere_conflicts() {
        let engine = LocalEngine::new();
        engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();
        let err = engine
            .apply(&ctx(), &registry_graph("ecr-copy"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceConflict { ref owner, .. } if owner == "ecr-dev"));
    }

    #[tokio::test]
    async fn injected_failure_keeps_created_resources() {
        let engine = LocalEngine::new();
        engine.fail_on("ImageDeployment");

        let err = engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap_err();
        match err {
            EngineError::PartialApply { failed, created, .. } => {
                assert_eq!(failed, "ImageDeployment");
                assert_eq!(created.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        let stack = engine.describe("ecr-dev").await.unwrap().unwrap();
        assert_eq!(stack.status, StackStatus::Partial);
        assert!(stack.resource("ImageDeployment").is_none());

        engine.clear_failures();
        assert!(engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn failed_update_keeps_resources_it_did_not_reach() {
        let engine = LocalEngine::new();
        engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();

        engine.fail_on("Registry");
        let err = engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap_err();
        assert!(matches!(err, EngineError::PartialApply { ref failed, .. } if failed == "Registry"));

        let stack = engine.describe("ecr-dev").await.unwrap().unwrap();
        assert_eq!(stack.status, StackStatus::Partial);
        assert!(stack.resource("Registry").is_some());
        assert!(stack.resource("ImageDeployment").is_some());
        assert_eq!(stack.resources.len(), 3);
    }

    #[tokio::test]
    async fn engines_sharing_a_state_file_merge_their_stacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let first = LocalEngine::open(&path).await.unwrap();
        let second = LocalEngine::open(&path).await.unwrap();
        first.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();
        second
            .apply(&ctx(), &ResourceGraph::new("roles-dev"))
            .await
            .unwrap();

        let reopened = LocalEngine::open(&path).await.unwrap();
        assert_eq!(
            reopened.stack_names(),
            vec!["ecr-dev".to_string(), "roles-dev".to_string()]
        );
        assert!(first.describe("roles-dev").await.unwrap().is_some());

        assert!(second.teardown(&ctx(), "ecr-dev", false).await.unwrap());
        assert!(first.describe("ecr-dev").await.unwrap().is_none());
        assert_eq!(first.stack_names(), vec!["roles-dev".to_string()]);
    }

    #[tokio::test]
    async fn conflicts_are_checked_against_other_processes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let first = LocalEngine::open(&path).await.unwrap();
        let second = LocalEngine::open(&path).await.unwrap();
        first.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();
        assert!(matches!(
            second.apply(&ctx(), &registry_graph("ecr-copy")).await,
            Err(EngineError::ResourceConflict { .. })
        ));
    }

    #[tokio::test]
    async fn protected_stack_needs_force() {
        let engine = LocalEngine::new();
        let graph = registry_graph("ecr-prod").protected(true);
        engine.apply(&ctx(), &graph).await.unwrap();

        assert!(matches!(
            engine.teardown(&ctx(), "ecr-prod", false).await,
            Err(EngineError::TerminationProtected { .. })
        ));
        assert!(engine.teardown(&ctx(), "ecr-prod", true).await.unwrap());
        assert!(!engine.teardown(&ctx(), "ecr-prod", true).await.unwrap());
    }

    #[tokio::test]
    async fn state_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let engine = LocalEngine::open(&path).await.unwrap();
        let applied = engine.apply(&ctx(), &registry_graph("ecr-dev")).await.unwrap();

        let reopened = LocalEngine::open(&path).await.unwrap();
        assert_eq!(reopened.describe("ecr-dev").await.unwrap(), Some(applied));
        assert_eq!(reopened.state_path(), Some(path.as_path()));
    }
}
