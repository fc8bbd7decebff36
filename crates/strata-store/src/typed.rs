//! Typed accessors per logical key
//!
//! Unit code calls `params.cluster_name()` instead of formatting
//! `"/prefix/cluster-name"` itself.

use crate::error::StoreResult;
use crate::key::{KeyNamespace, LogicalKey, ParameterKey};
use crate::stage::Stage;
use crate::store::ParameterStore;

/// Store view bound to one namespace and stage
#[derive(Clone, Copy)]
pub struct StackParameters<'a> {
    store: &'a dyn ParameterStore,
    namespace: &'a KeyNamespace,
    stage: &'a Stage,
}

macro_rules! typed_parameter {
    ($($getter:ident, $setter:ident => $logical:ident;)*) => {
        $(
            #[doc = concat!("Resolve `", stringify!($logical), "` for this stage")]
            pub async fn $getter(&self) -> StoreResult<String> {
                self.get(LogicalKey::$logical).await
            }

            #[doc = concat!("Publish `", stringify!($logical), "` for this stage")]
            pub async fn $setter(&self, value: &str) -> StoreResult<String> {
                self.put(LogicalKey::$logical, value).await
            }
        )*
    };
}

impl<'a> StackParameters<'a> {
    /// Bind a store to a namespace and stage
    #[must_use]
    pub fn new(store: &'a dyn ParameterStore, namespace: &'a KeyNamespace, stage: &'a Stage) -> Self {
        Self {
            store,
            namespace,
            stage,
        }
    }

    /// Stage this view reads and writes
    #[inline]
    #[must_use]
    pub fn stage(&self) -> &Stage {
        self.stage
    }

    /// Concrete key for a logical key
    #[must_use]
    pub fn key(&self, logical: LogicalKey) -> ParameterKey {
        self.namespace.key(self.stage, logical)
    }

    /// Resolve a logical key, rejecting values written by another stage
    ///
    /// # Errors
    /// [`crate::StoreError::NotFound`] if never published,
    /// [`crate::StoreError::StaleDependency`] if another stage wrote it.
    pub async fn get(&self, logical: LogicalKey) -> StoreResult<String> {
        self.store.get_for_stage(&self.key(logical), self.stage).await
    }

    /// Publish a logical key (idempotent upsert)
    ///
    /// # Errors
    /// Propagates store failures and empty-value rejection.
    pub async fn put(&self, logical: LogicalKey, value: &str) -> StoreResult<String> {
        self.store.put(&self.key(logical), value, self.stage).await
    }

    /// Remove a logical key; returns whether it existed
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn delete(&self, logical: LogicalKey) -> StoreResult<bool> {
        self.store.delete(&self.key(logical)).await
    }

    typed_parameter! {
        network_id, put_network_id => VpcId;
        execution_role_arn, put_execution_role_arn => TaskExecutionRoleArn;
        task_role_arn, put_task_role_arn => DefaultTaskRoleArn;
        cluster_name, put_cluster_name => ClusterName;
        cluster_arn, put_cluster_arn => ClusterArn;
        cluster_security_group_id, put_cluster_security_group_id => ClusterSecurityGroupId;
        registry_name, put_registry_name => EcrRepoName;
        registry_arn, put_registry_arn => EcrRepoArn;
        source_repository_arn, put_source_repository_arn => CodecommitArn;
    }
}

impl std::fmt::Debug for StackParameters<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackParameters")
            .field("namespace", self.namespace)
            .field("stage", self.stage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyScheme;
    use crate::memory::InMemoryParameterStore;
    use crate::StoreError;

    #[tokio::test]
    async fn typed_accessors_use_namespace_layout() {
        let store = InMemoryParameterStore::new();
        let ns = KeyNamespace::new("/sonarqube-fargate-cdk", KeyScheme::StageScoped).unwrap();
        let dev = Stage::new("dev").unwrap();
        let params = StackParameters::new(&store, &ns, &dev);

        params.put_cluster_name("sonarqube-fargate-dev").await.unwrap();

        let raw = ParameterKey::parse("/sonarqube-fargate-cdk/dev/cluster-name").unwrap();
        assert_eq!(store.get(&raw).await.unwrap().value, "sonarqube-fargate-dev");
        assert_eq!(params.cluster_name().await.unwrap(), "sonarqube-fargate-dev");
    }

    #[tokio::test]
    async fn global_scheme_surfaces_other_stage_as_stale() {
        let store = InMemoryParameterStore::new();
        let ns = KeyNamespace::new("/app", KeyScheme::Global).unwrap();
        let dev = Stage::new("dev").unwrap();
        let prod = Stage::new("prod").unwrap();

        StackParameters::new(&store, &ns, &prod)
            .put_network_id("vpc-prod")
            .await
            .unwrap();

        let err = StackParameters::new(&store, &ns, &dev)
            .network_id()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleDependency { .. }));
    }

    #[tokio::test]
    async fn stage_scoped_scheme_keeps_stages_apart() {
        let store = InMemoryParameterStore::new();
        let ns = KeyNamespace::new("/app", KeyScheme::StageScoped).unwrap();
        let dev = Stage::new("dev").unwrap();
        let prod = Stage::new("prod").unwrap();

        StackParameters::new(&store, &ns, &prod)
            .put_network_id("vpc-prod")
            .await
            .unwrap();
        StackParameters::new(&store, &ns, &dev)
            .put_network_id("vpc-dev")
            .await
            .unwrap();

        assert_eq!(
            StackParameters::new(&store, &ns, &prod).network_id().await.unwrap(),
            "vpc-prod"
        );
        assert_eq!(
            StackParameters::new(&store, &ns, &dev).network_id().await.unwrap(),
            "vpc-dev"
        );
    }
}
