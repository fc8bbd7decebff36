//! Per-run stage resolution

use crate::config::StrataConfig;
use crate::error::UnitResult;
use strata_engine::DeployContext;
use strata_store::{KeyNamespace, ParameterStore, StackParameters, Stage};

/// Everything a unit needs to know about the current run
///
/// Resolved once per invocation and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    stage: Stage,
    network_override: Option<String>,
    namespace: KeyNamespace,
    deploy: DeployContext,
    protected: bool,
}

impl RunContext {
    /// Resolve the active stage, falling back to the configured default
    ///
    /// # Errors
    /// Fails when the stage name or parameter prefix is invalid.
    pub fn resolve(
        config: &StrataConfig,
        stage: Option<&str>,
        network_override: Option<String>,
    ) -> UnitResult<Self> {
        let default_stage = Stage::new(config.deployment.default_stage.as_str())?;
        let stage = match stage {
            Some(name) => Stage::new(name)?,
            None => default_stage.clone(),
        };
        let namespace = KeyNamespace::new(&config.parameters.prefix, config.parameters.scheme)?;
        let deploy = DeployContext::new(
            stage.as_str(),
            config.deployment.account.as_str(),
            config.deployment.region.as_str(),
        );
        let protected = stage != default_stage;
        tracing::debug!(stage = %stage, protected, "run context resolved");

        Ok(Self {
            stage,
            network_override: network_override.filter(|id| !id.is_empty()),
            namespace,
            deploy,
            protected,
        })
    }

    /// Active stage
    #[inline]
    #[must_use]
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Network id supplied on the command line instead of the store
    #[must_use]
    pub fn network_override(&self) -> Option<&str> {
        self.network_override.as_deref()
    }

    /// Key namespace
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    /// Engine context
    #[inline]
    #[must_use]
    pub fn deploy(&self) -> &DeployContext {
        &self.deploy
    }

    /// Whether stacks of this run get termination protection
    #[inline]
    #[must_use]
    pub fn protected(&self) -> bool {
        self.protected
    }

    /// Typed parameter view for this stage
    #[must_use]
    pub fn params<'a>(&'a self, store: &'a dyn ParameterStore) -> StackParameters<'a> {
        StackParameters::new(store, &self.namespace, &self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_unprotected_baseline_stage() {
        let ctx = RunContext::resolve(&StrataConfig::default(), None, None).unwrap();
        assert_eq!(ctx.stage().as_str(), "dev");
        assert!(!ctx.protected());
        assert!(ctx.network_override().is_none());
    }

    #[test]
    fn other_stages_are_protected() {
        let ctx = RunContext::resolve(&StrataConfig::default(), Some("prod"), Some("vpc-9".into()))
            .unwrap();
        assert!(ctx.protected());
        assert_eq!(ctx.deploy().stage, "prod");
        assert_eq!(ctx.network_override(), Some("vpc-9"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let ctx = RunContext::resolve(&StrataConfig::default(), None, Some(String::new())).unwrap();
        assert!(ctx.network_override().is_none());
    }

    #[test]
    fn invalid_stage_is_rejected() {
        assert!(RunContext::resolve(&StrataConfig::default(), Some("Prod!"), None).is_err());
    }
}
