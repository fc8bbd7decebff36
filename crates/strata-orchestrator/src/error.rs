//! Error types for unit orchestration
//!
//! Every failure aborts the current unit and is surfaced to the operator.
//! The only implicit cross-unit signal is a key that never gets published,
//! which shows up downstream as [`ProvisionError::DependencyNotReady`].

use strata_engine::{EngineError, ResourceKind};
use strata_store::{ParameterKey, Stage, StoreError};
use strata_units::{UnitError, UnitKind, ValidationError};

/// Result alias for orchestration
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Orchestration errors
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Required keys are not published; nothing was created
    #[error("unit {unit} is not ready: missing {}", format_keys(keys))]
    DependencyNotReady {
        /// Unit being applied
        unit: UnitKind,
        /// Every missing key
        keys: Vec<ParameterKey>,
    },

    /// A required key holds a value written by another stage
    #[error("unit {unit}: {key} was published by stage '{found}', expected '{expected}'")]
    StaleDependency {
        /// Unit being applied
        unit: UnitKind,
        /// Offending key
        key: ParameterKey,
        /// Active stage
        expected: Stage,
        /// Stage that wrote the value
        found: Stage,
    },

    /// A named resource belongs to another stack
    #[error("unit {unit}: {kind} '{name}' already exists in stack {owner}")]
    ResourceConflict {
        /// Unit being applied
        unit: UnitKind,
        /// Resource kind
        kind: ResourceKind,
        /// Physical name
        name: String,
        /// Owning stack
        owner: String,
    },

    /// Declared properties violate a constraint; nothing was created
    #[error("unit {unit}: {source}")]
    Validation {
        /// Unit being applied
        unit: UnitKind,
        /// Violated constraint
        source: ValidationError,
    },

    /// Some resources exist after a later one failed; re-apply to converge
    #[error("unit {unit}: step '{failed_step}' failed after creating [{}]: {reason}", created.join(", "))]
    PartialApply {
        /// Unit being applied
        unit: UnitKind,
        /// Logical id that failed
        failed_step: String,
        /// Logical ids that exist
        created: Vec<String>,
        /// Engine failure detail
        reason: String,
    },

    /// Teardown of a protected stage without override
    #[error("unit {unit}: stack {stack} is termination protected (use --force)")]
    TerminationProtected {
        /// Unit being torn down
        unit: UnitKind,
        /// Protected stack
        stack: String,
    },

    /// Teardown while consumers of the unit's keys are still deployed
    #[error("unit {unit} still has deployed dependents: {}", format_units(dependents))]
    DependentsStillApplied {
        /// Unit being torn down
        unit: UnitKind,
        /// Deployed consumers
        dependents: Vec<UnitKind>,
    },

    /// Another apply or teardown of the same unit and stage is running
    #[error("unit {unit} is already being applied for stage {stage}")]
    ApplyInProgress {
        /// Contended unit
        unit: UnitKind,
        /// Contended stage
        stage: Stage,
    },

    /// No unit of that kind is registered
    #[error("unit {0} is not registered")]
    UnknownUnit(UnitKind),

    /// Unit manifests form a cycle or name no producer
    #[error("unit graph error: {0}")]
    Graph(String),

    /// Configuration could not be loaded or resolved
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine failure without a more specific classification
    #[error("unit {unit}: {source}")]
    Engine {
        /// Unit being applied
        unit: UnitKind,
        /// Engine error
        source: EngineError,
    },

    /// Store failure
    #[error("parameter store error: {0}")]
    Store(#[from] StoreError),
}

fn format_keys(keys: &[ParameterKey]) -> String {
    keys.iter()
        .map(ParameterKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_units(units: &[UnitKind]) -> String {
    units
        .iter()
        .map(|u| u.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ProvisionError {
    /// Classify an engine failure for `unit`
    #[must_use]
    pub fn from_engine(unit: UnitKind, err: EngineError) -> Self {
        match err {
            EngineError::ResourceConflict { kind, name, owner } => Self::ResourceConflict {
                unit,
                kind,
                name,
                owner,
            },
            EngineError::PartialApply {
                failed,
                created,
                reason,
                ..
            } => Self::PartialApply {
                unit,
                failed_step: failed,
                created,
                reason,
            },
            EngineError::TerminationProtected { stack } => {
                Self::TerminationProtected { unit, stack }
            }
            other => Self::Engine {
                unit,
                source: other,
            },
        }
    }

    /// Classify a store failure hit while resolving `unit`'s inputs
    #[must_use]
    pub fn from_store(unit: UnitKind, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => Self::DependencyNotReady {
                unit,
                keys: vec![key],
            },
            StoreError::StaleDependency {
                key,
                expected,
                found,
            } => Self::StaleDependency {
                unit,
                key,
                expected,
                found,
            },
            other => Self::Store(other),
        }
    }

    /// Classify a declaration failure of `unit`
    #[must_use]
    pub fn from_unit(unit: UnitKind, err: UnitError) -> Self {
        match err {
            UnitError::Validation(source) => Self::Validation { unit, source },
            UnitError::Engine(err) => Self::from_engine(unit, err),
            UnitError::Store(err) => Self::from_store(unit, err),
            UnitError::MissingInput { key, .. } => Self::Graph(format!(
                "unit {unit} declared without resolving {key}; its manifest is incomplete"
            )),
            UnitError::Config(msg) => Self::Config(msg),
        }
    }

    /// Whether re-running the same command can succeed without other changes
    ///
    /// Partial applies converge on re-apply; lock contention clears once the
    /// other run finishes.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PartialApply { .. } | Self::ApplyInProgress { .. }
        )
    }

    /// Keys that must be published first, if this is a readiness failure
    #[must_use]
    pub fn missing_keys(&self) -> &[ParameterKey] {
        match self {
            Self::DependencyNotReady { keys, .. } => keys,
            _ => &[],
        }
    }

    /// Unit the error is about, if any
    #[must_use]
    pub fn unit(&self) -> Option<UnitKind> {
        match self {
            Self::DependencyNotReady { unit, .. }
            | Self::StaleDependency { unit, .. }
            | Self::ResourceConflict { unit, .. }
            | Self::Validation { unit, .. }
            | Self::PartialApply { unit, .. }
            | Self::TerminationProtected { unit, .. }
            | Self::DependentsStillApplied { unit, .. }
            | Self::ApplyInProgress { unit, .. }
            | Self::Engine { unit, .. } => Some(*unit),
            Self::UnknownUnit(unit) => Some(*unit),
            Self::Graph(_) | Self::Config(_) | Self::Store(_) => None,
        }
    }
}
