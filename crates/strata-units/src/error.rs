//! Error types for unit declaration

use crate::manifest::UnitKind;
use strata_engine::EngineError;
use strata_store::{LogicalKey, StoreError};

/// Result alias for unit operations
pub type UnitResult<T> = Result<T, UnitError>;

/// Static constraint violated by the configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Container asks for more than the task provides
    #[error("container {resource} {requested} exceeds task {resource} {available}")]
    ContainerExceedsTask {
        /// `cpu` or `memory`
        resource: &'static str,
        /// Container reservation
        requested: u32,
        /// Task size
        available: u32,
    },

    /// Task size is not a supported cpu/memory pair
    #[error("unsupported task shape: {cpu} cpu units with {memory_mib} MiB")]
    UnsupportedTaskShape {
        /// Task cpu units
        cpu: u32,
        /// Task memory in MiB
        memory_mib: u32,
    },

    /// Health check would time out after the next check started
    #[error("health check interval {interval_secs}s must exceed timeout {timeout_secs}s")]
    HealthCheckTiming {
        /// Check interval
        interval_secs: u64,
        /// Check timeout
        timeout_secs: u64,
    },

    /// Threshold or count that must be positive is zero
    #[error("{field} must be a positive integer")]
    NonPositive {
        /// Offending field
        field: &'static str,
    },

    /// Scale-out must react faster than scale-in
    #[error("scale-out cooldown {scale_out_secs}s must be shorter than scale-in cooldown {scale_in_secs}s")]
    CooldownOrder {
        /// Scale-out cooldown
        scale_out_secs: u64,
        /// Scale-in cooldown
        scale_in_secs: u64,
    },

    /// Autoscaling bounds are inverted
    #[error("min capacity {min} exceeds max capacity {max}")]
    CapacityBounds {
        /// Minimum task count
        min: u32,
        /// Maximum task count
        max: u32,
    },

    /// Target utilization outside 1..=100
    #[error("target utilization {0}% must be between 1 and 100")]
    TargetUtilization(u32),

    /// Rolling update bounds would drop below desired count or never replace
    #[error("deployment bounds {min_healthy}%..{max_healthy}% must keep min >= 100 and max > min")]
    DeploymentBounds {
        /// Minimum healthy percent
        min_healthy: u32,
        /// Maximum percent
        max_healthy: u32,
    },

    /// Address block could not be parsed
    #[error("invalid CIDR block '{cidr}': {reason}")]
    InvalidCidr {
        /// Raw text
        cidr: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Subnet masks do not fit the network block
    #[error("subnet layout does not fit: {0}")]
    SubnetLayout(String),

    /// A port is zero
    #[error("{field} must be a non-zero port")]
    InvalidPort {
        /// Offending field
        field: &'static str,
    },

    /// Ingress rules break the service boundary invariants
    #[error("ingress rule rejected on {boundary}: {reason}")]
    Ingress {
        /// Boundary the rule belongs to
        boundary: String,
        /// Why it was rejected
        reason: String,
    },

    /// Name-like field is empty or malformed
    #[error("invalid {field}: {reason}")]
    InvalidName {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Unit declaration errors
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// Configuration or declared properties violate a constraint
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Declaration needed a key that was not resolved
    #[error("unit {unit} is missing input {key}")]
    MissingInput {
        /// Unit being declared
        unit: UnitKind,
        /// Unresolved key
        key: LogicalKey,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Stage or key construction failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Graph construction failed
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<figment::Error> for UnitError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
