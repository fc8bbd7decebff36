//! Error types for the provisioning engine

use crate::resource::ResourceKind;

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Provisioning engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Two resources in one graph share a logical id
    #[error("stack {stack}: duplicate logical id '{logical_id}'")]
    DuplicateLogicalId {
        /// Stack being declared
        stack: String,
        /// Repeated id
        logical_id: String,
    },

    /// A property or ordering edge names an undeclared resource
    #[error("stack {stack}: '{from}' references unknown resource '{to}'")]
    UnknownReference {
        /// Stack being applied
        stack: String,
        /// Referencing resource
        from: String,
        /// Missing resource
        to: String,
    },

    /// A property asks for an attribute the target does not expose
    #[error("stack {stack}: resource '{resource}' has no attribute '{attribute}'")]
    UnknownAttribute {
        /// Stack being applied
        stack: String,
        /// Referenced resource
        resource: String,
        /// Missing attribute
        attribute: String,
    },

    /// References form a cycle
    #[error("stack {stack}: resource references form a cycle")]
    Cycle {
        /// Stack being applied
        stack: String,
    },

    /// A named resource already belongs to another stack
    #[error("{kind} '{name}' already exists and is owned by stack {owner}")]
    ResourceConflict {
        /// Kind of the conflicting resource
        kind: ResourceKind,
        /// Physical name
        name: String,
        /// Stack that owns it
        owner: String,
    },

    /// A resource failed after others were created
    #[error("stack {stack}: creating '{failed}' failed after {} resources were created: {reason}", created.len())]
    PartialApply {
        /// Stack being applied
        stack: String,
        /// Logical id that failed
        failed: String,
        /// Logical ids that exist
        created: Vec<String>,
        /// Failure detail
        reason: String,
    },

    /// Teardown refused without an explicit override
    #[error("stack {stack} has termination protection enabled")]
    TerminationProtected {
        /// Protected stack
        stack: String,
    },

    /// State file could not be read or written
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State file is not valid JSON
    #[error("engine serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Stack the error refers to, if any
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::DuplicateLogicalId { stack, .. }
            | Self::UnknownReference { stack, .. }
            | Self::UnknownAttribute { stack, .. }
            | Self::Cycle { stack }
            | Self::PartialApply { stack, .. }
            | Self::TerminationProtected { stack } => Some(stack),
            Self::ResourceConflict { owner, .. } => Some(owner),
            Self::Io(_) | Self::Serialization(_) => None,
        }
    }
}
