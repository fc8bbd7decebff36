//! Strata Parameter Store
//!
//! Typed get/put over a hierarchical key namespace shared by every
//! provisioning unit.
//!
//! # Overview
//!
//! Units never hold in-memory handles to each other's resources. A unit
//! publishes identifiers under well-known keys and downstream units resolve
//! them at provisioning time:
//! - **ParameterKey**: validated `/`-separated path
//! - **LogicalKey** + **KeyNamespace**: the fixed set of published names and
//!   how they map onto concrete keys for a stage
//! - **ParameterStore**: idempotent upsert, lookup, teardown and listing
//! - **StackParameters**: typed wrappers per logical key
//!
//! # Example
//!
//! ```rust
//! use strata_store::{InMemoryParameterStore, KeyNamespace, KeyScheme, Stage, StackParameters};
//!
//! # async fn example() -> Result<(), strata_store::StoreError> {
//! let store = InMemoryParameterStore::new();
//! let namespace = KeyNamespace::new("/sonarqube-fargate-cdk", KeyScheme::StageScoped)?;
//! let stage = Stage::new("dev")?;
//!
//! let params = StackParameters::new(&store, &namespace, &stage);
//! params.put_network_id("vpc-123").await?;
//! assert_eq!(params.network_id().await?, "vpc-123");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod file;
pub mod key;
pub mod memory;
pub mod stage;
pub mod store;
pub mod typed;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use file::FileParameterStore;
pub use key::{KeyNamespace, KeyScheme, LogicalKey, ParameterKey};
pub use memory::InMemoryParameterStore;
pub use stage::Stage;
pub use store::{ParameterRecord, ParameterStore};
pub use typed::StackParameters;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for parameter store operations
    pub use crate::{
        InMemoryParameterStore, KeyNamespace, KeyScheme, LogicalKey, ParameterKey,
        ParameterRecord, ParameterStore, StackParameters, Stage, StoreError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
