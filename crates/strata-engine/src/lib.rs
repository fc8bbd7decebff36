//! Strata Provisioning Engine
//!
//! Declared resource graphs in, existing resources out.
//!
//! A unit never talks to a cloud API directly. It declares a
//! [`ResourceGraph`] and hands it to a [`ProvisioningEngine`], which orders
//! creation by reference, resolves cross-resource attributes and records
//! what exists per stack. [`LocalEngine`] is the bundled implementation.
//!
//! # Example
//!
//! ```rust
//! use strata_engine::{attr, DeployContext, LocalEngine, PropertyValue, ProvisioningEngine,
//!     ResourceDecl, ResourceGraph, ResourceKind};
//!
//! # async fn example() -> Result<(), strata_engine::EngineError> {
//! let mut graph = ResourceGraph::new("ecs-vpc-dev");
//! graph.add(ResourceDecl::new("Vpc", ResourceKind::Vpc))?;
//! graph.add(
//!     ResourceDecl::new("Subnet", ResourceKind::Subnet).with("vpc", PropertyValue::reference("Vpc")),
//! )?;
//!
//! let engine = LocalEngine::new();
//! let stack = engine.apply(&DeployContext::new("dev", "000000000000", "local"), &graph).await?;
//! assert!(stack.attribute("Vpc", attr::ID).is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod local;
pub mod resource;

// Re-exports
pub use engine::{AppliedStack, CreatedResource, DeployContext, ProvisioningEngine, StackStatus};
pub use error::{EngineError, EngineResult};
pub use local::LocalEngine;
pub use resource::{attr, PropertyValue, ResourceDecl, ResourceGraph, ResourceKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
