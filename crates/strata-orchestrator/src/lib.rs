//! Strata Orchestrator
//!
//! Applies the provisioning units in dependency order for one stage.
//!
//! # Overview
//!
//! - **UnitGraph**: data and ordering edges derived from unit manifests
//! - **Orchestrator**: readiness checks, apply, teardown and status
//! - **ApplyLocks**: one apply per (stage, unit) at a time
//! - **ProvisionError**: every failure classified for the operator
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_engine::LocalEngine;
//! use strata_orchestrator::Orchestrator;
//! use strata_store::InMemoryParameterStore;
//! use strata_units::{RunContext, StrataConfig, UnitKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StrataConfig::default();
//! let orchestrator = Orchestrator::new(
//!     &config,
//!     Arc::new(InMemoryParameterStore::new()),
//!     Arc::new(LocalEngine::new()),
//! )?;
//! let ctx = RunContext::resolve(&config, Some("dev"), None)?;
//!
//! let network = orchestrator.apply(&ctx, UnitKind::Network).await?;
//! assert!(network.published("vpc-id").is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod locks;
pub mod logging;
pub mod orchestrator;
pub mod report;

// Re-exports
pub use error::{ProvisionError, ProvisionResult};
pub use graph::{EdgeKind, UnitGraph};
pub use locks::{ApplyGuard, ApplyLocks};
pub use logging::init_tracing;
pub use orchestrator::Orchestrator;
pub use report::{Output, PublishedKey, TeardownReport, UnitReport, UnitStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
