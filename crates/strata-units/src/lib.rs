//! Strata Provisioning Units
//!
//! The five independently applicable units of the deployment topology and
//! the pieces they share.
//!
//! # Overview
//!
//! - **StrataConfig**: figment-loaded settings with validated constraints
//! - **RunContext**: the stage selected for one run, its key namespace and
//!   whether its stacks are protected
//! - **UnitManifest**: keys a unit reads and writes, used for ordering
//! - **Unit**: declares a resource graph from resolved inputs
//! - **ServiceIngress**: typed boundaries proving the load balancer wiring
//!
//! Units are leaf first: [`NetworkUnit`], [`AccessRolesUnit`],
//! [`ArtifactRepositoryUnit`], [`ClusterUnit`], [`ServiceUnit`].
//!
//! # Example
//!
//! ```rust
//! use strata_units::{ClusterUnit, ResolvedInputs, RunContext, StrataConfig, Unit};
//! use strata_store::LogicalKey;
//!
//! let config = StrataConfig::default();
//! let ctx = RunContext::resolve(&config, Some("dev"), None).unwrap();
//! let inputs = ResolvedInputs::new().with(LogicalKey::VpcId, "vpc-123");
//!
//! let graph = ClusterUnit::new(&config).declare(&ctx, &inputs).unwrap();
//! assert_eq!(graph.stack_name, "ecs-sonarqube-cluster-sonarqube-fargate-dev");
//! ```

#![warn(missing_docs)]

pub mod artifacts;
pub mod cidr;
pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod ingress;
pub mod manifest;
pub mod network;
pub mod roles;
pub mod service;
pub mod unit;

// Re-exports
pub use artifacts::ArtifactRepositoryUnit;
pub use cidr::Ipv4Cidr;
pub use cluster::ClusterUnit;
pub use config::{ImageSource, StrataConfig};
pub use context::RunContext;
pub use error::{UnitError, UnitResult, ValidationError};
pub use ingress::{BoundaryRef, IngressBoundary, IngressRule, Peer, Protocol, ServiceIngress};
pub use manifest::{OutputDecl, OutputSource, Publication, UnitKind, UnitManifest};
pub use network::NetworkUnit;
pub use roles::AccessRolesUnit;
pub use service::ServiceUnit;
pub use strata_store::Stage;
pub use unit::{standard_units, ResolvedInputs, Unit};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
