//! Declarative resource graph
//!
//! A unit describes what it owns as a [`ResourceGraph`]: resources keyed by
//! logical id, whose properties may reference other resources of the same
//! graph. References double as ordering edges.

use crate::error::EngineError;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Attribute names exposed on created resources
pub mod attr {
    /// Physical identifier (always present)
    pub const ID: &str = "Id";
    /// Resource ARN (always present)
    pub const ARN: &str = "Arn";
    /// Physical name (always present)
    pub const NAME: &str = "Name";
    /// Registry URI
    pub const URI: &str = "Uri";
    /// Built image URI
    pub const IMAGE_URI: &str = "ImageUri";
    /// Source repository HTTP clone URL
    pub const CLONE_URL_HTTP: &str = "CloneUrlHttp";
    /// Load balancer DNS name
    pub const DNS_NAME: &str = "DnsName";
    /// Task definition family
    pub const FAMILY: &str = "Family";
}

/// Kinds of resources the units declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Network block
    Vpc,
    /// Public or private subnet
    Subnet,
    /// NAT path for a private subnet
    NatGateway,
    /// IAM-style identity with attached policy
    Role,
    /// Image built from a build context
    ImageAsset,
    /// Image registry
    Registry,
    /// Copy of a built image into a registry
    ImageCopy,
    /// Source code repository
    SourceRepository,
    /// Compute cluster
    Cluster,
    /// Ingress boundary
    SecurityGroup,
    /// Standalone rule on an existing boundary
    SecurityGroupIngress,
    /// Task specification
    TaskDefinition,
    /// Long-running compute service
    Service,
    /// Autoscaling capacity bounds
    ScalableTarget,
    /// Autoscaling policy
    ScalingPolicy,
    /// Log destination
    LogGroup,
    /// Load balancer
    LoadBalancer,
    /// Load balancer listener
    Listener,
    /// Load balancer target group
    TargetGroup,
}

impl ResourceKind {
    /// Prefix for generated physical ids, for kinds that get one
    #[must_use]
    pub const fn id_prefix(self) -> Option<&'static str> {
        match self {
            ResourceKind::Vpc => Some("vpc"),
            ResourceKind::Subnet => Some("subnet"),
            ResourceKind::NatGateway => Some("nat"),
            ResourceKind::SecurityGroup => Some("sg"),
            ResourceKind::SecurityGroupIngress => Some("sgr"),
            _ => None,
        }
    }

    /// Service segment used in ARNs
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            ResourceKind::Vpc
            | ResourceKind::Subnet
            | ResourceKind::NatGateway
            | ResourceKind::SecurityGroup
            | ResourceKind::SecurityGroupIngress => "network",
            ResourceKind::Role => "iam",
            ResourceKind::ImageAsset | ResourceKind::Registry | ResourceKind::ImageCopy => {
                "registry"
            }
            ResourceKind::SourceRepository => "source",
            ResourceKind::Cluster | ResourceKind::TaskDefinition | ResourceKind::Service => {
                "compute"
            }
            ResourceKind::ScalableTarget | ResourceKind::ScalingPolicy => "autoscaling",
            ResourceKind::LogGroup => "logs",
            ResourceKind::LoadBalancer | ResourceKind::Listener | ResourceKind::TargetGroup => {
                "loadbalancing"
            }
        }
    }

    /// Type segment used in ARNs
    #[must_use]
    pub const fn arn_type(self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::NatGateway => "natgateway",
            ResourceKind::Role => "role",
            ResourceKind::ImageAsset => "asset",
            ResourceKind::Registry => "repository",
            ResourceKind::ImageCopy => "image",
            ResourceKind::SourceRepository => "repository",
            ResourceKind::Cluster => "cluster",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::SecurityGroupIngress => "security-group-rule",
            ResourceKind::TaskDefinition => "task-definition",
            ResourceKind::Service => "service",
            ResourceKind::ScalableTarget => "scalable-target",
            ResourceKind::ScalingPolicy => "scaling-policy",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::LoadBalancer => "loadbalancer",
            ResourceKind::Listener => "listener",
            ResourceKind::TargetGroup => "targetgroup",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Property value: literal, or resolved from another resource at apply time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Plain JSON value
    Literal(Value),
    /// Physical id of another resource in the graph
    Ref(String),
    /// Named attribute of another resource in the graph
    Attr {
        /// Logical id of the referenced resource
        resource: String,
        /// Attribute name (see [`attr`])
        attribute: String,
    },
    /// List of values
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Literal value
    #[inline]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Reference to another resource's physical id
    #[inline]
    pub fn reference(logical_id: impl Into<String>) -> Self {
        Self::Ref(logical_id.into())
    }

    /// Reference to another resource's attribute
    #[inline]
    pub fn attr(logical_id: impl Into<String>, attribute: &str) -> Self {
        Self::Attr {
            resource: logical_id.into(),
            attribute: attribute.to_string(),
        }
    }

    /// Logical ids this value depends on
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            PropertyValue::Literal(_) => Vec::new(),
            PropertyValue::Ref(id) => vec![id.as_str()],
            PropertyValue::Attr { resource, .. } => vec![resource.as_str()],
            PropertyValue::List(items) => items.iter().flat_map(Self::dependencies).collect(),
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// One declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Identifier unique within the graph
    pub logical_id: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Explicit physical name, if the resource is named
    pub name: Option<String>,
    /// Declared properties
    pub properties: BTreeMap<String, PropertyValue>,
    /// Resource-specific tags (graph tags are added on top)
    pub tags: BTreeMap<String, String>,
    /// Ordering-only dependencies
    pub depends_on: Vec<String>,
}

impl ResourceDecl {
    /// Start a declaration
    pub fn new(logical_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            name: None,
            properties: BTreeMap::new(),
            tags: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// Set the physical name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a property
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    /// Add an ordering-only dependency
    #[must_use]
    pub fn after(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Literal property, if present and literal
    #[must_use]
    pub fn literal(&self, key: &str) -> Option<&Value> {
        match self.properties.get(key) {
            Some(PropertyValue::Literal(v)) => Some(v),
            _ => None,
        }
    }

    /// Every logical id this resource must wait for
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .properties
            .values()
            .flat_map(PropertyValue::dependencies)
            .chain(self.depends_on.iter().map(String::as_str))
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }
}

/// The complete declaration of one unit for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGraph {
    /// Stack name the engine tracks the unit under
    pub stack_name: String,
    /// Human readable description
    pub description: String,
    /// Refuse teardown without explicit override
    pub termination_protection: bool,
    /// Tags applied to every resource
    pub tags: BTreeMap<String, String>,
    resources: IndexMap<String, ResourceDecl>,
}

impl ResourceGraph {
    /// Empty graph for a stack
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            description: String::new(),
            termination_protection: false,
            tags: BTreeMap::new(),
            resources: IndexMap::new(),
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Enable or disable termination protection
    #[must_use]
    pub fn protected(mut self, protected: bool) -> Self {
        self.termination_protection = protected;
        self
    }

    /// Add a tag applied to every resource
    #[must_use]
    pub fn with_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    /// Add a resource
    ///
    /// # Errors
    /// Returns [`EngineError::DuplicateLogicalId`] if the id is taken.
    pub fn add(&mut self, decl: ResourceDecl) -> Result<(), EngineError> {
        if self.resources.contains_key(&decl.logical_id) {
            return Err(EngineError::DuplicateLogicalId {
                stack: self.stack_name.clone(),
                logical_id: decl.logical_id,
            });
        }
        self.resources.insert(decl.logical_id.clone(), decl);
        Ok(())
    }

    /// Look up a resource by logical id
    #[must_use]
    pub fn get(&self, logical_id: &str) -> Option<&ResourceDecl> {
        self.resources.get(logical_id)
    }

    /// Resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceDecl> {
        self.resources.values()
    }

    /// Resources of one kind, in declaration order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceDecl> {
        self.resources.values().filter(move |r| r.kind == kind)
    }

    /// Number of resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if graph is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Order in which resources can be created
    ///
    /// # Errors
    /// [`EngineError::UnknownReference`] for a reference to an undeclared
    /// resource, [`EngineError::Cycle`] for circular references.
    pub fn creation_order(&self) -> Result<Vec<&ResourceDecl>, EngineError> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.resources.keys() {
            graph.add_node(id.as_str());
        }
        for decl in self.resources.values() {
            for dep in decl.dependencies() {
                if !self.resources.contains_key(dep) {
                    return Err(EngineError::UnknownReference {
                        stack: self.stack_name.clone(),
                        from: decl.logical_id.clone(),
                        to: dep.to_string(),
                    });
                }
                if dep == decl.logical_id {
                    return Err(EngineError::Cycle {
                        stack: self.stack_name.clone(),
                    });
                }
                graph.add_edge(dep, decl.logical_id.as_str(), ());
            }
        }

        let order = toposort(&graph, None).map_err(|_| EngineError::Cycle {
            stack: self.stack_name.clone(),
        })?;
        Ok(order
            .into_iter()
            .filter_map(|id| self.resources.get(id))
            .collect())
    }
}
