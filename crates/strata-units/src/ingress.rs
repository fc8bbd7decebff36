//! Typed ingress boundaries
//!
//! Rules are data, so the service wiring invariants can be checked before
//! any resource is declared: the cluster boundary only admits the load
//! balancer boundary on the container port, and the load balancer boundary
//! only admits the public internet on the listener port.

use crate::cidr::Ipv4Cidr;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::{self, Display, Formatter};
use strata_engine::PropertyValue;

/// Transport protocol of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl Protocol {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// How a boundary is referenced
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryRef {
    /// Declared in the same graph, by logical id
    Declared(String),
    /// Owned by another unit, by physical id
    Existing(String),
}

impl BoundaryRef {
    /// Property value resolving to the boundary id
    #[must_use]
    pub fn property(&self) -> PropertyValue {
        match self {
            BoundaryRef::Declared(logical_id) => PropertyValue::reference(logical_id.clone()),
            BoundaryRef::Existing(id) => PropertyValue::literal(id.clone()),
        }
    }
}

impl Display for BoundaryRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryRef::Declared(id) => write!(f, "declared:{id}"),
            BoundaryRef::Existing(id) => write!(f, "existing:{id}"),
        }
    }
}

/// Traffic source of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Peer {
    /// `0.0.0.0/0`
    AnyIpv4,
    /// An address block
    Cidr(Ipv4Cidr),
    /// Members of another boundary
    Boundary(BoundaryRef),
}

impl Peer {
    /// Whether the source is an address range rather than a boundary
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self, Peer::AnyIpv4 | Peer::Cidr(_))
    }

    /// Property value resolving to the source
    #[must_use]
    pub fn property(&self) -> PropertyValue {
        match self {
            Peer::AnyIpv4 => PropertyValue::literal("0.0.0.0/0"),
            Peer::Cidr(cidr) => PropertyValue::literal(cidr.to_string()),
            Peer::Boundary(boundary) => boundary.property(),
        }
    }
}

/// One `(source, protocol, port)` admission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    /// Traffic source
    pub source: Peer,
    /// Protocol
    pub protocol: Protocol,
    /// Destination port
    pub port: u16,
    /// Operator-facing description
    pub description: String,
}

impl IngressRule {
    /// TCP rule
    pub fn tcp(source: Peer, port: u16, description: impl Into<String>) -> Self {
        Self {
            source,
            protocol: Protocol::Tcp,
            port,
            description: description.into(),
        }
    }

    /// Literal rendering for rules whose source is an address range
    #[must_use]
    pub fn to_literal(&self) -> Option<Value> {
        let cidr = match &self.source {
            Peer::AnyIpv4 => "0.0.0.0/0".to_string(),
            Peer::Cidr(cidr) => cidr.to_string(),
            Peer::Boundary(_) => return None,
        };
        Some(json!({
            "cidr": cidr,
            "protocol": self.protocol.as_str(),
            "port": self.port,
            "description": self.description,
        }))
    }
}

/// A named filter and the rules it admits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressBoundary {
    /// Physical name
    pub name: String,
    /// How other rules refer to this boundary
    pub reference: BoundaryRef,
    /// Admissions
    pub rules: Vec<IngressRule>,
}

impl IngressBoundary {
    /// Boundary without rules
    pub fn new(name: impl Into<String>, reference: BoundaryRef) -> Self {
        Self {
            name: name.into(),
            reference,
            rules: Vec::new(),
        }
    }

    /// Add a rule
    #[must_use]
    pub fn allow(mut self, rule: IngressRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// The two boundaries a service wires together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIngress {
    /// Shared cluster boundary (owned by the cluster unit)
    pub cluster: IngressBoundary,
    /// Dedicated load balancer boundary (owned by the service unit)
    pub load_balancer: IngressBoundary,
    /// Port the container listens on
    pub container_port: u16,
    /// Public listener port
    pub listener_port: u16,
}

impl ServiceIngress {
    /// Standard wiring: internet → listener port on the load balancer
    /// boundary, load balancer boundary → container port on the cluster
    /// boundary
    #[must_use]
    pub fn plan(
        cluster_boundary_id: &str,
        load_balancer: (&str, &str),
        container_port: u16,
        listener_port: u16,
    ) -> Self {
        let (lb_logical_id, lb_name) = load_balancer;
        let lb_ref = BoundaryRef::Declared(lb_logical_id.to_string());
        let cluster = IngressBoundary::new(
            cluster_boundary_id,
            BoundaryRef::Existing(cluster_boundary_id.to_string()),
        )
        .allow(IngressRule::tcp(
            Peer::Boundary(lb_ref.clone()),
            container_port,
            "Allow from ALB",
        ));
        let load_balancer = IngressBoundary::new(lb_name, lb_ref)
            .allow(IngressRule::tcp(Peer::AnyIpv4, listener_port, "Allow any"));
        Self {
            cluster,
            load_balancer,
            container_port,
            listener_port,
        }
    }

    /// Prove the wiring invariants
    ///
    /// # Errors
    /// [`ValidationError::Ingress`] naming the boundary and the broken rule.
    pub fn verify(&self) -> Result<(), ValidationError> {
        let reject = |boundary: &IngressBoundary, reason: String| ValidationError::Ingress {
            boundary: boundary.name.clone(),
            reason,
        };

        if self.cluster.reference == self.load_balancer.reference {
            return Err(reject(
                &self.cluster,
                "load balancer must have its own boundary".to_string(),
            ));
        }
        if self.cluster.rules.is_empty() {
            return Err(reject(
                &self.cluster,
                "no rule admits the load balancer".to_string(),
            ));
        }
        let lb_source = Peer::Boundary(self.load_balancer.reference.clone());
        for rule in &self.cluster.rules {
            if rule.source.is_public() {
                return Err(reject(
                    &self.cluster,
                    format!("port {} must not be open to an address range", rule.port),
                ));
            }
            if rule.source != lb_source {
                return Err(reject(
                    &self.cluster,
                    "only the load balancer boundary may be a source".to_string(),
                ));
            }
            if rule.port != self.container_port {
                return Err(reject(
                    &self.cluster,
                    format!(
                        "rule on port {} but the container listens on {}",
                        rule.port, self.container_port
                    ),
                ));
            }
        }

        for rule in &self.load_balancer.rules {
            if !rule.source.is_public() {
                return Err(reject(
                    &self.load_balancer,
                    "rules must admit an address range".to_string(),
                ));
            }
            if rule.port != self.listener_port {
                return Err(reject(
                    &self.load_balancer,
                    format!(
                        "port {} is not the listener port {}",
                        rule.port, self.listener_port
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn planned() -> ServiceIngress {
        ServiceIngress::plan("sg-abc", ("LoadBalancerSecurityGroup", "albsg-sonarqube"), 9000, 80)
    }

    #[test]
    fn planned_wiring_verifies() {
        let ingress = planned();
        ingress.verify().unwrap();
        assert_eq!(ingress.cluster.rules[0].port, 9000);
        assert_eq!(ingress.load_balancer.rules[0].source, Peer::AnyIpv4);
    }

    #[test]
    fn public_rule_on_cluster_boundary_is_rejected() {
        let mut ingress = planned();
        ingress
            .cluster
            .rules
            .push(IngressRule::tcp(Peer::AnyIpv4, 9000, "oops"));
        assert!(matches!(
            ingress.verify(),
            Err(ValidationError::Ingress { ref boundary, .. }) if boundary == "sg-abc"
        ));
    }

    #[test]
    fn foreign_boundary_source_is_rejected() {
        let mut ingress = planned();
        ingress.cluster.rules[0].source =
            Peer::Boundary(BoundaryRef::Existing("sg-other".to_string()));
        assert!(ingress.verify().is_err());
    }

    #[test]
    fn load_balancer_rule_on_container_port_is_rejected() {
        let mut ingress = planned();
        ingress
            .load_balancer
            .rules
            .push(IngressRule::tcp(Peer::AnyIpv4, 9000, "direct"));
        assert!(ingress.verify().is_err());
    }

    #[test]
    fn boundary_rendering() {
        let ingress = planned();
        assert_eq!(
            ingress.cluster.rules[0].source.property(),
            PropertyValue::reference("LoadBalancerSecurityGroup")
        );
        assert!(ingress.cluster.rules[0].to_literal().is_none());
        let rendered = ingress.load_balancer.rules[0].to_literal().unwrap();
        assert_eq!(rendered["cidr"], "0.0.0.0/0");
        assert_eq!(rendered["port"], 80);
    }

    proptest! {
        #[test]
        fn prop_planned_wiring_always_verifies(container in 1u16.., listener in 1u16..) {
            let ingress = ServiceIngress::plan("sg-1", ("Lb", "albsg"), container, listener);
            prop_assert!(ingress.verify().is_ok());
            for rule in &ingress.cluster.rules {
                prop_assert!(!rule.source.is_public());
                prop_assert_eq!(rule.port, container);
            }
            for rule in &ingress.load_balancer.rules {
                prop_assert!(rule.source.is_public());
                prop_assert_eq!(rule.port, listener);
            }
        }
    }
}
