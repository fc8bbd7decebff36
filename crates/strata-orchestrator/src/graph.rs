//! Unit dependency graph
//!
//! Nodes are units. A data edge runs from the producer of a key to every
//! unit that requires it; an ordering edge comes from a manifest's `after`
//! list. Apply follows both; teardown only has to respect data edges.

use crate::error::{ProvisionError, ProvisionResult};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::BTreeMap;
use strata_store::LogicalKey;
use strata_units::{UnitKind, UnitManifest};

/// Why one unit must precede another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The successor reads a key the predecessor publishes
    Data,
    /// Declared ordering without a key in between
    Ordering,
}

/// Dependency graph over registered units
#[derive(Debug, Clone)]
pub struct UnitGraph {
    graph: DiGraphMap<UnitKind, EdgeKind>,
    producers: BTreeMap<LogicalKey, UnitKind>,
}

impl UnitGraph {
    /// Build the graph from manifests
    ///
    /// # Errors
    /// [`ProvisionError::Graph`] when a key has two producers, a required
    /// key has none, or the edges form a cycle.
    pub fn build(manifests: &[UnitManifest]) -> ProvisionResult<Self> {
        let mut graph = DiGraphMap::new();
        let mut producers = BTreeMap::new();

        for manifest in manifests {
            graph.add_node(manifest.kind);
            for key in &manifest.produces {
                if let Some(previous) = producers.insert(*key, manifest.kind) {
                    return Err(ProvisionError::Graph(format!(
                        "{key} is produced by both {previous} and {}",
                        manifest.kind
                    )));
                }
            }
        }

        for manifest in manifests {
            for key in &manifest.requires {
                let producer = producers.get(key).ok_or_else(|| {
                    ProvisionError::Graph(format!(
                        "{} requires {key}, which no unit produces",
                        manifest.kind
                    ))
                })?;
                graph.add_edge(*producer, manifest.kind, EdgeKind::Data);
            }
            for before in &manifest.after {
                if graph.contains_node(*before) && !graph.contains_edge(*before, manifest.kind) {
                    graph.add_edge(*before, manifest.kind, EdgeKind::Ordering);
                }
            }
        }

        let unit_graph = Self { graph, producers };
        unit_graph.order()?;
        Ok(unit_graph)
    }

    /// Linear apply order
    ///
    /// # Errors
    /// [`ProvisionError::Graph`] if the edges form a cycle.
    pub fn order(&self) -> ProvisionResult<Vec<UnitKind>> {
        toposort(&self.graph, None).map_err(|cycle| {
            ProvisionError::Graph(format!("dependency cycle through {}", cycle.node_id()))
        })
    }

    /// Apply order grouped into waves
    ///
    /// Every unit's predecessors are in earlier waves, so the units of one
    /// wave may be applied concurrently.
    ///
    /// # Errors
    /// [`ProvisionError::Graph`] if the edges form a cycle.
    pub fn waves(&self) -> ProvisionResult<Vec<Vec<UnitKind>>> {
        let mut depth: BTreeMap<UnitKind, usize> = BTreeMap::new();
        for unit in self.order()? {
            let level = self
                .graph
                .neighbors_directed(unit, Direction::Incoming)
                .filter_map(|pred| depth.get(&pred))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(unit, level);
        }

        let mut waves: Vec<Vec<UnitKind>> = Vec::new();
        for (unit, level) in depth {
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(unit);
        }
        Ok(waves)
    }

    /// Units that must be applied before `unit`
    #[must_use]
    pub fn dependencies(&self, unit: UnitKind) -> Vec<UnitKind> {
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(unit, Direction::Incoming)
            .collect();
        deps.sort();
        deps
    }

    /// Units reading keys `unit` publishes
    #[must_use]
    pub fn dependents(&self, unit: UnitKind) -> Vec<UnitKind> {
        let mut deps: Vec<_> = self
            .graph
            .edges_directed(unit, Direction::Outgoing)
            .filter(|(_, _, kind)| **kind == EdgeKind::Data)
            .map(|(_, to, _)| to)
            .collect();
        deps.sort();
        deps
    }

    /// Unit that publishes `key`
    #[must_use]
    pub fn producer(&self, key: LogicalKey) -> Option<UnitKind> {
        self.producers.get(&key).copied()
    }

    /// Edge between two units, if any
    #[must_use]
    pub fn edge(&self, from: UnitKind, to: UnitKind) -> Option<EdgeKind> {
        self.graph.edge_weight(from, to).copied()
    }

    /// Registered units
    pub fn units(&self) -> impl Iterator<Item = UnitKind> + '_ {
        self.graph.nodes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strata_units::{standard_units, StrataConfig};

    fn standard() -> UnitGraph {
        let manifests: Vec<_> = standard_units(&StrataConfig::default())
            .iter()
            .map(|u| u.manifest())
            .collect();
        UnitGraph::build(&manifests).unwrap()
    }

    #[test]
    fn standard_topology_waves() {
        let waves = standard().waves().unwrap();
        assert_eq!(
            waves,
            vec![
                vec![UnitKind::Network],
                vec![UnitKind::AccessRoles, UnitKind::ArtifactRepository],
                vec![UnitKind::Cluster],
                vec![UnitKind::Service],
            ]
        );
    }

    #[test]
    fn service_depends_on_cluster_roles_and_network() {
        let graph = standard();
        assert_eq!(
            graph.dependencies(UnitKind::Service),
            vec![UnitKind::Network, UnitKind::AccessRoles, UnitKind::Cluster]
        );
        assert_eq!(graph.edge(UnitKind::Cluster, UnitKind::Service), Some(EdgeKind::Data));
        assert_eq!(
            graph.edge(UnitKind::Network, UnitKind::ArtifactRepository),
            Some(EdgeKind::Ordering)
        );
    }

    #[test]
    fn ordering_edges_do_not_block_teardown() {
        let graph = standard();
        assert_eq!(
            graph.dependents(UnitKind::Network),
            vec![UnitKind::Cluster, UnitKind::Service]
        );
        assert!(graph.dependents(UnitKind::ArtifactRepository).is_empty());
        assert_eq!(graph.producer(LogicalKey::ClusterSecurityGroupId), Some(UnitKind::Cluster));
    }

    #[test]
    fn order_puts_producers_first() {
        let order = standard().order().unwrap();
        let pos = |u| order.iter().position(|x| *x == u).unwrap();
        assert!(pos(UnitKind::Network) < pos(UnitKind::Cluster));
        assert!(pos(UnitKind::Cluster) < pos(UnitKind::Service));
        assert!(pos(UnitKind::AccessRoles) < pos(UnitKind::Service));
    }

    #[test]
    fn unproduced_requirement_is_rejected() {
        let manifests = vec![UnitManifest::new(UnitKind::Cluster).requires([LogicalKey::VpcId])];
        assert!(matches!(
            UnitGraph::build(&manifests),
            Err(ProvisionError::Graph(_))
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let manifests = vec![
            UnitManifest::new(UnitKind::Network)
                .produces([LogicalKey::VpcId])
                .requires([LogicalKey::ClusterName]),
            UnitManifest::new(UnitKind::Cluster)
                .produces([LogicalKey::ClusterName])
                .requires([LogicalKey::VpcId]),
        ];
        assert!(UnitGraph::build(&manifests).is_err());
    }
}
