//! Snapshot to positioned topology, stage by stage.

use crate::attachments::{AttachmentEngine, AttachmentSummary};
use crate::config::LayoutConfig;
use crate::edges::{resolve_edges, retain_between, validate_edges};
use crate::layout::{CoordinateSolver, LayoutPlan, SolverOutcome, TopologyLayout};
use crate::model::{ExpansionState, Snapshot, SnapshotStats};
use crate::simplify::simplify_edges;
use crate::visibility::{Filters, apply_filters, filter_visible_with};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub total_nodes: usize,
    /// Removed by the user filters.
    pub filtered_nodes: usize,
    /// Collapsed behind an owner's expand toggle.
    pub hidden_nodes: usize,
    pub visible_nodes: usize,
    /// Edges with an endpoint missing from the snapshot.
    pub dropped_edges: usize,
    /// Fan-in edges merged by simplification.
    pub simplified_edges: usize,
    pub solver: SolverOutcome,
    /// Provider stats, or counts taken from the snapshot when none were supplied.
    pub snapshot: SnapshotStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub layout: TopologyLayout,
    pub diagnostics: Diagnostics,
}

/// Owner and attachment annotations computed against the whole snapshot, applied to the
/// layout once it exists.
#[derive(Debug, Clone)]
pub struct Decoration {
    owners: HashMap<String, String>,
    attachments: HashMap<String, Vec<AttachmentSummary>>,
    diagnostics: Diagnostics,
}

impl Decoration {
    pub fn apply(self, mut layout: TopologyLayout) -> Topology {
        let Decoration {
            mut owners,
            mut attachments,
            mut diagnostics,
        } = self;
        for node in &mut layout.nodes {
            node.owner = owners.remove(node.resource.id.as_str());
            node.attachments = attachments
                .remove(node.resource.id.as_str())
                .unwrap_or_default();
        }
        diagnostics.dropped_edges += layout.dropped_edges;
        diagnostics.solver = layout.solver.clone();
        layout.dropped_edges = diagnostics.dropped_edges;
        Topology {
            layout,
            diagnostics,
        }
    }
}

/// The pipeline up to, but excluding, the coordinate solve.
#[derive(Debug, Clone)]
pub struct PreparedTopology {
    pub plan: LayoutPlan,
    pub decoration: Decoration,
}

impl PreparedTopology {
    pub fn run(self, solver: Arc<dyn CoordinateSolver>) -> Topology {
        self.decoration.apply(self.plan.run(solver))
    }
}

pub fn prepare_topology(
    snapshot: &Snapshot,
    filters: &Filters,
    expansion: &ExpansionState,
    config: &LayoutConfig,
) -> PreparedTopology {
    let all_nodes = &snapshot.nodes;
    let raw_edges = match &snapshot.edges {
        Some(edges) => edges.clone(),
        None => resolve_edges(all_nodes),
    };
    let validation = validate_edges(&raw_edges, all_nodes);

    let engine = AttachmentEngine::new(all_nodes, &validation.edges);
    let owner_index = engine.owner_index();

    let filtered = apply_filters(all_nodes, filters);
    let visible = filter_visible_with(&filtered, &owner_index, expansion);
    let ids: HashSet<&str> = visible.iter().map(|node| node.id.as_str()).collect();
    let visible_edges = retain_between(&validation.edges, &ids);
    let edges = simplify_edges(&visible_edges, &visible);

    let mut owners = HashMap::new();
    let mut attachments = HashMap::new();
    for node in &visible {
        if let Some(owner) = owner_index.primary_owner(&node.id) {
            owners.insert(node.id.clone(), owner.id.clone());
        }
        let summary = engine.attachments(node).summarize(&node.id, expansion);
        if !summary.is_empty() {
            attachments.insert(node.id.clone(), summary);
        }
    }

    let diagnostics = Diagnostics {
        total_nodes: all_nodes.len(),
        filtered_nodes: all_nodes.len() - filtered.len(),
        hidden_nodes: filtered.len() - visible.len(),
        visible_nodes: visible.len(),
        dropped_edges: validation.dropped,
        simplified_edges: visible_edges.len() - edges.len(),
        solver: SolverOutcome::Skipped,
        snapshot: snapshot.stats(),
    };
    tracing::debug!(
        scope = %snapshot.scope,
        total = diagnostics.total_nodes,
        visible = diagnostics.visible_nodes,
        edges = edges.len(),
        "prepared topology"
    );

    PreparedTopology {
        plan: LayoutPlan::new(&visible, &edges, config),
        decoration: Decoration {
            owners,
            attachments,
            diagnostics,
        },
    }
}

/// Full pipeline with the solver named in `config`.
pub fn build_topology(
    snapshot: &Snapshot,
    filters: &Filters,
    expansion: &ExpansionState,
    config: &LayoutConfig,
) -> Topology {
    build_topology_with_solver(snapshot, filters, expansion, config, config.solver.build())
}

pub fn build_topology_with_solver(
    snapshot: &Snapshot,
    filters: &Filters,
    expansion: &ExpansionState,
    config: &LayoutConfig,
    solver: Arc<dyn CoordinateSolver>,
) -> Topology {
    prepare_topology(snapshot, filters, expansion, config).run(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SolverKind;
    use crate::model::{Edge, EdgeType, Resource, ResourceKind, ResourceStatus};

    fn config() -> LayoutConfig {
        LayoutConfig {
            solver: SolverKind::Layered,
            ..LayoutConfig::default()
        }
    }

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::from_nodes(vec![
            Resource::new(ResourceKind::Deployment, "web", Some("a")).with_id("d1"),
            Resource::new(ResourceKind::ReplicaSet, "web-1", Some("a"))
                .with_id("rs1")
                .with_owner(ResourceKind::Deployment, "web"),
            Resource::new(ResourceKind::Pod, "web-1-a", Some("a"))
                .with_id("p1")
                .with_status(ResourceStatus::Failed)
                .with_owner(ResourceKind::ReplicaSet, "web-1"),
        ]);
        snapshot.scope = "a".to_string();
        snapshot
    }

    #[test]
    fn collapsed_children_are_counted_and_summarized() {
        let topology = build_topology(&snapshot(), &Filters::default(), &ExpansionState::new(), &config());
        assert_eq!(topology.layout.nodes.len(), 1);
        assert_eq!(topology.diagnostics.hidden_nodes, 2);
        assert_eq!(topology.diagnostics.visible_nodes, 1);
        let d1 = topology.layout.node("d1").unwrap();
        assert_eq!(d1.owner, None);
        assert_eq!(
            d1.attachments,
            vec![AttachmentSummary {
                kind: ResourceKind::ReplicaSet,
                count: 1,
                expanded: false
            }]
        );
    }

    #[test]
    fn expanded_children_carry_their_owner() {
        let mut expansion = ExpansionState::new();
        expansion.expand("d1", ResourceKind::ReplicaSet);
        let topology = build_topology(&snapshot(), &Filters::default(), &expansion, &config());
        let rs1 = topology.layout.node("rs1").unwrap();
        assert_eq!(rs1.owner.as_deref(), Some("d1"));
        assert!(topology.layout.node("d1").unwrap().attachments[0].expanded);
        assert_eq!(topology.layout.edges, vec![Edge::new("d1", "rs1", EdgeType::Owns)]);
    }

    #[test]
    fn snapshot_stats_are_counted_when_not_supplied() {
        let topology = build_topology(&snapshot(), &Filters::default(), &ExpansionState::new(), &config());
        let stats = &topology.diagnostics.snapshot;
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.total_edges, 0);
        assert_eq!(stats.by_kind.get(&ResourceKind::Pod), Some(&1));

        let mut supplied = snapshot();
        supplied.stats = Some(SnapshotStats {
            total_nodes: 40,
            ..SnapshotStats::default()
        });
        let topology = build_topology(&supplied, &Filters::default(), &ExpansionState::new(), &config());
        assert_eq!(topology.diagnostics.snapshot.total_nodes, 40);
    }

    #[test]
    fn filters_run_before_visibility() {
        let filters = Filters {
            problems_only: true,
            ..Filters::default()
        };
        let mut expansion = ExpansionState::new();
        expansion.expand("d1", ResourceKind::ReplicaSet);
        expansion.expand("rs1", ResourceKind::Pod);
        let topology = build_topology(&snapshot(), &filters, &expansion, &config());
        let ids: Vec<&str> = topology.layout.nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["p1"]);
        assert_eq!(topology.diagnostics.filtered_nodes, 2);
        assert!(topology.layout.edges.is_empty());
    }

    #[test]
    fn supplied_edges_bypass_resolution() {
        let mut snapshot = snapshot();
        snapshot.edges = Some(vec![Edge::new("d1", "ghost", EdgeType::Owns)]);
        let topology = build_topology(&snapshot, &Filters::default(), &ExpansionState::new(), &config());
        assert_eq!(topology.diagnostics.dropped_edges, 1);
        // Ownership comes from edges; with none left the children are orphans and stay visible.
        assert_eq!(topology.layout.nodes.len(), 3);
    }
}
