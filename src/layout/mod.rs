//! Deterministic layered placement of a visible topology.
//!
//! Main-flow resources are pinned to lanes and handed to a [`CoordinateSolver`]; the raw
//! coordinates are then snapped to columns and de-overlapped. Side-band resources are placed
//! afterwards next to the node they hang off. A failing solver degrades to a plain grid.

mod columns;
mod error;
mod lanes;
mod layered;
mod sideband;
mod solver;

pub use error::SolverError;
pub use lanes::{Lane, compact_lanes, lane_for};
pub use layered::LayeredSolver;
pub use sideband::Rect;
pub use solver::{
    CancelFlag, CoordinateSolver, DagreSolver, SolveNode, SolveRequest, SolvedPositions,
    SolverKind, run_solver, run_solver_with_timeout,
};

use crate::attachments::AttachmentSummary;
use crate::config::LayoutConfig;
use crate::edges::validate_edges;
use crate::measure::node_size;
use crate::model::{Edge, Resource};
use error::compute_fallback_layout;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub resource: Resource,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub lane: Lane,
    /// Compacted column; `None` for side-band nodes.
    pub column: Option<usize>,
    /// Primary owner id, filled in by the pipeline.
    pub owner: Option<String>,
    pub attachments: Vec<AttachmentSummary>,
}

impl LayoutNode {
    pub fn id(&self) -> &str {
        &self.resource.id
    }

    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SolverOutcome {
    /// No main-flow nodes, so nothing was sent to a solver.
    Skipped,
    Solved { solver: String },
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopologyLayout {
    /// In input order.
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<Edge>,
    pub width: f32,
    pub height: f32,
    pub dropped_edges: usize,
    pub solver: SolverOutcome,
}

impl TopologyLayout {
    pub fn node(&self, id: &str) -> Option<&LayoutNode> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.solver, SolverOutcome::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlanEntry {
    pub resource: Resource,
    pub lane: Lane,
    pub column: Option<usize>,
    pub width: f32,
    pub height: f32,
    pub x: f32,
    pub y: f32,
}

impl PlanEntry {
    fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    pub(crate) fn to_layout_node(&self) -> LayoutNode {
        LayoutNode {
            resource: self.resource.clone(),
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            lane: self.lane,
            column: self.column,
            owner: None,
            attachments: Vec::new(),
        }
    }
}

/// Everything up to the coordinate solve. Splitting here lets the solve run elsewhere
/// (a blocking pool, under a timeout) and the plan be finished afterwards.
#[derive(Debug, Clone)]
pub struct LayoutPlan {
    entries: Vec<PlanEntry>,
    edges: Vec<Edge>,
    dropped_edges: usize,
    column_count: usize,
    request: Option<SolveRequest>,
    config: LayoutConfig,
}

impl LayoutPlan {
    pub fn new(nodes: &[Resource], edges: &[Edge], config: &LayoutConfig) -> Self {
        let validation = validate_edges(edges, nodes);

        let mut entries: Vec<PlanEntry> = nodes
            .iter()
            .map(|resource| {
                let (width, height) = node_size(resource, config);
                PlanEntry {
                    resource: resource.clone(),
                    lane: lane_for(resource.kind()),
                    column: None,
                    width,
                    height,
                    x: 0.0,
                    y: 0.0,
                }
            })
            .collect();
        let columns = compact_lanes(entries.iter().map(|entry| entry.lane));
        for entry in &mut entries {
            entry.column = columns.get(&entry.lane).copied();
        }

        let solve_nodes: Vec<SolveNode> = entries
            .iter()
            .enumerate()
            .filter_map(|(order, entry)| {
                entry.column.map(|layer| SolveNode {
                    id: entry.resource.id.clone(),
                    layer,
                    width: entry.width,
                    height: entry.height,
                    order,
                })
            })
            .collect();
        let request = if solve_nodes.is_empty() {
            None
        } else {
            let layers: HashMap<&str, usize> = solve_nodes
                .iter()
                .map(|node| (node.id.as_str(), node.layer))
                .collect();
            let mut solve_edges = Vec::new();
            for edge in &validation.edges {
                let (Some(from), Some(to)) = (layers.get(edge.from.as_str()), layers.get(edge.to.as_str()))
                else {
                    continue;
                };
                if from < to {
                    solve_edges.push((edge.from.clone(), edge.to.clone()));
                } else if to < from {
                    solve_edges.push((edge.to.clone(), edge.from.clone()));
                }
            }
            Some(SolveRequest {
                nodes: solve_nodes,
                edges: solve_edges,
                layer_count: columns.len(),
                node_spacing: config.node_spacing,
                rank_spacing: config.rank_spacing,
                order_passes: config.order_passes,
                cancel: CancelFlag::new(),
            })
        };

        tracing::debug!(
            nodes = entries.len(),
            columns = columns.len(),
            edges = validation.edges.len(),
            dropped = validation.dropped,
            "layout plan"
        );

        Self {
            entries,
            edges: validation.edges,
            dropped_edges: validation.dropped,
            column_count: columns.len(),
            request,
            config: config.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `None` when there is nothing for a solver to place.
    pub fn request(&self) -> Option<&SolveRequest> {
        self.request.as_ref()
    }

    pub fn dropped_edges(&self) -> usize {
        self.dropped_edges
    }

    /// Solves on a worker thread bounded by `solver_timeout_ms`, blocking the caller, and
    /// finishes the plan.
    pub fn run(self, solver: Arc<dyn CoordinateSolver>) -> TopologyLayout {
        let Some(request) = self.request.as_ref() else {
            return self.finish_unsolved();
        };
        let name = solver.name();
        let solved = run_solver_with_timeout(solver, request, self.config.solver_timeout_ms);
        self.finish(name, solved)
    }

    /// Finishes a plan that had no solve request.
    pub fn finish_unsolved(self) -> TopologyLayout {
        self.place(&SolvedPositions::new(), SolverOutcome::Skipped)
    }

    pub fn finish(
        self,
        solver: &str,
        solved: Result<SolvedPositions, SolverError>,
    ) -> TopologyLayout {
        match solved {
            Ok(positions) => self.place(
                &positions,
                SolverOutcome::Solved {
                    solver: solver.to_string(),
                },
            ),
            Err(err) => {
                tracing::warn!(solver, error = %err, "coordinate solve failed, using grid layout");
                let nodes = compute_fallback_layout(&self.entries, &self.config);
                let (width, height) = extent(&nodes, self.config.margin);
                TopologyLayout {
                    nodes,
                    edges: self.edges,
                    width,
                    height,
                    dropped_edges: self.dropped_edges,
                    solver: SolverOutcome::Fallback {
                        reason: err.to_string(),
                    },
                }
            }
        }
    }

    fn place(mut self, positions: &SolvedPositions, outcome: SolverOutcome) -> TopologyLayout {
        let config = &self.config;
        columns::snap_columns(&mut self.entries, positions, self.column_count, config);
        columns::resolve_vertical_collisions(&mut self.entries, self.column_count, config);
        for placement in sideband::place_side_band(&self.entries, &self.edges, config) {
            let entry = &mut self.entries[placement.index];
            entry.x = placement.rect.x;
            entry.y = placement.rect.y;
        }

        // Shift everything so the top-left box sits on the margin.
        let min_x = self.entries.iter().map(|e| e.x).fold(f32::INFINITY, f32::min);
        let min_y = self.entries.iter().map(|e| e.y).fold(f32::INFINITY, f32::min);
        if min_x.is_finite() && min_y.is_finite() {
            let dx = config.margin - min_x;
            let dy = config.margin - min_y;
            for entry in &mut self.entries {
                entry.x += dx;
                entry.y += dy;
            }
        }

        let nodes: Vec<LayoutNode> = self.entries.iter().map(PlanEntry::to_layout_node).collect();
        let (width, height) = extent(&nodes, config.margin);
        TopologyLayout {
            nodes,
            edges: self.edges,
            width,
            height,
            dropped_edges: self.dropped_edges,
            solver: outcome,
        }
    }
}

fn extent(nodes: &[LayoutNode], margin: f32) -> (f32, f32) {
    if nodes.is_empty() {
        return (0.0, 0.0);
    }
    let right = nodes.iter().map(|n| n.x + n.width).fold(0.0f32, f32::max);
    let bottom = nodes.iter().map(|n| n.y + n.height).fold(0.0f32, f32::max);
    (right + margin, bottom + margin)
}

/// Lays out `nodes` with the solver named in `config`.
pub fn layout(nodes: &[Resource], edges: &[Edge], config: &LayoutConfig) -> TopologyLayout {
    layout_with_solver(nodes, edges, config, config.solver.build())
}

pub fn layout_with_solver(
    nodes: &[Resource],
    edges: &[Edge],
    config: &LayoutConfig,
    solver: Arc<dyn CoordinateSolver>,
) -> TopologyLayout {
    LayoutPlan::new(nodes, edges, config).run(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeType, ResourceKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl CoordinateSolver for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn solve(&self, request: &SolveRequest) -> Result<SolvedPositions, SolverError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            LayeredSolver.solve(request)
        }
    }

    fn config() -> LayoutConfig {
        LayoutConfig {
            solver: SolverKind::Layered,
            ..LayoutConfig::default()
        }
    }

    fn cluster() -> (Vec<Resource>, Vec<Edge>) {
        let nodes = vec![
            Resource::new(ResourceKind::Ingress, "web", Some("a")).with_id("ing"),
            Resource::new(ResourceKind::Service, "web", Some("a")).with_id("svc"),
            Resource::new(ResourceKind::Deployment, "web", Some("a")).with_id("d1"),
            Resource::new(ResourceKind::Pod, "web-a", Some("a")).with_id("p1"),
            Resource::new(ResourceKind::Pod, "web-b", Some("a")).with_id("p2"),
            Resource::new(ResourceKind::ConfigMap, "cfg", Some("a")).with_id("cm1"),
        ];
        let edges = vec![
            Edge::new("ing", "svc", EdgeType::Backs),
            Edge::new("d1", "p1", EdgeType::Owns),
            Edge::new("d1", "p2", EdgeType::Owns),
            Edge::new("d1", "cm1", EdgeType::Uses),
        ];
        (nodes, edges)
    }

    #[test]
    fn empty_input_skips_the_solver() {
        let solver = Arc::new(Counting(AtomicUsize::new(0)));
        let out = layout_with_solver(&[], &[], &config(), solver.clone());
        assert!(out.nodes.is_empty());
        assert_eq!(out.solver, SolverOutcome::Skipped);
        assert_eq!((out.width, out.height), (0.0, 0.0));
        assert_eq!(solver.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn side_band_only_input_skips_the_solver() {
        let solver = Arc::new(Counting(AtomicUsize::new(0)));
        let nodes = vec![
            Resource::new(ResourceKind::ConfigMap, "a", Some("ns")).with_id("a"),
            Resource::new(ResourceKind::Secret, "b", Some("ns")).with_id("b"),
        ];
        let out = layout_with_solver(&nodes, &[], &config(), solver.clone());
        assert_eq!(solver.0.load(Ordering::SeqCst), 0);
        assert_eq!(out.solver, SolverOutcome::Skipped);
        assert_eq!(out.nodes.len(), 2);
        assert!(!out.nodes[0].rect().overlaps(&out.nodes[1].rect()));
        assert_eq!(out.nodes[0].x, config().margin);
        assert_eq!(out.nodes[0].y, config().margin);
    }

    #[test]
    fn lanes_are_ordered_left_to_right() {
        let (nodes, edges) = cluster();
        let out = layout(&nodes, &edges, &config());
        assert_eq!(
            out.solver,
            SolverOutcome::Solved {
                solver: "layered".to_string()
            }
        );
        let ing = out.node("ing").unwrap();
        let svc = out.node("svc").unwrap();
        let d1 = out.node("d1").unwrap();
        let p1 = out.node("p1").unwrap();
        assert_eq!(svc.x, d1.x);
        assert!(ing.x + ing.width < svc.x);
        assert!(d1.x + d1.width.max(svc.width) < p1.x);
        assert_eq!(ing.column, Some(0));
        assert_eq!(p1.column, Some(2));
    }

    #[test]
    fn config_map_sits_beside_its_controller() {
        let (nodes, edges) = cluster();
        let out = layout(&nodes, &edges, &config());
        let d1 = out.node("d1").unwrap();
        let cm = out.node("cm1").unwrap();
        assert_eq!(cm.column, None);
        assert_eq!(cm.lane, Lane::SIDE_BAND);
        assert!(cm.x >= d1.x + d1.width);
        for other in out.nodes.iter().filter(|n| n.id() != "cm1") {
            assert!(!cm.rect().overlaps(&other.rect()), "overlaps {}", other.id());
        }
    }

    /// Never finishes on its own; gives up once cancelled.
    struct Stalled;

    impl CoordinateSolver for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn solve(&self, request: &SolveRequest) -> Result<SolvedPositions, SolverError> {
            while !request.cancel.is_cancelled() {
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
            Err(SolverError::Cancelled { solver: "stalled" })
        }
    }

    #[test]
    fn stalled_solver_times_out_into_grid() {
        let (nodes, edges) = cluster();
        let config = LayoutConfig {
            solver_timeout_ms: 25,
            ..config()
        };
        let out = layout_with_solver(&nodes, &edges, &config, Arc::new(Stalled));
        assert_eq!(
            out.solver,
            SolverOutcome::Fallback {
                reason: SolverError::TimedOut(25).to_string()
            }
        );
        assert_eq!(out.nodes.len(), nodes.len());
        assert_eq!(out.nodes[0].x, config.margin);
        assert_eq!(out.nodes[0].y, config.margin);
    }

    #[test]
    fn malformed_edges_are_counted_and_dropped() {
        let (nodes, mut edges) = cluster();
        edges.push(Edge::new("ghost", "d1", EdgeType::Owns));
        let out = layout(&nodes, &edges, &config());
        assert_eq!(out.dropped_edges, 1);
        assert!(out.edges.iter().all(|e| e.from != "ghost"));
    }

    #[test]
    fn output_is_in_input_order_and_on_the_margin() {
        let (nodes, edges) = cluster();
        let out = layout(&nodes, &edges, &config());
        let ids: Vec<&str> = out.nodes.iter().map(LayoutNode::id).collect();
        assert_eq!(ids, vec!["ing", "svc", "d1", "p1", "p2", "cm1"]);
        let min_x = out.nodes.iter().map(|n| n.x).fold(f32::INFINITY, f32::min);
        let min_y = out.nodes.iter().map(|n| n.y).fold(f32::INFINITY, f32::min);
        assert!((min_x - config().margin).abs() < 1e-3);
        assert!((min_y - config().margin).abs() < 1e-3);
    }
}
