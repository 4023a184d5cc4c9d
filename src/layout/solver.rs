use super::error::SolverError;
use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Shared stop signal for a solve that nobody is waiting on any more. Solvers check it
/// between passes; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl PartialEq for CancelFlag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveNode {
    pub id: String,
    /// Compacted lane; the solver must keep the node in this layer.
    pub layer: usize,
    pub width: f32,
    pub height: f32,
    /// Initial order within the layer.
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveRequest {
    pub nodes: Vec<SolveNode>,
    /// Oriented from the lower layer to the higher one; no same-layer edges.
    pub edges: Vec<(String, String)>,
    pub layer_count: usize,
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub order_passes: usize,
    pub cancel: CancelFlag,
}

/// Top-left corner per node id.
pub type SolvedPositions = HashMap<String, (f32, f32)>;

/// Layered-graph placement backend. Implementations receive nodes pinned to layers and
/// return initial coordinates; the engine snaps and de-overlaps them afterwards.
pub trait CoordinateSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, request: &SolveRequest) -> Result<SolvedPositions, SolverError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    Dagre,
    #[default]
    Layered,
}

impl SolverKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "dagre" => Some(Self::Dagre),
            "layered" => Some(Self::Layered),
            _ => None,
        }
    }

    pub fn build(self) -> Arc<dyn CoordinateSolver> {
        match self {
            Self::Dagre => Arc::new(DagreSolver),
            Self::Layered => Arc::new(super::layered::LayeredSolver),
        }
    }
}

/// Runs `solver` and rejects panics and incomplete or non-finite output.
pub fn run_solver(
    solver: &dyn CoordinateSolver,
    request: &SolveRequest,
) -> Result<SolvedPositions, SolverError> {
    let name = solver.name();
    let outcome = catch_unwind(AssertUnwindSafe(|| solver.solve(request))).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        SolverError::Panicked {
            solver: name,
            message,
        }
    })?;
    let positions = outcome?;
    for node in &request.nodes {
        let Some((x, y)) = positions.get(&node.id) else {
            return Err(SolverError::MissingNode {
                solver: name,
                node: node.id.clone(),
            });
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(SolverError::NonFinite {
                solver: name,
                node: node.id.clone(),
            });
        }
    }
    Ok(positions)
}

/// [`run_solver`] on a dedicated thread, giving up after `timeout_ms`. On timeout the
/// request's cancel flag is raised and the thread is left to wind down on its own.
pub fn run_solver_with_timeout(
    solver: Arc<dyn CoordinateSolver>,
    request: &SolveRequest,
    timeout_ms: u64,
) -> Result<SolvedPositions, SolverError> {
    let (tx, rx) = mpsc::channel();
    let owned = request.clone();
    thread::Builder::new()
        .name(format!("{}-solve", solver.name()))
        .spawn(move || {
            let _ = tx.send(run_solver(solver.as_ref(), &owned));
        })
        .map_err(|err| SolverError::Aborted(err.to_string()))?;
    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            request.cancel.cancel();
            tracing::warn!(timeout_ms, "coordinate solve timed out");
            Err(SolverError::TimedOut(timeout_ms))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(SolverError::Aborted("solver thread exited without a result".to_string()))
        }
    }
}

/// dagre (left-to-right ranks). Only the vertical order dagre produces is used: columns
/// are re-snapped afterwards, so layers are not pinned inside the dagre graph. Edges are
/// oriented from lower to higher layer, which keeps the graph acyclic.
#[derive(Debug, Clone, Copy, Default)]
pub struct DagreSolver;

impl CoordinateSolver for DagreSolver {
    fn name(&self) -> &'static str {
        "dagre"
    }

    fn solve(&self, request: &SolveRequest) -> Result<SolvedPositions, SolverError> {
        if request.nodes.is_empty() {
            return Ok(SolvedPositions::new());
        }

        let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
            DagreGraph::new(Some(GraphOption {
                directed: Some(true),
                multigraph: Some(false),
                compound: Some(false),
            }));

        let mut graph_config = DagreConfig::default();
        graph_config.rankdir = Some("LR".to_string());
        graph_config.nodesep = Some(request.node_spacing);
        graph_config.ranksep = Some(request.rank_spacing);
        graph_config.marginx = Some(8.0);
        graph_config.marginy = Some(8.0);
        dagre_graph.set_graph(graph_config);

        for node in &request.nodes {
            let mut dagre_node = DagreNode::default();
            dagre_node.width = node.width;
            dagre_node.height = node.height;
            dagre_node.order = Some(node.order);
            dagre_graph.set_node(node.id.clone(), Some(dagre_node));
        }

        let layers: HashMap<&str, usize> = request
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), node.layer))
            .collect();
        let mut edge_set: HashSet<(&str, &str)> = HashSet::new();
        for (from, to) in &request.edges {
            let (Some(from_layer), Some(to_layer)) = (layers.get(from.as_str()), layers.get(to.as_str()))
            else {
                continue;
            };
            if to_layer <= from_layer || !edge_set.insert((from.as_str(), to.as_str())) {
                continue;
            }
            let mut edge_label = DagreEdge::default();
            edge_label.minlen = Some(1.0);
            let _ = dagre_graph.set_edge(from, to, Some(edge_label), None);
        }

        if request.cancel.is_cancelled() {
            return Err(SolverError::Cancelled { solver: self.name() });
        }
        dagre_layout::run_layout(&mut dagre_graph);

        let mut positions = SolvedPositions::with_capacity(request.nodes.len());
        for node in &request.nodes {
            let Some(dagre_node) = dagre_graph.node(&node.id) else {
                continue;
            };
            positions.insert(
                node.id.clone(),
                (
                    dagre_node.x - node.width / 2.0,
                    dagre_node.y - node.height / 2.0,
                ),
            );
        }
        Ok(positions)
    }
}
