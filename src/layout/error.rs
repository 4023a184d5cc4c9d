use crate::config::LayoutConfig;
use thiserror::Error;

use super::{LayoutNode, PlanEntry};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    #[error("{solver} solver failed: {message}")]
    Failed {
        solver: &'static str,
        message: String,
    },
    #[error("{solver} solver panicked: {message}")]
    Panicked {
        solver: &'static str,
        message: String,
    },
    #[error("{solver} solver returned no position for `{node}`")]
    MissingNode { solver: &'static str, node: String },
    #[error("{solver} solver returned a non-finite position for `{node}`")]
    NonFinite { solver: &'static str, node: String },
    #[error("{solver} solver was cancelled")]
    Cancelled { solver: &'static str },
    #[error("solver did not finish within {0} ms")]
    TimedOut(u64),
    #[error("solver task aborted: {0}")]
    Aborted(String),
}

/// Row-major grid over every node, used when the coordinate solver cannot be trusted.
pub(super) fn compute_fallback_layout(
    entries: &[PlanEntry],
    config: &LayoutConfig,
) -> Vec<LayoutNode> {
    let columns = config.fallback_columns.max(1);
    let cell_width = entries
        .iter()
        .map(|entry| entry.width)
        .fold(0.0f32, f32::max)
        + config.fallback_gap_x;
    let cell_height = entries
        .iter()
        .map(|entry| entry.height)
        .fold(0.0f32, f32::max)
        + config.fallback_gap_y;

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let column = idx % columns;
            let row = idx / columns;
            let mut node = entry.to_layout_node();
            node.x = config.margin + column as f32 * cell_width;
            node.y = config.margin + row as f32 * cell_height;
            node
        })
        .collect()
}
