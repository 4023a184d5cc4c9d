use super::error::SolverError;
use super::solver::{CancelFlag, CoordinateSolver, SolveRequest, SolvedPositions};
use std::cmp::Ordering;
use std::collections::HashMap;

/// In-process layered solver: median-heuristic crossing reduction over the pinned layers,
/// then stacked placement with every layer centred on the same axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayeredSolver;

impl CoordinateSolver for LayeredSolver {
    fn name(&self) -> &'static str {
        "layered"
    }

    fn solve(&self, request: &SolveRequest) -> Result<SolvedPositions, SolverError> {
        let mut layers: Vec<Vec<String>> = vec![Vec::new(); request.layer_count];
        let mut sizes: HashMap<&str, (f32, f32)> = HashMap::new();
        let mut initial: HashMap<String, usize> = HashMap::new();
        let mut sorted = request.nodes.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        for node in sorted {
            let Some(bucket) = layers.get_mut(node.layer) else {
                return Err(SolverError::Failed {
                    solver: self.name(),
                    message: format!("node `{}` is on layer {} of {}", node.id, node.layer, request.layer_count),
                });
            };
            bucket.push(node.id.clone());
            sizes.insert(node.id.as_str(), (node.width, node.height));
            initial.insert(node.id.clone(), node.order);
        }

        if !order_layers(&mut layers, &request.edges, &initial, request.order_passes, &request.cancel) {
            return Err(SolverError::Cancelled { solver: self.name() });
        }

        let mut positions = SolvedPositions::with_capacity(request.nodes.len());
        let mut x = 0.0f32;
        for bucket in &layers {
            let layer_width = bucket
                .iter()
                .filter_map(|id| sizes.get(id.as_str()))
                .map(|(w, _)| *w)
                .fold(0.0f32, f32::max);
            let total_height: f32 = bucket
                .iter()
                .filter_map(|id| sizes.get(id.as_str()))
                .map(|(_, h)| *h)
                .sum::<f32>()
                + request.node_spacing * bucket.len().saturating_sub(1) as f32;
            let mut y = -total_height / 2.0;
            for id in bucket {
                let (_, height) = sizes.get(id.as_str()).copied().unwrap_or((0.0, 0.0));
                positions.insert(id.clone(), (x, y));
                y += height + request.node_spacing;
            }
            x += layer_width + request.rank_spacing;
        }
        Ok(positions)
    }
}

/// Alternating downward/upward sweeps ordering each layer by the median position of its
/// neighbours in the adjacent layer. Returns `false` when `cancel` fires between passes.
fn order_layers(
    layers: &mut [Vec<String>],
    edges: &[(String, String)],
    initial: &HashMap<String, usize>,
    passes: usize,
    cancel: &CancelFlag,
) -> bool {
    if layers.len() <= 1 {
        return true;
    }
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        outgoing.entry(from.as_str()).or_default().push(to.as_str());
        incoming.entry(to.as_str()).or_default().push(from.as_str());
    }

    let mut positions: HashMap<String, usize> = HashMap::new();
    let refresh = |layers: &[Vec<String>], positions: &mut HashMap<String, usize>| {
        positions.clear();
        for bucket in layers {
            for (idx, id) in bucket.iter().enumerate() {
                positions.insert(id.clone(), idx);
            }
        }
    };
    refresh(layers, &mut positions);

    let sort_bucket = |bucket: &mut Vec<String>,
                       neighbors: &HashMap<&str, Vec<&str>>,
                       positions: &HashMap<String, usize>| {
        let current: HashMap<String, usize> = bucket
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        bucket.sort_by(|a, b| {
            let a_score = median_position(a, neighbors, positions, &current);
            let b_score = median_position(b, neighbors, positions, &current);
            match a_score.partial_cmp(&b_score) {
                Some(Ordering::Equal) | None => {
                    let a_pos = current.get(a).copied().unwrap_or(0);
                    let b_pos = current.get(b).copied().unwrap_or(0);
                    a_pos.cmp(&b_pos).then_with(|| {
                        initial
                            .get(a)
                            .copied()
                            .unwrap_or(usize::MAX)
                            .cmp(&initial.get(b).copied().unwrap_or(usize::MAX))
                    })
                }
                Some(ordering) => ordering,
            }
        });
    };

    for _ in 0..passes.max(1) {
        if cancel.is_cancelled() {
            return false;
        }
        for layer in 1..layers.len() {
            if layers[layer].len() <= 1 {
                continue;
            }
            sort_bucket(&mut layers[layer], &incoming, &positions);
            refresh(layers, &mut positions);
        }
        for layer in (0..layers.len() - 1).rev() {
            if layers[layer].len() <= 1 {
                continue;
            }
            sort_bucket(&mut layers[layer], &outgoing, &positions);
            refresh(layers, &mut positions);
        }
    }
    true
}

fn median_position(
    id: &str,
    neighbors: &HashMap<&str, Vec<&str>>,
    positions: &HashMap<String, usize>,
    current: &HashMap<String, usize>,
) -> f32 {
    let fallback = *current.get(id).unwrap_or(&0) as f32;
    let Some(list) = neighbors.get(id) else {
        return fallback;
    };
    let mut values: Vec<f32> = list
        .iter()
        .filter_map(|neighbor| positions.get(*neighbor))
        .map(|pos| *pos as f32)
        .collect();
    if values.is_empty() {
        return fallback;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::solver::SolveNode;

    fn node(id: &str, layer: usize, order: usize) -> SolveNode {
        SolveNode {
            id: id.to_string(),
            layer,
            width: 100.0,
            height: 40.0,
            order,
        }
    }

    #[test]
    fn uncrosses_simple_bipartite_graph() {
        let request = SolveRequest {
            nodes: vec![
                node("a", 0, 0),
                node("b", 0, 1),
                node("x", 1, 2),
                node("y", 1, 3),
            ],
            edges: vec![
                ("a".to_string(), "y".to_string()),
                ("b".to_string(), "x".to_string()),
            ],
            layer_count: 2,
            node_spacing: 10.0,
            rank_spacing: 50.0,
            order_passes: 2,
            cancel: CancelFlag::new(),
        };
        let positions = LayeredSolver.solve(&request).unwrap();
        let (ax, ay) = positions["a"];
        let (_, by) = positions["b"];
        let (xx, xy) = positions["x"];
        let (_, yy) = positions["y"];
        assert!(xx > ax);
        assert_eq!(ay < by, yy < xy);
    }

    #[test]
    fn layers_out_of_range_fail() {
        let request = SolveRequest {
            nodes: vec![node("a", 3, 0)],
            edges: Vec::new(),
            layer_count: 1,
            node_spacing: 10.0,
            rank_spacing: 10.0,
            order_passes: 1,
            cancel: CancelFlag::new(),
        };
        assert!(LayeredSolver.solve(&request).is_err());
    }

    #[test]
    fn cancelled_request_stops_before_sweeping() {
        let request = SolveRequest {
            nodes: vec![node("a", 0, 0), node("x", 1, 1), node("y", 1, 2)],
            edges: vec![("a".to_string(), "y".to_string())],
            layer_count: 2,
            node_spacing: 10.0,
            rank_spacing: 10.0,
            order_passes: 4,
            cancel: CancelFlag::new(),
        };
        request.cancel.cancel();
        assert_eq!(
            LayeredSolver.solve(&request),
            Err(SolverError::Cancelled { solver: "layered" })
        );
    }
}
