use crate::model::{Edge, Resource, ResourceKind};
use crate::priority::resolve_owner_index;
use std::collections::HashMap;

/// Collapses fan-in onto config-like targets to the single edge from the highest priority
/// source. Claims keep every incoming edge since pods genuinely share them; all other
/// targets pass through. Edges touching resources outside `nodes` are dropped.
pub fn simplify_edges(edges: &[Edge], nodes: &[Resource]) -> Vec<Edge> {
    let kinds: HashMap<&str, ResourceKind> = nodes
        .iter()
        .map(|node| (node.id.as_str(), node.kind()))
        .collect();

    let mut fan_in: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        let (Some(_), Some(target_kind)) = (kinds.get(edge.from.as_str()), kinds.get(edge.to.as_str()))
        else {
            continue;
        };
        if target_kind.is_config_like() {
            fan_in.entry(edge.to.as_str()).or_default().push(idx);
        }
    }

    let mut winners: HashMap<&str, usize> = HashMap::with_capacity(fan_in.len());
    for (target, candidates) in &fan_in {
        let source_kinds = candidates
            .iter()
            .map(|idx| kinds[edges[*idx].from.as_str()]);
        if let Some(pos) = resolve_owner_index(source_kinds) {
            winners.insert(*target, candidates[pos]);
        }
    }

    let mut kept = Vec::with_capacity(edges.len());
    for (idx, edge) in edges.iter().enumerate() {
        let (Some(_), Some(target_kind)) = (kinds.get(edge.from.as_str()), kinds.get(edge.to.as_str()))
        else {
            continue;
        };
        let keep = match target_kind {
            ResourceKind::ConfigMap | ResourceKind::Secret | ResourceKind::ServiceAccount => {
                winners.get(edge.to.as_str()) == Some(&idx)
            }
            // Shared claims are a real many-to-one relationship.
            ResourceKind::PersistentVolumeClaim => true,
            _ => true,
        };
        if keep {
            kept.push(edge.clone());
        }
    }
    if kept.len() < edges.len() {
        tracing::debug!(
            before = edges.len(),
            after = kept.len(),
            "simplified fan-in edges"
        );
    }
    kept
}
