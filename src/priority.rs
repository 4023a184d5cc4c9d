//! Owner priority used whenever several resources compete for the same child.
//!
//! The attachment engine uses it to pick a primary owner and the edge simplifier uses it
//! to choose the one edge kept for config-like targets.

use crate::model::{Resource, ResourceKind};

/// Highest priority first.
pub const OWNER_PRIORITY: [ResourceKind; 8] = [
    ResourceKind::Deployment,
    ResourceKind::StatefulSet,
    ResourceKind::DaemonSet,
    ResourceKind::CronJob,
    ResourceKind::Service,
    ResourceKind::Job,
    ResourceKind::ReplicaSet,
    ResourceKind::Pod,
];

/// Position of `kind` in [`OWNER_PRIORITY`]; kinds outside the table have no rank.
pub fn owner_rank(kind: ResourceKind) -> Option<usize> {
    OWNER_PRIORITY.iter().position(|candidate| *candidate == kind)
}

/// Index of the winning candidate: the first one of the best ranked kind present, or the
/// first candidate when no kind is ranked.
pub fn resolve_owner_index<I>(kinds: I) -> Option<usize>
where
    I: IntoIterator<Item = ResourceKind>,
{
    let mut first = None;
    let mut best: Option<(usize, usize)> = None;
    for (idx, kind) in kinds.into_iter().enumerate() {
        if first.is_none() {
            first = Some(idx);
        }
        let Some(rank) = owner_rank(kind) else {
            continue;
        };
        match best {
            Some((best_rank, _)) if best_rank <= rank => {}
            _ => best = Some((rank, idx)),
        }
    }
    best.map(|(_, idx)| idx).or(first)
}

pub fn resolve_owner<'a>(candidates: &[&'a Resource]) -> Option<&'a Resource> {
    let idx = resolve_owner_index(candidates.iter().map(|resource| resource.kind()))?;
    candidates.get(idx).copied()
}
