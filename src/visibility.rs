use crate::attachments::{AttachmentEngine, OwnerIndex};
use crate::model::{Edge, ExpansionState, Resource, ResourceKind, ResourceStatus};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// User-facing filters. Empty sets mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    pub statuses: BTreeSet<ResourceStatus>,
    pub kinds: BTreeSet<ResourceKind>,
    pub namespaces: BTreeSet<String>,
    /// Case-insensitive substring, or a regex when written as `/pattern/`.
    pub search: Option<String>,
    pub problems_only: bool,
    pub hide_cluster_scoped: bool,
}

/// Kinds that are never hidden behind an expand toggle.
pub fn is_always_visible(kind: ResourceKind) -> bool {
    match kind {
        ResourceKind::Ingress
        | ResourceKind::Service
        | ResourceKind::Deployment
        | ResourceKind::StatefulSet
        | ResourceKind::DaemonSet
        | ResourceKind::CronJob
        | ResourceKind::HorizontalPodAutoscaler
        | ResourceKind::Other => true,
        ResourceKind::Endpoints
        | ResourceKind::ReplicaSet
        | ResourceKind::Job
        | ResourceKind::Pod
        | ResourceKind::ConfigMap
        | ResourceKind::Secret
        | ResourceKind::ServiceAccount
        | ResourceKind::PersistentVolumeClaim
        | ResourceKind::PersistentVolume
        | ResourceKind::StorageClass => false,
    }
}

enum SearchMatcher {
    Substring(String),
    Pattern(Regex),
}

impl SearchMatcher {
    fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() > 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
            let pattern = &trimmed[1..trimmed.len() - 1];
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => return Some(Self::Pattern(regex)),
                Err(err) => {
                    tracing::debug!(%err, pattern, "invalid search pattern, matching literally");
                }
            }
        }
        Some(Self::Substring(trimmed.to_lowercase()))
    }

    fn matches(&self, resource: &Resource) -> bool {
        let fields = [
            resource.name.as_str(),
            resource.namespace.as_deref().unwrap_or(""),
            resource.kind().as_str(),
        ];
        match self {
            Self::Substring(needle) => fields
                .iter()
                .any(|field| field.to_lowercase().contains(needle.as_str())),
            Self::Pattern(regex) => fields.iter().any(|field| regex.is_match(field)),
        }
    }
}

/// Keeps the resources that satisfy every active filter.
pub fn apply_filters(nodes: &[Resource], filters: &Filters) -> Vec<Resource> {
    let search = filters.search.as_deref().and_then(SearchMatcher::new);
    nodes
        .iter()
        .filter(|node| {
            if !filters.statuses.is_empty() && !filters.statuses.contains(&node.status) {
                return false;
            }
            if !filters.kinds.is_empty() && !filters.kinds.contains(&node.kind()) {
                return false;
            }
            if filters.problems_only && !node.status.is_problem() {
                return false;
            }
            match node.namespace.as_deref() {
                None if filters.hide_cluster_scoped => return false,
                Some(ns) if !filters.namespaces.is_empty() && !filters.namespaces.contains(ns) => {
                    return false;
                }
                _ => {}
            }
            search.as_ref().is_none_or(|matcher| matcher.matches(node))
        })
        .cloned()
        .collect()
}

/// Resources of `nodes` that are visible under `expansion`. Owners are resolved against
/// `all_nodes`, so a resource whose owner was filtered out still follows that owner's
/// expansion state.
pub fn filter_visible(
    nodes: &[Resource],
    all_nodes: &[Resource],
    edges: &[Edge],
    expansion: &ExpansionState,
) -> Vec<Resource> {
    let engine = AttachmentEngine::new(all_nodes, edges);
    let owners = engine.owner_index();
    filter_visible_with(nodes, &owners, expansion)
}

pub fn filter_visible_with(
    nodes: &[Resource],
    owners: &OwnerIndex<'_>,
    expansion: &ExpansionState,
) -> Vec<Resource> {
    nodes
        .iter()
        .filter(|node| is_visible(node, owners, expansion))
        .cloned()
        .collect()
}

fn is_visible(node: &Resource, owners: &OwnerIndex<'_>, expansion: &ExpansionState) -> bool {
    let kind = node.kind();
    if is_always_visible(kind) {
        return true;
    }
    let candidates = owners.owners(&node.id);
    // Orphans fail open.
    candidates.is_empty()
        || candidates
            .iter()
            .any(|owner| expansion.is_expanded(&owner.id, kind))
}
