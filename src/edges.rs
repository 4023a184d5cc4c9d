use crate::model::{Edge, EdgeType, Resource, ResourceKind, ResourceSpec};
use std::collections::{HashMap, HashSet};

type NameKey = (ResourceKind, String, Option<String>);
type NamespaceKey = (ResourceKind, Option<String>);

/// Lookup tables over one snapshot: by id, by `(kind, name, namespace)` and by
/// `(kind, namespace)`. Cluster-scoped kinds are keyed without a namespace.
pub(crate) struct ResourceIndex<'a> {
    nodes: &'a [Resource],
    by_id: HashMap<&'a str, &'a Resource>,
    by_name: HashMap<NameKey, Vec<&'a Resource>>,
    by_namespace: HashMap<NamespaceKey, Vec<&'a Resource>>,
}

impl<'a> ResourceIndex<'a> {
    pub(crate) fn new(nodes: &'a [Resource]) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut by_name: HashMap<NameKey, Vec<&'a Resource>> = HashMap::new();
        let mut by_namespace: HashMap<NamespaceKey, Vec<&'a Resource>> = HashMap::new();
        for node in nodes {
            by_id.entry(node.id.as_str()).or_insert(node);
            let kind = node.kind();
            let ns = scoped_namespace(kind, node.namespace.as_deref()).map(str::to_string);
            by_name
                .entry((kind, node.name.clone(), ns.clone()))
                .or_default()
                .push(node);
            by_namespace.entry((kind, ns)).or_default().push(node);
        }
        Self {
            nodes,
            by_id,
            by_name,
            by_namespace,
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<&'a Resource> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn lookup(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> &[&'a Resource] {
        let ns = scoped_namespace(kind, namespace).map(str::to_string);
        self.by_name
            .get(&(kind, name.to_string(), ns))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every resource of `kind` called `name`, whatever its namespace, in input order.
    pub(crate) fn named(&self, kind: ResourceKind, name: &str) -> Vec<&'a Resource> {
        self.nodes
            .iter()
            .filter(|node| node.kind() == kind && node.name == name)
            .collect()
    }

    pub(crate) fn in_namespace(&self, kind: ResourceKind, namespace: Option<&str>) -> &[&'a Resource] {
        let ns = scoped_namespace(kind, namespace).map(str::to_string);
        self.by_namespace
            .get(&(kind, ns))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn scoped_namespace(kind: ResourceKind, namespace: Option<&str>) -> Option<&str> {
    if kind.is_cluster_scoped() {
        None
    } else {
        namespace
    }
}

/// Infers typed edges from every resource's reference fields. References that match no
/// resource produce nothing; duplicates are left in place.
pub fn resolve_edges(nodes: &[Resource]) -> Vec<Edge> {
    let index = ResourceIndex::new(nodes);
    let mut edges = Vec::new();
    for node in nodes {
        resolve_node_edges(node, &index, &mut edges);
    }
    tracing::debug!(nodes = nodes.len(), edges = edges.len(), "resolved edges");
    edges
}

fn resolve_node_edges(node: &Resource, index: &ResourceIndex<'_>, edges: &mut Vec<Edge>) {
    let ns = node.namespace.as_deref();
    let push_all = |targets: &[&Resource], from_node: bool, relation: EdgeType, edges: &mut Vec<Edge>| {
        for target in targets {
            let edge = if from_node {
                Edge::new(&node.id, &target.id, relation)
            } else {
                Edge::new(&target.id, &node.id, relation)
            };
            edges.push(edge);
        }
    };

    for owner in &node.owners {
        let by_uid = owner.uid.as_deref().and_then(|uid| index.get(uid));
        match by_uid {
            Some(found) => push_all(&[found], false, EdgeType::Owns, edges),
            None => push_all(index.lookup(owner.kind, &owner.name, ns), false, EdgeType::Owns, edges),
        }
    }

    match &node.spec {
        ResourceSpec::Service => {
            let endpoints = index.lookup(ResourceKind::Endpoints, &node.name, ns);
            push_all(endpoints, true, EdgeType::Selects, edges);
        }
        ResourceSpec::Endpoints { target_pods } => {
            for pod in target_pods {
                push_all(index.lookup(ResourceKind::Pod, pod, ns), true, EdgeType::Selects, edges);
            }
        }
        ResourceSpec::Ingress => {
            let services = index.in_namespace(ResourceKind::Service, ns);
            push_all(services, true, EdgeType::Backs, edges);
        }
        ResourceSpec::PersistentVolumeClaim { volume_name } => {
            if let Some(volume) = volume_name {
                let volumes = index.lookup(ResourceKind::PersistentVolume, volume, None);
                push_all(volumes, true, EdgeType::Ref, edges);
            }
        }
        ResourceSpec::PersistentVolume {
            claim_ref,
            storage_class,
        } => {
            if let Some(claim) = claim_ref {
                // A claimRef without a namespace matches the claim by name alone.
                let claims = match claim.namespace.as_deref() {
                    Some(claim_ns) => {
                        index.lookup(ResourceKind::PersistentVolumeClaim, &claim.name, Some(claim_ns)).to_vec()
                    }
                    None => index.named(ResourceKind::PersistentVolumeClaim, &claim.name),
                };
                push_all(&claims, false, EdgeType::Ref, edges);
            }
            if let Some(class) = storage_class {
                let classes = index.lookup(ResourceKind::StorageClass, class, None);
                push_all(classes, true, EdgeType::Ref, edges);
            }
        }
        ResourceSpec::Pod(refs) => {
            for claim in &refs.claims {
                let claims = index.lookup(ResourceKind::PersistentVolumeClaim, claim, ns);
                push_all(claims, true, EdgeType::Mounts, edges);
            }
            let uses = config_targets(
                index,
                ns,
                &refs.config_maps,
                &refs.secrets,
                refs.service_account.as_deref(),
            );
            push_all(&uses, true, EdgeType::Uses, edges);
        }
        ResourceSpec::Deployment(refs) | ResourceSpec::StatefulSet(refs) | ResourceSpec::DaemonSet(refs) => {
            let uses = config_targets(
                index,
                ns,
                &refs.config_maps,
                &refs.secrets,
                refs.service_account.as_deref(),
            );
            push_all(&uses, true, EdgeType::Uses, edges);
        }
        ResourceSpec::HorizontalPodAutoscaler => {
            // No scale target in the snapshot; every controller in the namespace is a candidate.
            for kind in [
                ResourceKind::Deployment,
                ResourceKind::StatefulSet,
                ResourceKind::DaemonSet,
            ] {
                push_all(index.in_namespace(kind, ns), true, EdgeType::Scales, edges);
            }
        }
        ResourceSpec::CronJob
        | ResourceSpec::ReplicaSet
        | ResourceSpec::Job
        | ResourceSpec::ConfigMap
        | ResourceSpec::Secret
        | ResourceSpec::ServiceAccount
        | ResourceSpec::StorageClass
        | ResourceSpec::Other => {}
    }
}

pub(crate) fn config_targets<'a>(
    index: &ResourceIndex<'a>,
    namespace: Option<&str>,
    config_maps: &[String],
    secrets: &[String],
    service_account: Option<&str>,
) -> Vec<&'a Resource> {
    let mut targets = Vec::new();
    for name in config_maps {
        targets.extend_from_slice(index.lookup(ResourceKind::ConfigMap, name, namespace));
    }
    for name in secrets {
        targets.extend_from_slice(index.lookup(ResourceKind::Secret, name, namespace));
    }
    if let Some(name) = service_account {
        targets.extend_from_slice(index.lookup(ResourceKind::ServiceAccount, name, namespace));
    }
    targets
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeValidation {
    pub edges: Vec<Edge>,
    /// Edges removed because an endpoint is not in the node set.
    pub dropped: usize,
}

/// Drops every edge whose endpoints are not both present in `nodes`.
pub fn validate_edges(edges: &[Edge], nodes: &[Resource]) -> EdgeValidation {
    let ids: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
    let kept = retain_between(edges, &ids);
    let dropped = edges.len() - kept.len();
    if dropped > 0 {
        tracing::debug!(dropped, "dropped edges with unknown endpoints");
    }
    EdgeValidation {
        edges: kept,
        dropped,
    }
}

/// Edges whose endpoints are both in `ids`, in input order.
pub fn retain_between(edges: &[Edge], ids: &HashSet<&str>) -> Vec<Edge> {
    edges
        .iter()
        .filter(|edge| ids.contains(edge.from.as_str()) && ids.contains(edge.to.as_str()))
        .cloned()
        .collect()
}
