//! Collapsible descendants per resource.
//!
//! An attachment is a resource hidden behind a per-kind expand toggle on one of its
//! owners. Controllers additionally collect the configuration and storage referenced by
//! every pod they run so that it can be shown once at the controller instead of once per
//! pod.

use crate::edges::{ResourceIndex, config_targets};
use crate::model::{Edge, EdgeType, ExpansionState, Resource, ResourceKind, ResourceSpec};
use crate::priority::resolve_owner;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Descendants grouped by kind, each group in discovery order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentSet<'a> {
    groups: BTreeMap<ResourceKind, Vec<&'a Resource>>,
}

impl<'a> AttachmentSet<'a> {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, kind: ResourceKind) -> &[&'a Resource] {
        self.groups.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.groups.keys().copied()
    }

    pub fn groups(&self) -> impl Iterator<Item = (ResourceKind, &[&'a Resource])> + '_ {
        self.groups.iter().map(|(kind, list)| (*kind, list.as_slice()))
    }

    pub fn resources(&self) -> impl Iterator<Item = &'a Resource> + '_ {
        self.groups.values().flat_map(|list| list.iter().copied())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources().any(|resource| resource.id == id)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// One toggle per attached kind, as shown on the owner's node.
    pub fn summarize(&self, owner_id: &str, expansion: &ExpansionState) -> Vec<AttachmentSummary> {
        self.groups()
            .map(|(kind, list)| AttachmentSummary {
                kind,
                count: list.len(),
                expanded: expansion.is_expanded(owner_id, kind),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentSummary {
    pub kind: ResourceKind,
    pub count: usize,
    pub expanded: bool,
}

#[derive(Default)]
struct Collector<'a> {
    set: AttachmentSet<'a>,
    seen: HashSet<&'a str>,
}

impl<'a> Collector<'a> {
    fn add(&mut self, resource: &'a Resource) {
        if self.seen.insert(resource.id.as_str()) {
            self.set
                .groups
                .entry(resource.kind())
                .or_default()
                .push(resource);
        }
    }

    fn extend<I: IntoIterator<Item = &'a Resource>>(&mut self, resources: I) {
        for resource in resources {
            self.add(resource);
        }
    }
}

/// Indexes one snapshot so attachments can be computed per resource without rescanning.
pub struct AttachmentEngine<'a> {
    nodes: &'a [Resource],
    edges: &'a [Edge],
    index: ResourceIndex<'a>,
    outgoing: HashMap<&'a str, Vec<(&'a str, EdgeType)>>,
}

impl<'a> AttachmentEngine<'a> {
    pub fn new(nodes: &'a [Resource], edges: &'a [Edge]) -> Self {
        let mut outgoing: HashMap<&'a str, Vec<(&'a str, EdgeType)>> = HashMap::new();
        for edge in edges {
            outgoing
                .entry(edge.from.as_str())
                .or_default()
                .push((edge.to.as_str(), edge.relation));
        }
        Self {
            nodes,
            edges,
            index: ResourceIndex::new(nodes),
            outgoing,
        }
    }

    fn targets(
        &self,
        from: &str,
        relation: EdgeType,
        accept: impl Fn(ResourceKind) -> bool,
    ) -> Vec<&'a Resource> {
        let Some(list) = self.outgoing.get(from) else {
            return Vec::new();
        };
        list.iter()
            .filter(|(_, rel)| *rel == relation)
            .filter_map(|(to, _)| self.index.get(to))
            .filter(|target| accept(target.kind()))
            .collect()
    }

    pub fn attachments(&self, node: &Resource) -> AttachmentSet<'a> {
        let mut collector = Collector::default();
        let kind = node.kind();
        match kind {
            ResourceKind::Service => {
                collector.extend(self.targets(&node.id, EdgeType::Selects, |k| {
                    k == ResourceKind::Endpoints
                }));
            }
            ResourceKind::Deployment
            | ResourceKind::StatefulSet
            | ResourceKind::DaemonSet
            | ResourceKind::CronJob => self.collect_workload(node, &mut collector),
            ResourceKind::ReplicaSet | ResourceKind::Job => {
                collector.extend(self.targets(&node.id, EdgeType::Owns, |k| k == ResourceKind::Pod));
            }
            ResourceKind::Pod => collector.extend(self.pod_references(node)),
            ResourceKind::PersistentVolumeClaim => {
                if let ResourceSpec::PersistentVolumeClaim {
                    volume_name: Some(volume),
                } = &node.spec
                {
                    collector.extend(self.index.lookup(ResourceKind::PersistentVolume, volume, None).iter().copied());
                }
                collector.extend(self.targets(&node.id, EdgeType::Ref, |k| {
                    k == ResourceKind::PersistentVolume
                }));
            }
            ResourceKind::PersistentVolume => {
                if let ResourceSpec::PersistentVolume {
                    storage_class: Some(class),
                    ..
                } = &node.spec
                {
                    collector.extend(self.index.lookup(ResourceKind::StorageClass, class, None).iter().copied());
                }
                collector.extend(self.targets(&node.id, EdgeType::Ref, |k| {
                    k == ResourceKind::StorageClass
                }));
            }
            ResourceKind::Ingress
            | ResourceKind::Endpoints
            | ResourceKind::ConfigMap
            | ResourceKind::Secret
            | ResourceKind::ServiceAccount
            | ResourceKind::StorageClass
            | ResourceKind::HorizontalPodAutoscaler
            | ResourceKind::Other => {}
        }
        collector.set
    }

    fn collect_workload(&self, node: &Resource, collector: &mut Collector<'a>) {
        let owned = self.targets(&node.id, EdgeType::Owns, |k| {
            matches!(k, ResourceKind::ReplicaSet | ResourceKind::Job | ResourceKind::Pod)
        });
        collector.extend(owned.iter().copied());

        let mut pods: Vec<&'a Resource> = Vec::new();
        for child in owned.iter().copied() {
            if child.kind() == ResourceKind::Pod {
                pods.push(child);
            } else {
                pods.extend(self.targets(&child.id, EdgeType::Owns, |k| k == ResourceKind::Pod));
            }
        }

        collector.extend(self.targets(&node.id, EdgeType::Uses, ResourceKind::is_config_like));
        for pod in pods {
            collector.extend(self.pod_references(pod));
        }
    }

    /// Config, secrets, service account and claims a pod names directly or through edges.
    fn pod_references(&self, pod: &Resource) -> Vec<&'a Resource> {
        let mut found = Vec::new();
        if let ResourceSpec::Pod(refs) = &pod.spec {
            let ns = pod.namespace.as_deref();
            found.extend(config_targets(
                &self.index,
                ns,
                &refs.config_maps,
                &refs.secrets,
                refs.service_account.as_deref(),
            ));
            for claim in &refs.claims {
                found.extend_from_slice(self.index.lookup(ResourceKind::PersistentVolumeClaim, claim, ns));
            }
        }
        found.extend(self.targets(&pod.id, EdgeType::Uses, ResourceKind::is_config_like));
        found.extend(self.targets(&pod.id, EdgeType::Mounts, |k| {
            k == ResourceKind::PersistentVolumeClaim
        }));
        found
    }

    /// Owners of every resource: incoming `owns` sources plus every resource whose
    /// attachment set contains it.
    pub fn owner_index(&self) -> OwnerIndex<'a> {
        let mut owners: HashMap<&'a str, Vec<&'a Resource>> = HashMap::new();
        let mut push = |child: &'a str, owner: &'a Resource| {
            let list = owners.entry(child).or_default();
            if !list.iter().any(|existing| existing.id == owner.id) {
                list.push(owner);
            }
        };
        for edge in self.edges {
            if edge.relation != EdgeType::Owns {
                continue;
            }
            let (Some(owner), Some(child)) = (self.index.get(&edge.from), self.index.get(&edge.to)) else {
                continue;
            };
            push(child.id.as_str(), owner);
        }
        for node in self.nodes {
            for child in self.attachments(node).resources() {
                push(child.id.as_str(), node);
            }
        }
        OwnerIndex { owners }
    }
}

/// Convenience wrapper that indexes the snapshot for a single lookup.
pub fn compute_attachments<'a>(
    node: &Resource,
    nodes: &'a [Resource],
    edges: &'a [Edge],
) -> AttachmentSet<'a> {
    AttachmentEngine::new(nodes, edges).attachments(node)
}

pub struct OwnerIndex<'a> {
    owners: HashMap<&'a str, Vec<&'a Resource>>,
}

impl<'a> OwnerIndex<'a> {
    pub fn owners(&self, id: &str) -> &[&'a Resource] {
        self.owners.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn primary_owner(&self, id: &str) -> Option<&'a Resource> {
        resolve_owner(self.owners(id))
    }

    pub fn is_orphan(&self, id: &str) -> bool {
        self.owners(id).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::resolve_edges;
    use crate::model::{PodRefs, WorkloadRefs};

    fn ids(list: &[&Resource]) -> Vec<String> {
        list.iter().map(|r| r.id.clone()).collect()
    }

    fn deployment_tree() -> Vec<Resource> {
        vec![
            Resource::new(ResourceKind::Deployment, "web", Some("a"))
                .with_id("d1")
                .with_spec(ResourceSpec::Deployment(WorkloadRefs {
                    secrets: vec!["tls".to_string()],
                    ..WorkloadRefs::default()
                })),
            Resource::new(ResourceKind::ReplicaSet, "web-1", Some("a"))
                .with_id("rs1")
                .with_owner(ResourceKind::Deployment, "web"),
            Resource::new(ResourceKind::Pod, "web-1-a", Some("a"))
                .with_id("p1")
                .with_owner(ResourceKind::ReplicaSet, "web-1")
                .with_spec(ResourceSpec::Pod(PodRefs {
                    config_maps: vec!["cfg".to_string()],
                    claims: vec!["data".to_string()],
                    service_account: Some("web".to_string()),
                    ..PodRefs::default()
                })),
            Resource::new(ResourceKind::Pod, "web-1-b", Some("a"))
                .with_id("p2")
                .with_owner(ResourceKind::ReplicaSet, "web-1")
                .with_spec(ResourceSpec::Pod(PodRefs {
                    config_maps: vec!["cfg".to_string()],
                    ..PodRefs::default()
                })),
            Resource::new(ResourceKind::ConfigMap, "cfg", Some("a")).with_id("cm1"),
            Resource::new(ResourceKind::Secret, "tls", Some("a")).with_id("s1"),
            Resource::new(ResourceKind::ServiceAccount, "web", Some("a")).with_id("sa1"),
            Resource::new(ResourceKind::PersistentVolumeClaim, "data", Some("a")).with_id("pvc1"),
        ]
    }

    #[test]
    fn controller_collects_pod_references_once() {
        let nodes = deployment_tree();
        let edges = resolve_edges(&nodes);
        let set = compute_attachments(&nodes[0], &nodes, &edges);
        assert_eq!(ids(set.get(ResourceKind::ReplicaSet)), vec!["rs1"]);
        assert!(set.get(ResourceKind::Pod).is_empty());
        assert_eq!(ids(set.get(ResourceKind::ConfigMap)), vec!["cm1"]);
        assert_eq!(ids(set.get(ResourceKind::Secret)), vec!["s1"]);
        assert_eq!(ids(set.get(ResourceKind::ServiceAccount)), vec!["sa1"]);
        assert_eq!(ids(set.get(ResourceKind::PersistentVolumeClaim)), vec!["pvc1"]);
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn ephemeral_controller_attaches_pods() {
        let nodes = deployment_tree();
        let edges = resolve_edges(&nodes);
        let set = compute_attachments(&nodes[1], &nodes, &edges);
        assert_eq!(ids(set.get(ResourceKind::Pod)), vec!["p1", "p2"]);
        assert_eq!(set.kinds().collect::<Vec<_>>(), vec![ResourceKind::Pod]);
    }

    #[test]
    fn summary_reports_counts_and_toggles() {
        let nodes = deployment_tree();
        let edges = resolve_edges(&nodes);
        let set = compute_attachments(&nodes[1], &nodes, &edges);
        let mut expansion = ExpansionState::new();
        assert_eq!(
            set.summarize("rs1", &expansion),
            vec![AttachmentSummary {
                kind: ResourceKind::Pod,
                count: 2,
                expanded: false
            }]
        );
        expansion.expand("rs1", ResourceKind::Pod);
        assert!(set.summarize("rs1", &expansion)[0].expanded);
    }

    #[test]
    fn pod_attaches_direct_references() {
        let nodes = deployment_tree();
        let edges = resolve_edges(&nodes);
        let set = compute_attachments(&nodes[2], &nodes, &edges);
        assert!(set.contains("cm1"));
        assert!(set.contains("sa1"));
        assert!(set.contains("pvc1"));
        assert!(!set.contains("s1"));
    }

    #[test]
    fn pod_references_work_from_supplied_edges_alone() {
        let nodes = vec![
            Resource::new(ResourceKind::Pod, "p", Some("a")).with_id("p1"),
            Resource::new(ResourceKind::Secret, "s", Some("a")).with_id("s1"),
        ];
        let edges = vec![Edge::new("p1", "s1", EdgeType::Uses)];
        let set = compute_attachments(&nodes[0], &nodes, &edges);
        assert_eq!(ids(set.get(ResourceKind::Secret)), vec!["s1"]);
    }

    #[test]
    fn storage_chain_attaches_volume_and_class() {
        let nodes = vec![
            Resource::new(ResourceKind::PersistentVolumeClaim, "data", Some("a"))
                .with_id("pvc")
                .with_spec(ResourceSpec::PersistentVolumeClaim {
                    volume_name: Some("vol".to_string()),
                }),
            Resource::new(ResourceKind::PersistentVolume, "vol", None)
                .with_id("pv")
                .with_spec(ResourceSpec::PersistentVolume {
                    claim_ref: None,
                    storage_class: Some("fast".to_string()),
                }),
            Resource::new(ResourceKind::StorageClass, "fast", None).with_id("sc"),
        ];
        let edges = resolve_edges(&nodes);
        let claim = compute_attachments(&nodes[0], &nodes, &edges);
        assert_eq!(ids(claim.get(ResourceKind::PersistentVolume)), vec!["pv"]);
        let volume = compute_attachments(&nodes[1], &nodes, &edges);
        assert_eq!(ids(volume.get(ResourceKind::StorageClass)), vec!["sc"]);
    }

    #[test]
    fn service_attaches_endpoints() {
        let nodes = vec![
            Resource::new(ResourceKind::Service, "api", Some("a")).with_id("svc"),
            Resource::new(ResourceKind::Endpoints, "api", Some("a")).with_id("ep"),
        ];
        let edges = resolve_edges(&nodes);
        let set = compute_attachments(&nodes[0], &nodes, &edges);
        assert_eq!(ids(set.get(ResourceKind::Endpoints)), vec!["ep"]);
    }

    #[test]
    fn owner_index_uses_priority_for_primary_owner() {
        let nodes = deployment_tree();
        let edges = resolve_edges(&nodes);
        let engine = AttachmentEngine::new(&nodes, &edges);
        let owners = engine.owner_index();
        let cm_owners = ids(owners.owners("cm1"));
        assert!(cm_owners.contains(&"d1".to_string()));
        assert!(cm_owners.contains(&"p1".to_string()));
        assert!(cm_owners.contains(&"p2".to_string()));
        assert_eq!(owners.primary_owner("cm1").unwrap().id, "d1");
        assert_eq!(owners.primary_owner("p1").unwrap().id, "rs1");
        assert!(owners.is_orphan("d1"));
    }
}
