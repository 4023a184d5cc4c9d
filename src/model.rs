use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Ingress,
    Service,
    Endpoints,
    Deployment,
    StatefulSet,
    DaemonSet,
    CronJob,
    ReplicaSet,
    Job,
    Pod,
    ConfigMap,
    Secret,
    ServiceAccount,
    PersistentVolumeClaim,
    PersistentVolume,
    StorageClass,
    HorizontalPodAutoscaler,
    #[serde(other)]
    Other,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 18] = [
        Self::Ingress,
        Self::Service,
        Self::Endpoints,
        Self::Deployment,
        Self::StatefulSet,
        Self::DaemonSet,
        Self::CronJob,
        Self::ReplicaSet,
        Self::Job,
        Self::Pod,
        Self::ConfigMap,
        Self::Secret,
        Self::ServiceAccount,
        Self::PersistentVolumeClaim,
        Self::PersistentVolume,
        Self::StorageClass,
        Self::HorizontalPodAutoscaler,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "Ingress",
            Self::Service => "Service",
            Self::Endpoints => "Endpoints",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::CronJob => "CronJob",
            Self::ReplicaSet => "ReplicaSet",
            Self::Job => "Job",
            Self::Pod => "Pod",
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::ServiceAccount => "ServiceAccount",
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::PersistentVolume => "PersistentVolume",
            Self::StorageClass => "StorageClass",
            Self::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            Self::Other => "Other",
        }
    }

    /// Case-insensitive lookup that also accepts the usual kubectl short names.
    pub fn from_token(token: &str) -> Option<Self> {
        let lower = token.trim().to_ascii_lowercase();
        let kind = match lower.as_str() {
            "ing" => Self::Ingress,
            "svc" => Self::Service,
            "ep" => Self::Endpoints,
            "deploy" => Self::Deployment,
            "sts" => Self::StatefulSet,
            "ds" => Self::DaemonSet,
            "cj" => Self::CronJob,
            "rs" => Self::ReplicaSet,
            "po" => Self::Pod,
            "cm" => Self::ConfigMap,
            "sa" => Self::ServiceAccount,
            "pvc" => Self::PersistentVolumeClaim,
            "pv" => Self::PersistentVolume,
            "sc" => Self::StorageClass,
            "hpa" => Self::HorizontalPodAutoscaler,
            _ => {
                return Self::ALL
                    .into_iter()
                    .find(|kind| kind.as_str().eq_ignore_ascii_case(&lower));
            }
        };
        Some(kind)
    }

    /// Controllers that carry a pod template with config references.
    pub fn is_controller(self) -> bool {
        matches!(self, Self::Deployment | Self::StatefulSet | Self::DaemonSet)
    }

    pub fn is_workload_controller(self) -> bool {
        self.is_controller() || self == Self::CronJob
    }

    pub fn is_ephemeral_controller(self) -> bool {
        matches!(self, Self::ReplicaSet | Self::Job)
    }

    pub fn is_cluster_scoped(self) -> bool {
        matches!(self, Self::PersistentVolume | Self::StorageClass)
    }

    /// Config-like targets whose fan-in is collapsed to a single edge.
    pub fn is_config_like(self) -> bool {
        matches!(self, Self::ConfigMap | Self::Secret | Self::ServiceAccount)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    Running,
    Ready,
    Succeeded,
    Pending,
    NotReady,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ResourceStatus {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "running" => Some(Self::Running),
            "ready" => Some(Self::Ready),
            "succeeded" => Some(Self::Succeeded),
            "pending" => Some(Self::Pending),
            "notready" | "not-ready" => Some(Self::NotReady),
            "failed" => Some(Self::Failed),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn is_problem(self) -> bool {
        matches!(self, Self::Pending | Self::NotReady | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRefs {
    #[serde(default)]
    pub config_maps: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRefs {
    #[serde(default)]
    pub config_maps: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default)]
    pub claims: Vec<String>,
}

/// Kind tag plus the reference fields that exist for that kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResourceSpec {
    Ingress,
    Service,
    Endpoints {
        #[serde(default, rename = "targetPods")]
        target_pods: Vec<String>,
    },
    Deployment(WorkloadRefs),
    StatefulSet(WorkloadRefs),
    DaemonSet(WorkloadRefs),
    CronJob,
    ReplicaSet,
    Job,
    Pod(PodRefs),
    ConfigMap,
    Secret,
    ServiceAccount,
    PersistentVolumeClaim {
        #[serde(default, rename = "volumeName", skip_serializing_if = "Option::is_none")]
        volume_name: Option<String>,
    },
    PersistentVolume {
        #[serde(default, rename = "claimRef", skip_serializing_if = "Option::is_none")]
        claim_ref: Option<ObjectRef>,
        #[serde(default, rename = "storageClass", skip_serializing_if = "Option::is_none")]
        storage_class: Option<String>,
    },
    StorageClass,
    HorizontalPodAutoscaler,
    #[serde(other)]
    Other,
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Ingress => ResourceKind::Ingress,
            Self::Service => ResourceKind::Service,
            Self::Endpoints { .. } => ResourceKind::Endpoints,
            Self::Deployment(_) => ResourceKind::Deployment,
            Self::StatefulSet(_) => ResourceKind::StatefulSet,
            Self::DaemonSet(_) => ResourceKind::DaemonSet,
            Self::CronJob => ResourceKind::CronJob,
            Self::ReplicaSet => ResourceKind::ReplicaSet,
            Self::Job => ResourceKind::Job,
            Self::Pod(_) => ResourceKind::Pod,
            Self::ConfigMap => ResourceKind::ConfigMap,
            Self::Secret => ResourceKind::Secret,
            Self::ServiceAccount => ResourceKind::ServiceAccount,
            Self::PersistentVolumeClaim { .. } => ResourceKind::PersistentVolumeClaim,
            Self::PersistentVolume { .. } => ResourceKind::PersistentVolume,
            Self::StorageClass => ResourceKind::StorageClass,
            Self::HorizontalPodAutoscaler => ResourceKind::HorizontalPodAutoscaler,
            Self::Other => ResourceKind::Other,
        }
    }

    /// Spec for `kind` with every reference field empty.
    pub fn empty(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Ingress => Self::Ingress,
            ResourceKind::Service => Self::Service,
            ResourceKind::Endpoints => Self::Endpoints {
                target_pods: Vec::new(),
            },
            ResourceKind::Deployment => Self::Deployment(WorkloadRefs::default()),
            ResourceKind::StatefulSet => Self::StatefulSet(WorkloadRefs::default()),
            ResourceKind::DaemonSet => Self::DaemonSet(WorkloadRefs::default()),
            ResourceKind::CronJob => Self::CronJob,
            ResourceKind::ReplicaSet => Self::ReplicaSet,
            ResourceKind::Job => Self::Job,
            ResourceKind::Pod => Self::Pod(PodRefs::default()),
            ResourceKind::ConfigMap => Self::ConfigMap,
            ResourceKind::Secret => Self::Secret,
            ResourceKind::ServiceAccount => Self::ServiceAccount,
            ResourceKind::PersistentVolumeClaim => Self::PersistentVolumeClaim { volume_name: None },
            ResourceKind::PersistentVolume => Self::PersistentVolume {
                claim_ref: None,
                storage_class: None,
            },
            ResourceKind::StorageClass => Self::StorageClass,
            ResourceKind::HorizontalPodAutoscaler => Self::HorizontalPodAutoscaler,
            ResourceKind::Other => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<OwnerRef>,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

impl Resource {
    /// Bare resource of `kind` with no references; ids default to `kind/namespace/name`.
    pub fn new(kind: ResourceKind, name: &str, namespace: Option<&str>) -> Self {
        let id = match namespace {
            Some(ns) => format!("{}/{}/{}", kind, ns, name),
            None => format!("{}/{}", kind, name),
        };
        Self {
            id,
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            status: ResourceStatus::Unknown,
            owners: Vec::new(),
            spec: ResourceSpec::empty(kind),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_owner(mut self, kind: ResourceKind, name: &str) -> Self {
        self.owners.push(OwnerRef {
            kind,
            name: name.to_string(),
            uid: None,
        });
        self
    }

    pub fn with_spec(mut self, spec: ResourceSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Owns,
    Selects,
    Backs,
    Ref,
    Mounts,
    Uses,
    Scales,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub relation: EdgeType,
}

impl Edge {
    pub fn new(from: &str, to: &str, relation: EdgeType) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            relation,
        }
    }
}

/// Per-resource set of descendant kinds the user expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpansionState(BTreeMap<String, BTreeSet<ResourceKind>>);

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(&mut self, id: &str, kind: ResourceKind) {
        self.0.entry(id.to_string()).or_default().insert(kind);
    }

    pub fn collapse(&mut self, id: &str, kind: ResourceKind) {
        if let Some(kinds) = self.0.get_mut(id) {
            kinds.remove(&kind);
            if kinds.is_empty() {
                self.0.remove(id);
            }
        }
    }

    /// Flips one entry and reports whether it is now expanded.
    pub fn toggle(&mut self, id: &str, kind: ResourceKind) -> bool {
        if self.is_expanded(id, kind) {
            self.collapse(id, kind);
            false
        } else {
            self.expand(id, kind);
            true
        }
    }

    pub fn is_expanded(&self, id: &str, kind: ResourceKind) -> bool {
        self.0.get(id).is_some_and(|kinds| kinds.contains(&kind))
    }

    /// True when every entry of `other` is also present here.
    pub fn contains(&self, other: &ExpansionState) -> bool {
        other
            .0
            .iter()
            .all(|(id, kinds)| kinds.iter().all(|kind| self.is_expanded(id, *kind)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<ResourceKind>)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    #[serde(default)]
    pub total_nodes: usize,
    #[serde(default)]
    pub total_edges: usize,
    #[serde(default)]
    pub by_kind: BTreeMap<ResourceKind, usize>,
}

/// Snapshot as delivered by the resource provider. When `edges` is present it is used
/// as-is and edge resolution is skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub nodes: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SnapshotStats>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid snapshot JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate resource id `{0}`")]
    DuplicateId(String),
}

impl Snapshot {
    pub fn from_nodes(nodes: Vec<Resource>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn from_json(input: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(input)?;
        let mut seen = BTreeSet::new();
        for node in &snapshot.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(SnapshotError::DuplicateId(node.id.clone()));
            }
        }
        Ok(snapshot)
    }

    /// Provider stats when supplied, otherwise counted from the snapshot itself.
    pub fn stats(&self) -> SnapshotStats {
        if let Some(stats) = &self.stats {
            return stats.clone();
        }
        let mut by_kind = BTreeMap::new();
        for node in &self.nodes {
            *by_kind.entry(node.kind()).or_insert(0) += 1;
        }
        SnapshotStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.as_ref().map(Vec::len).unwrap_or(0),
            by_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_resources() {
        let input = r#"{
            "scope": "demo",
            "nodes": [
                {"id": "d1", "name": "web", "namespace": "demo", "status": "Running",
                 "kind": "Deployment", "configMaps": ["web-config"], "serviceAccount": "web"},
                {"id": "p1", "name": "web-abc", "namespace": "demo", "kind": "Pod",
                 "owners": [{"kind": "ReplicaSet", "name": "web-1"}], "claims": ["data"]},
                {"id": "x1", "name": "thing", "kind": "VolumeSnapshot"}
            ]
        }"#;
        let snapshot = Snapshot::from_json(input).unwrap();
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.nodes[0].kind(), ResourceKind::Deployment);
        match &snapshot.nodes[0].spec {
            ResourceSpec::Deployment(refs) => {
                assert_eq!(refs.config_maps, vec!["web-config".to_string()]);
                assert_eq!(refs.service_account.as_deref(), Some("web"));
            }
            other => panic!("unexpected spec {other:?}"),
        }
        assert_eq!(snapshot.nodes[1].owners[0].kind, ResourceKind::ReplicaSet);
        assert_eq!(snapshot.nodes[1].status, ResourceStatus::Unknown);
        assert_eq!(snapshot.nodes[2].kind(), ResourceKind::Other);
        assert!(snapshot.edges.is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let input = r#"{"nodes": [
            {"id": "a", "name": "a", "kind": "Pod"},
            {"id": "a", "name": "b", "kind": "Pod"}
        ]}"#;
        assert!(matches!(
            Snapshot::from_json(input),
            Err(SnapshotError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_type_serializes_lowercase() {
        let edge = Edge::new("a", "b", EdgeType::Ref);
        let json = serde_json::to_string(&edge).unwrap();
        assert_eq!(json, r#"{"from":"a","to":"b","type":"ref"}"#);
    }

    #[test]
    fn expansion_toggle_and_containment() {
        let mut small = ExpansionState::new();
        assert!(small.toggle("d1", ResourceKind::ReplicaSet));
        let mut large = small.clone();
        large.expand("rs1", ResourceKind::Pod);
        assert!(large.contains(&small));
        assert!(!small.contains(&large));
        assert!(!small.toggle("d1", ResourceKind::ReplicaSet));
        assert!(small.is_empty());
    }

    #[test]
    fn kind_tokens_accept_short_names() {
        assert_eq!(ResourceKind::from_token("pvc"), Some(ResourceKind::PersistentVolumeClaim));
        assert_eq!(ResourceKind::from_token("replicaset"), Some(ResourceKind::ReplicaSet));
        assert_eq!(ResourceKind::from_token("nope"), None);
    }
}
