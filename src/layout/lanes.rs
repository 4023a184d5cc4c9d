use crate::model::ResourceKind;
use serde::Serialize;
use std::collections::BTreeMap;

/// Horizontal position class of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Lane(pub u8);

impl Lane {
    pub const ENTRY: Lane = Lane(0);
    pub const CONTROLLER: Lane = Lane(1);
    pub const EPHEMERAL: Lane = Lane(2);
    pub const WORKLOAD: Lane = Lane(3);
    pub const CLAIM: Lane = Lane(4);
    pub const VOLUME: Lane = Lane(5);
    /// Reserved for attachments placed beside their anchor instead of by the solver.
    pub const SIDE_BAND: Lane = Lane(6);

    pub fn is_main_flow(self) -> bool {
        self <= Self::VOLUME
    }

    /// Lanes preferred when choosing a side-band anchor.
    pub fn is_preferred_anchor(self) -> bool {
        (Self::CONTROLLER..=Self::WORKLOAD).contains(&self)
    }
}

pub fn lane_for(kind: ResourceKind) -> Lane {
    match kind {
        ResourceKind::Ingress | ResourceKind::HorizontalPodAutoscaler => Lane::ENTRY,
        ResourceKind::Service
        | ResourceKind::Deployment
        | ResourceKind::StatefulSet
        | ResourceKind::DaemonSet
        | ResourceKind::CronJob => Lane::CONTROLLER,
        ResourceKind::ReplicaSet | ResourceKind::Job => Lane::EPHEMERAL,
        ResourceKind::Pod => Lane::WORKLOAD,
        ResourceKind::PersistentVolumeClaim => Lane::CLAIM,
        ResourceKind::PersistentVolume => Lane::VOLUME,
        ResourceKind::Endpoints
        | ResourceKind::ConfigMap
        | ResourceKind::Secret
        | ResourceKind::ServiceAccount
        | ResourceKind::StorageClass
        | ResourceKind::Other => Lane::SIDE_BAND,
    }
}

/// Maps the main-flow lanes in use onto `0..K`, keeping their relative order.
pub fn compact_lanes<I>(lanes: I) -> BTreeMap<Lane, usize>
where
    I: IntoIterator<Item = Lane>,
{
    let used: std::collections::BTreeSet<Lane> = lanes
        .into_iter()
        .filter(|lane| lane.is_main_flow())
        .collect();
    used.into_iter()
        .enumerate()
        .map(|(column, lane)| (lane, column))
        .collect()
}
