use super::PlanEntry;
use crate::config::LayoutConfig;
use crate::model::Edge;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Touching edges do not count as overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Placement {
    pub index: usize,
    pub rect: Rect,
    pub anchor: Option<usize>,
}

/// Places every side-band entry against an arena that starts with the main-flow boxes and
/// grows with each placement. Entries are visited in input order.
pub(super) fn place_side_band(
    entries: &[PlanEntry],
    edges: &[Edge],
    config: &LayoutConfig,
) -> Vec<Placement> {
    let by_id: HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| (entry.resource.id.as_str(), idx))
        .collect();
    let mut incoming: HashMap<usize, Vec<usize>> = HashMap::new();
    for edge in edges {
        let (Some(from), Some(to)) = (by_id.get(edge.from.as_str()), by_id.get(edge.to.as_str()))
        else {
            continue;
        };
        incoming.entry(*to).or_default().push(*from);
    }

    let mut arena: Vec<Rect> = entries
        .iter()
        .filter(|entry| entry.column.is_some())
        .map(PlanEntry::rect)
        .collect();
    let main_left = arena.iter().map(|rect| rect.x).fold(f32::INFINITY, f32::min);

    let mut placements = Vec::new();
    let mut stack_tops: HashMap<usize, f32> = HashMap::new();
    let mut orphans = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        if entry.column.is_some() {
            continue;
        }
        let Some(anchor) = find_anchor(idx, &incoming, entries) else {
            orphans.push(idx);
            continue;
        };
        let base = &entries[anchor];
        let mut rect = Rect {
            x: base.x + base.width + config.sideband_offset,
            y: stack_tops.get(&anchor).copied().unwrap_or(base.y),
            width: entry.width,
            height: entry.height,
        };
        nudge_clear(&mut rect, &arena, config.sideband_gap);
        stack_tops.insert(anchor, rect.bottom() + config.sideband_gap);
        arena.push(rect);
        placements.push(Placement {
            index: idx,
            rect,
            anchor: Some(anchor),
        });
    }

    if !orphans.is_empty() {
        let top = arena
            .iter()
            .map(Rect::bottom)
            .fold(f32::NEG_INFINITY, f32::max);
        let top = if top.is_finite() {
            top + config.orphan_gap
        } else {
            config.margin
        };
        let left = if main_left.is_finite() {
            main_left
        } else {
            config.margin
        };
        let columns = config.orphan_columns.max(1);
        let cell_width = orphans
            .iter()
            .map(|idx| entries[*idx].width)
            .fold(0.0f32, f32::max)
            + config.sideband_gap;
        let cell_height = orphans
            .iter()
            .map(|idx| entries[*idx].height)
            .fold(0.0f32, f32::max)
            + config.sideband_gap;
        for (slot, idx) in orphans.into_iter().enumerate() {
            let entry = &entries[idx];
            placements.push(Placement {
                index: idx,
                rect: Rect {
                    x: left + (slot % columns) as f32 * cell_width,
                    y: top + (slot / columns) as f32 * cell_height,
                    width: entry.width,
                    height: entry.height,
                },
                anchor: None,
            });
        }
    }
    placements
}

/// Walks incoming edges backwards, through other side-band nodes, until main-flow nodes are
/// reached. Anchors in the controller, ephemeral and workload lanes win over the others.
fn find_anchor(
    start: usize,
    incoming: &HashMap<usize, Vec<usize>>,
    entries: &[PlanEntry],
) -> Option<usize> {
    let mut queue = VecDeque::from([start]);
    let mut seen = HashSet::from([start]);
    let mut candidates = Vec::new();
    while let Some(current) = queue.pop_front() {
        let Some(sources) = incoming.get(&current) else {
            continue;
        };
        for source in sources {
            if !seen.insert(*source) {
                continue;
            }
            if entries[*source].column.is_some() {
                candidates.push(*source);
            } else {
                queue.push_back(*source);
            }
        }
    }
    candidates
        .iter()
        .copied()
        .find(|idx| entries[*idx].lane.is_preferred_anchor())
        .or_else(|| candidates.first().copied())
}

fn nudge_clear(rect: &mut Rect, arena: &[Rect], gap: f32) {
    loop {
        let blocking = arena
            .iter()
            .filter(|placed| placed.overlaps(rect))
            .map(Rect::bottom)
            .fold(None, |acc: Option<f32>, bottom| {
                Some(acc.map_or(bottom, |current| current.max(bottom)))
            });
        match blocking {
            Some(bottom) => rect.y = bottom + gap,
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::lanes::{Lane, lane_for};
    use crate::model::{EdgeType, Resource, ResourceKind};

    fn entry(id: &str, kind: ResourceKind, column: Option<usize>, x: f32, y: f32) -> PlanEntry {
        PlanEntry {
            resource: Resource::new(kind, id, Some("ns")).with_id(id),
            lane: lane_for(kind),
            column,
            width: 100.0,
            height: 40.0,
            x,
            y,
        }
    }

    #[test]
    fn attachments_stack_right_of_their_anchor() {
        let config = LayoutConfig::default();
        let entries = vec![
            entry("d1", ResourceKind::Deployment, Some(0), 0.0, 0.0),
            entry("cm1", ResourceKind::ConfigMap, None, 0.0, 0.0),
            entry("s1", ResourceKind::Secret, None, 0.0, 0.0),
        ];
        let edges = vec![
            Edge::new("d1", "cm1", EdgeType::Uses),
            Edge::new("d1", "s1", EdgeType::Uses),
        ];
        let placements = place_side_band(&entries, &edges, &config);
        assert_eq!(placements.len(), 2);
        let cm = &placements[0];
        let secret = &placements[1];
        assert_eq!(cm.anchor, Some(0));
        assert_eq!(cm.rect.x, 100.0 + config.sideband_offset);
        assert_eq!(cm.rect.y, 0.0);
        assert_eq!(secret.rect.x, cm.rect.x);
        assert!(secret.rect.y >= cm.rect.bottom() + config.sideband_gap - 1e-3);
        assert!(!cm.rect.overlaps(&secret.rect));
    }

    #[test]
    fn preferred_lanes_win_the_anchor() {
        let entries = vec![
            entry("pv", ResourceKind::PersistentVolume, Some(2), 400.0, 0.0),
            entry("p1", ResourceKind::Pod, Some(1), 200.0, 0.0),
            entry("cm1", ResourceKind::ConfigMap, None, 0.0, 0.0),
        ];
        let edges = vec![
            Edge::new("pv", "cm1", EdgeType::Ref),
            Edge::new("p1", "cm1", EdgeType::Uses),
        ];
        let mut incoming = HashMap::new();
        incoming.insert(2usize, vec![0usize, 1]);
        assert_eq!(find_anchor(2, &incoming, &entries), Some(1));
        assert_eq!(entries[1].lane, Lane::WORKLOAD);
        let placements = place_side_band(&entries, &edges, &LayoutConfig::default());
        assert_eq!(placements[0].anchor, Some(1));
    }

    #[test]
    fn anchors_are_found_through_side_band_chains() {
        let entries = vec![
            entry("svc", ResourceKind::Service, Some(0), 0.0, 0.0),
            entry("ep", ResourceKind::Endpoints, None, 0.0, 0.0),
            entry("other", ResourceKind::Other, None, 0.0, 0.0),
        ];
        let edges = vec![
            Edge::new("svc", "ep", EdgeType::Selects),
            Edge::new("ep", "other", EdgeType::Ref),
        ];
        let placements = place_side_band(&entries, &edges, &LayoutConfig::default());
        assert!(placements.iter().all(|p| p.anchor == Some(0)));
    }

    #[test]
    fn placements_are_nudged_below_blocking_boxes() {
        let config = LayoutConfig {
            sideband_offset: 10.0,
            ..LayoutConfig::default()
        };
        let entries = vec![
            entry("d1", ResourceKind::Deployment, Some(0), 0.0, 0.0),
            // Sits exactly where d1's first attachment would go.
            entry("p1", ResourceKind::Pod, Some(1), 110.0, 0.0),
            entry("cm1", ResourceKind::ConfigMap, None, 0.0, 0.0),
        ];
        let edges = vec![Edge::new("d1", "cm1", EdgeType::Uses)];
        let placements = place_side_band(&entries, &edges, &config);
        assert_eq!(placements[0].rect.y, 40.0 + config.sideband_gap);
    }

    #[test]
    fn anchorless_attachments_go_below_the_layout() {
        let config = LayoutConfig {
            orphan_columns: 2,
            ..LayoutConfig::default()
        };
        let entries = vec![
            entry("d1", ResourceKind::Deployment, Some(0), 20.0, 0.0),
            entry("a", ResourceKind::ConfigMap, None, 0.0, 0.0),
            entry("b", ResourceKind::ConfigMap, None, 0.0, 0.0),
            entry("c", ResourceKind::ConfigMap, None, 0.0, 0.0),
        ];
        let placements = place_side_band(&entries, &[], &config);
        assert_eq!(placements.len(), 3);
        let top = 40.0 + config.orphan_gap;
        assert_eq!(placements[0].rect.y, top);
        assert_eq!(placements[1].rect.y, top);
        assert!(placements[2].rect.y > top);
        assert_eq!(placements[0].rect.x, 20.0);
        assert_eq!(placements[2].rect.x, 20.0);
        assert!(placements.iter().all(|p| p.anchor.is_none()));
    }
}
