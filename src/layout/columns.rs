use super::PlanEntry;
use super::solver::SolvedPositions;
use crate::config::LayoutConfig;

/// Left edge of every compacted column: each column starts after the widest node of the
/// previous one plus `lane_gap`.
pub(super) fn column_offsets(entries: &[PlanEntry], column_count: usize, config: &LayoutConfig) -> Vec<f32> {
    let mut widths = vec![0.0f32; column_count];
    for entry in entries {
        let Some(column) = entry.column else {
            continue;
        };
        if let Some(width) = widths.get_mut(column) {
            *width = width.max(entry.width);
        }
    }
    let mut offsets = Vec::with_capacity(column_count);
    let mut x = config.margin;
    for width in widths {
        offsets.push(x);
        x += width + config.lane_gap;
    }
    offsets
}

/// Moves every main-flow node onto its column's x and takes y from the solver.
pub(super) fn snap_columns(
    entries: &mut [PlanEntry],
    positions: &SolvedPositions,
    column_count: usize,
    config: &LayoutConfig,
) {
    let offsets = column_offsets(entries, column_count, config);
    for entry in entries.iter_mut() {
        let Some(x) = entry.column.and_then(|column| offsets.get(column)) else {
            continue;
        };
        entry.x = *x;
        entry.y = positions
            .get(&entry.resource.id)
            .map(|(_, y)| *y)
            .unwrap_or(0.0);
    }
}

/// Per column: keeps the solver's vertical order, pushes nodes apart until consecutive
/// boxes are at least `min_vertical_gap` apart, then restores the column's centroid.
pub(super) fn resolve_vertical_collisions(
    entries: &mut [PlanEntry],
    column_count: usize,
    config: &LayoutConfig,
) {
    for column in 0..column_count {
        let mut members: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.column == Some(column))
            .map(|(idx, _)| idx)
            .collect();
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| {
            entries[*a]
                .y
                .total_cmp(&entries[*b].y)
                .then_with(|| entries[*a].resource.id.cmp(&entries[*b].resource.id))
        });

        let centroid = |entries: &[PlanEntry]| {
            members
                .iter()
                .map(|idx| entries[*idx].y + entries[*idx].height / 2.0)
                .sum::<f32>()
                / members.len() as f32
        };
        let before = centroid(&*entries);

        let mut floor = f32::NEG_INFINITY;
        for idx in &members {
            let entry = &mut entries[*idx];
            if entry.y < floor {
                entry.y = floor;
            }
            floor = entry.y + entry.height + config.min_vertical_gap;
        }

        let shift = before - centroid(&*entries);
        for idx in &members {
            entries[*idx].y += shift;
        }
    }
}
