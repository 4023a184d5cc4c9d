use crate::layout::SolverKind;
use crate::visibility::Filters;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Vertical spacing the solver keeps between nodes of one lane.
    pub node_spacing: f32,
    /// Horizontal spacing the solver keeps between lanes.
    pub rank_spacing: f32,
    /// Gap between snapped lane columns.
    pub lane_gap: f32,
    pub min_vertical_gap: f32,
    pub sideband_offset: f32,
    pub sideband_gap: f32,
    pub orphan_gap: f32,
    pub orphan_columns: usize,
    pub fallback_columns: usize,
    pub fallback_gap_x: f32,
    pub fallback_gap_y: f32,
    pub margin: f32,
    pub node_padding_x: f32,
    pub node_padding_y: f32,
    pub font_size: f32,
    pub label_line_height: f32,
    /// Average glyph advance as a fraction of the font size.
    pub char_width_ratio: f32,
    pub min_node_width: f32,
    pub max_node_width: f32,
    pub max_label_chars: usize,
    pub solver: SolverKind,
    pub solver_timeout_ms: u64,
    pub order_passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_spacing: 40.0,
            rank_spacing: 120.0,
            lane_gap: 120.0,
            min_vertical_gap: 16.0,
            sideband_offset: 24.0,
            sideband_gap: 12.0,
            orphan_gap: 60.0,
            orphan_columns: 6,
            fallback_columns: 4,
            fallback_gap_x: 40.0,
            fallback_gap_y: 30.0,
            margin: 20.0,
            node_padding_x: 16.0,
            node_padding_y: 10.0,
            font_size: 13.0,
            label_line_height: 1.4,
            char_width_ratio: 0.6,
            min_node_width: 120.0,
            max_node_width: 260.0,
            max_label_chars: 32,
            solver: SolverKind::default(),
            solver_timeout_ms: 2_000,
            order_passes: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub layout: LayoutConfig,
    pub filters: Filters,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    node_spacing: Option<f32>,
    rank_spacing: Option<f32>,
    lane_gap: Option<f32>,
    min_vertical_gap: Option<f32>,
    sideband_offset: Option<f32>,
    sideband_gap: Option<f32>,
    orphan_gap: Option<f32>,
    orphan_columns: Option<usize>,
    fallback_columns: Option<usize>,
    fallback_gap_x: Option<f32>,
    fallback_gap_y: Option<f32>,
    margin: Option<f32>,
    solver: Option<SolverKind>,
    solver_timeout_ms: Option<u64>,
    order_passes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LabelConfigFile {
    font_size: Option<f32>,
    line_height: Option<f32>,
    char_width_ratio: Option<f32>,
    padding_x: Option<f32>,
    padding_y: Option<f32>,
    min_width: Option<f32>,
    max_width: Option<f32>,
    max_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    labels: Option<LabelConfigFile>,
    filters: Option<Filters>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parses a JSON or JSON5 document of overrides and merges it onto the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(layout) = parsed.layout {
        if let Some(v) = layout.node_spacing {
            config.layout.node_spacing = v;
        }
        if let Some(v) = layout.rank_spacing {
            config.layout.rank_spacing = v;
        }
        if let Some(v) = layout.lane_gap {
            config.layout.lane_gap = v;
        }
        if let Some(v) = layout.min_vertical_gap {
            config.layout.min_vertical_gap = v;
        }
        if let Some(v) = layout.sideband_offset {
            config.layout.sideband_offset = v;
        }
        if let Some(v) = layout.sideband_gap {
            config.layout.sideband_gap = v;
        }
        if let Some(v) = layout.orphan_gap {
            config.layout.orphan_gap = v;
        }
        if let Some(v) = layout.orphan_columns {
            config.layout.orphan_columns = v.max(1);
        }
        if let Some(v) = layout.fallback_columns {
            config.layout.fallback_columns = v.max(1);
        }
        if let Some(v) = layout.fallback_gap_x {
            config.layout.fallback_gap_x = v;
        }
        if let Some(v) = layout.fallback_gap_y {
            config.layout.fallback_gap_y = v;
        }
        if let Some(v) = layout.margin {
            config.layout.margin = v;
        }
        if let Some(v) = layout.solver {
            config.layout.solver = v;
        }
        if let Some(v) = layout.solver_timeout_ms {
            config.layout.solver_timeout_ms = v;
        }
        if let Some(v) = layout.order_passes {
            config.layout.order_passes = v;
        }
    }

    if let Some(labels) = parsed.labels {
        if let Some(v) = labels.font_size {
            config.layout.font_size = v;
        }
        if let Some(v) = labels.line_height {
            config.layout.label_line_height = v;
        }
        if let Some(v) = labels.char_width_ratio {
            config.layout.char_width_ratio = v;
        }
        if let Some(v) = labels.padding_x {
            config.layout.node_padding_x = v;
        }
        if let Some(v) = labels.padding_y {
            config.layout.node_padding_y = v;
        }
        if let Some(v) = labels.min_width {
            config.layout.min_node_width = v;
        }
        if let Some(v) = labels.max_width {
            config.layout.max_node_width = v;
        }
        if let Some(v) = labels.max_chars {
            config.layout.max_label_chars = v;
        }
    }
    if config.layout.max_node_width < config.layout.min_node_width {
        config.layout.max_node_width = config.layout.min_node_width;
    }

    if let Some(filters) = parsed.filters {
        config.filters = filters;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;

    #[test]
    fn missing_path_yields_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.layout.fallback_columns, 4);
        assert_eq!(config.layout.solver, SolverKind::Layered);
        assert!(config.filters.kinds.is_empty());
    }

    #[test]
    fn overrides_merge_onto_defaults() {
        let config = parse_config(
            r#"{
                // json5 comments are accepted
                layout: { laneGap: 200, solver: "dagre", fallbackColumns: 0 },
                labels: { maxWidth: 50 },
                filters: { kinds: ["Pod"], problemsOnly: true },
            }"#,
        )
        .unwrap();
        assert_eq!(config.layout.lane_gap, 200.0);
        assert_eq!(config.layout.solver, SolverKind::Dagre);
        assert_eq!(config.layout.fallback_columns, 1);
        assert_eq!(config.layout.max_node_width, config.layout.min_node_width);
        assert_eq!(config.layout.rank_spacing, LayoutConfig::default().rank_spacing);
        assert!(config.filters.kinds.contains(&ResourceKind::Pod));
        assert!(config.filters.problems_only);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(parse_config("{ layout: ").is_err());
    }
}
