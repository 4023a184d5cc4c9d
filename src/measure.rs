//! Node sizing from labels.
//!
//! Widths are estimated from per-glyph advance classes rather than real font metrics, so a
//! layout is the same on every machine.

use crate::config::LayoutConfig;
use crate::model::Resource;

#[derive(Debug, Clone, PartialEq)]
pub struct LabelBlock {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
}

/// Two label lines: the (possibly truncated) name and the kind.
pub fn label_lines(resource: &Resource, config: &LayoutConfig) -> Vec<String> {
    vec![
        truncate(&resource.name, config.max_label_chars),
        resource.kind().as_str().to_string(),
    ]
}

pub fn measure_label(lines: Vec<String>, config: &LayoutConfig) -> LabelBlock {
    let width = lines
        .iter()
        .map(|line| text_width(line, config))
        .fold(0.0, f32::max);
    let height = lines.len().max(1) as f32 * config.font_size * config.label_line_height;
    LabelBlock {
        lines,
        width,
        height,
    }
}

/// Box size for a resource: label plus padding, clamped to the configured width range.
pub fn node_size(resource: &Resource, config: &LayoutConfig) -> (f32, f32) {
    let label = measure_label(label_lines(resource, config), config);
    let width = (label.width + config.node_padding_x * 2.0)
        .clamp(config.min_node_width, config.max_node_width.max(config.min_node_width));
    let height = label.height + config.node_padding_y * 2.0;
    (width, height)
}

pub fn text_width(text: &str, config: &LayoutConfig) -> f32 {
    text.chars()
        .map(|ch| char_width_factor(ch, config.char_width_ratio))
        .sum::<f32>()
        * config.font_size
}

fn char_width_factor(ch: char, average: f32) -> f32 {
    match ch {
        'i' | 'j' | 'l' | 'I' | '.' | ',' | ':' | ';' | '|' | '!' | '\'' => 0.27,
        'f' | 't' | 'r' | ' ' | '(' | ')' | '[' | ']' | '-' | '/' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' => 0.9,
        'A'..='Z' => 0.68,
        '0'..='9' => 0.6,
        _ => average,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;

    #[test]
    fn long_names_are_truncated() {
        let config = LayoutConfig {
            max_label_chars: 8,
            ..LayoutConfig::default()
        };
        let resource = Resource::new(ResourceKind::Pod, "checkout-7d9f8b6c5-x2x9q", Some("shop"));
        let lines = label_lines(&resource, &config);
        assert_eq!(lines[0], "checkou…");
        assert_eq!(lines[0].chars().count(), 8);
        assert_eq!(lines[1], "Pod");
    }

    #[test]
    fn sizes_are_clamped() {
        let config = LayoutConfig::default();
        let short = Resource::new(ResourceKind::Pod, "a", Some("ns"));
        let (width, height) = node_size(&short, &config);
        assert_eq!(width, config.min_node_width);
        assert!(height > 2.0 * config.font_size);

        let long = Resource::new(ResourceKind::Pod, &"w".repeat(200), Some("ns"));
        assert_eq!(node_size(&long, &config).0, config.max_node_width);
    }

    #[test]
    fn wide_glyphs_measure_wider() {
        let config = LayoutConfig::default();
        assert!(text_width("mmmm", &config) > text_width("iiii", &config));
    }
}
