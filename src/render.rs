use crate::graph::ConversationGraph;
use crate::layout::{ResolvedNode, ResolvedView};
use crate::model::NodeKey;
use crate::theme::Theme;
use anyhow::Result;
use std::path::Path;

#[cfg(feature = "png")]
use crate::config::RenderConfig;

const LABEL_MAX_CHARS: usize = 28;

/// Draws edges first so node circles sit on top of the clipped segments.
pub fn render_svg(view: &ResolvedView, graph: &ConversationGraph, theme: &Theme) -> String {
    let mut svg = String::new();
    let width = view.width.max(1.0);
    let height = view.height.max(1.0);

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));
    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        theme.background
    ));

    for edge in &view.edges {
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"1.4\" stroke-linecap=\"round\"/>",
            edge.start.0, edge.start.1, edge.end.0, edge.end.1, theme.line_color
        ));
    }

    for node in &view.nodes {
        svg.push_str(&node_svg(node, graph, theme));
    }

    svg.push_str("</svg>");
    svg
}

fn node_svg(node: &ResolvedNode, graph: &ConversationGraph, theme: &Theme) -> String {
    let mut out = String::new();
    let cluster = node.key.is_cluster();
    let (stroke, stroke_width) = if node.manual {
        (&theme.manual_border_color, 2.4)
    } else {
        (&theme.node_border_color, 1.4)
    };
    out.push_str(&format!(
        "<circle data-node=\"{}\" cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{}\"/>",
        node.key,
        node.x,
        node.y,
        node.radius,
        theme.fill_for(node.kind, cluster),
        stroke,
        stroke_width
    ));

    if let Some(count) = node.cluster_count {
        out.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" font-weight=\"600\" fill=\"{}\">+{count}</text>",
            node.x, node.y, theme.font_family, theme.font_size, theme.text_color
        ));
    }

    let label = match node.key {
        NodeKey::Conversation(id) => graph.conversation(id).map(|c| truncate_label(&c.title, LABEL_MAX_CHARS)),
        NodeKey::Cluster(_) => None,
    };
    if let Some(label) = label {
        let y = node.y + node.radius + theme.font_size + 2.0;
        out.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{y:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
            node.x,
            theme.font_family,
            theme.font_size,
            theme.text_color,
            escape_xml(&label)
        ));
    }
    out
}

fn truncate_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", head.trim_end())
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = "Inter".to_string();
    opt.fontdb_mut().load_system_fonts();
    if let Some(size) = usvg::Size::from_wh(render_cfg.width, render_cfg.height) {
        opt.default_size = size;
    }

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
