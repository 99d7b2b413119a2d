use super::*;

fn node_radius(kind: LayoutNodeKind, key: NodeKey, mode: RenderMode, config: &LayoutConfig) -> f32 {
    let base = if key.is_cluster() {
        config.cluster_node_radius
    } else {
        match kind {
            LayoutNodeKind::Root => config.root_node_radius,
            LayoutNodeKind::Topic => config.topic_node_radius,
            LayoutNodeKind::Ai => config.ai_node_radius,
        }
    };
    match mode {
        RenderMode::Full => base,
        RenderMode::Mini => base * config.mini_scale,
    }
}

/// Ring radius for `depth` given the deepest ring present.
pub fn ring_radius(depth: usize, max_depth: usize, viewport: Viewport, mode: RenderMode, config: &LayoutConfig) -> f32 {
    if depth == 0 || max_depth == 0 {
        return 0.0;
    }
    let padding = match mode {
        RenderMode::Full => config.padding,
        RenderMode::Mini => config.mini_padding,
    };
    let max_radius = (viewport.width.min(viewport.height) / 2.0 - padding).max(0.0);
    let ring_gap = max_radius / max_depth as f32;
    config.min_radius.max(depth as f32 * ring_gap)
}

/// Projects the cached polar layout of `subtree` onto `viewport`.
///
/// Manual positions replace the computed point outright, and edges are
/// clipped against the same placed points, so a dragged node never detaches
/// from its lines. Nodes missing from the cache are skipped for this frame.
pub fn resolve_view(
    subtree: &Subtree,
    tree: Option<&TreeLayout>,
    manual: &ManualPositions,
    viewport: Viewport,
    mode: RenderMode,
    config: &LayoutConfig,
) -> ResolvedView {
    let (Some(root), Some(tree)) = (subtree.root, tree) else {
        return ResolvedView::empty(viewport);
    };

    let cached: Vec<(&SubtreeNode, &CachedNode)> = subtree
        .nodes
        .iter()
        .filter_map(|node| match tree.nodes.get(&node.key) {
            Some(entry) => Some((node, entry)),
            None => {
                trace!(node = %node.key, "not cached yet, skipped");
                None
            }
        })
        .collect();
    let max_depth = cached.iter().map(|(node, _)| node.depth).max().unwrap_or(0);
    let (cx, cy) = viewport.center();

    let mut nodes = Vec::with_capacity(cached.len());
    for (node, entry) in cached {
        let (x, y, is_manual) = match manual.get(root, node.key) {
            Some(point) => (point.nx * viewport.width, point.ny * viewport.height, true),
            None if node.depth == 0 => (cx, cy, false),
            None => {
                let r = ring_radius(node.depth, max_depth, viewport, mode, config);
                let angle = entry.angle as f32;
                (cx + r * angle.cos(), cy + r * angle.sin(), false)
            }
        };
        let cluster_count = match &node.kind {
            SubtreeNodeKind::Cluster { count, .. } => Some(*count),
            _ => None,
        };
        nodes.push(ResolvedNode {
            key: node.key,
            x,
            y,
            radius: node_radius(entry.kind, node.key, mode, config),
            depth: node.depth,
            kind: entry.kind,
            cluster_count,
            manual: is_manual,
        });
    }

    let placed: HashMap<NodeKey, (f32, f32, f32)> = nodes
        .iter()
        .map(|node| (node.key, (node.x, node.y, node.radius)))
        .collect();
    let edges = subtree
        .links
        .iter()
        .filter_map(|link| {
            let source = placed.get(&link.source)?;
            let target = placed.get(&link.target)?;
            let (start, end) = clip_segment(*source, *target)?;
            Some(ResolvedEdge {
                source: link.source,
                target: link.target,
                start,
                end,
            })
        })
        .collect();

    ResolvedView {
        root: Some(root),
        width: viewport.width,
        height: viewport.height,
        nodes,
        edges,
    }
}

/// Segment between two circles, trimmed to their boundaries. `None` when
/// the circles touch or overlap.
pub fn clip_segment(
    source: (f32, f32, f32),
    target: (f32, f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    let (x1, y1, r1) = source;
    let (x2, y2, r2) = target;
    let dx = x2 - x1;
    let dy = y2 - y1;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist <= r1 + r2 {
        return None;
    }
    let ux = dx / dist;
    let uy = dy / dist;
    Some(((x1 + ux * r1, y1 + uy * r1), (x2 - ux * r2, y2 - uy * r2)))
}
