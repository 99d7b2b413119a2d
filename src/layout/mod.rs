mod cache;
mod resolve;
pub(crate) mod types;
pub use cache::*;
pub use resolve::*;
pub use types::*;

use crate::config::LayoutConfig;
use crate::graph::{ConversationGraph, Subtree, SubtreeNode, SubtreeNodeKind};
use crate::model::{ConversationId, NodeKey};
use crate::positions::ManualPositions;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Radians each successive ring is rotated by, so rings do not line up.
pub const DEFAULT_RING_PHASE_STEP: f64 = 0.35;

/// One full layout pass for the tree rooted at `root`: extract the subtree,
/// fold it into the cache, then project it onto the viewport.
#[allow(clippy::too_many_arguments)]
pub fn compute_view(
    graph: &ConversationGraph,
    root: ConversationId,
    focused_parent: Option<ConversationId>,
    cache: &mut LayoutCache,
    manual: &ManualPositions,
    viewport: Viewport,
    mode: RenderMode,
    config: &LayoutConfig,
) -> ResolvedView {
    let subtree = graph.subtree(root, focused_parent);
    cache.update(&subtree);
    resolve_view(&subtree, cache.tree(root), manual, viewport, mode, config)
}
