use super::*;

use std::f64::consts::TAU;

const ANGLE_EPSILON: f64 = 1e-9;
/// Minimum separation between siblings on a ring, as a fraction of the
/// ring's even angle step.
const MIN_SEPARATION_RATIO: f64 = 0.5;

fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU - ANGLE_EPSILON { 0.0 } else { wrapped }
}

fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(TAU);
    diff.min(TAU - diff)
}

fn layout_kind(node: &SubtreeNode) -> LayoutNodeKind {
    match node.kind {
        SubtreeNodeKind::Root => LayoutNodeKind::Root,
        SubtreeNodeKind::Real { ai_generated: false } => LayoutNodeKind::Topic,
        SubtreeNodeKind::Real { ai_generated: true } | SubtreeNodeKind::Cluster { .. } => {
            LayoutNodeKind::Ai
        }
    }
}

/// Per-root arena of stable polar coordinates.
///
/// Angles are assigned once per node and reused on every later pass; nodes
/// that drop out of a tree keep their entry so they land in the same spot if
/// they come back. An arena only goes away through [`LayoutCache::clear`].
#[derive(Debug, Clone)]
pub struct LayoutCache {
    trees: HashMap<ConversationId, TreeLayout>,
    ring_phase_step: f64,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(DEFAULT_RING_PHASE_STEP)
    }
}

impl LayoutCache {
    pub fn new(ring_phase_step: f64) -> Self {
        Self {
            trees: HashMap::new(),
            ring_phase_step,
        }
    }

    pub fn tree(&self, root: ConversationId) -> Option<&TreeLayout> {
        self.trees.get(&root)
    }

    pub fn roots(&self) -> impl Iterator<Item = ConversationId> + '_ {
        self.trees.keys().copied()
    }

    pub fn clear(&mut self, root: ConversationId) -> bool {
        self.trees.remove(&root).is_some()
    }

    /// Folds `subtree` into the arena of its root. Returns whether anything
    /// changed; the tree version only moves when it did.
    pub fn update(&mut self, subtree: &Subtree) -> bool {
        let Some(root) = subtree.root else {
            return false;
        };
        if subtree.nodes.is_empty() {
            return false;
        }
        let tree = self.trees.entry(root).or_default();
        let pass = tree.version + 1;
        let mut changed = false;

        let mut ring_sizes: BTreeMap<usize, usize> = BTreeMap::new();
        for node in &subtree.nodes {
            *ring_sizes.entry(node.depth).or_default() += 1;
        }

        let mut used: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        let mut fresh: Vec<&SubtreeNode> = Vec::new();
        for node in &subtree.nodes {
            let kind = layout_kind(node);
            match tree.nodes.get_mut(&node.key) {
                Some(cached) => {
                    if cached.depth != node.depth
                        || cached.parent_id != node.parent
                        || cached.kind != kind
                    {
                        cached.depth = node.depth;
                        cached.parent_id = node.parent;
                        cached.kind = kind;
                        changed = true;
                    }
                    if node.depth > 0 {
                        used.entry(node.depth).or_default().push(cached.angle);
                    }
                }
                None => fresh.push(node),
            }
        }

        for node in fresh {
            let angle = if node.depth == 0 {
                0.0
            } else {
                let ring = used.entry(node.depth).or_default();
                let siblings = ring_sizes.get(&node.depth).copied().unwrap_or(1);
                let angle = free_slot(ring, siblings, node.depth, self.ring_phase_step);
                ring.push(angle);
                angle
            };
            trace!(root = %root, node = %node.key, depth = node.depth, angle, "assigned angle");
            tree.nodes.insert(
                node.key,
                CachedNode {
                    depth: node.depth,
                    angle,
                    parent_id: node.parent,
                    kind: layout_kind(node),
                    created_at: pass,
                },
            );
            changed = true;
        }

        if changed {
            tree.version = pass;
            debug!(root = %root, version = pass, nodes = tree.nodes.len(), "layout cache updated");
        }
        changed
    }
}

/// First evenly spaced slot (then half-slot) on the ring that keeps clear of
/// every angle already in use; the next sequential slot when none does.
fn free_slot(used: &[f64], siblings: usize, depth: usize, phase_step: f64) -> f64 {
    let siblings = siblings.max(1);
    let step = TAU / siblings as f64;
    let phase = phase_step * depth as f64;
    let min_gap = step * MIN_SEPARATION_RATIO - ANGLE_EPSILON;

    let probes = (0..siblings)
        .map(|slot| slot as f64)
        .chain((0..siblings).map(|slot| slot as f64 + 0.5));
    for slot in probes {
        let candidate = normalize_angle(phase + slot * step);
        if used
            .iter()
            .all(|angle| angular_distance(*angle, candidate) >= min_gap)
        {
            return candidate;
        }
    }
    normalize_angle(phase + used.len() as f64 * step)
}
