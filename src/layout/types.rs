use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ConversationId, NodeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutNodeKind {
    Root,
    Topic,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedNode {
    pub depth: usize,
    pub angle: f64,
    pub parent_id: Option<NodeKey>,
    pub kind: LayoutNodeKind,
    pub created_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeLayout {
    pub version: u64,
    pub nodes: BTreeMap<NodeKey, CachedNode>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Full,
    Mini,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
    pub key: NodeKey,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub depth: usize,
    pub kind: LayoutNodeKind,
    pub cluster_count: Option<usize>,
    pub manual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEdge {
    pub source: NodeKey,
    pub target: NodeKey,
    pub start: (f32, f32),
    pub end: (f32, f32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedView {
    pub root: Option<ConversationId>,
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<ResolvedNode>,
    pub edges: Vec<ResolvedEdge>,
}

impl ResolvedView {
    pub fn empty(viewport: Viewport) -> Self {
        Self {
            root: None,
            width: viewport.width,
            height: viewport.height,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, key: NodeKey) -> Option<&ResolvedNode> {
        self.nodes.iter().find(|node| node.key == key)
    }

    /// Topmost node whose visual circle contains the point.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<NodeKey> {
        self.nodes
            .iter()
            .rev()
            .find(|node| {
                let dx = node.x - x;
                let dy = node.y - y;
                dx * dx + dy * dy <= node.radius * node.radius
            })
            .map(|node| node.key)
    }
}
