use crate::graph::ConversationGraph;
use crate::layout::{LayoutNodeKind, ResolvedView, TreeLayout};
use crate::model::NodeKey;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDump {
    pub root: Option<String>,
    pub width: f32,
    pub height: f32,
    pub cache_version: u64,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDump {
    pub id: String,
    pub title: Option<String>,
    pub kind: LayoutNodeKind,
    pub depth: usize,
    /// Cached polar angle in radians; absent for nodes not cached yet.
    pub angle: Option<f64>,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub manual: bool,
    pub cluster_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub points: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_view(view: &ResolvedView, tree: Option<&TreeLayout>, graph: &ConversationGraph) -> Self {
        let nodes = view
            .nodes
            .iter()
            .map(|node| NodeDump {
                id: node.key.to_string(),
                title: match node.key {
                    NodeKey::Conversation(id) => graph.conversation(id).map(|c| c.title.clone()),
                    NodeKey::Cluster(_) => None,
                },
                kind: node.kind,
                depth: node.depth,
                angle: tree.and_then(|t| t.nodes.get(&node.key)).map(|cached| cached.angle),
                x: node.x,
                y: node.y,
                radius: node.radius,
                manual: node.manual,
                cluster_count: node.cluster_count,
            })
            .collect();

        let edges = view
            .edges
            .iter()
            .map(|edge| EdgeDump {
                from: edge.source.to_string(),
                to: edge.target.to_string(),
                points: vec![[edge.start.0, edge.start.1], [edge.end.0, edge.end.1]],
            })
            .collect();

        LayoutDump {
            root: view.root.map(|id| id.to_string()),
            width: view.width,
            height: view.height,
            cache_version: tree.map_or(0, |t| t.version),
            nodes,
            edges,
        }
    }
}

pub fn write_layout_dump(
    path: &Path,
    view: &ResolvedView,
    tree: Option<&TreeLayout>,
    graph: &ConversationGraph,
) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_view(view, tree, graph);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
