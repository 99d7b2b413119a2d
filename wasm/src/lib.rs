use serde::Deserialize;
use threadmap::config::Config;
use threadmap::graph::ConversationGraph;
use threadmap::layout::{LayoutCache, RenderMode, Viewport, compute_view};
use threadmap::model::{ConversationId, ForestSnapshot};
use threadmap::positions::ManualPositions;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForestLayoutOptions {
    root: Option<u64>,
    focused_parent: Option<u64>,
    width: Option<f32>,
    height: Option<f32>,
    mini: Option<bool>,
    manual_positions: Option<ManualPositions>,
}

fn layout_json(
    cache: &mut LayoutCache,
    config: &Config,
    snapshot: ForestSnapshot,
    options: ForestLayoutOptions,
) -> Result<String, serde_json::Error> {
    let graph = ConversationGraph::from_snapshot(snapshot);
    let Some(root) = options
        .root
        .map(|id| graph.root_of(ConversationId(id)))
        .or_else(|| graph.roots().last().copied())
    else {
        return Ok("null".to_string());
    };
    let viewport = Viewport::new(
        options.width.unwrap_or(config.render.width),
        options.height.unwrap_or(config.render.height),
    );
    let mode = if options.mini.unwrap_or(false) {
        RenderMode::Mini
    } else {
        RenderMode::Full
    };
    let view = compute_view(
        &graph,
        root,
        options.focused_parent.map(ConversationId),
        cache,
        &options.manual_positions.unwrap_or_default(),
        viewport,
        mode,
        &config.layout,
    );
    serde_json::to_string(&view)
}

fn parse_inputs(
    snapshot_json: &str,
    options_json: Option<String>,
) -> Result<(ForestSnapshot, ForestLayoutOptions), JsValue> {
    let snapshot: ForestSnapshot =
        serde_json::from_str(snapshot_json).map_err(|error| JsValue::from_str(&error.to_string()))?;
    let options = if let Some(raw_options) = options_json {
        serde_json::from_str::<ForestLayoutOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?
    } else {
        ForestLayoutOptions::default()
    };
    Ok((snapshot, options))
}

/// Layout state kept across calls so node angles stay put while the
/// forest grows. A browser front end holds one of these per page.
#[wasm_bindgen]
pub struct ForestLayout {
    cache: LayoutCache,
    config: Config,
}

impl Default for ForestLayout {
    fn default() -> Self {
        let config = Config::default();
        Self {
            cache: LayoutCache::new(config.layout.ring_phase_step),
            config,
        }
    }
}

impl ForestLayout {
    fn layout_snapshot(
        &mut self,
        snapshot: ForestSnapshot,
        options: ForestLayoutOptions,
    ) -> Result<String, serde_json::Error> {
        layout_json(&mut self.cache, &self.config, snapshot, options)
    }
}

#[wasm_bindgen]
impl ForestLayout {
    #[wasm_bindgen(constructor)]
    pub fn new() -> ForestLayout {
        ForestLayout::default()
    }

    /// Resolved view JSON for one tree of the snapshot.
    pub fn layout(&mut self, snapshot_json: &str, options_json: Option<String>) -> Result<String, JsValue> {
        let (snapshot, options) = parse_inputs(snapshot_json, options_json)?;
        self.layout_snapshot(snapshot, options)
            .map_err(|error| JsValue::from_str(&error.to_string()))
    }

    /// Forgets the cached angles of the tree rooted at `root`.
    #[wasm_bindgen(js_name = clearTree)]
    pub fn clear_tree(&mut self, root: u64) -> bool {
        self.cache.clear(ConversationId(root))
    }
}

/// One-shot layout from an empty cache. Use [`ForestLayout`] when the same
/// forest is laid out repeatedly.
#[wasm_bindgen]
pub fn layout_forest(snapshot_json: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let (snapshot, options) = parse_inputs(snapshot_json, options_json)?;
    ForestLayout::default()
        .layout_snapshot(snapshot, options)
        .map_err(|error| JsValue::from_str(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::{ForestLayout, ForestLayoutOptions};
    use threadmap::model::ForestSnapshot;

    fn star(children: &[u64]) -> ForestSnapshot {
        let mut conversations = vec![serde_json::json!({"id": 1, "title": "root"})];
        let mut edges = Vec::new();
        for id in children {
            conversations.push(serde_json::json!({"id": id, "title": format!("topic {id}"), "fromConversationId": 1}));
            edges.push(serde_json::json!({"conversationId": id, "fromConversationId": 1}));
        }
        serde_json::from_value(serde_json::json!({"conversations": conversations, "edges": edges}))
            .expect("snapshot should parse")
    }

    fn square() -> ForestLayoutOptions {
        serde_json::from_str(r#"{"width": 800, "height": 800}"#).expect("options should parse")
    }

    fn position(view: &serde_json::Value, id: &str) -> (f64, f64) {
        let node = view["nodes"]
            .as_array()
            .expect("nodes array")
            .iter()
            .find(|node| node["key"] == id)
            .expect("node present");
        (
            node["x"].as_f64().expect("x"),
            node["y"].as_f64().expect("y"),
        )
    }

    #[test]
    fn lays_out_snapshot_with_manual_override() {
        let snapshot: ForestSnapshot = serde_json::from_str(
            r#"{
                "conversations": [
                    {"id": 1, "title": "root"},
                    {"id": 2, "title": "split", "fromConversationId": 1}
                ],
                "edges": [{"conversationId": 2, "fromConversationId": 1}]
            }"#,
        )
        .expect("snapshot should parse");
        let options: ForestLayoutOptions = serde_json::from_str(
            r#"{"root": 2, "width": 400, "height": 200, "manualPositions": {"1": {"2": {"nx": 0.25, "ny": 0.5}}}}"#,
        )
        .expect("options should parse");

        let json = ForestLayout::new()
            .layout_snapshot(snapshot, options)
            .expect("view should serialize");
        let view: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(view["root"], 1);
        assert_eq!(view["nodes"][0]["x"], 200.0);
        assert_eq!(view["nodes"][1]["x"], 100.0);
        assert_eq!(view["nodes"][1]["manual"], true);
    }

    #[test]
    fn positions_hold_while_the_tree_grows() {
        let mut layout = ForestLayout::new();
        let first = layout
            .layout_snapshot(star(&[2, 3]), square())
            .expect("view should serialize");
        let grown = layout
            .layout_snapshot(star(&[2, 3, 4]), square())
            .expect("view should serialize");
        let first: serde_json::Value = serde_json::from_str(&first).expect("valid json");
        let grown: serde_json::Value = serde_json::from_str(&grown).expect("valid json");

        assert_eq!(grown["nodes"].as_array().map(Vec::len), Some(4));
        for id in ["1", "2", "3"] {
            let (x0, y0) = position(&first, id);
            let (x1, y1) = position(&grown, id);
            assert!((x0 - x1).abs() < 1e-3 && (y0 - y1).abs() < 1e-3, "{id} moved");
        }

        assert!(layout.clear_tree(1));
        assert!(!layout.clear_tree(1));
    }
}
