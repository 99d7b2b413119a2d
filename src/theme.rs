use serde::{Deserialize, Serialize};

use crate::layout::LayoutNodeKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub font_size: f32,
    pub background: String,
    pub line_color: String,
    pub root_color: String,
    pub topic_color: String,
    pub ai_color: String,
    pub cluster_color: String,
    pub node_border_color: String,
    pub manual_border_color: String,
    pub text_color: String,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 12.0,
            background: "#FFFFFF".to_string(),
            line_color: "#7A8AA6".to_string(),
            root_color: "#1C2430".to_string(),
            topic_color: "#4F7CFF".to_string(),
            ai_color: "#A974F2".to_string(),
            cluster_color: "#EEE4FD".to_string(),
            node_border_color: "#C7D2E5".to_string(),
            manual_border_color: "#F2A541".to_string(),
            text_color: "#1C2430".to_string(),
        }
    }

    pub fn dark() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 12.0,
            background: "#0F1218".to_string(),
            line_color: "#3A4458".to_string(),
            root_color: "#E6EAF2".to_string(),
            topic_color: "#5C8BFF".to_string(),
            ai_color: "#B48CF5".to_string(),
            cluster_color: "#2B2140".to_string(),
            node_border_color: "#2A3142".to_string(),
            manual_border_color: "#F2A541".to_string(),
            text_color: "#E6EAF2".to_string(),
        }
    }

    pub fn fill_for(&self, kind: LayoutNodeKind, cluster: bool) -> &str {
        if cluster {
            return &self.cluster_color;
        }
        match kind {
            LayoutNodeKind::Root => &self.root_color,
            LayoutNodeKind::Topic => &self.topic_color,
            LayoutNodeKind::Ai => &self.ai_color,
        }
    }
}
