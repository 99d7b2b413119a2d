use crate::chat::ModelProvider;
use crate::layout::DEFAULT_RING_PHASE_STEP;
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_NAMESPACE_KEY: &str = "threadmap.manualPositions";
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub min_radius: f32,
    pub padding: f32,
    pub mini_padding: f32,
    pub mini_scale: f32,
    pub ring_phase_step: f64,
    pub root_node_radius: f32,
    pub topic_node_radius: f32,
    pub ai_node_radius: f32,
    pub cluster_node_radius: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_radius: 60.0,
            padding: 60.0,
            mini_padding: 16.0,
            mini_scale: 0.5,
            ring_phase_step: DEFAULT_RING_PHASE_STEP,
            root_node_radius: 28.0,
            topic_node_radius: 20.0,
            ai_node_radius: 16.0,
            cluster_node_radius: 22.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub namespace_key: String,
    pub debounce_ms: u64,
    /// Directory for the file-backed store; in-memory when unset.
    pub dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            namespace_key: DEFAULT_NAMESPACE_KEY.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub endpoint: String,
    pub model_provider: ModelProvider,
    pub enabled_agents: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5001/api/chat".to_string(),
            model_provider: ModelProvider::Claude,
            enabled_agents: vec!["brainstorming".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub persistence: PersistenceConfig,
    pub chat: ChatConfig,
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: Theme::light(),
            layout: LayoutConfig::default(),
            persistence: PersistenceConfig::default(),
            chat: ChatConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    min_radius: Option<f32>,
    padding: Option<f32>,
    mini_padding: Option<f32>,
    mini_scale: Option<f32>,
    ring_phase_step: Option<f64>,
    root_node_radius: Option<f32>,
    topic_node_radius: Option<f32>,
    ai_node_radius: Option<f32>,
    cluster_node_radius: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PersistenceConfigFile {
    namespace_key: Option<String>,
    debounce_ms: Option<u64>,
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChatConfigFile {
    endpoint: Option<String>,
    model_provider: Option<ModelProvider>,
    enabled_agents: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    font_size: Option<f32>,
    background: Option<String>,
    line_color: Option<String>,
    root_color: Option<String>,
    topic_color: Option<String>,
    ai_color: Option<String>,
    cluster_color: Option<String>,
    node_border_color: Option<String>,
    text_color: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    layout: Option<LayoutConfigFile>,
    persistence: Option<PersistenceConfigFile>,
    chat: Option<ChatConfigFile>,
    width: Option<f32>,
    height: Option<f32>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Overlays a JSON5 config document on the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(theme_name) = parsed.theme.as_deref() {
        if theme_name == "dark" {
            config.theme = Theme::dark();
        } else if theme_name == "light" || theme_name == "default" {
            config.theme = Theme::light();
        }
    }

    if let Some(vars) = parsed.theme_variables {
        if let Some(v) = vars.font_family {
            config.theme.font_family = v;
        }
        if let Some(v) = vars.font_size {
            config.theme.font_size = v;
        }
        if let Some(v) = vars.background {
            config.theme.background = v;
        }
        if let Some(v) = vars.line_color {
            config.theme.line_color = v;
        }
        if let Some(v) = vars.root_color {
            config.theme.root_color = v;
        }
        if let Some(v) = vars.topic_color {
            config.theme.topic_color = v;
        }
        if let Some(v) = vars.ai_color {
            config.theme.ai_color = v;
        }
        if let Some(v) = vars.cluster_color {
            config.theme.cluster_color = v;
        }
        if let Some(v) = vars.node_border_color {
            config.theme.node_border_color = v;
        }
        if let Some(v) = vars.text_color {
            config.theme.text_color = v;
        }
    }

    if let Some(layout) = parsed.layout {
        if let Some(v) = layout.min_radius {
            config.layout.min_radius = v;
        }
        if let Some(v) = layout.padding {
            config.layout.padding = v;
        }
        if let Some(v) = layout.mini_padding {
            config.layout.mini_padding = v;
        }
        if let Some(v) = layout.mini_scale {
            config.layout.mini_scale = v;
        }
        if let Some(v) = layout.ring_phase_step {
            config.layout.ring_phase_step = v;
        }
        if let Some(v) = layout.root_node_radius {
            config.layout.root_node_radius = v;
        }
        if let Some(v) = layout.topic_node_radius {
            config.layout.topic_node_radius = v;
        }
        if let Some(v) = layout.ai_node_radius {
            config.layout.ai_node_radius = v;
        }
        if let Some(v) = layout.cluster_node_radius {
            config.layout.cluster_node_radius = v;
        }
    }

    if let Some(persistence) = parsed.persistence {
        if let Some(v) = persistence.namespace_key {
            config.persistence.namespace_key = v;
        }
        if let Some(v) = persistence.debounce_ms {
            config.persistence.debounce_ms = v;
        }
        if persistence.dir.is_some() {
            config.persistence.dir = persistence.dir;
        }
    }

    if let Some(chat) = parsed.chat {
        if let Some(v) = chat.endpoint {
            config.chat.endpoint = v;
        }
        if let Some(v) = chat.model_provider {
            config.chat.model_provider = v;
        }
        if let Some(v) = chat.enabled_agents {
            config.chat.enabled_agents = v;
        }
    }

    if let Some(v) = parsed.width {
        config.render.width = v;
    }
    if let Some(v) = parsed.height {
        config.render.height = v;
    }

    Ok(config)
}
