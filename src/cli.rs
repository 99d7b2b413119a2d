use crate::config::{Config, load_config};
use crate::graph::ConversationGraph;
use crate::layout::RenderMode;
use crate::layout_dump::write_layout_dump;
use crate::model::{ConversationId, ForestSnapshot, NodeKey, load_snapshot};
use crate::positions::{JsonFileStore, MemoryStore, PositionStore};
use crate::render::{render_svg, write_output_svg};
use crate::session::ForestSession;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "tmap", version, about = "Radial map of branching conversations")]
pub struct Args {
    /// Forest snapshot (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config file (JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Tree to draw, by any conversation id in it. Defaults to the newest root.
    #[arg(long = "root")]
    pub root: Option<u64>,

    /// Expand the agent cluster under this parent
    #[arg(long = "focus")]
    pub focus: Option<u64>,

    /// Width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,

    /// Compact rendering with reduced padding and smaller nodes
    #[arg(long = "mini")]
    pub mini: bool,

    /// Directory holding persisted manual positions
    #[arg(long = "positions")]
    pub positions: Option<PathBuf>,

    /// Write resolved positions and cached angles as JSON
    #[arg(long = "dump-layout")]
    pub dump_layout: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        config.render.width = width;
    }
    if let Some(height) = args.height {
        config.render.height = height;
    }
    if let Some(dir) = args.positions.clone() {
        config.persistence.dir = Some(dir);
    }

    let snapshot = read_snapshot(args.input.as_deref())?;
    let graph = ConversationGraph::from_snapshot(snapshot);
    info!(conversations = graph.len(), roots = graph.roots().len(), "forest loaded");

    let store: Box<dyn PositionStore> = match &config.persistence.dir {
        Some(dir) => Box::new(JsonFileStore::new(dir)),
        None => Box::new(MemoryStore::new()),
    };
    let mut session = ForestSession::new(graph, store, config);
    if let Some(root) = args.root {
        session.select(ConversationId(root))?;
    }
    if args.mini {
        session.set_mode(RenderMode::Mini);
    }
    if let Some(focus) = args.focus {
        session.click(NodeKey::Cluster(ConversationId(focus)), Instant::now());
    }

    let view = session.view();
    debug!(nodes = view.nodes.len(), edges = view.edges.len(), "view resolved");
    if let Some(path) = args.dump_layout.as_deref() {
        let tree = view.root.and_then(|root| session.layout_cache().tree(root));
        write_layout_dump(path, &view, tree, session.graph())?;
    }

    let config = session.config();
    let svg = render_svg(&view, session.graph(), &config.theme);
    match args.output_format {
        OutputFormat::Svg => {
            write_output_svg(&svg, args.output.as_deref())?;
        }
        OutputFormat::Png => write_png(&svg, args.output.as_deref(), config)?,
    }
    session.flush()?;
    Ok(())
}

#[cfg(feature = "png")]
fn write_png(svg: &str, output: Option<&Path>, config: &Config) -> Result<()> {
    let output = output.ok_or_else(|| anyhow::anyhow!("Output path required for png output"))?;
    crate::render::write_output_png(svg, output, &config.render)
}

#[cfg(not(feature = "png"))]
fn write_png(_svg: &str, _output: Option<&Path>, _config: &Config) -> Result<()> {
    Err(anyhow::anyhow!("built without png support"))
}

fn read_snapshot(path: Option<&Path>) -> Result<ForestSnapshot> {
    match path {
        Some(path) if path != Path::new("-") => load_snapshot(path),
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(serde_json::from_str(&buf)?)
        }
    }
}
