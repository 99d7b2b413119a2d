pub mod chat;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod context;
pub mod graph;
pub mod interaction;
pub mod layout;
pub mod layout_dump;
pub mod model;
pub mod positions;
pub mod render;
pub mod session;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use graph::{ConversationGraph, GraphError};
pub use model::{ConversationId, ForestSnapshot, MessageId, NodeKey};
pub use session::ForestSession;
