use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const TITLE_MAX_CHARS: usize = 48;
pub const UNTITLED: &str = "New chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub from_conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub is_ai_generated: bool,
    #[serde(default)]
    pub generated_by: Option<String>,
    /// Summary of the origin context, as last returned by the chat endpoint.
    #[serde(default)]
    pub topic_summary: Option<String>,
}

impl Conversation {
    pub fn new(id: ConversationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            from_conversation_id: None,
            is_ai_generated: false,
            generated_by: None,
            topic_summary: None,
        }
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }
}

/// Character offsets into the rendered text of a message.
///
/// Signed so that stale or miscalculated offsets coming from the UI layer
/// can be represented and clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: i64,
    pub end: i64,
}

impl SelectionRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicEdge {
    pub conversation_id: ConversationId,
    pub from_conversation_id: ConversationId,
    /// `None` for agent-synthesized topics.
    #[serde(default)]
    pub from_message_id: Option<MessageId>,
    #[serde(default)]
    pub selection_range: Option<SelectionRange>,
}

/// Identity of a node in a laid-out tree: either a real conversation or the
/// synthetic cluster standing in for the AI-generated children of a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    Conversation(ConversationId),
    Cluster(ConversationId),
}

impl NodeKey {
    pub fn conversation_id(self) -> Option<ConversationId> {
        match self {
            NodeKey::Conversation(id) => Some(id),
            NodeKey::Cluster(_) => None,
        }
    }

    pub fn is_cluster(self) -> bool {
        matches!(self, NodeKey::Cluster(_))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Conversation(id) => write!(f, "{id}"),
            NodeKey::Cluster(parent) => write!(f, "cluster-{parent}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid node key: {0:?}")]
pub struct ParseNodeKeyError(String);

impl FromStr for NodeKey {
    type Err = ParseNodeKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cluster, digits) = match s.strip_prefix("cluster-") {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let id = digits
            .parse::<u64>()
            .map(ConversationId)
            .map_err(|_| ParseNodeKeyError(s.to_string()))?;
        Ok(if cluster {
            NodeKey::Cluster(id)
        } else {
            NodeKey::Conversation(id)
        })
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Interchange format for a whole forest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestSnapshot {
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub edges: Vec<TopicEdge>,
}

pub fn load_snapshot(path: &std::path::Path) -> anyhow::Result<ForestSnapshot> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Issues strictly increasing ids derived from the wall clock in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never issue an id at or below `floor`, e.g. the largest id of a
    /// loaded snapshot.
    pub fn starting_after(floor: u64) -> Self {
        Self { last: floor }
    }

    pub fn next_raw(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        self.last = now.max(self.last.saturating_add(1));
        self.last
    }

    pub fn conversation(&mut self) -> ConversationId {
        ConversationId(self.next_raw())
    }

    pub fn message(&mut self) -> MessageId {
        MessageId(self.next_raw())
    }
}

pub fn derive_title(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text.trim(), " ");
    if collapsed.is_empty() {
        return UNTITLED.to_string();
    }
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return collapsed.into_owned();
    }
    let truncated: String = collapsed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_key_round_trips_through_strings() {
        let cluster: NodeKey = "cluster-42".parse().unwrap();
        assert_eq!(cluster, NodeKey::Cluster(ConversationId(42)));
        assert_eq!(cluster.to_string(), "cluster-42");
        let real: NodeKey = "7".parse().unwrap();
        assert_eq!(real, NodeKey::Conversation(ConversationId(7)));
        assert!("cluster-x".parse::<NodeKey>().is_err());
    }

    #[test]
    fn id_generator_is_strictly_increasing() {
        let mut ids = IdGenerator::starting_after(u64::MAX / 2);
        let a = ids.next_raw();
        let b = ids.next_raw();
        assert!(a > u64::MAX / 2);
        assert!(b > a);
    }

    #[test]
    fn titles_collapse_whitespace_and_truncate() {
        assert_eq!(derive_title("  hello \n  world "), "hello world");
        assert_eq!(derive_title("   "), "New chat");
        let long = "word ".repeat(30);
        let title = derive_title(&long);
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn snapshot_reads_camel_case_fields() {
        let json = r#"{
            "conversations": [
                {"id": 1, "title": "root", "messages": [{"id": 2, "text": "hi", "sender": "user"}]},
                {"id": 3, "title": "idea", "fromConversationId": 1, "isAiGenerated": true, "generatedBy": "brainstorming"}
            ],
            "edges": [{"conversationId": 3, "fromConversationId": 1, "fromMessageId": null}]
        }"#;
        let snapshot: ForestSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.conversations.len(), 2);
        assert!(snapshot.conversations[1].is_ai_generated);
        assert_eq!(snapshot.edges[0].from_message_id, None);
        assert_eq!(snapshot.conversations[0].messages[0].sender, Sender::User);
    }
}
