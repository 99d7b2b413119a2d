use crate::model::{
    Conversation, ConversationId, ForestSnapshot, Message, MessageId, NodeKey, SelectionRange,
    TopicEdge,
};
use std::collections::{BTreeMap, HashSet, VecDeque};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),
    #[error("unknown message {message} in conversation {conversation}")]
    UnknownMessage {
        conversation: ConversationId,
        message: MessageId,
    },
    #[error("conversation {0} cannot be linked to itself")]
    SelfLink(ConversationId),
    #[error("conversation {0} already has a parent")]
    AlreadyLinked(ConversationId),
    #[error("conversation {0} already exists")]
    Duplicate(ConversationId),
}

/// Tagged node kinds produced by [`ConversationGraph::subtree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtreeNodeKind {
    Root,
    Real { ai_generated: bool },
    Cluster { count: usize, child_ids: Vec<ConversationId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeNode {
    pub key: NodeKey,
    pub depth: usize,
    pub parent: Option<NodeKey>,
    pub kind: SubtreeNodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtreeLink {
    pub source: NodeKey,
    pub target: NodeKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtree {
    pub root: Option<ConversationId>,
    pub nodes: Vec<SubtreeNode>,
    pub links: Vec<SubtreeLink>,
}

impl Subtree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, key: NodeKey) -> Option<&SubtreeNode> {
        self.nodes.iter().find(|node| node.key == key)
    }
}

/// Conversations plus the topic edges linking them into a forest.
///
/// Each conversation has at most one inbound edge; the map below is keyed by
/// the child so the constructive path cannot produce a second parent.
#[derive(Debug, Clone, Default)]
pub struct ConversationGraph {
    conversations: BTreeMap<ConversationId, Conversation>,
    edges: BTreeMap<ConversationId, TopicEdge>,
    /// Parent -> children, newest first. Derived from `edges`.
    children: BTreeMap<ConversationId, Vec<ConversationId>>,
    revision: u64,
}

impl ConversationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from snapshot data as-is. Cycles and dangling parents
    /// are accepted here; every traversal guards against them.
    pub fn from_snapshot(snapshot: ForestSnapshot) -> Self {
        let mut graph = Self::new();
        for conversation in snapshot.conversations {
            graph.conversations.insert(conversation.id, conversation);
        }
        for edge in snapshot.edges {
            graph.edges.insert(edge.conversation_id, edge);
        }
        for edge in graph.edges.values() {
            graph
                .children
                .entry(edge.from_conversation_id)
                .or_default()
                .push(edge.conversation_id);
        }
        for children in graph.children.values_mut() {
            children.sort_unstable_by(|a, b| b.cmp(a));
        }
        graph
    }

    pub fn to_snapshot(&self) -> ForestSnapshot {
        ForestSnapshot {
            conversations: self.conversations.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Bumped on every structural or content mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn max_id(&self) -> u64 {
        let conversations = self.conversations.keys().map(|id| id.0);
        let messages = self
            .conversations
            .values()
            .flat_map(|c| c.messages.iter().map(|m| m.id.0));
        conversations.chain(messages).max().unwrap_or(0)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.conversations.contains_key(&id)
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub fn ids(&self) -> HashSet<ConversationId> {
        self.conversations.keys().copied().collect()
    }

    pub fn inbound_edge(&self, id: ConversationId) -> Option<&TopicEdge> {
        self.edges.get(&id)
    }

    pub fn insert(&mut self, conversation: Conversation) -> Result<(), GraphError> {
        if self.conversations.contains_key(&conversation.id) {
            return Err(GraphError::Duplicate(conversation.id));
        }
        self.conversations.insert(conversation.id, conversation);
        self.revision += 1;
        Ok(())
    }

    pub fn append_message(
        &mut self,
        id: ConversationId,
        message: Message,
    ) -> Result<(), GraphError> {
        let conversation = self
            .conversations
            .get_mut(&id)
            .ok_or(GraphError::UnknownConversation(id))?;
        conversation.messages.push(message);
        self.revision += 1;
        Ok(())
    }

    pub fn set_title(&mut self, id: ConversationId, title: String) -> Result<(), GraphError> {
        let conversation = self
            .conversations
            .get_mut(&id)
            .ok_or(GraphError::UnknownConversation(id))?;
        conversation.title = title;
        Ok(())
    }

    pub fn set_topic_summary(
        &mut self,
        id: ConversationId,
        summary: String,
    ) -> Result<(), GraphError> {
        let conversation = self
            .conversations
            .get_mut(&id)
            .ok_or(GraphError::UnknownConversation(id))?;
        conversation.topic_summary = Some(summary);
        Ok(())
    }

    /// Records that `child` was spawned from `parent`.
    pub fn link(
        &mut self,
        child: ConversationId,
        parent: ConversationId,
        from_message_id: Option<MessageId>,
        selection_range: Option<SelectionRange>,
    ) -> Result<(), GraphError> {
        if child == parent {
            return Err(GraphError::SelfLink(child));
        }
        if !self.conversations.contains_key(&parent) {
            return Err(GraphError::UnknownConversation(parent));
        }
        if !self.conversations.contains_key(&child) {
            return Err(GraphError::UnknownConversation(child));
        }
        if self.edges.contains_key(&child) {
            return Err(GraphError::AlreadyLinked(child));
        }
        if let (Some(message), Some(origin)) = (from_message_id, self.conversations.get(&parent))
            && origin.message(message).is_none()
        {
            return Err(GraphError::UnknownMessage {
                conversation: parent,
                message,
            });
        }
        self.edges.insert(
            child,
            TopicEdge {
                conversation_id: child,
                from_conversation_id: parent,
                from_message_id,
                selection_range,
            },
        );
        let siblings = self.children.entry(parent).or_default();
        let slot = siblings.partition_point(|sibling| *sibling > child);
        siblings.insert(slot, child);
        if let Some(conversation) = self.conversations.get_mut(&child) {
            conversation.from_conversation_id = Some(parent);
        }
        self.revision += 1;
        Ok(())
    }

    /// Walks inbound edges from `id` up to its root. The walk stops at a
    /// conversation without an inbound edge, at a dangling parent, or on the
    /// first revisit; the last id returned is the effective root.
    pub fn ancestor_chain(&self, id: ConversationId) -> Vec<ConversationId> {
        let mut chain = vec![id];
        let mut visited = HashSet::from([id]);
        let mut current = id;
        while let Some(edge) = self.edges.get(&current) {
            let parent = edge.from_conversation_id;
            if !self.conversations.contains_key(&parent) || !visited.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub fn root_of(&self, id: ConversationId) -> ConversationId {
        self.ancestor_chain(id).last().copied().unwrap_or(id)
    }

    /// Conversations spawned from `id`, newest first.
    pub fn children_of(&self, id: ConversationId) -> Vec<ConversationId> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .copied()
            .filter(|child| *child != id && self.conversations.contains_key(child))
            .collect()
    }

    /// Conversations without an inbound edge, oldest first.
    pub fn roots(&self) -> Vec<ConversationId> {
        self.conversations
            .keys()
            .filter(|id| !self.edges.contains_key(id))
            .copied()
            .collect()
    }

    /// Breadth-first extraction of the tree under `root`.
    ///
    /// Without a focus, a parent's AI-generated children collapse into one
    /// `cluster-<parent>` node whenever there is more than one of them. With
    /// `focused_parent` set every child is emitted individually.
    pub fn subtree(&self, root: ConversationId, focused_parent: Option<ConversationId>) -> Subtree {
        if !self.conversations.contains_key(&root) {
            return Subtree::default();
        }
        let root_key = NodeKey::Conversation(root);
        let mut subtree = Subtree {
            root: Some(root),
            nodes: vec![SubtreeNode {
                key: root_key,
                depth: 0,
                parent: None,
                kind: SubtreeNodeKind::Root,
            }],
            links: Vec::new(),
        };
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([(root, 0usize)]);

        while let Some((parent, depth)) = queue.pop_front() {
            let parent_key = NodeKey::Conversation(parent);
            let children: Vec<&Conversation> = self
                .children_of(parent)
                .into_iter()
                .filter(|child| !visited.contains(child))
                .filter_map(|child| self.conversations.get(&child))
                .collect();
            let ai_count = children.iter().filter(|c| c.is_ai_generated).count();
            let collapse = focused_parent.is_none() && ai_count > 1;

            for child in &children {
                if collapse && child.is_ai_generated {
                    continue;
                }
                visited.insert(child.id);
                let key = NodeKey::Conversation(child.id);
                subtree.nodes.push(SubtreeNode {
                    key,
                    depth: depth + 1,
                    parent: Some(parent_key),
                    kind: SubtreeNodeKind::Real {
                        ai_generated: child.is_ai_generated,
                    },
                });
                subtree.links.push(SubtreeLink {
                    source: parent_key,
                    target: key,
                });
                queue.push_back((child.id, depth + 1));
            }

            if collapse {
                let mut child_ids: Vec<ConversationId> = children
                    .iter()
                    .filter(|c| c.is_ai_generated)
                    .map(|c| c.id)
                    .collect();
                child_ids.sort_unstable();
                let key = NodeKey::Cluster(parent);
                subtree.nodes.push(SubtreeNode {
                    key,
                    depth: depth + 1,
                    parent: Some(parent_key),
                    kind: SubtreeNodeKind::Cluster {
                        count: child_ids.len(),
                        child_ids,
                    },
                });
                subtree.links.push(SubtreeLink {
                    source: parent_key,
                    target: key,
                });
            }
        }

        subtree
    }
}
