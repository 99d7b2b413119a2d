use crate::chat::{ChatBackend, ChatError, ChatRequest, ChatResponse, agent_ideas};
use crate::config::Config;
use crate::context::build_context_pack;
use crate::graph::{ConversationGraph, GraphError, Subtree};
use crate::interaction::{ClickAction, DragUpdate, InteractionController, PointerDown, PointerId, Release};
use crate::layout::{LayoutCache, RenderMode, ResolvedView, Viewport, resolve_view};
use crate::model::{
    Conversation, ConversationId, IdGenerator, Message, MessageId, NodeKey, SelectionRange, Sender,
    UNTITLED, derive_title,
};
use crate::positions::{
    DebouncedWriter, ManualPositions, MemoryStore, PositionStore, StoreError, load_positions,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A chat request bound to the conversation it was issued from.
#[derive(Debug, Clone)]
pub struct PendingChat {
    pub conversation_id: ConversationId,
    pub request: ChatRequest,
}

#[derive(Debug, Clone)]
struct SubtreeMemo {
    root: ConversationId,
    focus: Option<ConversationId>,
    revision: u64,
    subtree: Subtree,
}

/// Owns the forest and every piece of view state derived from it. All
/// mutations are expected to arrive sequentially from one event loop.
pub struct ForestSession {
    graph: ConversationGraph,
    cache: LayoutCache,
    manual: ManualPositions,
    interaction: InteractionController,
    writer: DebouncedWriter,
    store: Box<dyn PositionStore>,
    ids: IdGenerator,
    config: Config,
    active: Option<ConversationId>,
    focused_parent: Option<ConversationId>,
    viewport: Viewport,
    mode: RenderMode,
    memo: Option<SubtreeMemo>,
    pruned_at: Option<u64>,
}

impl ForestSession {
    pub fn new(graph: ConversationGraph, store: Box<dyn PositionStore>, config: Config) -> Self {
        let manual = load_positions(&*store, &config.persistence.namespace_key);
        debug!(entries = manual.len(), "manual positions loaded");
        let active = graph.roots().last().copied();
        Self {
            ids: IdGenerator::starting_after(graph.max_id()),
            cache: LayoutCache::new(config.layout.ring_phase_step),
            writer: DebouncedWriter::new(Duration::from_millis(config.persistence.debounce_ms)),
            viewport: Viewport::new(config.render.width, config.render.height),
            graph,
            manual,
            interaction: InteractionController::new(),
            store,
            config,
            active,
            focused_parent: None,
            mode: RenderMode::Full,
            memo: None,
            pruned_at: None,
        }
    }

    pub fn in_memory(graph: ConversationGraph, config: Config) -> Self {
        Self::new(graph, Box::new(MemoryStore::new()), config)
    }

    pub fn graph(&self) -> &ConversationGraph {
        &self.graph
    }

    pub fn layout_cache(&self) -> &LayoutCache {
        &self.cache
    }

    pub fn manual_positions(&self) -> &ManualPositions {
        &self.manual
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    pub fn focused_parent(&self) -> Option<ConversationId> {
        self.focused_parent
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    pub fn is_locked(&self) -> bool {
        self.interaction.is_locked()
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.interaction.set_locked(locked);
    }

    /// Root of the tree the active conversation belongs to.
    pub fn current_root(&self) -> Option<ConversationId> {
        self.active.map(|id| self.graph.root_of(id))
    }

    /// Makes `id` the active conversation. Moving to another tree drops the
    /// cluster focus.
    pub fn select(&mut self, id: ConversationId) -> Result<(), GraphError> {
        if !self.graph.contains(id) {
            return Err(GraphError::UnknownConversation(id));
        }
        if self.current_root() != Some(self.graph.root_of(id)) {
            self.focused_parent = None;
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn new_conversation(&mut self) -> ConversationId {
        let id = self.ids.conversation();
        // Fresh ids are above every existing one, so this cannot collide.
        if let Err(err) = self.graph.insert(Conversation::new(id, UNTITLED)) {
            warn!(%err, "conversation id collision");
        }
        self.active = Some(id);
        self.focused_parent = None;
        info!(conversation = %id, "new conversation");
        id
    }

    /// Splits a highlighted span of `from_message` into a new topic thread
    /// and makes it active.
    pub fn create_topic_from_selection(
        &mut self,
        from_conversation: ConversationId,
        from_message: MessageId,
        highlight: &str,
        range: SelectionRange,
    ) -> Result<ConversationId, GraphError> {
        let parent = self
            .graph
            .conversation(from_conversation)
            .ok_or(GraphError::UnknownConversation(from_conversation))?;
        if parent.message(from_message).is_none() {
            return Err(GraphError::UnknownMessage {
                conversation: from_conversation,
                message: from_message,
            });
        }
        let id = self.ids.conversation();
        self.graph.insert(Conversation::new(id, derive_title(highlight)))?;
        self.graph
            .link(id, from_conversation, Some(from_message), Some(range))?;
        self.select(id)?;
        info!(conversation = %id, parent = %from_conversation, message = %from_message, "topic split");
        Ok(id)
    }

    pub fn append_message(
        &mut self,
        conversation: ConversationId,
        sender: Sender,
        text: impl Into<String>,
    ) -> Result<MessageId, GraphError> {
        let id = self.ids.message();
        self.graph.append_message(
            conversation,
            Message {
                id,
                text: text.into(),
                sender,
            },
        )?;
        Ok(id)
    }

    /// Appends the user's message to the active conversation (creating one
    /// when none is active) and builds the request for it.
    pub fn prepare_message(&mut self, text: &str) -> Result<PendingChat, GraphError> {
        let conversation_id = match self.active {
            Some(id) if self.graph.contains(id) => id,
            _ => self.new_conversation(),
        };
        let untitled = self
            .graph
            .conversation(conversation_id)
            .is_some_and(|c| c.title == UNTITLED && !c.messages.iter().any(|m| m.sender == Sender::User));
        self.append_message(conversation_id, Sender::User, text)?;
        if untitled {
            self.graph.set_title(conversation_id, derive_title(text))?;
        }

        let conversation = self
            .graph
            .conversation(conversation_id)
            .ok_or(GraphError::UnknownConversation(conversation_id))?;
        let request = ChatRequest {
            message: text.to_string(),
            context_pack: build_context_pack(&self.graph, conversation_id),
            conversation_messages: conversation.messages.clone(),
            enabled_agents: self.config.chat.enabled_agents.clone(),
            model_provider: self.config.chat.model_provider,
        };
        Ok(PendingChat {
            conversation_id,
            request,
        })
    }

    /// Applies the endpoint's answer to the conversation the request was
    /// bound to. Returns the ids of topics created from agent ideas.
    pub fn complete_message(
        &mut self,
        conversation_id: ConversationId,
        result: Result<ChatResponse, ChatError>,
    ) -> Vec<ConversationId> {
        if !self.graph.contains(conversation_id) {
            warn!(conversation = %conversation_id, "dropping reply for missing conversation");
            return Vec::new();
        }
        let reply = match result.and_then(ChatResponse::into_reply) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(conversation = %conversation_id, %err, "chat request failed");
                if let Err(err) = self.append_message(conversation_id, Sender::Assistant, err.as_reply()) {
                    warn!(%err, "could not record chat failure");
                }
                return Vec::new();
            }
        };

        if let Err(err) = self.append_message(conversation_id, Sender::Assistant, reply.text) {
            warn!(%err, "could not record chat reply");
            return Vec::new();
        }
        if let Some(summary) = reply.topic_summary
            && let Err(err) = self.graph.set_topic_summary(conversation_id, summary)
        {
            warn!(%err, "could not cache topic summary");
        }

        let mut spawned = Vec::new();
        for (agent, idea) in agent_ideas(&reply.agent_results) {
            match self.spawn_idea(conversation_id, &agent, &idea) {
                Ok(id) => spawned.push(id),
                Err(err) => warn!(%err, agent = %agent, "could not add agent idea"),
            }
        }
        if !spawned.is_empty() {
            info!(conversation = %conversation_id, ideas = spawned.len(), "agent ideas added");
        }
        spawned
    }

    fn spawn_idea(&mut self, parent: ConversationId, agent: &str, idea: &str) -> Result<ConversationId, GraphError> {
        let id = self.ids.conversation();
        let mut conversation = Conversation::new(id, derive_title(idea));
        conversation.is_ai_generated = true;
        conversation.generated_by = Some(agent.to_string());
        self.graph.insert(conversation)?;
        self.graph.link(id, parent, None, None)?;
        Ok(id)
    }

    /// Sends `text` from the active conversation and applies the answer.
    pub async fn send_message<B: ChatBackend>(
        &mut self,
        backend: &B,
        text: &str,
    ) -> Result<Vec<ConversationId>, GraphError> {
        let pending = self.prepare_message(text)?;
        let result = backend.send(&pending.request).await;
        Ok(self.complete_message(pending.conversation_id, result))
    }

    /// Lays out the active tree for the current viewport.
    pub fn view(&mut self) -> ResolvedView {
        self.prune_stale();
        let Some(root) = self.current_root() else {
            return ResolvedView::empty(self.viewport);
        };
        let focus = self.focused_parent;
        let revision = self.graph.revision();
        let fresh = self
            .memo
            .as_ref()
            .is_some_and(|memo| memo.root == root && memo.focus == focus && memo.revision == revision);
        if !fresh {
            self.memo = None;
        }
        let graph = &self.graph;
        let memo = self.memo.get_or_insert_with(|| SubtreeMemo {
            root,
            focus,
            revision,
            subtree: graph.subtree(root, focus),
        });
        self.cache.update(&memo.subtree);
        resolve_view(
            &memo.subtree,
            self.cache.tree(root),
            &self.manual,
            self.viewport,
            self.mode,
            &self.config.layout,
        )
    }

    /// Only positions follow a resize; cached angles stay as they are.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport = Viewport::new(width, height);
    }

    pub fn pointer_down(&mut self, node: NodeKey, pointer: PointerId, x: f32, y: f32) -> PointerDown {
        self.interaction.pointer_down(node, pointer, x, y)
    }

    pub fn pointer_move(&mut self, pointer: PointerId, x: f32, y: f32, now: Instant) -> Option<DragUpdate> {
        let update = self.interaction.pointer_move(pointer, x, y, self.viewport)?;
        let root = self.current_root()?;
        self.manual.set(root, update.node, update.point);
        self.writer.mark_dirty(now);
        Some(update)
    }

    pub fn pointer_up(&mut self, pointer: PointerId, now: Instant) -> Release {
        self.interaction.pointer_up(pointer, now)
    }

    pub fn pointer_leave(&mut self, pointer: PointerId, now: Instant) -> Release {
        self.interaction.pointer_leave(pointer, now)
    }

    /// Handles a click on a laid-out node. Clicks right after a drag are
    /// swallowed and return `None`.
    pub fn click(&mut self, node: NodeKey, now: Instant) -> Option<ClickAction> {
        if !self.interaction.accepts_click(now) {
            return None;
        }
        let action = InteractionController::click_action(node);
        match action {
            ClickAction::Select(id) => {
                if let Err(err) = self.select(id) {
                    debug!(%err, "click on unknown conversation");
                    return None;
                }
            }
            ClickAction::ExpandCluster(parent) => {
                self.focused_parent = Some(parent);
            }
        }
        Some(action)
    }

    pub fn collapse_clusters(&mut self) {
        self.focused_parent = None;
    }

    /// Drops manual positions under `root`. The layout cache is untouched.
    pub fn reset_positions(&mut self, root: ConversationId) -> usize {
        let removed = self.manual.reset_root(root);
        if removed > 0 {
            self.writer.mark_dirty(Instant::now());
            info!(root = %root, removed, "manual positions reset");
        }
        removed
    }

    /// Evicts everything kept for the tree under `root`.
    pub fn clear_tree(&mut self, root: ConversationId) {
        self.cache.clear(root);
        if self.manual.reset_root(root) > 0 {
            self.writer.mark_dirty(Instant::now());
        }
        if self.memo.as_ref().is_some_and(|memo| memo.root == root) {
            self.memo = None;
        }
        debug!(root = %root, "tree state cleared");
    }

    /// Persists manual positions once the debounce window has elapsed.
    pub fn tick(&mut self, now: Instant) -> Result<bool, StoreError> {
        self.writer.poll(
            now,
            &mut *self.store,
            &self.config.persistence.namespace_key,
            &self.manual,
        )
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.writer.is_pending() {
            return Ok(());
        }
        self.writer
            .flush(&mut *self.store, &self.config.persistence.namespace_key, &self.manual)
    }

    fn prune_stale(&mut self) {
        let revision = self.graph.revision();
        if self.pruned_at == Some(revision) {
            return;
        }
        if self.manual.prune(&self.graph.ids()) > 0 {
            self.writer.mark_dirty(Instant::now());
        }
        self.pruned_at = Some(revision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::NormalizedPoint;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedBackend {
        replies: RefCell<VecDeque<Result<ChatResponse, ChatError>>>,
        seen: RefCell<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<ChatResponse, ChatError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatBackend for ScriptedBackend {
        async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
            self.seen.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Transport("script exhausted".to_string())))
        }
    }

    fn session() -> ForestSession {
        ForestSession::in_memory(ConversationGraph::new(), Config::default())
    }

    /// A root with one assistant message to split from.
    fn seeded() -> (ForestSession, ConversationId, MessageId) {
        let mut session = session();
        let root = session.new_conversation();
        session.append_message(root, Sender::User, "tell me a pangram").unwrap();
        let message = session
            .append_message(root, Sender::Assistant, "The quick brown fox")
            .unwrap();
        (session, root, message)
    }

    #[test]
    fn topic_split_becomes_active_and_titled() {
        let (mut session, root, message) = seeded();
        let topic = session
            .create_topic_from_selection(root, message, "quick", SelectionRange::new(4, 9))
            .unwrap();
        assert_eq!(session.active(), Some(topic));
        assert_eq!(session.graph().conversation(topic).unwrap().title, "quick");
        assert_eq!(session.current_root(), Some(root));
    }

    #[test]
    fn split_in_another_tree_drops_cluster_focus() {
        let (mut session, first, _) = seeded();
        let focused = session.new_conversation();
        session
            .append_message(focused, Sender::User, "second tree")
            .unwrap();
        session.click(NodeKey::Cluster(focused), Instant::now());
        assert_eq!(session.focused_parent(), Some(focused));

        let message = session.graph().conversation(first).unwrap().messages[1].id;
        let topic = session
            .create_topic_from_selection(first, message, "brown", SelectionRange::new(10, 15))
            .unwrap();
        assert_eq!(session.active(), Some(topic));
        assert_eq!(session.current_root(), Some(first));
        assert_eq!(session.focused_parent(), None);
    }

    #[test]
    fn split_from_unknown_message_creates_nothing() {
        let (mut session, root, _) = seeded();
        let before = session.graph().len();
        let err = session
            .create_topic_from_selection(root, MessageId(1), "x", SelectionRange::new(0, 1))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownMessage { .. }));
        assert_eq!(session.graph().len(), before);
    }

    #[tokio::test]
    async fn topic_message_carries_context_pack() {
        let (mut session, root, message) = seeded();
        session
            .create_topic_from_selection(root, message, "quick", SelectionRange::new(4, 9))
            .unwrap();
        let mut summarized = ChatResponse::reply("Quick means fast.");
        summarized.topic_summary = Some("pangrams".to_string());
        let backend = ScriptedBackend::new(vec![Ok(summarized), Ok(ChatResponse::reply("ok"))]);

        session.send_message(&backend, "what does it mean?").await.unwrap();
        session.send_message(&backend, "and slow?").await.unwrap();

        let seen = backend.seen.borrow();
        let first = seen[0].context_pack.as_ref().unwrap();
        assert_eq!(first.selected_text, "quick");
        assert_eq!(first.parent_messages.len(), 2);
        assert!(first.topic_summary.is_none());
        let second = seen[1].context_pack.as_ref().unwrap();
        assert_eq!(second.topic_summary.as_deref(), Some("pangrams"));
        assert!(second.parent_messages.is_empty());
        assert_eq!(second.recent_turns.len(), 1);
    }

    #[tokio::test]
    async fn endpoint_failure_appends_one_error_message() {
        let mut session = session();
        let backend = ScriptedBackend::new(vec![Err(ChatError::Transport("refused".to_string()))]);
        let spawned = session.send_message(&backend, "hello there").await.unwrap();
        assert!(spawned.is_empty());
        let id = session.active().unwrap();
        let conversation = session.graph().conversation(id).unwrap();
        assert_eq!(conversation.title, "hello there");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].sender, Sender::Assistant);
        assert!(conversation.messages[1].text.starts_with("Error: "));
        assert_eq!(session.graph().len(), 1);
    }

    #[test]
    fn agent_ideas_become_clustered_ai_topics() {
        let mut session = session();
        let pending = session.prepare_message("plan a trip").unwrap();
        let response: ChatResponse = serde_json::from_str(
            r#"{"response": "sure", "agentResults": {"brainstorming": {"success": true, "ideas": ["Budget", "Packing", "Route"]}}}"#,
        )
        .unwrap();
        let spawned = session.complete_message(pending.conversation_id, Ok(response));
        assert_eq!(spawned.len(), 3);
        for id in &spawned {
            let edge = session.graph().inbound_edge(*id).unwrap();
            assert!(edge.from_message_id.is_none());
            assert_eq!(
                session.graph().conversation(*id).unwrap().generated_by.as_deref(),
                Some("brainstorming")
            );
        }

        let view = session.view();
        let cluster = NodeKey::Cluster(pending.conversation_id);
        assert_eq!(view.node(cluster).unwrap().cluster_count, Some(3));

        assert_eq!(
            session.click(cluster, Instant::now()),
            Some(ClickAction::ExpandCluster(pending.conversation_id))
        );
        let expanded = session.view();
        assert!(expanded.node(cluster).is_none());
        assert_eq!(expanded.nodes.len(), 4);

        session.collapse_clusters();
        assert!(session.view().node(cluster).is_some());
    }

    #[test]
    fn reply_for_missing_conversation_is_dropped() {
        let mut session = session();
        let spawned = session.complete_message(ConversationId(42), Ok(ChatResponse::reply("late")));
        assert!(spawned.is_empty());
        assert!(session.graph().is_empty());
    }

    #[test]
    fn drag_is_persisted_after_debounce() {
        let (mut session, root, message) = seeded();
        let topic = session
            .create_topic_from_selection(root, message, "quick", SelectionRange::new(4, 9))
            .unwrap();
        session.resize(1000.0, 1000.0);
        session.view();

        let key = NodeKey::Conversation(topic);
        let start = Instant::now();
        session.pointer_down(key, 1, 500.0, 500.0);
        let update = session.pointer_move(1, 200.0, 800.0, start).unwrap();
        assert_eq!(update.point, NormalizedPoint::new(0.2, 0.8));
        assert_eq!(session.pointer_up(1, start), Release::DragEnded(key));
        assert!(session.click(key, start).is_none());

        let view = session.view();
        let node = view.node(key).unwrap();
        assert!(node.manual);
        assert!((node.x - 200.0).abs() < 1e-3 && (node.y - 800.0).abs() < 1e-3);

        assert!(!session.tick(start + Duration::from_millis(100)).unwrap());
        assert!(session.tick(start + Duration::from_millis(300)).unwrap());
        assert!(!session.tick(start + Duration::from_millis(900)).unwrap());
    }

    #[test]
    fn positions_survive_a_new_session() {
        let (mut session, root, message) = seeded();
        let topic = session
            .create_topic_from_selection(root, message, "quick", SelectionRange::new(4, 9))
            .unwrap();
        session.view();
        let key = NodeKey::Conversation(topic);
        session.pointer_down(key, 1, 0.0, 0.0);
        session.pointer_move(1, 600.0, 400.0, Instant::now());
        session.pointer_up(1, Instant::now());
        session.flush().unwrap();

        let snapshot = session.graph().to_snapshot();
        let ForestSession { store, config, .. } = session;
        let reloaded = ForestSession::new(ConversationGraph::from_snapshot(snapshot), store, config);
        assert_eq!(
            reloaded.manual_positions().get(root, key),
            Some(NormalizedPoint::new(0.5, 0.5))
        );
    }

    #[test]
    fn reload_prunes_vanished_conversations_but_keeps_clusters() {
        let mut session = session();
        let pending = session.prepare_message("plan a trip").unwrap();
        let root = pending.conversation_id;
        let response: ChatResponse = serde_json::from_str(
            r#"{"response": "sure", "agentResults": {"brainstorming": {"success": true, "ideas": ["Budget", "Packing"]}}}"#,
        )
        .unwrap();
        session.complete_message(root, Ok(response));
        let message = session.graph().conversation(root).unwrap().messages[1].id;
        let topic = session
            .create_topic_from_selection(root, message, "sure", SelectionRange::new(0, 4))
            .unwrap();

        let cluster = NodeKey::Cluster(root);
        let key = NodeKey::Conversation(topic);
        let view = session.view();
        for (pointer, node) in [(1, cluster), (2, key)] {
            let placed = view.node(node).unwrap();
            let now = Instant::now();
            session.pointer_down(node, pointer, placed.x, placed.y);
            session
                .pointer_move(pointer, placed.x + 40.0, placed.y + 40.0, now)
                .unwrap();
            session.pointer_up(pointer, now);
        }
        assert_eq!(session.manual_positions().len(), 2);
        session.flush().unwrap();

        let mut snapshot = session.graph().to_snapshot();
        snapshot.conversations.retain(|c| c.id != topic);
        snapshot.edges.retain(|e| e.conversation_id != topic);
        let ForestSession { store, config, .. } = session;
        let mut reloaded = ForestSession::new(ConversationGraph::from_snapshot(snapshot), store, config);
        assert_eq!(reloaded.manual_positions().len(), 2);

        reloaded.view();
        assert!(reloaded.manual_positions().get(root, key).is_none());
        assert!(reloaded.manual_positions().get(root, cluster).is_some());
        reloaded.flush().unwrap();

        let snapshot = reloaded.graph().to_snapshot();
        let ForestSession { store, config, .. } = reloaded;
        let again = ForestSession::new(ConversationGraph::from_snapshot(snapshot), store, config);
        assert_eq!(again.manual_positions().len(), 1);
    }

    #[test]
    fn resize_keeps_cache_version() {
        let (mut session, root, message) = seeded();
        session
            .create_topic_from_selection(root, message, "quick", SelectionRange::new(4, 9))
            .unwrap();
        session.view();
        let version = session.layout_cache().tree(root).unwrap().version;
        session.resize(300.0, 200.0);
        let view = session.view();
        assert_eq!(session.layout_cache().tree(root).unwrap().version, version);
        assert_eq!(view.node(NodeKey::Conversation(root)).unwrap().x, 150.0);
    }

    #[test]
    fn clear_tree_evicts_cache_and_positions() {
        let (mut session, root, _) = seeded();
        session.view();
        session.pointer_down(NodeKey::Conversation(root), 1, 0.0, 0.0);
        session.pointer_move(1, 100.0, 100.0, Instant::now());
        session.pointer_up(1, Instant::now());
        assert!(!session.manual_positions().is_empty());

        session.clear_tree(root);
        assert!(session.layout_cache().tree(root).is_none());
        assert!(session.manual_positions().is_empty());
    }
}
