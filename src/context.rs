use crate::graph::ConversationGraph;
use crate::model::{ConversationId, Message, MessageId, SelectionRange, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Complete turns forwarded with each topic-thread message.
pub const MAX_RECENT_TURNS: usize = 4;
/// Parent messages forwarded, ending at the origin message.
pub const PARENT_WINDOW: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPack {
    pub is_topic_thread: bool,
    pub from_conversation_id: ConversationId,
    pub from_message_id: MessageId,
    pub selected_text: String,
    pub selection_range: SelectionRange,
    pub parent_messages: Vec<Message>,
    pub topic_summary: Option<String>,
    pub recent_turns: Vec<Turn>,
}

/// A selection range clamped into `0 <= start <= end <= len`, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedRange {
    pub start: usize,
    pub end: usize,
}

pub fn clamp_selection(range: SelectionRange, len: usize) -> ClampedRange {
    let bound = |offset: i64| -> usize {
        if offset <= 0 {
            0
        } else {
            usize::try_from(offset).map_or(len, |offset| offset.min(len))
        }
    };
    let end = bound(range.end);
    let start = bound(range.start).min(end);
    ClampedRange { start, end }
}

/// Returns the selected span of `text`. Offsets count Unicode scalar values
/// and are clamped, so stale ranges shrink instead of failing.
pub fn extract_selected_text(text: &str, range: SelectionRange) -> String {
    let clamped = clamp_selection(range, text.chars().count());
    text.chars()
        .skip(clamped.start)
        .take(clamped.end - clamped.start)
        .collect()
}

/// Up to `limit` most recent user→assistant pairs, oldest first. Trailing
/// or interleaved messages that do not form a pair are skipped.
pub fn recent_turns(messages: &[Message], limit: usize) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut idx = messages.len();
    while idx >= 2 && turns.len() < limit {
        let answer = &messages[idx - 1];
        let question = &messages[idx - 2];
        if answer.sender == Sender::Assistant && question.sender == Sender::User {
            turns.push(Turn {
                user: question.text.clone(),
                assistant: answer.text.clone(),
            });
            idx -= 2;
        } else {
            idx -= 1;
        }
    }
    turns.reverse();
    turns
}

pub fn build_context_pack(graph: &ConversationGraph, id: ConversationId) -> Option<ContextPack> {
    let edge = graph.inbound_edge(id)?;
    let topic = graph.conversation(id)?;
    let from_message_id = edge.from_message_id?;
    let range = edge.selection_range?;
    let Some(parent) = graph.conversation(edge.from_conversation_id) else {
        debug!(conversation = %id, parent = %edge.from_conversation_id, "topic parent missing");
        return None;
    };
    let Some(origin_idx) = parent.messages.iter().position(|m| m.id == from_message_id) else {
        debug!(conversation = %id, message = %from_message_id, "origin message missing");
        return None;
    };

    let selected_text = extract_selected_text(&parent.messages[origin_idx].text, range);
    if selected_text.is_empty() {
        debug!(conversation = %id, "selection clamped to empty span");
        return None;
    }

    let parent_messages = if topic.topic_summary.is_some() {
        Vec::new()
    } else {
        let window_start = (origin_idx + 1).saturating_sub(PARENT_WINDOW);
        parent.messages[window_start..=origin_idx].to_vec()
    };

    Some(ContextPack {
        is_topic_thread: true,
        from_conversation_id: edge.from_conversation_id,
        from_message_id,
        selected_text,
        selection_range: range,
        parent_messages,
        topic_summary: topic.topic_summary.clone(),
        recent_turns: recent_turns(&topic.messages, MAX_RECENT_TURNS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Conversation, MessageId};

    fn msg(id: u64, sender: Sender, text: &str) -> Message {
        Message {
            id: MessageId(id),
            text: text.to_string(),
            sender,
        }
    }

    #[test]
    fn clamps_out_of_range_offsets() {
        let text = "The quick brown fox";
        assert_eq!(extract_selected_text(text, SelectionRange::new(4, 9)), "quick");
        assert_eq!(extract_selected_text(text, SelectionRange::new(-5, 3)), "The");
        assert_eq!(extract_selected_text(text, SelectionRange::new(16, 500)), "fox");
        assert_eq!(extract_selected_text(text, SelectionRange::new(9, 4)), "");
        assert_eq!(extract_selected_text(text, SelectionRange::new(i64::MIN, i64::MAX)), text);
        assert_eq!(extract_selected_text("", SelectionRange::new(2, 8)), "");
    }

    #[test]
    fn clamped_range_is_ordered_and_bounded() {
        for (start, end) in [(-3, -1), (0, 0), (7, 2), (2, 100), (50, 60)] {
            let clamped = clamp_selection(SelectionRange::new(start, end), 10);
            assert!(clamped.start <= clamped.end);
            assert!(clamped.end <= 10);
        }
    }

    #[test]
    fn selection_counts_chars_not_bytes() {
        assert_eq!(extract_selected_text("héllo wörld", SelectionRange::new(6, 11)), "wörld");
    }

    #[test]
    fn recent_turns_skip_incomplete_tail() {
        let messages = vec![
            msg(1, Sender::User, "q1"),
            msg(2, Sender::Assistant, "a1"),
            msg(3, Sender::User, "q2"),
            msg(4, Sender::Assistant, "a2"),
            msg(5, Sender::User, "pending"),
        ];
        let turns = recent_turns(&messages, MAX_RECENT_TURNS);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "q1");
        assert_eq!(turns[1].assistant, "a2");
    }

    #[test]
    fn recent_turns_are_bounded() {
        let mut messages = Vec::new();
        for i in 0..10u64 {
            messages.push(msg(i * 2, Sender::User, &format!("q{i}")));
            messages.push(msg(i * 2 + 1, Sender::Assistant, &format!("a{i}")));
        }
        let turns = recent_turns(&messages, MAX_RECENT_TURNS);
        assert_eq!(turns.len(), MAX_RECENT_TURNS);
        assert_eq!(turns[0].user, "q6");
        assert_eq!(turns[3].user, "q9");
    }

    fn split_graph(range: SelectionRange) -> ConversationGraph {
        let mut graph = ConversationGraph::new();
        let mut parent = Conversation::new(ConversationId(1), "root");
        parent.messages.push(msg(10, Sender::User, "tell me"));
        parent.messages.push(msg(11, Sender::Assistant, "The quick brown fox"));
        graph.insert(parent).unwrap();
        graph.insert(Conversation::new(ConversationId(2), "quick")).unwrap();
        graph
            .link(ConversationId(2), ConversationId(1), Some(MessageId(11)), Some(range))
            .unwrap();
        graph
    }

    #[test]
    fn ordinary_conversation_has_no_pack() {
        let graph = split_graph(SelectionRange::new(4, 9));
        assert!(build_context_pack(&graph, ConversationId(1)).is_none());
    }

    #[test]
    fn pack_carries_selection_and_parent_window() {
        let graph = split_graph(SelectionRange::new(4, 9));
        let pack = build_context_pack(&graph, ConversationId(2)).unwrap();
        assert!(pack.is_topic_thread);
        assert_eq!(pack.selected_text, "quick");
        assert_eq!(pack.parent_messages.len(), 2);
        assert!(pack.topic_summary.is_none());
        assert!(pack.recent_turns.is_empty());
    }

    #[test]
    fn empty_selection_yields_no_pack() {
        let graph = split_graph(SelectionRange::new(40, 90));
        assert!(build_context_pack(&graph, ConversationId(2)).is_none());
    }

    #[test]
    fn cached_summary_replaces_parent_messages() {
        let mut graph = split_graph(SelectionRange::new(4, 9));
        graph
            .set_topic_summary(ConversationId(2), "foxes".to_string())
            .unwrap();
        let pack = build_context_pack(&graph, ConversationId(2)).unwrap();
        assert!(pack.parent_messages.is_empty());
        assert_eq!(pack.topic_summary.as_deref(), Some("foxes"));
    }

    #[test]
    fn pack_serializes_camel_case() {
        let graph = split_graph(SelectionRange::new(4, 9));
        let pack = build_context_pack(&graph, ConversationId(2)).unwrap();
        let json = serde_json::to_value(&pack).unwrap();
        assert_eq!(json["isTopicThread"], true);
        assert_eq!(json["selectedText"], "quick");
        assert_eq!(json["selectionRange"]["start"], 4);
    }
}
