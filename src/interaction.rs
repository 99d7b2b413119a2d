//! Pointer-driven drag and click handling for laid-out nodes.
//!
//! Each gesture moves through `Idle -> PotentialDrag -> Dragging -> Idle`.
//! A press that never travels past [`DRAG_THRESHOLD_PX`] is a click; one
//! that does commits a manual position on every move, and the click that
//! the browser fires right after the release is swallowed for
//! [`CLICK_SUPPRESS_WINDOW`].

use crate::layout::Viewport;
use crate::model::{ConversationId, NodeKey};
use crate::positions::NormalizedPoint;
use std::time::{Duration, Instant};

pub const DRAG_THRESHOLD_PX: f32 = 5.0;
pub const CLICK_SUPPRESS_WINDOW: Duration = Duration::from_millis(50);

pub type PointerId = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    PotentialDrag {
        node: NodeKey,
        pointer: PointerId,
        origin: (f32, f32),
    },
    Dragging {
        node: NodeKey,
        pointer: PointerId,
    },
}

/// What the host should do with pointer capture after a pointer-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerDown {
    Ignored,
    Captured(PointerId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragUpdate {
    pub node: NodeKey,
    pub point: NormalizedPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Nothing was being tracked for this pointer.
    None,
    Click(NodeKey),
    DragEnded(NodeKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    Select(ConversationId),
    ExpandCluster(ConversationId),
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    state: DragState,
    locked: bool,
    suppress_click_until: Option<Instant>,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
            locked: false,
            suppress_click_until: None,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Locking abandons any gesture in flight.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        if locked {
            self.state = DragState::Idle;
        }
    }

    pub fn pointer_down(&mut self, node: NodeKey, pointer: PointerId, x: f32, y: f32) -> PointerDown {
        if self.locked || self.state != DragState::Idle {
            return PointerDown::Ignored;
        }
        self.state = DragState::PotentialDrag {
            node,
            pointer,
            origin: (x, y),
        };
        PointerDown::Captured(pointer)
    }

    /// Returns the position to commit while dragging.
    pub fn pointer_move(&mut self, pointer: PointerId, x: f32, y: f32, viewport: Viewport) -> Option<DragUpdate> {
        let node = match self.state {
            DragState::PotentialDrag {
                node,
                pointer: active,
                origin,
            } if active == pointer => {
                let dx = x - origin.0;
                let dy = y - origin.1;
                if (dx * dx + dy * dy).sqrt() <= DRAG_THRESHOLD_PX {
                    return None;
                }
                self.state = DragState::Dragging { node, pointer };
                node
            }
            DragState::Dragging { node, pointer: active } if active == pointer => node,
            _ => return None,
        };
        if viewport.width <= 0.0 || viewport.height <= 0.0 {
            return None;
        }
        Some(DragUpdate {
            node,
            point: NormalizedPoint::new(x / viewport.width, y / viewport.height),
        })
    }

    pub fn pointer_up(&mut self, pointer: PointerId, now: Instant) -> Release {
        match self.state {
            DragState::PotentialDrag { node, pointer: active, .. } if active == pointer => {
                self.state = DragState::Idle;
                Release::Click(node)
            }
            DragState::Dragging { node, pointer: active } if active == pointer => {
                self.state = DragState::Idle;
                self.suppress_click_until = Some(now + CLICK_SUPPRESS_WINDOW);
                Release::DragEnded(node)
            }
            _ => Release::None,
        }
    }

    /// Leaving the surface ends the gesture without producing a click.
    pub fn pointer_leave(&mut self, pointer: PointerId, now: Instant) -> Release {
        match self.pointer_up(pointer, now) {
            Release::Click(_) => Release::None,
            other => other,
        }
    }

    /// Whether a click delivered at `now` should act, or is the tail of a drag.
    pub fn accepts_click(&mut self, now: Instant) -> bool {
        match self.suppress_click_until {
            Some(until) if now <= until => {
                self.suppress_click_until = None;
                false
            }
            _ => {
                self.suppress_click_until = None;
                true
            }
        }
    }

    pub fn click_action(node: NodeKey) -> ClickAction {
        match node {
            NodeKey::Conversation(id) => ClickAction::Select(id),
            NodeKey::Cluster(parent) => ClickAction::ExpandCluster(parent),
        }
    }
}
