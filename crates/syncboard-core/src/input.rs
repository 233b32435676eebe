//! Pointer and keyboard routing.
//!
//! Mouse, touch and pen pointers are tracked by id. Only one pointer owns the
//! gesture slot at a time; everything else is ignored until it lets go.
//! Positions passed in are viewport coordinates; stroke points come back in
//! canvas coordinates (viewport plus scroll).

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Currently selected tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Freehand drawing.
    #[default]
    Pen,
    /// Place a sticky note on the next click.
    Sticky,
    /// Nothing selected.
    None,
}

/// Default stroke color.
pub const DEFAULT_COLOR: &str = "#000";

/// Identifies one pointer (mouse, a touch contact, or a pen).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerId(pub u64);

/// Gesture slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerState {
    Idle,
    Drawing {
        pointer: PointerId,
    },
    Panning {
        pointer: PointerId,
        /// Viewport position where the pan started.
        start: Point,
        /// Scroll offset when the pan started.
        origin: Vec2,
    },
}

/// What a pointer or key event means for the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputAction {
    None,
    /// Start a stroke at this canvas point.
    BeginStroke(Point),
    /// Continue the stroke to this canvas point.
    ExtendStroke(Point),
    EndStroke,
    /// Place a sticky note at this viewport point.
    PlaceNote(Point),
    /// Scroll the viewport to this offset.
    ScrollTo(Vec2),
    EndPan,
}

/// Per-pointer input state machine.
#[derive(Debug, Clone)]
pub struct InputRouter {
    state: PointerState,
    space_held: bool,
    text_input_focused: bool,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRouter {
    pub fn new() -> Self {
        Self {
            state: PointerState::Idle,
            space_held: false,
            text_input_focused: false,
        }
    }

    pub fn state(&self) -> PointerState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, PointerState::Drawing { .. })
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.state, PointerState::Panning { .. })
    }

    /// Whether Space is held for panning.
    pub fn space_held(&self) -> bool {
        self.space_held
    }

    /// Track whether a text field (e.g. a note being edited) has focus.
    pub fn set_text_input_focused(&mut self, focused: bool) {
        self.text_input_focused = focused;
        if focused {
            self.space_held = false;
        }
    }

    /// Key pressed. Returns true if the key was consumed.
    pub fn key_down(&mut self, key: &str) -> bool {
        if !is_space(key) || self.text_input_focused {
            return false;
        }
        self.space_held = true;
        true
    }

    /// Key released.
    pub fn key_up(&mut self, key: &str) {
        if is_space(key) {
            self.space_held = false;
        }
    }

    pub fn pointer_down(
        &mut self,
        pointer: PointerId,
        position: Point,
        tool: Tool,
        scroll: Vec2,
    ) -> InputAction {
        if self.state != PointerState::Idle {
            log::debug!("Ignoring pointer {:?}: slot is busy", pointer);
            return InputAction::None;
        }

        if self.space_held {
            self.state = PointerState::Panning {
                pointer,
                start: position,
                origin: scroll,
            };
            return InputAction::None;
        }

        match tool {
            Tool::Pen => {
                self.state = PointerState::Drawing { pointer };
                InputAction::BeginStroke(position + scroll)
            }
            Tool::Sticky => InputAction::PlaceNote(position),
            Tool::None => InputAction::None,
        }
    }

    pub fn pointer_move(
        &mut self,
        pointer: PointerId,
        position: Point,
        scroll: Vec2,
    ) -> InputAction {
        match self.state {
            PointerState::Drawing { pointer: owner } if owner == pointer => {
                InputAction::ExtendStroke(position + scroll)
            }
            PointerState::Panning {
                pointer: owner,
                start,
                origin,
            } if owner == pointer => {
                let target = origin - (position - start);
                InputAction::ScrollTo(Vec2::new(target.x.max(0.0), target.y.max(0.0)))
            }
            _ => InputAction::None,
        }
    }

    pub fn pointer_up(&mut self, pointer: PointerId) -> InputAction {
        match self.state {
            PointerState::Drawing { pointer: owner } if owner == pointer => {
                self.state = PointerState::Idle;
                InputAction::EndStroke
            }
            PointerState::Panning { pointer: owner, .. } if owner == pointer => {
                self.state = PointerState::Idle;
                InputAction::EndPan
            }
            _ => InputAction::None,
        }
    }

    /// Release the slot whatever owns it.
    pub fn cancel_all(&mut self) -> InputAction {
        let action = match self.state {
            PointerState::Drawing { .. } => InputAction::EndStroke,
            PointerState::Panning { .. } => InputAction::EndPan,
            PointerState::Idle => InputAction::None,
        };
        self.state = PointerState::Idle;
        action
    }
}

fn is_space(key: &str) -> bool {
    key == " " || key == "Space"
}
