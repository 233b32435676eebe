//! Board document: strokes, sticky notes and note patches.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a sticky note (a UUID string on the wire).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub String);

impl NoteId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One continuous pen gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// CSS color string.
    pub color: String,
    /// Pointer-down position.
    pub start: Point,
    /// Sampled points after `start`, in gesture order.
    #[serde(default)]
    pub points: Vec<Point>,
}

impl Stroke {
    /// Create a stroke with no points yet.
    pub fn new(color: impl Into<String>, start: Point) -> Self {
        Self {
            color: color.into(),
            start,
            points: Vec::new(),
        }
    }

    /// The last sampled point, or `start` for a dot.
    pub fn last_point(&self) -> Point {
        self.points.last().copied().unwrap_or(self.start)
    }

    /// Bounding box of the stroke.
    pub fn bounds(&self) -> Rect {
        self.points
            .iter()
            .fold(Rect::from_points(self.start, self.start), |rect, p| {
                rect.union_pt(*p)
            })
    }
}

/// A sticky note placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: NoteId,
    /// Absolute top-left position in canvas coordinates.
    pub position: Point,
    #[serde(default)]
    pub content: String,
}

impl StickyNote {
    /// Create an empty note with a fresh id.
    pub fn new(position: Point) -> Self {
        Self {
            id: NoteId::new(),
            position,
            content: String::new(),
        }
    }
}

/// Partial position; each axis merges independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl From<Point> for PositionPatch {
    fn from(point: Point) -> Self {
        Self {
            x: Some(point.x),
            y: Some(point.y),
        }
    }
}

/// Sparse sticky note update as carried by `updateNote`.
///
/// The flags describe how the sender produced the update; they do not change
/// how it is merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    pub id: NoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final_position: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final_content: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_content_update: bool,
}

impl NotePatch {
    /// Empty patch for `id`.
    pub fn new(id: NoteId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Merge this patch into `note`. Top-level fields overwrite; position
    /// axes overwrite independently.
    pub fn apply_to(&self, note: &mut StickyNote) {
        if let Some(position) = self.position {
            if let Some(x) = position.x {
                note.position.x = x;
            }
            if let Some(y) = position.y {
                note.position.y = y;
            }
        }
        if let Some(content) = &self.content {
            note.content.clone_from(content);
        }
    }
}

/// Canonical board state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Strokes in paint order (later on top).
    #[serde(default)]
    pub paths: Vec<Stroke>,
    /// Notes in insertion order, unique by id.
    #[serde(default)]
    pub sticky_notes: Vec<StickyNote>,
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the board has neither strokes nor notes.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.sticky_notes.is_empty()
    }

    /// Get a note by id.
    pub fn note(&self, id: &NoteId) -> Option<&StickyNote> {
        self.sticky_notes.iter().find(|note| &note.id == id)
    }

    /// Get a mutable note by id.
    pub fn note_mut(&mut self, id: &NoteId) -> Option<&mut StickyNote> {
        self.sticky_notes.iter_mut().find(|note| &note.id == id)
    }

    /// Check whether a note with this id exists.
    pub fn contains_note(&self, id: &NoteId) -> bool {
        self.note(id).is_some()
    }

    /// Insert a note unless its id is already present.
    /// Returns true if the note was inserted.
    pub fn insert_note(&mut self, note: StickyNote) -> bool {
        if self.contains_note(&note.id) {
            return false;
        }
        self.sticky_notes.push(note);
        true
    }

    /// Remove a note by id.
    pub fn remove_note(&mut self, id: &NoteId) -> Option<StickyNote> {
        let index = self.sticky_notes.iter().position(|note| &note.id == id)?;
        Some(self.sticky_notes.remove(index))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
