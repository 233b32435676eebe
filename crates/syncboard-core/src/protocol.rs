//! Wire protocol: event names, outbound payloads and inbound parsing.
//!
//! Every message is an event name plus a JSON payload. Outbound events are
//! built from typed values; inbound events are validated here so the
//! reconciler only ever sees well-formed data.

use crate::board::{NoteId, NotePatch, StickyNote, Stroke};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

// --- Event names ---

pub const DRAW: &str = "draw";
pub const STOP_DRAW: &str = "stop-draw";
pub const UPDATE_DRAWING: &str = "update-drawing";
pub const LOAD_DRAW: &str = "load-draw";
pub const LOAD_DRAWING: &str = "load-drawing";
pub const CLEAR_CANVAS: &str = "clear-canvas";
pub const ADD_NOTE: &str = "add-note";
pub const NOTE_ADDED: &str = "note-added";
pub const UPDATE_NOTE: &str = "updateNote";
pub const DELETE_STICKY_NOTE: &str = "delete-sticky-note";
pub const STICKY_NOTE_DELETED: &str = "sticky-note-deleted";
pub const USER_PRESENCE_UPDATE: &str = "user-presence-update";
pub const DRAWING_NOT_ALLOWED: &str = "drawing-not-allowed";
pub const FORCE_CLEAR_DRAWING_STATE: &str = "force-clear-drawing-state";
pub const ENSURE_DRAWING_STOPPED: &str = "ensure-drawing-stopped";

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    #[error("Malformed '{event}' payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid '{event}' payload: {reason}")]
    Invalid { event: String, reason: String },
    #[error("Failed to encode '{event}': {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Which kind of drawing change a full-paths message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Update,
    Undo,
    Redo,
    Clear,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Update => "update",
            Operation::Undo => "undo",
            Operation::Redo => "redo",
            Operation::Clear => "clear",
        }
    }

    /// Map a wire tag. Missing or unrecognized tags read as `Update`.
    pub fn from_wire(tag: Option<&str>) -> Self {
        match tag {
            Some("undo") => Operation::Undo,
            Some("redo") => Operation::Redo,
            Some("clear") => Operation::Clear,
            _ => Operation::Update,
        }
    }
}

/// Origin tag on full-paths messages. Clients always send `client`.
pub const SOURCE_CLIENT: &str = "client";

/// A connected user as broadcast by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub id: String,
    /// Single character shown in the avatar.
    #[serde(default)]
    pub initial: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub is_drawing: bool,
    /// Server stamp of the last drawing status change. Only compared for
    /// equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_change: Option<Value>,
}

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// In-progress stroke.
    Draw(Stroke),
    /// Gesture finished; carries every stroke.
    StopDraw { paths: Vec<Stroke> },
    /// Whole-paths replacement (undo, redo, clear).
    UpdateDrawing {
        paths: Vec<Stroke>,
        sticky_notes: Vec<StickyNote>,
        operation: Operation,
    },
    /// Ask for the current board.
    LoadDraw,
    ClearCanvas,
    AddNote(StickyNote),
    UpdateNote(NotePatch),
    DeleteStickyNote(NoteId),
    /// Ask the relay to drop any drawing lock held for this client.
    ForceClearDrawingState,
    /// Sent when a stroke was force-ended by the watchdog.
    EnsureDrawingStopped,
}

impl OutboundEvent {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Draw(_) => DRAW,
            OutboundEvent::StopDraw { .. } => STOP_DRAW,
            OutboundEvent::UpdateDrawing { .. } => UPDATE_DRAWING,
            OutboundEvent::LoadDraw => LOAD_DRAW,
            OutboundEvent::ClearCanvas => CLEAR_CANVAS,
            OutboundEvent::AddNote(_) => ADD_NOTE,
            OutboundEvent::UpdateNote(_) => UPDATE_NOTE,
            OutboundEvent::DeleteStickyNote(_) => DELETE_STICKY_NOTE,
            OutboundEvent::ForceClearDrawingState => FORCE_CLEAR_DRAWING_STATE,
            OutboundEvent::EnsureDrawingStopped => ENSURE_DRAWING_STOPPED,
        }
    }

    /// JSON payload for this event.
    pub fn payload(&self) -> ProtocolResult<Value> {
        let encode = |source: serde_json::Error| ProtocolError::Encode {
            event: self.name(),
            source,
        };

        let value = match self {
            OutboundEvent::Draw(stroke) => serde_json::to_value(stroke).map_err(encode)?,
            OutboundEvent::StopDraw { paths } => json!({
                "paths": serde_json::to_value(paths).map_err(encode)?,
                "operation": Operation::Update.as_str(),
                "source": SOURCE_CLIENT,
            }),
            OutboundEvent::UpdateDrawing {
                paths,
                sticky_notes,
                operation,
            } => json!({
                "paths": serde_json::to_value(paths).map_err(encode)?,
                "stickyNotes": serde_json::to_value(sticky_notes).map_err(encode)?,
                "operation": operation.as_str(),
                "source": SOURCE_CLIENT,
            }),
            OutboundEvent::LoadDraw | OutboundEvent::ForceClearDrawingState => Value::Null,
            OutboundEvent::ClearCanvas | OutboundEvent::EnsureDrawingStopped => json!({}),
            OutboundEvent::AddNote(note) => serde_json::to_value(note).map_err(encode)?,
            OutboundEvent::UpdateNote(patch) => serde_json::to_value(patch).map_err(encode)?,
            OutboundEvent::DeleteStickyNote(id) => json!({ "id": id }),
        };
        Ok(value)
    }

    /// Name and payload, ready for a transport.
    pub fn encode(&self) -> ProtocolResult<(&'static str, Value)> {
        Ok((self.name(), self.payload()?))
    }
}

/// Validated messages received from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Full board in answer to `load-draw`.
    LoadDrawing {
        paths: Vec<Stroke>,
        sticky_notes: Vec<StickyNote>,
    },
    /// Whole-paths broadcast (`update-drawing` or a relayed `stop-draw`).
    DrawingUpdated {
        paths: Vec<Stroke>,
        operation: Operation,
    },
    CanvasCleared,
    NoteAdded(StickyNote),
    NoteUpdated(NotePatch),
    NoteDeleted(NoteId),
    PresenceUpdate(Vec<PresenceUser>),
    DrawingNotAllowed,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadDrawingPayload {
    #[serde(default)]
    paths: Vec<Stroke>,
    #[serde(default)]
    sticky_notes: Vec<StickyNote>,
}

#[derive(Deserialize)]
struct DrawingUpdatePayload {
    paths: Vec<Stroke>,
    #[serde(default)]
    operation: Option<String>,
}

impl InboundEvent {
    /// Parse and validate a raw transport message.
    pub fn parse(event: &str, payload: Value) -> ProtocolResult<Self> {
        let malformed = |source: serde_json::Error| ProtocolError::Malformed {
            event: event.to_string(),
            source,
        };

        match event {
            LOAD_DRAWING => {
                let payload = if payload.is_null() { json!({}) } else { payload };
                let data: LoadDrawingPayload = serde_json::from_value(payload).map_err(malformed)?;
                Ok(InboundEvent::LoadDrawing {
                    paths: data.paths,
                    sticky_notes: data.sticky_notes,
                })
            }
            UPDATE_DRAWING | STOP_DRAW => {
                let data: DrawingUpdatePayload =
                    serde_json::from_value(payload).map_err(malformed)?;
                Ok(InboundEvent::DrawingUpdated {
                    paths: data.paths,
                    operation: Operation::from_wire(data.operation.as_deref()),
                })
            }
            CLEAR_CANVAS => Ok(InboundEvent::CanvasCleared),
            NOTE_ADDED => {
                let note: StickyNote = serde_json::from_value(payload).map_err(malformed)?;
                validate_id(event, &note.id)?;
                Ok(InboundEvent::NoteAdded(note))
            }
            UPDATE_NOTE => {
                let patch: NotePatch = serde_json::from_value(payload).map_err(malformed)?;
                validate_id(event, &patch.id)?;
                Ok(InboundEvent::NoteUpdated(patch))
            }
            STICKY_NOTE_DELETED => {
                let id = match payload {
                    Value::String(id) => NoteId(id),
                    Value::Object(mut map) => match map.remove("id") {
                        Some(Value::String(id)) => NoteId(id),
                        _ => {
                            return Err(ProtocolError::Invalid {
                                event: event.to_string(),
                                reason: "missing string id".to_string(),
                            });
                        }
                    },
                    other => {
                        return Err(ProtocolError::Invalid {
                            event: event.to_string(),
                            reason: format!("expected id, got {}", preview(&other)),
                        });
                    }
                };
                validate_id(event, &id)?;
                Ok(InboundEvent::NoteDeleted(id))
            }
            USER_PRESENCE_UPDATE => {
                let users: Vec<PresenceUser> =
                    serde_json::from_value(payload).map_err(malformed)?;
                Ok(InboundEvent::PresenceUpdate(users))
            }
            DRAWING_NOT_ALLOWED => Ok(InboundEvent::DrawingNotAllowed),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn validate_id(event: &str, id: &NoteId) -> ProtocolResult<()> {
    if id.as_str().is_empty() {
        return Err(ProtocolError::Invalid {
            event: event.to_string(),
            reason: "empty note id".to_string(),
        });
    }
    Ok(())
}

/// Short rendering of a payload for log lines.
pub(crate) fn preview(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(100) {
        Some((end, _)) => text[..end].to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn test_stop_draw_payload() {
        let event = OutboundEvent::StopDraw {
            paths: vec![Stroke::new("#000", Point::ZERO)],
        };
        let (name, payload) = event.encode().unwrap();
        assert_eq!(name, "stop-draw");
        assert_eq!(payload["operation"], "update");
        assert_eq!(payload["source"], "client");
        assert_eq!(payload["paths"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_update_drawing_payload() {
        let event = OutboundEvent::UpdateDrawing {
            paths: Vec::new(),
            sticky_notes: Vec::new(),
            operation: Operation::Clear,
        };
        let payload = event.payload().unwrap();
        assert_eq!(
            payload,
            json!({"paths": [], "stickyNotes": [], "operation": "clear", "source": "client"})
        );
    }

    #[test]
    fn test_delete_payload_carries_id() {
        let event = OutboundEvent::DeleteStickyNote(NoteId::from("n1"));
        assert_eq!(event.name(), "delete-sticky-note");
        assert_eq!(event.payload().unwrap(), json!({"id": "n1"}));
    }

    #[test]
    fn test_parse_load_drawing() {
        let payload = json!({
            "paths": [{"color": "#000", "start": {"x": 0, "y": 0}, "points": []}],
            "stickyNotes": [{"id": "a", "position": {"x": 1, "y": 2}, "content": "hi"}],
        });
        match InboundEvent::parse("load-drawing", payload).unwrap() {
            InboundEvent::LoadDrawing { paths, sticky_notes } => {
                assert_eq!(paths.len(), 1);
                assert_eq!(sticky_notes[0].content, "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_load_drawing_empty() {
        let event = InboundEvent::parse("load-drawing", Value::Null).unwrap();
        assert_eq!(
            event,
            InboundEvent::LoadDrawing {
                paths: Vec::new(),
                sticky_notes: Vec::new()
            }
        );
    }

    #[test]
    fn test_parse_update_drawing_operation() {
        let event = InboundEvent::parse(
            "update-drawing",
            json!({"paths": [], "operation": "clear", "source": "client"}),
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::DrawingUpdated {
                paths: Vec::new(),
                operation: Operation::Clear
            }
        );

        let event = InboundEvent::parse("stop-draw", json!({"paths": []})).unwrap();
        assert!(matches!(
            event,
            InboundEvent::DrawingUpdated {
                operation: Operation::Update,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            InboundEvent::parse("update-drawing", json!({"paths": "nope"})),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            InboundEvent::parse("note-added", json!({"content": "x"})),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            InboundEvent::parse("updateNote", json!({"id": ""})),
            Err(ProtocolError::Invalid { .. })
        ));
        assert!(matches!(
            InboundEvent::parse("mystery", Value::Null),
            Err(ProtocolError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_parse_note_deleted_forms() {
        assert_eq!(
            InboundEvent::parse("sticky-note-deleted", json!("a")).unwrap(),
            InboundEvent::NoteDeleted(NoteId::from("a"))
        );
        assert_eq!(
            InboundEvent::parse("sticky-note-deleted", json!({"id": "b", "content": ""})).unwrap(),
            InboundEvent::NoteDeleted(NoteId::from("b"))
        );
        assert!(InboundEvent::parse("sticky-note-deleted", json!(5)).is_err());
    }

    #[test]
    fn test_parse_presence() {
        let payload = json!([
            {
                "id": "u1",
                "initial": "A",
                "color": "#f00",
                "isDrawing": true,
                "lastStatusChange": 1700000000000u64
            },
            {"id": "u2", "initial": "B", "color": "#0f0", "isDrawing": false},
        ]);
        match InboundEvent::parse("user-presence-update", payload).unwrap() {
            InboundEvent::PresenceUpdate(users) => {
                assert_eq!(users.len(), 2);
                assert!(users[0].is_drawing);
                assert!(users[0].last_status_change.is_some());
                assert!(users[1].last_status_change.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let value = Value::String("é".repeat(200));
        let text = preview(&value);
        assert_eq!(text.chars().count(), 100);
    }
}
