//! Drawing state reconciliation.
//!
//! The reconciler exclusively owns the [`Board`] and its [`HistoryManager`].
//! Local edits are applied optimistically and queued for the relay; remote
//! events are merged last-writer-wins without touching history. Either way the
//! render callback sees the new board straight after the mutation.

use crate::board::{Board, NoteId, NotePatch, StickyNote, Stroke};
use crate::config::BoardConfig;
use crate::geometry::clamp_note_position;
use crate::history::HistoryManager;
use crate::protocol::{InboundEvent, Operation, OutboundEvent};
use kurbo::{Point, Size};

/// Identifies one stroke gesture. Handles are invalidated when the board is
/// replaced underneath the gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrokeHandle(u64);

/// Local user-initiated mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalMutation {
    /// Append an empty stroke. Records history first.
    BeginStroke { color: String, start: Point },
    /// Append a sampled point to the active stroke and queue `draw`.
    ExtendStroke { handle: StrokeHandle, point: Point },
    /// Close the active gesture and queue `stop-draw`.
    FinishStroke,
    Undo,
    Redo,
    /// Remove every stroke. Records history first.
    Clear,
    /// Insert a note and queue `add-note`.
    AddNote(StickyNote),
    /// Merge a patch into a note. Emission is left to the note store's
    /// throttle and debounce policy.
    UpdateNote(NotePatch),
    /// Remove a note and queue `delete-sticky-note`.
    RemoveNote(NoteId),
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    handle: StrokeHandle,
    index: usize,
}

type BoardCallback = Box<dyn FnMut(&Board)>;

/// Owns the canonical board, history and outbound queue.
pub struct DrawingStateReconciler {
    board: Board,
    history: HistoryManager,
    /// Pending outgoing events.
    outgoing: Vec<OutboundEvent>,
    /// Stroke currently being drawn, if it is still on the board.
    active: Option<ActiveStroke>,
    next_gesture: u64,
    /// True until the first full board arrives.
    loading: bool,
    canvas_size: Size,
    note_size: Size,
    on_board_changed: Option<BoardCallback>,
}

impl DrawingStateReconciler {
    /// Create a reconciler with an empty board.
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            board: Board::new(),
            history: HistoryManager::new(config.history_limit),
            outgoing: Vec::new(),
            active: None,
            next_gesture: 0,
            loading: false,
            canvas_size: config.canvas_size(),
            note_size: config.note_size(),
            on_board_changed: None,
        }
    }

    /// Read-only view of the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Handle of the gesture in progress, if its stroke is still attached.
    pub fn active_stroke(&self) -> Option<StrokeHandle> {
        self.active.map(|active| active.handle)
    }

    /// Register the render callback. Replaces any previous one.
    pub fn set_on_board_changed(&mut self, callback: impl FnMut(&Board) + 'static) {
        self.on_board_changed = Some(Box::new(callback));
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Mark the board as waiting for its first `load-drawing`.
    pub fn begin_loading(&mut self) {
        self.loading = true;
    }

    // --- Outbox ---

    /// Queue an outbound event.
    pub fn emit(&mut self, event: OutboundEvent) {
        log::debug!("Queued '{}'", event.name());
        self.outgoing.push(event);
    }

    /// Take pending outgoing events (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<OutboundEvent> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing events.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Local mutations ---

    /// Apply a local mutation. Returns true if the board changed.
    pub fn apply_local(&mut self, mutation: LocalMutation) -> bool {
        let changed = match mutation {
            LocalMutation::BeginStroke { color, start } => {
                self.history.record_before_mutation(&self.board.paths);
                self.board.paths.push(Stroke::new(color, start));
                self.next_gesture += 1;
                self.active = Some(ActiveStroke {
                    handle: StrokeHandle(self.next_gesture),
                    index: self.board.paths.len() - 1,
                });
                true
            }
            LocalMutation::ExtendStroke { handle, point } => {
                let Some(active) = self.active.filter(|active| active.handle == handle) else {
                    log::debug!("Dropping point for detached stroke {:?}", handle);
                    return false;
                };
                let Some(stroke) = self.board.paths.get_mut(active.index) else {
                    self.active = None;
                    return false;
                };
                stroke.points.push(point);
                let stroke = stroke.clone();
                self.emit(OutboundEvent::Draw(stroke));
                true
            }
            LocalMutation::FinishStroke => {
                self.active = None;
                let paths = self.board.paths.clone();
                self.emit(OutboundEvent::StopDraw { paths });
                false
            }
            LocalMutation::Undo => {
                let Some(previous) = self.history.undo(&self.board.paths) else {
                    return false;
                };
                self.replace_paths(previous);
                self.emit_full_paths(Operation::Undo);
                true
            }
            LocalMutation::Redo => {
                let Some(next) = self.history.redo(&self.board.paths) else {
                    return false;
                };
                self.replace_paths(next);
                self.emit_full_paths(Operation::Redo);
                true
            }
            LocalMutation::Clear => {
                self.history.record_before_mutation(&self.board.paths);
                self.replace_paths(Vec::new());
                self.emit_full_paths(Operation::Clear);
                self.emit(OutboundEvent::ClearCanvas);
                true
            }
            LocalMutation::AddNote(mut note) => {
                note.position = self.clamp(note.position);
                if !self.board.insert_note(note.clone()) {
                    log::debug!("Note {} already exists", note.id);
                    return false;
                }
                self.emit(OutboundEvent::AddNote(note));
                true
            }
            LocalMutation::UpdateNote(patch) => self.merge_note(&patch),
            LocalMutation::RemoveNote(id) => {
                if self.board.remove_note(&id).is_none() {
                    log::debug!("Cannot remove unknown note {}", id);
                    return false;
                }
                self.emit(OutboundEvent::DeleteStickyNote(id));
                true
            }
        };

        if changed {
            self.notify();
        }
        changed
    }

    // --- Remote events ---

    /// Merge a remote event. Never records history. Returns true if the
    /// board changed.
    pub fn apply_remote(&mut self, event: InboundEvent) -> bool {
        let changed = match event {
            InboundEvent::LoadDrawing { paths, sticky_notes } => {
                log::info!(
                    "Loaded board: {} paths, {} notes",
                    paths.len(),
                    sticky_notes.len()
                );
                self.replace_paths(paths);
                self.board.sticky_notes.clear();
                for mut note in sticky_notes {
                    note.position = self.clamp(note.position);
                    if !self.board.insert_note(note) {
                        log::debug!("Dropping duplicate note in loaded board");
                    }
                }
                self.loading = false;
                true
            }
            InboundEvent::DrawingUpdated { paths, operation } => {
                if operation == Operation::Clear || paths.is_empty() {
                    self.replace_paths(Vec::new());
                } else {
                    self.replace_paths(paths);
                }
                true
            }
            InboundEvent::CanvasCleared => {
                self.replace_paths(Vec::new());
                true
            }
            InboundEvent::NoteAdded(mut note) => {
                note.position = self.clamp(note.position);
                let id = note.id.clone();
                let inserted = self.board.insert_note(note);
                if !inserted {
                    log::debug!("Ignoring replayed note {}", id);
                }
                inserted
            }
            InboundEvent::NoteUpdated(patch) => self.merge_note(&patch),
            InboundEvent::NoteDeleted(id) => {
                let removed = self.board.remove_note(&id).is_some();
                if !removed {
                    log::debug!("Ignoring delete of unknown note {}", id);
                }
                removed
            }
            InboundEvent::PresenceUpdate(_) | InboundEvent::DrawingNotAllowed => false,
        };

        if changed {
            self.notify();
        }
        changed
    }

    /// Connection came back: forget the in-progress stroke and ask for the
    /// current board. History is kept.
    pub fn on_reconnect(&mut self) {
        if self.active.take().is_some() {
            log::info!("Detached in-progress stroke on reconnect");
        }
        self.emit(OutboundEvent::LoadDraw);
    }

    fn merge_note(&mut self, patch: &NotePatch) -> bool {
        let (canvas, note_size) = (self.canvas_size, self.note_size);
        let Some(note) = self.board.note_mut(&patch.id) else {
            log::debug!("Ignoring update for unknown note {}", patch.id);
            return false;
        };
        patch.apply_to(note);
        note.position = clamp_note_position(note.position, canvas, note_size);
        true
    }

    /// Wholesale path replacement. Any active stroke index is no longer
    /// meaningful afterwards.
    fn replace_paths(&mut self, paths: Vec<Stroke>) {
        if self.active.take().is_some() {
            log::debug!("Board replaced under an active stroke");
        }
        self.board.paths = paths;
    }

    fn emit_full_paths(&mut self, operation: Operation) {
        let event = OutboundEvent::UpdateDrawing {
            paths: self.board.paths.clone(),
            sticky_notes: self.board.sticky_notes.clone(),
            operation,
        };
        self.emit(event);
    }

    fn clamp(&self, position: Point) -> Point {
        clamp_note_position(position, self.canvas_size, self.note_size)
    }

    fn notify(&mut self) {
        if let Some(callback) = self.on_board_changed.as_mut() {
            callback(&self.board);
        }
    }
}
