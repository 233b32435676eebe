//! Sticky note editing with rate-limited emission.
//!
//! Every edit lands on the board immediately. What goes on the wire is
//! shaped per note: drags are throttled to one trailing update per window,
//! a release sends one authoritative position, and typing sends live updates
//! plus a debounced final copy once the user pauses.

use crate::board::{NoteId, NotePatch, PositionPatch, StickyNote};
use crate::config::BoardConfig;
use crate::geometry::clamp_note_position;
use crate::protocol::OutboundEvent;
use crate::reconciler::{DrawingStateReconciler, LocalMutation};
use crate::timer::{Debounce, Duration, Instant, Throttle};
use kurbo::{Point, Size, Vec2};
use std::collections::{BTreeMap, BTreeSet};

/// A local edit to a sticky note.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteUpdate {
    /// Pointer moved while dragging.
    Drag { position: Point },
    /// Drag finished.
    Release { position: Point },
    /// Text changed.
    Content { content: String },
}

/// Create, edit and delete sticky notes.
#[derive(Debug, Clone)]
pub struct StickyNoteStore {
    canvas_size: Size,
    note_size: Size,
    throttle_window: Duration,
    debounce_delay: Duration,
    /// Pending drag positions per note.
    drags: BTreeMap<NoteId, Throttle<Point>>,
    /// Pending final-content emissions per note.
    typing: BTreeMap<NoteId, Debounce<()>>,
    /// Notes between their first drag and the release.
    dragging: BTreeSet<NoteId>,
}

impl StickyNoteStore {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            canvas_size: config.canvas_size(),
            note_size: config.note_size(),
            throttle_window: config.position_throttle(),
            debounce_delay: config.content_debounce(),
            drags: BTreeMap::new(),
            typing: BTreeMap::new(),
            dragging: BTreeSet::new(),
        }
    }

    /// Place a new note at `raw` (viewport coordinates) scrolled by
    /// `scroll`.
    pub fn create(
        &mut self,
        reconciler: &mut DrawingStateReconciler,
        raw: Point,
        scroll: Vec2,
    ) -> StickyNote {
        let position = clamp_note_position(raw + scroll, self.canvas_size, self.note_size);
        let note = StickyNote::new(position);
        log::debug!("Creating note {} at {:?}", note.id, position);
        reconciler.apply_local(LocalMutation::AddNote(note.clone()));
        note
    }

    /// Apply an edit. Unknown ids are ignored. Returns true if a note
    /// changed.
    pub fn update(
        &mut self,
        reconciler: &mut DrawingStateReconciler,
        id: &NoteId,
        update: NoteUpdate,
        now: Instant,
    ) -> bool {
        if !reconciler.board().contains_note(id) {
            log::debug!("Ignoring edit for unknown note {}", id);
            return false;
        }

        match update {
            NoteUpdate::Drag { position } => {
                let position = self.move_note(reconciler, id, position);
                self.dragging.insert(id.clone());
                self.drags
                    .entry(id.clone())
                    .or_insert_with(|| Throttle::new(self.throttle_window))
                    .offer(position, now);
            }
            NoteUpdate::Release { position } => {
                let position = self.move_note(reconciler, id, position);
                self.dragging.remove(id);
                if let Some(mut throttle) = self.drags.remove(id) {
                    throttle.cancel();
                }
                reconciler.emit(OutboundEvent::UpdateNote(NotePatch {
                    position: Some(position.into()),
                    is_final_position: true,
                    ..NotePatch::new(id.clone())
                }));
            }
            NoteUpdate::Content { content } => {
                let patch = NotePatch {
                    content: Some(content),
                    ..NotePatch::new(id.clone())
                };
                reconciler.apply_local(LocalMutation::UpdateNote(patch.clone()));
                reconciler.emit(OutboundEvent::UpdateNote(NotePatch {
                    is_content_update: true,
                    ..patch
                }));
                self.typing
                    .entry(id.clone())
                    .or_insert_with(|| Debounce::new(self.debounce_delay))
                    .schedule((), now);
            }
        }
        true
    }

    /// Delete a note and cancel its timers. Returns false if it was absent.
    pub fn remove(&mut self, reconciler: &mut DrawingStateReconciler, id: &NoteId) -> bool {
        self.forget(id);
        reconciler.apply_local(LocalMutation::RemoveNote(id.clone()))
    }

    /// Drop all local edit state for a note deleted elsewhere.
    pub fn forget(&mut self, id: &NoteId) {
        self.drags.remove(id);
        self.typing.remove(id);
        self.dragging.remove(id);
    }

    /// Whether a debounced content emission is pending for this note.
    pub fn is_editing(&self, id: &NoteId) -> bool {
        self.typing.get(id).is_some_and(|debounce| debounce.is_pending())
    }

    /// Whether the note is being dragged locally.
    pub fn is_dragging(&self, id: &NoteId) -> bool {
        self.dragging.contains(id)
    }

    /// Strip the fields of a remote patch that a local edit in progress
    /// owns. Content is kept while typing, position while dragging.
    pub fn guard_remote(&self, mut patch: NotePatch) -> NotePatch {
        if self.is_editing(&patch.id) && patch.content.take().is_some() {
            log::debug!("Keeping local content of note {} over remote update", patch.id);
        }
        if self.is_dragging(&patch.id) && patch.position.take().is_some() {
            log::debug!("Keeping local position of note {} over remote update", patch.id);
        }
        patch
    }

    /// Fire due throttle and debounce emissions.
    pub fn poll(&mut self, reconciler: &mut DrawingStateReconciler, now: Instant) {
        let board = reconciler.board();
        self.drags.retain(|id, _| board.contains_note(id));
        self.typing.retain(|id, _| board.contains_note(id));
        self.dragging.retain(|id| board.contains_note(id));

        for (id, throttle) in self.drags.iter_mut() {
            if let Some(position) = throttle.poll(now) {
                reconciler.emit(OutboundEvent::UpdateNote(NotePatch {
                    position: Some(position.into()),
                    ..NotePatch::new(id.clone())
                }));
            }
        }
        self.drags.retain(|_, throttle| throttle.is_pending());

        for (id, debounce) in self.typing.iter_mut() {
            if debounce.poll(now).is_none() {
                continue;
            }
            let Some(note) = reconciler.board().note(id) else {
                continue;
            };
            let patch = NotePatch {
                position: Some(PositionPatch::from(note.position)),
                content: Some(note.content.clone()),
                is_final_content: true,
                ..NotePatch::new(id.clone())
            };
            reconciler.emit(OutboundEvent::UpdateNote(patch));
        }
        self.typing.retain(|_, debounce| debounce.is_pending());
    }

    /// Cancel every pending emission.
    pub fn cancel_all(&mut self) {
        self.drags.clear();
        self.typing.clear();
        self.dragging.clear();
    }

    /// Number of outstanding timers.
    pub fn pending_timers(&self) -> usize {
        self.drags.values().filter(|t| t.is_pending()).count()
            + self.typing.values().filter(|d| d.is_pending()).count()
    }

    /// Move a note on the board and return where it ended up after clamping.
    fn move_note(
        &self,
        reconciler: &mut DrawingStateReconciler,
        id: &NoteId,
        position: Point,
    ) -> Point {
        let position = clamp_note_position(position, self.canvas_size, self.note_size);
        reconciler.apply_local(LocalMutation::UpdateNote(NotePatch {
            position: Some(position.into()),
            ..NotePatch::new(id.clone())
        }));
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InboundEvent;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn setup() -> (StickyNoteStore, DrawingStateReconciler, NoteId) {
        let config = BoardConfig::default();
        let mut store = StickyNoteStore::new(&config);
        let mut reconciler = DrawingStateReconciler::new(&config);
        let note = store.create(&mut reconciler, Point::new(10.0, 10.0), Vec2::ZERO);
        reconciler.take_outgoing();
        (store, reconciler, note.id)
    }

    fn drag(x: f64, y: f64) -> NoteUpdate {
        NoteUpdate::Drag {
            position: Point::new(x, y),
        }
    }

    fn release(x: f64, y: f64) -> NoteUpdate {
        NoteUpdate::Release {
            position: Point::new(x, y),
        }
    }

    fn typed(content: &str) -> NoteUpdate {
        NoteUpdate::Content {
            content: content.to_string(),
        }
    }

    fn note_updates(reconciler: &mut DrawingStateReconciler) -> Vec<NotePatch> {
        reconciler
            .take_outgoing()
            .into_iter()
            .filter_map(|event| match event {
                OutboundEvent::UpdateNote(patch) => Some(patch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_create_adds_scroll_and_clamps() {
        let config = BoardConfig::default();
        let mut store = StickyNoteStore::new(&config);
        let mut reconciler = DrawingStateReconciler::new(&config);

        let scroll = Vec2::new(200.0, 10.0);
        let note = store.create(&mut reconciler, Point::new(100.0, 50.0), scroll);
        assert_eq!(note.position, Point::new(300.0, 60.0));
        assert!(note.content.is_empty());

        let scroll = Vec2::new(2000.0, 2000.0);
        let far = store.create(&mut reconciler, Point::new(900.0, 900.0), scroll);
        assert_eq!(far.position, Point::new(1664.0, 824.0));
        assert_ne!(note.id, far.id);

        let names: Vec<&str> = reconciler.take_outgoing().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["add-note", "add-note"]);
    }

    #[test]
    fn test_drag_is_throttled_trailing_edge() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();

        for i in 0..5u32 {
            let at = t0 + ms(u64::from(i) * 10);
            store.update(&mut reconciler, &id, drag(20.0 + f64::from(i), 20.0), at);
        }
        // Board follows the pointer immediately.
        assert_eq!(reconciler.board().note(&id).unwrap().position, Point::new(24.0, 20.0));

        store.poll(&mut reconciler, t0 + ms(49));
        assert!(note_updates(&mut reconciler).is_empty());

        store.poll(&mut reconciler, t0 + ms(50));
        let sent = note_updates(&mut reconciler);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].position, Some(PositionPatch::from(Point::new(24.0, 20.0))));
        assert!(!sent[0].is_final_position);
        assert_eq!(store.pending_timers(), 0);
    }

    #[test]
    fn test_release_cancels_throttle() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();

        store.update(&mut reconciler, &id, drag(30.0, 30.0), t0);
        store.update(&mut reconciler, &id, release(40.0, 40.0), t0 + ms(20));

        let sent = note_updates(&mut reconciler);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is_final_position);
        assert_eq!(store.pending_timers(), 0);

        store.poll(&mut reconciler, t0 + ms(1000));
        assert!(note_updates(&mut reconciler).is_empty());
    }

    #[test]
    fn test_content_live_then_debounced_final() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();

        store.update(&mut reconciler, &id, typed("h"), t0);
        store.update(&mut reconciler, &id, typed("hi"), t0 + ms(300));

        let live = note_updates(&mut reconciler);
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|p| p.is_content_update && !p.is_final_content));

        store.poll(&mut reconciler, t0 + ms(500));
        assert!(note_updates(&mut reconciler).is_empty());

        store.poll(&mut reconciler, t0 + ms(800));
        let fin = note_updates(&mut reconciler);
        assert_eq!(fin.len(), 1);
        assert!(fin[0].is_final_content);
        assert_eq!(fin[0].content.as_deref(), Some("hi"));
        assert_eq!(fin[0].position, Some(PositionPatch::from(Point::new(10.0, 10.0))));
    }

    #[test]
    fn test_remove_cancels_timers() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();

        store.update(&mut reconciler, &id, typed("x"), t0);
        store.update(&mut reconciler, &id, drag(5.0, 5.0), t0);
        assert_eq!(store.pending_timers(), 2);

        assert!(store.remove(&mut reconciler, &id));
        assert_eq!(store.pending_timers(), 0);
        reconciler.take_outgoing();

        store.poll(&mut reconciler, t0 + ms(10_000));
        assert!(!reconciler.has_outgoing());
        assert!(!store.remove(&mut reconciler, &id));
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let (mut store, mut reconciler, _) = setup();
        let before = reconciler.board().clone();
        let unknown = NoteId::from("missing");

        assert!(!store.update(&mut reconciler, &unknown, typed("x"), Instant::now()));
        assert_eq!(reconciler.board(), &before);
        assert!(!reconciler.has_outgoing());
        assert_eq!(store.pending_timers(), 0);
    }

    #[test]
    fn test_cancel_all() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();
        store.update(&mut reconciler, &id, typed("x"), t0);
        reconciler.take_outgoing();

        store.cancel_all();
        assert_eq!(store.pending_timers(), 0);
        store.poll(&mut reconciler, t0 + ms(10_000));
        assert!(!reconciler.has_outgoing());
    }

    #[test]
    fn test_forget_drops_timers_of_deleted_note() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();
        store.update(&mut reconciler, &id, drag(40.0, 40.0), t0);
        store.update(&mut reconciler, &id, typed("x"), t0);
        reconciler.take_outgoing();

        store.forget(&id);
        assert_eq!(store.pending_timers(), 0);
        assert!(!store.is_dragging(&id));
        assert!(!store.is_editing(&id));
    }

    #[test]
    fn test_poll_skips_notes_missing_from_board() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();
        store.update(&mut reconciler, &id, drag(40.0, 40.0), t0);
        store.update(&mut reconciler, &id, typed("x"), t0);
        // Deleted behind the store's back.
        reconciler.apply_remote(InboundEvent::NoteDeleted(id.clone()));
        reconciler.take_outgoing();

        store.poll(&mut reconciler, t0 + ms(60));
        store.poll(&mut reconciler, t0 + ms(10_000));
        assert!(!reconciler.has_outgoing());
        assert_eq!(store.pending_timers(), 0);
    }

    #[test]
    fn test_guard_remote_keeps_local_edits() {
        let (mut store, mut reconciler, id) = setup();
        let t0 = Instant::now();
        let remote = NotePatch {
            position: Some(Point::new(500.0, 500.0).into()),
            content: Some("theirs".to_string()),
            ..NotePatch::new(id.clone())
        };
        assert_eq!(store.guard_remote(remote.clone()), remote);

        store.update(&mut reconciler, &id, typed("mine"), t0);
        let guarded = store.guard_remote(remote.clone());
        assert_eq!(guarded.content, None);
        assert_eq!(guarded.position, remote.position);

        store.update(&mut reconciler, &id, drag(40.0, 40.0), t0);
        let guarded = store.guard_remote(remote.clone());
        assert_eq!(guarded.content, None);
        assert_eq!(guarded.position, None);

        store.update(&mut reconciler, &id, release(40.0, 40.0), t0);
        store.poll(&mut reconciler, t0 + ms(1000));
        assert!(!store.is_editing(&id));
        assert_eq!(store.guard_remote(remote.clone()), remote);
    }
}
