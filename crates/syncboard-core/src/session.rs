//! Whiteboard session: wires input, strokes, notes, presence and the
//! reconciler to a transport.
//!
//! Hosts forward pointer, key and window events plus a periodic [`tick`]
//! with the current time, and call [`handle_transport_events`] whenever the
//! transport may have traffic. Everything runs on the caller's thread.
//!
//! [`tick`]: WhiteboardSession::tick
//! [`handle_transport_events`]: WhiteboardSession::handle_transport_events

use crate::board::{Board, NoteId, StickyNote};
use crate::config::{BoardConfig, ConfigResult};
use crate::geometry::is_near_viewport;
use crate::input::{DEFAULT_COLOR, InputAction, InputRouter, PointerId, Tool};
use crate::notes::{NoteUpdate, StickyNoteStore};
use crate::presence::{LivenessSignal, LivenessVerdict, PresenceGate, PresenceSummary};
use crate::protocol::{InboundEvent, OutboundEvent, preview};
use crate::reconciler::{DrawingStateReconciler, LocalMutation};
use crate::stroke::StrokeBuilder;
use crate::timer::{Deadline, Instant};
use crate::transport::{ConnectionHandle, TransportAdapter, TransportEvent, TransportResult};
use kurbo::{Point, Size, Vec2};
use serde_json::Value;

/// A connected whiteboard client.
pub struct WhiteboardSession<T: TransportAdapter> {
    config: BoardConfig,
    transport: T,
    connection: Option<ConnectionHandle>,
    reconciler: DrawingStateReconciler,
    strokes: StrokeBuilder,
    notes: StickyNoteStore,
    presence: PresenceGate,
    input: InputRouter,
    tool: Tool,
    color: String,
    /// Viewport offset into the canvas.
    scroll: Vec2,
    viewport: Size,
    /// Pending `force-clear-drawing-state` after a failed `stop-draw`.
    force_clear_retry: Option<Deadline>,
    torn_down: bool,
}

impl<T: TransportAdapter> WhiteboardSession<T> {
    /// Create a session over `transport`. The config is validated first.
    pub fn new(transport: T, config: BoardConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            connection: None,
            reconciler: DrawingStateReconciler::new(&config),
            strokes: StrokeBuilder::new(&config),
            notes: StickyNoteStore::new(&config),
            presence: PresenceGate::new(&config),
            input: InputRouter::new(),
            tool: Tool::default(),
            color: DEFAULT_COLOR.to_string(),
            scroll: Vec2::ZERO,
            viewport: config.canvas_size(),
            force_clear_retry: None,
            torn_down: false,
            config,
        })
    }

    // --- Accessors ---

    pub fn board(&self) -> &Board {
        self.reconciler.board()
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn presence(&self) -> &PresenceGate {
        &self.presence
    }

    /// Handle of the live connection, if any.
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.connection
    }

    /// True from `connect` until the first full board arrives.
    pub fn is_loading(&self) -> bool {
        self.reconciler.is_loading()
    }

    pub fn is_drawing(&self) -> bool {
        self.strokes.is_active()
    }

    pub fn can_undo(&self) -> bool {
        self.reconciler.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.reconciler.can_redo()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    pub fn scroll(&self) -> Vec2 {
        self.scroll
    }

    /// Set the viewport offset. Negative offsets clamp to zero.
    pub fn set_scroll(&mut self, scroll: Vec2) {
        self.scroll = Vec2::new(scroll.x.max(0.0), scroll.y.max(0.0));
    }

    pub fn set_viewport_size(&mut self, size: Size) {
        self.viewport = size;
    }

    /// Id the relay uses for this client in presence snapshots.
    pub fn set_local_user_id(&mut self, id: Option<String>) {
        self.presence.set_local_user_id(id);
    }

    /// Register the render callback.
    pub fn set_on_board_changed(&mut self, callback: impl FnMut(&Board) + 'static) {
        self.reconciler.set_on_board_changed(callback);
    }

    /// Current transient notification.
    pub fn notification(&self, now: Instant) -> Option<&str> {
        self.presence.notification(now)
    }

    /// Avatar strip contents.
    pub fn presence_summary(&self, max_avatars: usize) -> PresenceSummary {
        self.presence.summary(max_avatars)
    }

    /// Notes close enough to the viewport to render.
    pub fn visible_notes(&self) -> Vec<&StickyNote> {
        let note_size = self.config.note_size();
        self.board()
            .sticky_notes
            .iter()
            .filter(|note| {
                is_near_viewport(
                    note.position,
                    self.viewport,
                    self.scroll,
                    note_size,
                    self.config.viewport_buffer,
                )
            })
            .collect()
    }

    /// Number of outstanding timers of any kind.
    pub fn pending_timers(&self) -> usize {
        self.notes.pending_timers()
            + usize::from(self.strokes.has_pending_timer())
            + usize::from(self.presence.has_pending_timer())
            + usize::from(self.force_clear_retry.is_some())
    }

    // --- Connection ---

    /// Connect and request the current board.
    pub fn connect(&mut self, now: Instant) -> TransportResult<ConnectionHandle> {
        let handle = self.transport.connect()?;
        log::info!("Connected ({:?}), loading board", handle);
        self.connection = Some(handle);
        self.torn_down = false;
        self.reconciler.begin_loading();
        self.reconciler.emit(OutboundEvent::LoadDraw);
        self.flush(now);
        Ok(handle)
    }

    /// Drain and dispatch everything the transport has received.
    pub fn handle_transport_events(&mut self, now: Instant) {
        if self.torn_down {
            return;
        }
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Connected => log::info!("Transport connected"),
                TransportEvent::Reconnected => {
                    log::info!("Transport reconnected, reloading board");
                    self.strokes.cancel();
                    self.input.cancel_all();
                    self.reconciler.begin_loading();
                    self.reconciler.on_reconnect();
                }
                TransportEvent::Disconnected => log::warn!("Transport disconnected"),
                TransportEvent::Message { event, payload } => {
                    self.handle_message(&event, payload, now);
                }
            }
        }
        self.flush(now);
    }

    /// Handle one inbound message. Returns true if the board changed.
    pub fn handle_message(&mut self, event: &str, payload: Value, now: Instant) -> bool {
        log::debug!("Received '{}': {}", event, preview(&payload));
        let inbound = match InboundEvent::parse(event, payload) {
            Ok(inbound) => inbound,
            Err(e) => {
                log::warn!("Dropping inbound message: {}", e);
                return false;
            }
        };

        match inbound {
            InboundEvent::PresenceUpdate(users) => {
                self.presence.update_presence(users, now);
                false
            }
            InboundEvent::DrawingNotAllowed => {
                self.presence.drawing_not_allowed(now);
                false
            }
            InboundEvent::NoteUpdated(patch) => {
                let patch = self.notes.guard_remote(patch);
                self.reconciler.apply_remote(InboundEvent::NoteUpdated(patch))
            }
            InboundEvent::NoteDeleted(id) => {
                self.notes.forget(&id);
                self.reconciler.apply_remote(InboundEvent::NoteDeleted(id))
            }
            other => self.reconciler.apply_remote(other),
        }
    }

    // --- Input ---

    pub fn pointer_down(&mut self, pointer: PointerId, position: Point, now: Instant) {
        let action = self
            .input
            .pointer_down(pointer, position, self.tool, self.scroll);
        self.perform(action, now);
    }

    pub fn pointer_move(&mut self, pointer: PointerId, position: Point, now: Instant) {
        let action = self.input.pointer_move(pointer, position, self.scroll);
        self.perform(action, now);
    }

    pub fn pointer_up(&mut self, pointer: PointerId, now: Instant) {
        let action = self.input.pointer_up(pointer);
        self.perform(action, now);
    }

    /// Key pressed. Returns true if the session consumed it.
    pub fn key_down(&mut self, key: &str) -> bool {
        self.input.key_down(key)
    }

    pub fn key_up(&mut self, key: &str) {
        self.input.key_up(key);
    }

    pub fn set_text_input_focused(&mut self, focused: bool) {
        self.input.set_text_input_focused(focused);
    }

    /// Window, visibility, global pointer or error signal.
    pub fn on_signal(&mut self, signal: LivenessSignal, now: Instant) {
        if self.presence.on_signal(signal, self.strokes.is_active()) == LivenessVerdict::ForceEnd {
            self.input.cancel_all();
            self.strokes.end(&mut self.reconciler);
            self.reconciler.emit(OutboundEvent::ForceClearDrawingState);
            self.flush(now);
        }
    }

    fn perform(&mut self, action: InputAction, now: Instant) {
        match action {
            InputAction::BeginStroke(start) => {
                let began = self.strokes.begin(
                    &mut self.reconciler,
                    &mut self.presence,
                    self.tool,
                    &self.color,
                    start,
                    now,
                );
                if began.is_none() {
                    self.input.cancel_all();
                }
            }
            InputAction::ExtendStroke(point) => {
                if let Some(handle) = self.strokes.handle() {
                    self.strokes.extend(&mut self.reconciler, handle, point);
                }
            }
            InputAction::EndStroke => {
                self.strokes.end(&mut self.reconciler);
            }
            InputAction::PlaceNote(raw) => {
                self.notes.create(&mut self.reconciler, raw, self.scroll);
                self.tool = Tool::None;
            }
            InputAction::ScrollTo(scroll) => self.set_scroll(scroll),
            InputAction::EndPan | InputAction::None => {}
        }
        self.flush(now);
    }

    // --- Board commands ---

    pub fn undo(&mut self, now: Instant) -> bool {
        self.finish_gesture();
        let changed = self.reconciler.apply_local(LocalMutation::Undo);
        self.flush(now);
        changed
    }

    pub fn redo(&mut self, now: Instant) -> bool {
        self.finish_gesture();
        let changed = self.reconciler.apply_local(LocalMutation::Redo);
        self.flush(now);
        changed
    }

    /// Remove every stroke. Notes stay.
    pub fn clear(&mut self, now: Instant) -> bool {
        self.finish_gesture();
        let changed = self.reconciler.apply_local(LocalMutation::Clear);
        self.flush(now);
        changed
    }

    /// Place a note at a viewport position.
    pub fn create_note(&mut self, raw: Point, now: Instant) -> StickyNote {
        let note = self.notes.create(&mut self.reconciler, raw, self.scroll);
        self.flush(now);
        note
    }

    pub fn update_note(&mut self, id: &NoteId, update: NoteUpdate, now: Instant) -> bool {
        let changed = self.notes.update(&mut self.reconciler, id, update, now);
        self.flush(now);
        changed
    }

    pub fn remove_note(&mut self, id: &NoteId, now: Instant) -> bool {
        let removed = self.notes.remove(&mut self.reconciler, id);
        self.flush(now);
        removed
    }

    // --- Timers ---

    /// Drive deferred work.
    pub fn tick(&mut self, now: Instant) {
        if self.torn_down {
            return;
        }

        self.notes.poll(&mut self.reconciler, now);
        self.presence.tick(now);

        if self.strokes.watchdog_expired(now) {
            log::info!("Stroke exceeded maximum duration, forcing end");
            self.input.cancel_all();
            self.strokes.end(&mut self.reconciler);
            self.reconciler.emit(OutboundEvent::EnsureDrawingStopped);
        }

        if self.force_clear_retry.is_some_and(|retry| retry.is_due(now)) {
            self.force_clear_retry = None;
            log::info!("Retrying drawing state clear");
            self.reconciler.emit(OutboundEvent::ForceClearDrawingState);
        }

        self.flush(now);
    }

    /// Cancel every timer, end any gesture and disconnect.
    pub fn teardown(&mut self, now: Instant) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.notes.cancel_all();
        self.presence.cancel_all();
        self.force_clear_retry = None;
        self.input.cancel_all();
        self.strokes.end(&mut self.reconciler);
        self.flush(now);

        self.transport.disconnect();
        self.connection = None;
        log::info!("Session torn down");
    }

    fn finish_gesture(&mut self) {
        if self.strokes.is_active() {
            self.input.cancel_all();
            self.strokes.end(&mut self.reconciler);
        }
    }

    /// Send everything queued. Failures are logged; drawing carries on
    /// locally.
    fn flush(&mut self, now: Instant) {
        for event in self.reconciler.take_outgoing() {
            let (name, payload) = match event.encode() {
                Ok(encoded) => encoded,
                Err(e) => {
                    log::error!("{}", e);
                    continue;
                }
            };
            log::debug!("Sending '{}': {}", name, preview(&payload));

            if let Err(e) = self.transport.send(name, payload) {
                log::error!("Failed to send '{}': {}", name, e);
                if matches!(event, OutboundEvent::StopDraw { .. })
                    && !self.torn_down
                    && self.force_clear_retry.is_none()
                {
                    self.force_clear_retry =
                        Some(Deadline::after(now, self.config.force_clear_retry()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use crate::timer::Duration;
    use serde_json::json;

    const MOUSE: PointerId = PointerId(1);

    fn session() -> (WhiteboardSession<MemoryTransport>, MemoryTransport, Instant) {
        let relay = MemoryTransport::new();
        let mut session = WhiteboardSession::new(relay.clone(), BoardConfig::default()).unwrap();
        let t0 = Instant::now();
        session.connect(t0).unwrap();
        session.handle_transport_events(t0);
        relay.take_sent();
        (session, relay, t0)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_connect_requests_board_and_loads() {
        let relay = MemoryTransport::new();
        let mut session = WhiteboardSession::new(relay.clone(), BoardConfig::default()).unwrap();
        let t0 = Instant::now();

        session.connect(t0).unwrap();
        assert!(session.is_loading());
        assert_eq!(relay.sent_events(), vec!["load-draw"]);

        relay.push_message("load-drawing", json!({"paths": [], "stickyNotes": []}));
        session.handle_transport_events(t0);
        assert!(!session.is_loading());
    }

    #[test]
    fn test_draw_gesture_sends_events() {
        let (mut session, relay, t0) = session();

        session.pointer_down(MOUSE, Point::new(10.0, 10.0), t0);
        session.pointer_move(MOUSE, Point::new(20.0, 10.0), t0);
        session.pointer_move(MOUSE, Point::new(20.5, 10.0), t0);
        session.pointer_up(MOUSE, t0);

        assert_eq!(relay.sent_events(), vec!["draw", "stop-draw"]);
        assert_eq!(session.board().paths[0].points.len(), 1);
        assert!(!session.is_drawing());
    }

    #[test]
    fn test_sticky_tool_places_note_and_resets() {
        let (mut session, relay, t0) = session();
        session.set_scroll(Vec2::new(100.0, 0.0));
        session.set_tool(Tool::Sticky);

        session.pointer_down(MOUSE, Point::new(50.0, 50.0), t0);
        assert_eq!(session.tool(), Tool::None);
        assert_eq!(session.board().sticky_notes[0].position, Point::new(150.0, 50.0));
        assert_eq!(relay.sent_events(), vec!["add-note"]);
    }

    #[test]
    fn test_malformed_inbound_is_dropped() {
        let (mut session, relay, t0) = session();
        relay.push_message("update-drawing", json!({"paths": 12}));
        relay.push_message("not-an-event", Value::Null);
        session.handle_transport_events(t0);
        assert!(session.board().is_empty());
    }

    #[test]
    fn test_failed_stop_draw_schedules_retry() {
        let (mut session, relay, t0) = session();
        session.pointer_down(MOUSE, Point::ZERO, t0);
        relay.set_fail_sends(true);
        session.pointer_up(MOUSE, t0);
        relay.set_fail_sends(false);

        session.tick(t0 + ms(999));
        assert!(relay.sent_events().is_empty());
        session.tick(t0 + ms(1000));
        assert_eq!(relay.sent_events(), vec!["force-clear-drawing-state"]);

        session.tick(t0 + ms(5000));
        assert_eq!(relay.sent_events().len(), 1);
    }

    #[test]
    fn test_watchdog_forces_end() {
        let (mut session, relay, t0) = session();
        session.pointer_down(MOUSE, Point::ZERO, t0);
        session.tick(t0 + Duration::from_secs(30));

        assert!(!session.is_drawing());
        assert_eq!(relay.sent_events(), vec!["stop-draw", "ensure-drawing-stopped"]);

        // The pointer that started the stroke no longer draws.
        session.pointer_move(MOUSE, Point::new(50.0, 50.0), t0);
        assert!(session.board().paths[0].points.is_empty());
    }

    #[test]
    fn test_liveness_signal_forces_end() {
        let (mut session, relay, t0) = session();
        session.on_signal(LivenessSignal::WindowBlur, t0);
        assert!(relay.sent_events().is_empty());

        session.pointer_down(MOUSE, Point::ZERO, t0);
        session.on_signal(LivenessSignal::WindowBlur, t0);
        assert!(!session.is_drawing());
        assert_eq!(relay.sent_events(), vec!["stop-draw", "force-clear-drawing-state"]);
    }

    #[test]
    fn test_visible_notes() {
        let (mut session, _relay, t0) = session();
        session.set_viewport_size(Size::new(800.0, 600.0));
        session.create_note(Point::new(10.0, 10.0), t0);
        session.create_note(Point::new(1600.0, 10.0), t0);

        assert_eq!(session.visible_notes().len(), 1);
        session.set_scroll(Vec2::new(1000.0, 0.0));
        assert_eq!(session.visible_notes().len(), 1);
        assert_eq!(session.visible_notes()[0].position.x, 1600.0);
    }

    #[test]
    fn test_teardown_cancels_everything() {
        let (mut session, relay, t0) = session();
        let note = session.create_note(Point::ZERO, t0);
        session.update_note(&note.id, NoteUpdate::Content { content: "x".into() }, t0);
        let drag = NoteUpdate::Drag {
            position: Point::new(9.0, 9.0),
        };
        session.update_note(&note.id, drag, t0);
        session.pointer_down(MOUSE, Point::new(400.0, 400.0), t0);
        assert!(session.pending_timers() >= 3);

        session.teardown(t0);
        assert_eq!(session.pending_timers(), 0);
        assert!(!session.is_drawing());
        relay.take_sent();

        session.tick(t0 + Duration::from_secs(60));
        assert!(relay.take_sent().is_empty());
    }

    #[test]
    fn test_remote_delete_cancels_note_timers() {
        let (mut session, relay, t0) = session();
        let note = session.create_note(Point::new(10.0, 10.0), t0);
        let drag = NoteUpdate::Drag {
            position: Point::new(40.0, 40.0),
        };
        session.update_note(&note.id, drag, t0);
        session.update_note(&note.id, NoteUpdate::Content { content: "x".into() }, t0);
        relay.take_sent();

        relay.push_message("sticky-note-deleted", json!({"id": note.id.as_str()}));
        session.handle_transport_events(t0 + ms(10));
        assert!(session.board().sticky_notes.is_empty());
        assert_eq!(session.pending_timers(), 0);

        session.tick(t0 + ms(60));
        session.tick(t0 + Duration::from_secs(5));
        assert!(relay.take_sent().is_empty());
    }

    #[test]
    fn test_remote_update_keeps_local_typing() {
        let (mut session, relay, t0) = session();
        let note = session.create_note(Point::new(10.0, 10.0), t0);
        session.update_note(&note.id, NoteUpdate::Content { content: "h".into() }, t0);
        session.update_note(&note.id, NoteUpdate::Content { content: "he".into() }, t0 + ms(50));
        relay.take_sent();

        relay.push_message("updateNote", json!({"id": note.id.as_str(), "content": "h"}));
        session.handle_transport_events(t0 + ms(60));
        assert_eq!(session.board().note(&note.id).unwrap().content, "he");

        session.tick(t0 + ms(600));
        let finals: Vec<Value> = relay
            .take_sent()
            .into_iter()
            .filter(|m| m.payload["isFinalContent"] == json!(true))
            .map(|m| m.payload["content"].clone())
            .collect();
        assert_eq!(finals, vec![json!("he")]);

        // Once the final copy is out, remote text applies again.
        relay.push_message("updateNote", json!({"id": note.id.as_str(), "content": "hey"}));
        session.handle_transport_events(t0 + ms(700));
        assert_eq!(session.board().note(&note.id).unwrap().content, "hey");
    }

    #[test]
    fn test_remote_update_keeps_dragged_position() {
        let (mut session, relay, t0) = session();
        let note = session.create_note(Point::new(10.0, 10.0), t0);
        let drag = NoteUpdate::Drag {
            position: Point::new(40.0, 40.0),
        };
        session.update_note(&note.id, drag, t0);

        let remote = json!({
            "id": note.id.as_str(),
            "position": {"x": 500.0, "y": 500.0},
            "content": "theirs"
        });
        relay.push_message("updateNote", remote.clone());
        session.handle_transport_events(t0 + ms(10));
        let current = session.board().note(&note.id).unwrap();
        assert_eq!(current.position, Point::new(40.0, 40.0));
        assert_eq!(current.content, "theirs");

        let release = NoteUpdate::Release {
            position: Point::new(60.0, 60.0),
        };
        session.update_note(&note.id, release, t0 + ms(20));
        relay.push_message("updateNote", remote);
        session.handle_transport_events(t0 + ms(30));
        assert_eq!(
            session.board().note(&note.id).unwrap().position,
            Point::new(500.0, 500.0)
        );
    }

    #[test]
    fn test_reconnect_shows_loading() {
        let (mut session, relay, t0) = session();
        relay.push_message("load-drawing", json!({"paths": [], "stickyNotes": []}));
        session.handle_transport_events(t0);
        assert!(!session.is_loading());

        relay.simulate_disconnect();
        relay.simulate_reconnect();
        session.handle_transport_events(t0);
        assert!(session.is_loading());

        relay.push_message("load-drawing", json!({"paths": [], "stickyNotes": []}));
        session.handle_transport_events(t0);
        assert!(!session.is_loading());
    }
}
