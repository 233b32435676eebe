//! SyncBoard Core Library
//!
//! Shared drawing state for a collaborative whiteboard client: strokes and
//! sticky notes on a fixed-size canvas, optimistic local edits, remote
//! reconciliation over a pluggable transport, and bounded undo/redo.
//!
//! Rendering and the socket itself live outside this crate. Hosts drive a
//! [`WhiteboardSession`] with input events, transport traffic and a clock.

pub mod board;
pub mod config;
pub mod geometry;
pub mod history;
pub mod input;
pub mod notes;
pub mod presence;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod stroke;
pub mod timer;
pub mod transport;

pub use board::{Board, NoteId, NotePatch, PositionPatch, StickyNote, Stroke};
pub use config::{BoardConfig, ConfigError};
pub use history::HistoryManager;
pub use input::{InputAction, InputRouter, PointerId, Tool};
pub use notes::{NoteUpdate, StickyNoteStore};
pub use presence::{DrawingDenied, LivenessSignal, LivenessVerdict, PresenceGate, PresenceSummary};
pub use protocol::{InboundEvent, Operation, OutboundEvent, PresenceUser, ProtocolError};
pub use reconciler::{DrawingStateReconciler, LocalMutation, StrokeHandle};
pub use session::WhiteboardSession;
pub use stroke::StrokeBuilder;
pub use transport::{
    ConnectionHandle, ConnectionState, MemoryTransport, TransportAdapter, TransportError,
    TransportEvent,
};
