//! Freehand stroke gestures.

use crate::config::BoardConfig;
use crate::geometry::distance;
use crate::input::Tool;
use crate::presence::PresenceGate;
use crate::reconciler::{DrawingStateReconciler, LocalMutation, StrokeHandle};
use crate::timer::{Deadline, Duration, Instant};
use kurbo::Point;

#[derive(Debug, Clone, Copy)]
enum StrokeState {
    Idle,
    Active {
        handle: StrokeHandle,
        /// Last accepted sample; `None` until the first point lands.
        last: Option<Point>,
        watchdog: Deadline,
    },
}

/// Turns pointer samples into one stroke at a time.
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    state: StrokeState,
    min_distance: f64,
    max_duration: Duration,
}

impl StrokeBuilder {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            state: StrokeState::Idle,
            min_distance: config.min_point_distance,
            max_duration: config.max_stroke_duration(),
        }
    }

    /// Check if a gesture is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self.state, StrokeState::Active { .. })
    }

    /// Handle of the gesture in progress.
    pub fn handle(&self) -> Option<StrokeHandle> {
        match self.state {
            StrokeState::Active { handle, .. } => Some(handle),
            StrokeState::Idle => None,
        }
    }

    /// Start a stroke at `start`.
    ///
    /// Returns `None` without touching the board unless the pen is selected
    /// and nobody else holds the drawing lock. An unfinished previous gesture
    /// is ended first.
    pub fn begin(
        &mut self,
        reconciler: &mut DrawingStateReconciler,
        gate: &mut PresenceGate,
        tool: Tool,
        color: &str,
        start: Point,
        now: Instant,
    ) -> Option<StrokeHandle> {
        if tool != Tool::Pen {
            return None;
        }
        if let Err(denied) = gate.check_begin(now) {
            log::debug!("Stroke refused: {}", denied);
            return None;
        }
        if self.is_active() {
            self.end(reconciler);
        }

        reconciler.apply_local(LocalMutation::BeginStroke {
            color: color.to_string(),
            start,
        });
        let handle = reconciler.active_stroke()?;
        self.state = StrokeState::Active {
            handle,
            last: None,
            watchdog: Deadline::after(now, self.max_duration),
        };
        Some(handle)
    }

    /// Offer a pointer sample. Returns true if it was appended.
    pub fn extend(
        &mut self,
        reconciler: &mut DrawingStateReconciler,
        handle: StrokeHandle,
        point: Point,
    ) -> bool {
        let StrokeState::Active {
            handle: active,
            last,
            watchdog,
        } = self.state
        else {
            return false;
        };
        if active != handle {
            return false;
        }
        if last.is_some_and(|last| distance(point, last) <= self.min_distance) {
            return false;
        }

        if !reconciler.apply_local(LocalMutation::ExtendStroke { handle, point }) {
            return false;
        }
        self.state = StrokeState::Active {
            handle,
            last: Some(point),
            watchdog,
        };
        true
    }

    /// Finish the gesture. Returns false if nothing was active.
    pub fn end(&mut self, reconciler: &mut DrawingStateReconciler) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = StrokeState::Idle;
        reconciler.apply_local(LocalMutation::FinishStroke);
        true
    }

    /// Whether the current gesture has outlived the maximum stroke duration.
    pub fn watchdog_expired(&self, now: Instant) -> bool {
        match self.state {
            StrokeState::Active { watchdog, .. } => watchdog.is_due(now),
            StrokeState::Idle => false,
        }
    }

    /// Whether the watchdog timer is outstanding.
    pub fn has_pending_timer(&self) -> bool {
        self.is_active()
    }

    /// Drop the gesture without emitting anything.
    pub fn cancel(&mut self) {
        self.state = StrokeState::Idle;
    }
}
