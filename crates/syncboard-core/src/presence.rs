//! Presence gate: who is drawing, and whether we may start.
//!
//! Only one user draws at a time. The gate keeps the last presence snapshot
//! from the relay, tracks when each user's drawing status last changed, and
//! treats an `isDrawing` flag as stale once it has gone quiet for longer than
//! the presence timeout. It never touches the board.

use crate::config::BoardConfig;
use crate::protocol::PresenceUser;
use crate::timer::{Deadline, Duration, Instant, SystemTime, UNIX_EPOCH};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Default number of avatars shown before the "+N" overflow.
pub const DEFAULT_MAX_AVATARS: usize = 5;

/// Refusal to start a stroke while someone else is drawing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DrawingDenied {
    /// The user holding the lock, if known.
    pub user_id: Option<String>,
    pub message: String,
}

/// Browser-level signals that should end a stuck gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSignal {
    WindowBlur,
    WindowFocus,
    VisibilityChanged { hidden: bool },
    /// Pointer released anywhere in the document.
    PointerUp,
    TouchEnd,
    TouchCancel,
    RuntimeError,
}

/// What the session should do about a liveness signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// End the stroke and ask the relay to clear our drawing lock.
    ForceEnd,
    Ignore,
}

/// Avatar strip contents.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSummary {
    pub connected: usize,
    pub avatars: Vec<PresenceUser>,
    /// Users beyond the avatar limit ("+N").
    pub overflow: usize,
}

#[derive(Debug, Clone)]
struct Notification {
    message: String,
    expires: Deadline,
}

/// Exclusivity policy and transient "someone is drawing" notifications.
#[derive(Debug, Clone)]
pub struct PresenceGate {
    local_user_id: Option<String>,
    users: Vec<PresenceUser>,
    /// Last time each user's drawing status was seen to change.
    last_activity: HashMap<String, Instant>,
    timeout: Duration,
    notification_duration: Duration,
    notification: Option<Notification>,
}

impl PresenceGate {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            local_user_id: None,
            users: Vec::new(),
            last_activity: HashMap::new(),
            timeout: config.presence_timeout(),
            notification_duration: config.notification_duration(),
            notification: None,
        }
    }

    /// Set the id the relay uses for this client. That user never blocks
    /// local drawing.
    pub fn set_local_user_id(&mut self, id: Option<String>) {
        self.local_user_id = id;
    }

    /// Last presence snapshot, in relay order.
    pub fn users(&self) -> &[PresenceUser] {
        &self.users
    }

    /// Store a new presence snapshot.
    pub fn update_presence(&mut self, users: Vec<PresenceUser>, now: Instant) {
        for user in &users {
            let changed = match self.users.iter().find(|prev| prev.id == user.id) {
                Some(prev) => {
                    prev.is_drawing != user.is_drawing
                        || prev.last_status_change != user.last_status_change
                }
                None => true,
            };
            if !changed {
                continue;
            }
            match status_age(user.last_status_change.as_ref()) {
                Some(age) if age >= self.timeout => {
                    log::debug!("Presence stamp for {} is already stale", user.id);
                    self.last_activity.remove(&user.id);
                }
                Some(age) => {
                    let since = now.checked_sub(age).unwrap_or(now);
                    self.last_activity.insert(user.id.clone(), since);
                }
                None => {
                    self.last_activity.insert(user.id.clone(), now);
                }
            }
        }
        self.last_activity
            .retain(|id, _| users.iter().any(|user| &user.id == id));

        log::debug!("Presence update: {} users", users.len());
        self.users = users;
    }

    /// Refresh a user's activity, e.g. when their strokes arrive.
    pub fn note_remote_activity(&mut self, user_id: &str, now: Instant) {
        if self.users.iter().any(|user| user.id == user_id) {
            self.last_activity.insert(user_id.to_string(), now);
        }
    }

    /// The remote user currently holding the drawing lock.
    pub fn drawing_user(&self, now: Instant) -> Option<&PresenceUser> {
        self.users.iter().find(|user| {
            user.is_drawing
                && self.local_user_id.as_deref() != Some(user.id.as_str())
                && self
                    .last_activity
                    .get(&user.id)
                    .is_some_and(|last| now.saturating_duration_since(*last) < self.timeout)
        })
    }

    /// Check whether a local stroke may start. Raises the notification on
    /// refusal.
    pub fn check_begin(&mut self, now: Instant) -> Result<(), DrawingDenied> {
        let Some(user) = self.drawing_user(now) else {
            return Ok(());
        };
        let denied = DrawingDenied {
            user_id: Some(user.id.clone()),
            message: drawing_message(Some(user)),
        };
        self.notify(denied.message.clone(), now);
        Err(denied)
    }

    /// The relay refused our stroke.
    pub fn drawing_not_allowed(&mut self, now: Instant) {
        let message = drawing_message(self.drawing_user(now));
        log::info!("Drawing not allowed: {}", message);
        self.notify(message, now);
    }

    /// Decide what to do with a liveness signal.
    pub fn on_signal(&self, signal: LivenessSignal, drawing: bool) -> LivenessVerdict {
        if !drawing {
            return LivenessVerdict::Ignore;
        }
        log::info!("Forcing stroke end on {:?}", signal);
        LivenessVerdict::ForceEnd
    }

    /// Current notification text, if it has not expired.
    pub fn notification(&self, now: Instant) -> Option<&str> {
        self.notification
            .as_ref()
            .filter(|n| !n.expires.is_due(now))
            .map(|n| n.message.as_str())
    }

    /// Drop an expired notification.
    pub fn tick(&mut self, now: Instant) {
        if self.notification.as_ref().is_some_and(|n| n.expires.is_due(now)) {
            self.notification = None;
        }
    }

    /// Whether a notification timer is outstanding.
    pub fn has_pending_timer(&self) -> bool {
        self.notification.is_some()
    }

    /// Drop the notification.
    pub fn cancel_all(&mut self) {
        self.notification = None;
    }

    /// Connected count plus the first `max_avatars` users.
    pub fn summary(&self, max_avatars: usize) -> PresenceSummary {
        let connected = self.users.len();
        PresenceSummary {
            connected,
            avatars: self.users.iter().take(max_avatars).cloned().collect(),
            overflow: connected.saturating_sub(max_avatars),
        }
    }

    fn notify(&mut self, message: String, now: Instant) {
        self.notification = Some(Notification {
            message,
            expires: Deadline::after(now, self.notification_duration),
        });
    }
}

fn drawing_message(user: Option<&PresenceUser>) -> String {
    match user {
        Some(user) => format!("User {} is currently drawing", user.initial),
        None => "Someone else is currently drawing".to_string(),
    }
}

/// Age of a `lastStatusChange` stamp given as epoch milliseconds. Other
/// formats, and stamps ahead of the local clock, count as fresh.
fn status_age(stamp: Option<&Value>) -> Option<Duration> {
    let millis = stamp?.as_u64()?;
    SystemTime::now()
        .duration_since(UNIX_EPOCH + Duration::from_millis(millis))
        .ok()
}
