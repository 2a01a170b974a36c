//! Gesture classification
//!
//! Classifies pointer movement into tap, drag or multitouch. The classifier is a
//! pure function; [`GestureTracker`] follows a single gesture from grant to
//! release and re-classifies on every move, so the emitted type is the one at
//! release time.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ProfileSettings;
use crate::types::{GestureType, Point};

/// Pointer movement captured since gesture start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub dx: f64,
    pub dy: f64,
    pub active_touch_count: u32,
}

impl PointerSample {
    pub fn new(dx: f64, dy: f64, active_touch_count: u32) -> Self {
        Self {
            dx,
            dy,
            active_touch_count,
        }
    }

    /// Straight-line displacement
    pub fn displacement(&self) -> f64 {
        self.dx.hypot(self.dy)
    }
}

/// Classify a movement sample.
///
/// Multitouch is checked first and wins over any displacement. Otherwise the
/// gesture is a drag once the displacement strictly exceeds the profile's drag
/// threshold.
pub fn classify(sample: &PointerSample, profile: &ProfileSettings) -> GestureType {
    if sample.active_touch_count >= 2 {
        GestureType::Multitouch
    } else if sample.displacement() > profile.drag_threshold_px {
        GestureType::Drag
    } else {
        GestureType::Tap
    }
}

/// A gesture finalized at release
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedGesture {
    /// Where the first finger landed
    pub start: Point,
    /// Where the gesture ended (start + final displacement)
    pub end: Point,
    pub gesture_type: GestureType,
    pub granted_at: DateTime<Utc>,
    pub released_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ActiveGesture {
    start: Point,
    granted_at: DateTime<Utc>,
    dx: f64,
    dy: f64,
    peak_touches: u32,
    current: GestureType,
}

/// Result of a touch-down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// A new gesture started
    Started,
    /// Trailing finger of a multitouch gesture, ignored
    Debounced,
    /// Non-finite coordinates, ignored
    Rejected,
}

/// Tracks one in-progress gesture
#[derive(Debug, Clone)]
pub struct GestureTracker {
    profile: ProfileSettings,
    active: Option<ActiveGesture>,
    last_multitouch_release: Option<DateTime<Utc>>,
}

impl GestureTracker {
    pub fn new(profile: ProfileSettings) -> Self {
        Self {
            profile,
            active: None,
            last_multitouch_release: None,
        }
    }

    /// Whether a gesture is in progress
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Current (provisional) classification of the in-progress gesture
    pub fn current(&self) -> Option<GestureType> {
        self.active.as_ref().map(|g| g.current)
    }

    /// Start a gesture. A grant while another is in progress restarts it.
    pub fn grant(&mut self, at: Point, touches: u32, now: DateTime<Utc>) -> GrantOutcome {
        if !at.is_finite() {
            debug!(x = at.x, y = at.y, "dropping touch-down with non-finite coordinates");
            return GrantOutcome::Rejected;
        }

        if let Some(released) = self.last_multitouch_release {
            let debounce = chrono::Duration::milliseconds(self.profile.multitouch_debounce_ms as i64);
            if now >= released && now - released < debounce {
                debug!("ignoring trailing touch after multitouch release");
                return GrantOutcome::Debounced;
            }
        }

        let touches = touches.max(1);
        let current = classify(&PointerSample::new(0.0, 0.0, touches), &self.profile);
        self.active = Some(ActiveGesture {
            start: at,
            granted_at: now,
            dx: 0.0,
            dy: 0.0,
            peak_touches: touches,
            current,
        });
        GrantOutcome::Started
    }

    /// Update the displacement since grant. Returns the new classification.
    pub fn move_to(&mut self, dx: f64, dy: f64, touches: u32) -> Option<GestureType> {
        if !dx.is_finite() || !dy.is_finite() {
            debug!("dropping pointer move with non-finite displacement");
            return self.current();
        }

        let profile = self.profile;
        let gesture = self.active.as_mut()?;
        gesture.dx = dx;
        gesture.dy = dy;
        gesture.peak_touches = gesture.peak_touches.max(touches);
        gesture.current = classify(
            &PointerSample::new(dx, dy, gesture.peak_touches),
            &profile,
        );
        Some(gesture.current)
    }

    /// Finalize the gesture. Returns `None` if nothing was in progress.
    pub fn release(&mut self, now: DateTime<Utc>) -> Option<CompletedGesture> {
        let gesture = self.active.take()?;
        let final_type = classify(
            &PointerSample::new(gesture.dx, gesture.dy, gesture.peak_touches),
            &self.profile,
        );

        if final_type == GestureType::Multitouch {
            self.last_multitouch_release = Some(now);
        }

        Some(CompletedGesture {
            start: gesture.start,
            end: gesture.start.offset(gesture.dx, gesture.dy),
            gesture_type: final_type,
            granted_at: gesture.granted_at,
            released_at: now,
        })
    }

    /// Drop any in-progress gesture
    pub fn cancel(&mut self) {
        self.active = None;
        self.last_multitouch_release = None;
    }
}
