//! Scan session state management

use std::time::Instant;

/// Scan session state machine
///
/// `Idle → Scanning → Detected → Processing → Detected (paused) → Scanning`,
/// with `Stopped` reachable from every node and terminal. Exactly one camera
/// stream is open while the session is neither `Idle` nor `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created, camera not yet requested
    Idle,

    /// Capture loop is sampling frames
    Scanning {
        /// When sampling (re)started
        started_at: Instant,
    },

    /// A payload was detected; sampling is suspended.
    /// The session also rests here, paused, once an outcome was surfaced.
    Detected {
        /// When the payload was handed up by the capture loop
        detected_at: Instant,
    },

    /// Redemption request in flight
    Processing,

    /// Camera released; the session cannot be restarted
    Stopped,
}

impl SessionState {
    pub fn scanning() -> Self {
        SessionState::Scanning {
            started_at: Instant::now(),
        }
    }

    pub fn detected() -> Self {
        SessionState::Detected {
            detected_at: Instant::now(),
        }
    }

    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            // From Stopped - no transitions allowed
            (Stopped, _) => false,

            // Stop is reachable from everywhere else
            (_, Stopped) => true,

            (Idle, Scanning { .. }) => true,
            (Scanning { .. }, Detected { .. }) => true,
            (Detected { .. }, Processing) => true,
            (Detected { .. }, Scanning { .. }) => true,
            (Processing, Detected { .. }) => true,

            // Self-transitions
            (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => true,

            // All other transitions invalid
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Scanning { .. } => "Scanning",
            SessionState::Detected { .. } => "Detected",
            SessionState::Processing => "Processing",
            SessionState::Stopped => "Stopped",
        }
    }

    /// Whether a camera stream is expected to be open
    pub fn holds_camera(&self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Stopped)
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, SessionState::Scanning { .. })
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, SessionState::Detected { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// Facing and torch changes are allowed only in these nodes
    pub fn allows_device_controls(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Scanning { .. } | SessionState::Detected { .. }
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
