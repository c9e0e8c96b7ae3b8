use crate::config::GameRules;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session.
///
/// WAITING, READY and FULL are derived from the number of active players.
/// RUNNING is entered explicitly by START and left only by RESTART.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Waiting,
    Ready,
    Full,
    Running,
}

impl SessionState {
    /// The count-derived state for `active` connected players.
    pub fn for_active_count(active: usize, rules: GameRules) -> Self {
        if active < rules.min_players {
            SessionState::Waiting
        } else if active < rules.max_players {
            SessionState::Ready
        } else {
            SessionState::Full
        }
    }

    pub fn is_joinable(self) -> bool {
        matches!(self, SessionState::Waiting | SessionState::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Waiting => "WAITING",
            SessionState::Ready => "READY",
            SessionState::Full => "FULL",
            SessionState::Running => "RUNNING",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
