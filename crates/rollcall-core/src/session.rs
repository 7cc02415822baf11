//! Scanning session state machine.
//!
//! ```text
//!                   answer(yes|no)
//!  AwaitingConfirmation ─────────────► Scanning { armed }
//!          ▲                               │  ▲ answer(yes|no)
//!          │ release()                     │  └─┘
//!          │                lock(identity) │ (only when armed)
//!          └──────── Locked { identity } ◄─┘
//! ```
//!
//! The controller is owned by the scan loop thread. Prompt and record tasks
//! never touch it directly; they send events the loop applies here.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("scan answer arrived while locked on {0}; ignoring")]
    StaleAnswer(String),
    #[error("release requested but session is not locked (state: {0:?})")]
    NotLocked(SessionState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// A prompt asking whether to scan is outstanding; matching is disabled.
    AwaitingConfirmation,
    /// Frames are captured; matching runs only while `armed`.
    Scanning { armed: bool },
    /// A match was accepted and handed to the record flow; matching is suspended.
    Locked { identity: String },
}

#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    /// Start with a prompt outstanding and matching disabled.
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingConfirmation,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether the loop should run the matcher on the current frame.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, SessionState::Scanning { armed: true })
    }

    /// Identity currently handed to the record flow.
    pub fn pending_identity(&self) -> Option<&str> {
        match &self.state {
            SessionState::Locked { identity } => Some(identity),
            _ => None,
        }
    }

    /// Apply the operator's answer to "scan now?".
    pub fn answer(&mut self, armed: bool) -> Result<(), SessionError> {
        if let SessionState::Locked { identity } = &self.state {
            return Err(SessionError::StaleAnswer(identity.clone()));
        }
        tracing::debug!(from = ?self.state, armed, "session answer");
        self.state = SessionState::Scanning { armed };
        Ok(())
    }

    /// Lock onto an accepted identity.
    ///
    /// Returns `false` without changing state unless the session is armed, so
    /// one detection burst can hand off at most once.
    pub fn lock(&mut self, identity: &str) -> bool {
        if !self.is_armed() {
            return false;
        }
        self.state = SessionState::Locked {
            identity: identity.to_string(),
        };
        tracing::debug!(identity, "session locked");
        true
    }

    /// The record flow finished; go back to waiting on a fresh prompt.
    /// Returns the identity that was locked.
    pub fn release(&mut self) -> Result<String, SessionError> {
        match std::mem::replace(&mut self.state, SessionState::AwaitingConfirmation) {
            SessionState::Locked { identity } => {
                tracing::debug!(identity = %identity, "session released");
                Ok(identity)
            }
            other => {
                self.state = other.clone();
                Err(SessionError::NotLocked(other))
            }
        }
    }
}
