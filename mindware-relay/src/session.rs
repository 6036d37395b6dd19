//! Per-connection session lifecycle.
//!
//! ```text
//! Connecting --join--> Joined --close / drop--> Closed
//! ```
//!
//! Frames are only routed while `Joined`. Closing unregisters the connection
//! exactly once, whichever path gets there first: transport close, a failed
//! write, eviction for a full outbound queue, or dropping the session.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{Notify, mpsc};

use crate::error::RelayError;
use crate::registry::SessionHandle;
use crate::relay::RelayState;
use crate::router::{self, Routed};

/// Lifecycle state of a [`RelaySession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upgraded but not yet registered.
    Connecting,
    /// Registered in a room; frames are routed.
    Joined,
    /// Unregistered. Terminal.
    Closed,
}

/// One client connection's view of the relay.
pub struct RelaySession {
    relay: Arc<RelayState>,
    handle: Option<SessionHandle>,
    state: SessionState,
}

impl RelaySession {
    /// Creates a session in the `Connecting` state.
    #[must_use]
    pub const fn new(relay: Arc<RelayState>) -> Self {
        Self {
            relay,
            handle: None,
            state: SessionState::Connecting,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Registry identity, present while joined.
    #[must_use]
    pub const fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// Registers the connection in `room` as `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConnection`] if the session is not in
    /// the `Connecting` state or the outbound queue is already closed.
    pub fn join(
        &mut self,
        room: &str,
        user_id: &str,
        outbound: mpsc::Sender<Message>,
        evict: Arc<Notify>,
    ) -> Result<(), RelayError> {
        if self.state != SessionState::Connecting {
            return Err(RelayError::InvalidConnection);
        }
        let handle = self.relay.registry.register(room, user_id, outbound, evict)?;
        self.handle = Some(handle);
        self.state = SessionState::Joined;
        Ok(())
    }

    /// Routes one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConnection`] unless joined, otherwise
    /// whatever [`router::route`] reports. None of these end the session.
    pub fn handle_text(&self, raw: &str) -> Result<Routed, RelayError> {
        match (&self.handle, self.state) {
            (Some(handle), SessionState::Joined) => {
                router::route(&self.relay.registry, handle, raw, self.relay.router_config())
            }
            _ => Err(RelayError::InvalidConnection),
        }
    }

    /// Moves to `Closed`, unregistering if joined.
    ///
    /// Returns `true` only for the call that actually unregistered.
    pub fn close(&mut self) -> bool {
        self.state = SessionState::Closed;
        self.handle
            .take()
            .is_some_and(|handle| self.relay.registry.unregister(&handle))
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        if self.close() {
            tracing::debug!("session dropped without explicit close");
        }
    }
}
