//! # Connection Lifecycle
//!
//! A single state machine shared by every transport: acceptors, connectors,
//! and channels all gate their operations through [`State::inspect`], and
//! every transition outside the permitted graph is a [`StateError`] rather
//! than a silent correction.
//!
//! ```text
//! None ── accept ──▶ Accepting ── ready ──▶ Open ── close ──▶ Closing ── drained ──▶ Closed
//! None ── reject ──▶ Rejecting ── drained ──▶ Closed
//! None | Closed ── open ──▶ Opening ── listening ──▶ Open
//! ```
//!
//! The `Closed -> Opening` edge is the server-side re-listen; a peer
//! initiated close takes the same `Open -> Closing -> Closed` path as a
//! local one.

use std::sync::Mutex;

use crate::error::StateError;

/// Lifecycle states of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Freshly constructed; nothing decided yet.
    None,
    /// An outbound connection is being established.
    Opening,
    /// `accept` ran but callbacks are not registered yet.
    Accepting,
    /// Fully operational.
    Open,
    /// `reject` ran; tearing down without ever opening.
    Rejecting,
    /// Close requested; pending calls are draining.
    Closing,
    /// Drained and physically closed.
    Closed,
}

impl State {
    /// Readiness gate consulted by every outbound operation.
    ///
    /// Returns an error for every state except `Open`, distinguishing
    /// not-yet-opened, closing-in-progress, and already-closed.
    pub fn inspect(self) -> Result<(), StateError> {
        match self {
            Self::Open => Ok(()),
            Self::Closing => Err(StateError::ClosingInProgress),
            Self::Closed => Err(StateError::AlreadyClosed),
            Self::None | Self::Opening | Self::Accepting | Self::Rejecting => {
                Err(StateError::NotOpened(self))
            }
        }
    }
}

/// Guarded transition controller over [`State`].
///
/// Interior mutability is a plain mutex; transitions are short and
/// single-writer. Cloneable handles share one lifecycle via `Arc`.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<State>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::None),
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        *self.state.lock().expect("lifecycle lock poisoned")
    }

    /// Readiness gate for the current state.
    pub fn inspect(&self) -> Result<(), StateError> {
        self.state().inspect()
    }

    fn shift(&self, permitted: &[State], to: State) -> Result<(), StateError> {
        let mut state = self.state.lock().expect("lifecycle lock poisoned");
        if !permitted.contains(&*state) {
            return Err(StateError::IllegalTransition { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    /// `None -> Accepting`. Fails with a domain error anywhere else, which
    /// makes a second `accept` a synchronous mistake rather than a re-open.
    pub fn begin_accept(&self) -> Result<(), StateError> {
        self.shift(&[State::None], State::Accepting)
    }

    /// `Accepting -> Open`, once the transport callbacks are registered.
    pub fn finish_accept(&self) -> Result<(), StateError> {
        self.shift(&[State::Accepting], State::Open)
    }

    /// `None -> Rejecting`.
    pub fn begin_reject(&self) -> Result<(), StateError> {
        self.shift(&[State::None], State::Rejecting)
    }

    /// `None | Closed -> Opening`. The `Closed` edge is the server-side
    /// re-listen after a completed close.
    pub fn begin_open(&self) -> Result<(), StateError> {
        self.shift(&[State::None, State::Closed], State::Opening)
    }

    /// `Opening -> Open`.
    pub fn finish_open(&self) -> Result<(), StateError> {
        self.shift(&[State::Opening], State::Open)
    }

    /// `Open -> Closing`. Surfaces the readiness error for every other
    /// state, so a double close observes `ClosingInProgress` or
    /// `AlreadyClosed` instead of silently re-closing.
    pub fn begin_close(&self) -> Result<(), StateError> {
        let mut state = self.state.lock().expect("lifecycle lock poisoned");
        state.inspect()?;
        *state = State::Closing;
        Ok(())
    }

    /// `Closing | Rejecting -> Closed`, once the pending table is drained
    /// and the transport confirmed the physical close.
    pub fn finish_close(&self) -> Result<(), StateError> {
        self.shift(&[State::Closing, State::Rejecting], State::Closed)
    }
}
