// src/state.rs

//! Operation lifecycle states and the forward-only state machine.
//!
//! The state machine keeps an explicit list of one-shot waiters, each a
//! `(target state, callback)` pair. A transition hands back the waiters
//! registered for the new state so the owner can fire them once it no
//! longer holds a borrow on the operation.

use std::fmt;

use crate::errors::{OpQueueError, Result};

/// Lifecycle state of an operation, ordered from first to last.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationState {
    /// Created but not yet added to an operation queue.
    #[default]
    Initialized,
    /// Added to a queue, waiting for dependencies to finish.
    Pending,
    /// The body is running.
    Executing,
    /// Finished execution, either normally or through cancellation.
    Finished,
}

impl OperationState {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Initialized => "initialized",
            OperationState::Pending => "pending",
            OperationState::Executing => "executing",
            OperationState::Finished => "finished",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback fired once when the machine enters a given state.
pub type StateWaiter = Box<dyn FnOnce()>;

/// Forward-only state machine with per-state one-shot waiters.
pub struct StateMachine {
    current: OperationState,
    waiters: Vec<(OperationState, StateWaiter)>,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: OperationState::Initialized,
            waiters: Vec::new(),
        }
    }

    pub fn current(&self) -> OperationState {
        self.current
    }

    /// Register a one-shot waiter for `target`.
    ///
    /// Waiters for a state that is skipped (e.g. `Executing` when an
    /// operation is cancelled while pending) or already reached never fire
    /// and are released at the latest when the machine finishes.
    pub fn subscribe(&mut self, target: OperationState, waiter: StateWaiter) {
        if target <= self.current {
            return;
        }
        self.waiters.push((target, waiter));
    }

    /// Move to `to`, returning the waiters registered for it in
    /// registration order.
    ///
    /// Fails without changing anything unless `to` is strictly after the
    /// current state.
    pub fn advance(&mut self, to: OperationState) -> Result<Vec<StateWaiter>> {
        if to <= self.current {
            return Err(OpQueueError::InvalidTransition {
                from: self.current,
                to,
            });
        }

        self.current = to;

        let (fire, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|(target, _)| *target == to);
        // Nothing follows `Finished`; waiters for skipped states are dropped.
        if to != OperationState::Finished {
            self.waiters = keep;
        }

        Ok(fire.into_iter().map(|(_, waiter)| waiter).collect())
    }
}
