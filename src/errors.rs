// src/errors.rs

//! Crate-wide error type.
//!
//! Every variant except the ambient ones (`Config`, `Io`, `Toml`, `Other`)
//! is an API misuse: the offending call is aborted before it mutates
//! anything and the error is handed back to the caller.

use thiserror::Error;

use crate::state::OperationState;

#[derive(Error, Debug)]
pub enum OpQueueError {
    /// A configuration method was called after the operation left
    /// `Initialized`.
    #[error("Cannot {action} after the operation has been added to an operation queue (operation '{operation}' is {state})")]
    NotInitialized {
        operation: String,
        action: &'static str,
        state: OperationState,
    },

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: OperationState,
        to: OperationState,
    },

    #[error("The operation has already been enqueued: {0}")]
    AlreadyEnqueued(String),

    #[error("Cannot finish '{operation}' because it's already {state}")]
    CannotFinish {
        operation: String,
        state: OperationState,
    },

    #[error("Output operation '{0}' finished without setting the output")]
    MissingOutput(String),

    #[error("Cannot execute operation '{operation}' that is {state} and {}", cancelled_label(.cancelled))]
    UnexpectedState {
        operation: String,
        state: OperationState,
        cancelled: bool,
    },

    /// Queue bookkeeping saw an operation in a state it can never be in at
    /// that point.
    #[error("Out of order execution in queue '{queue}': {detail}")]
    Membership { queue: String, detail: String },

    #[error("Cycle detected in dependency graph involving operation '{0}'")]
    DependencyCycle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn cancelled_label(cancelled: &bool) -> &'static str {
    if *cancelled { "cancelled" } else { "not cancelled" }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OpQueueError>;
