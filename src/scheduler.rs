// src/scheduler.rs

//! Deferred execution of queue steps.
//!
//! A queue never starts an operation from inside the call that satisfied
//! its last dependency. It hands a [`Job`] to a [`Scheduler`], which runs
//! it on a later turn. This keeps the call stack bounded regardless of how
//! long a dependency chain is, and callers are never re-entered.
//!
//! - [`TokioScheduler`] is the default. It uses
//!   `tokio::task::spawn_local`, so the queue must be driven from inside a
//!   `tokio::task::LocalSet`.
//! - [`ManualScheduler`] keeps jobs in a FIFO that the caller drains. It
//!   needs no runtime, which makes ordering tests fully deterministic.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::{error, trace};

use crate::errors::Result;

/// A deferred step. An `Err` is a fatal consistency violation.
pub type Job = Box<dyn FnOnce() -> Result<()>>;

/// Strategy for running a job on a later scheduling turn.
pub trait Scheduler {
    fn defer(&self, job: Job);
}

/// Runs jobs as local Tokio tasks.
///
/// # Panics
///
/// `defer` panics when called outside of a `tokio::task::LocalSet`. A job
/// that fails panics its task.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn defer(&self, job: Job) {
        tokio::task::spawn_local(async move { run_or_panic(job) });
    }
}

/// Run `job`, turning a consistency violation into a panic.
///
/// Used where no caller is left to hand the error back to.
pub fn run_or_panic(job: Job) {
    if let Err(err) = job() {
        error!(%err, "deferred queue step failed");
        panic!("deferred queue step failed: {err}");
    }
}

/// Scheduler whose jobs only run when the owner drains them.
///
/// Clones share the same job list.
#[derive(Default, Clone)]
pub struct ManualScheduler {
    jobs: Rc<RefCell<VecDeque<Job>>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.jobs.borrow().len()
    }

    /// Run the oldest job, if any.
    pub fn run_next(&self) -> Option<Result<()>> {
        let job = self.jobs.borrow_mut().pop_front()?;
        Some(job())
    }

    /// Run jobs until none are left, including jobs deferred by the jobs
    /// themselves. Returns how many ran, or the first error.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut ran = 0;
        while let Some(result) = self.run_next() {
            result?;
            ran += 1;
        }
        trace!(ran, "manual scheduler idle");
        Ok(ran)
    }
}

impl Scheduler for ManualScheduler {
    fn defer(&self, job: Job) {
        self.jobs.borrow_mut().push_back(job);
    }
}
