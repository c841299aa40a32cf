// src/observer.rs

//! Passive lifecycle observers.
//!
//! Observers are notified synchronously, in registration order, at the
//! lifecycle points of the operation they are attached to. The only
//! influence an observer has on scheduling is cancelling that operation
//! (e.g. from `will_execute`).

use std::fmt;
use std::rc::Rc;

use crate::operation::Operation;

/// Lifecycle hooks. Every method defaults to a no-op.
pub trait Observer {
    /// The operation was accepted by an operation queue.
    fn enqueued(&self, _operation: &Operation) {}

    /// The operation is about to execute. Cancelling it here prevents the
    /// body from running.
    fn will_execute(&self, _operation: &Operation) {}

    /// The operation finished because it was cancelled.
    fn cancelled(&self, _operation: &Operation) {}

    /// The operation finished normally.
    fn finished(&self, _operation: &Operation) {}
}

impl<T: Observer + ?Sized> Observer for Rc<T> {
    fn enqueued(&self, operation: &Operation) {
        (**self).enqueued(operation);
    }

    fn will_execute(&self, operation: &Operation) {
        (**self).will_execute(operation);
    }

    fn cancelled(&self, operation: &Operation) {
        (**self).cancelled(operation);
    }

    fn finished(&self, operation: &Operation) {
        (**self).finished(operation);
    }
}

type Hook = Box<dyn Fn(&Operation)>;

/// An [`Observer`] assembled from optional closures.
///
/// ```
/// use opqueue::{CallbackObserver, Operation};
///
/// let op = Operation::new(|finisher| {
///     let _ = finisher.finish();
/// });
/// op.add_observer(CallbackObserver::new().on_will_execute(|op| op.cancel()))
///     .unwrap();
/// ```
#[derive(Default)]
pub struct CallbackObserver {
    enqueued: Option<Hook>,
    will_execute: Option<Hook>,
    cancelled: Option<Hook>,
    finished: Option<Hook>,
}

impl fmt::Debug for CallbackObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackObserver")
            .field("enqueued", &self.enqueued.is_some())
            .field("will_execute", &self.will_execute.is_some())
            .field("cancelled", &self.cancelled.is_some())
            .field("finished", &self.finished.is_some())
            .finish()
    }
}

impl CallbackObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enqueued(mut self, f: impl Fn(&Operation) + 'static) -> Self {
        self.enqueued = Some(Box::new(f));
        self
    }

    pub fn on_will_execute(mut self, f: impl Fn(&Operation) + 'static) -> Self {
        self.will_execute = Some(Box::new(f));
        self
    }

    pub fn on_cancelled(mut self, f: impl Fn(&Operation) + 'static) -> Self {
        self.cancelled = Some(Box::new(f));
        self
    }

    pub fn on_finished(mut self, f: impl Fn(&Operation) + 'static) -> Self {
        self.finished = Some(Box::new(f));
        self
    }
}

impl Observer for CallbackObserver {
    fn enqueued(&self, operation: &Operation) {
        if let Some(hook) = &self.enqueued {
            hook(operation);
        }
    }

    fn will_execute(&self, operation: &Operation) {
        if let Some(hook) = &self.will_execute {
            hook(operation);
        }
    }

    fn cancelled(&self, operation: &Operation) {
        if let Some(hook) = &self.cancelled {
            hook(operation);
        }
    }

    fn finished(&self, operation: &Operation) {
        if let Some(hook) = &self.finished {
            hook(operation);
        }
    }
}
