// crates/test-utils/src/recorder.rs

use std::cell::RefCell;
use std::rc::Rc;

use opqueue::{Observer, Operation};

/// Ordered log of lifecycle events, shared between observers, bodies and
/// completion callbacks.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    /// Count events equal to `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.borrow().iter().position(|e| e == event)
    }

    /// Observer recording into this log.
    pub fn observer(&self) -> RecordingObserver {
        RecordingObserver {
            log: self.clone(),
            named: false,
        }
    }

    /// Observer recording `"<operation name>:<event>"` into this log.
    pub fn named_observer(&self) -> RecordingObserver {
        RecordingObserver {
            log: self.clone(),
            named: true,
        }
    }
}

/// Observer pushing `enqueued`, `will_execute`, `cancelled` and `finished`
/// into an [`EventLog`].
#[derive(Debug, Clone)]
pub struct RecordingObserver {
    log: EventLog,
    named: bool,
}

impl RecordingObserver {
    fn record(&self, operation: &Operation, event: &str) {
        if self.named {
            self.log.push(format!("{}:{event}", operation.name()));
        } else {
            self.log.push(event);
        }
    }
}

impl Observer for RecordingObserver {
    fn enqueued(&self, operation: &Operation) {
        self.record(operation, "enqueued");
    }

    fn will_execute(&self, operation: &Operation) {
        self.record(operation, "will_execute");
    }

    fn cancelled(&self, operation: &Operation) {
        self.record(operation, "cancelled");
    }

    fn finished(&self, operation: &Operation) {
        self.record(operation, "finished");
    }
}
