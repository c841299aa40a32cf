// src/lib.rs

//! Cooperative operation queue.
//!
//! Units of work ([`Operation`]s) declare dependencies on each other; an
//! [`OperationQueue`] starts each one only after all of its dependencies
//! have finished, whichever queue they live in. Operations can be
//! cancelled at any point, watched by [`Observer`]s, and chained so that
//! one operation's output becomes another's input (see [`io`]).
//!
//! Scheduling is single-threaded and cooperative. An operation's body is
//! started on a later scheduling turn, and it reports completion through
//! its [`Finisher`]; the engine never interrupts a running body.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use opqueue::{ManualScheduler, Operation, OperationQueue};
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let fetch = {
//!     let log = Rc::clone(&log);
//!     Operation::new(move |finisher| {
//!         log.borrow_mut().push("fetch");
//!         finisher.finish().unwrap();
//!     })
//! };
//! let render = {
//!     let log = Rc::clone(&log);
//!     Operation::new(move |finisher| {
//!         log.borrow_mut().push("render");
//!         finisher.finish().unwrap();
//!     })
//! };
//! render.add_dependency(&fetch).unwrap();
//!
//! let scheduler = ManualScheduler::new();
//! let queue = OperationQueue::with_scheduler("main", scheduler.clone());
//! queue.add_all([&render, &fetch]).unwrap();
//! scheduler.run_until_idle().unwrap();
//!
//! assert_eq!(*log.borrow(), ["fetch", "render"]);
//! assert!(queue.is_empty());
//! ```

pub mod config;
pub mod errors;
pub mod graph;
pub mod io;
pub mod logging;
pub mod naming;
pub mod observer;
pub mod operation;
pub mod queue;
pub mod scheduler;
pub mod state;

pub use errors::{OpQueueError, Result};
pub use graph::DependencyGraph;
pub use io::{
    HasInput, HasOutput, InputOperation, InputPort, IoOperation, OutputOperation, OutputPort,
    ResultFinisher,
};
pub use naming::NameCounter;
pub use observer::{CallbackObserver, Observer};
pub use operation::{Finisher, Operation, OperationId, WeakOperation};
pub use queue::OperationQueue;
pub use scheduler::{Job, ManualScheduler, Scheduler, TokioScheduler};
pub use state::OperationState;
