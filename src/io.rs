// src/io.rs

//! Output-to-input chaining between operations.
//!
//! Two independent capabilities:
//! - [`HasOutput`]: the operation produces one value, stored in an
//!   [`OutputPort`] through [`ResultFinisher::finish_with_result`].
//! - [`HasInput`]: the operation consumes one value, written into an
//!   [`InputPort`] by injectors right before it executes.
//!
//! [`OutputOperation`], [`InputOperation`] and [`IoOperation`] compose the
//! ports onto a plain [`Operation`] and dereference to it.
//!
//! Injecting adds a dependency edge as well as the data edge. When an
//! injected operation finishes without output (typically because it was
//! cancelled) the receiver is cancelled instead of executed.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tracing::{error, trace};

use crate::errors::Result;
use crate::naming::NameCounter;
use crate::operation::{Finisher, InputResolver, Operation, OutputProbe};

/// Slot holding the value produced by an operation.
pub struct OutputPort<O> {
    slot: RefCell<Option<O>>,
}

impl<O> OutputPort<O> {
    fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn get(&self) -> Option<O>
    where
        O: Clone,
    {
        self.slot.borrow().clone()
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(Option<&O>) -> R) -> R {
        f(self.slot.borrow().as_ref())
    }

    fn set(&self, value: O) {
        *self.slot.borrow_mut() = Some(value);
    }
}

impl<O> OutputProbe for OutputPort<O> {
    fn has_output(&self) -> bool {
        self.is_set()
    }
}

type Injector<I> = Box<dyn Fn() -> Option<I>>;

/// Slot holding the value consumed by an operation, plus the injectors
/// that fill it.
pub struct InputPort<I> {
    slot: RefCell<Option<I>>,
    injectors: RefCell<Vec<Injector<I>>>,
}

impl<I> InputPort<I> {
    fn new() -> Self {
        Self {
            slot: RefCell::new(None),
            injectors: RefCell::new(Vec::new()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn get(&self) -> Option<I>
    where
        I: Clone,
    {
        self.slot.borrow().clone()
    }

    fn push_injector(&self, injector: Injector<I>) {
        self.injectors.borrow_mut().push(injector);
    }
}

impl<I> InputResolver for InputPort<I> {
    fn resolve(&self) -> bool {
        for inject in self.injectors.borrow().iter() {
            if let Some(value) = inject() {
                *self.slot.borrow_mut() = Some(value);
            }
        }
        self.is_set()
    }
}

/// Capability of producing a value for downstream operations.
pub trait HasOutput<O: 'static> {
    fn operation(&self) -> &Operation;

    fn output_port(&self) -> &Rc<OutputPort<O>>;

    /// The produced value, if the operation finished with one.
    fn output(&self) -> Option<O>
    where
        O: Clone,
    {
        self.output_port().get()
    }
}

/// Capability of consuming a value produced upstream.
pub trait HasInput<I: 'static> {
    fn operation(&self) -> &Operation;

    fn input_port(&self) -> &Rc<InputPort<I>>;

    /// The resolved input. Empty until the operation is about to execute.
    fn input(&self) -> Option<I>
    where
        I: Clone,
    {
        self.input_port().get()
    }

    /// Feed `upstream`'s output unchanged into this operation's input.
    fn inject<U>(&self, upstream: &U) -> Result<&Self>
    where
        U: HasOutput<I>,
        I: Clone,
    {
        self.inject_with_transform(upstream, I::clone)
    }

    /// Feed `transform(upstream output)` into this operation's input.
    ///
    /// Both operations must still be `Initialized`.
    fn inject_with_transform<O, U>(
        &self,
        upstream: &U,
        transform: impl Fn(&O) -> I + 'static,
    ) -> Result<&Self>
    where
        O: 'static,
        U: HasOutput<O>,
    {
        self.operation().ensure_initialized("inject into the operation")?;
        upstream
            .operation()
            .ensure_initialized("inject the operation")?;

        let source = Rc::clone(upstream.output_port());
        self.input_port()
            .push_injector(Box::new(move || source.with(|output| output.map(&transform))));
        self.operation().add_dependency(upstream.operation())?;

        Ok(self)
    }
}

/// Finishing capability for operations with an output.
pub struct ResultFinisher<O> {
    finisher: Finisher,
    output: Rc<OutputPort<O>>,
}

impl<O> Clone for ResultFinisher<O> {
    fn clone(&self) -> Self {
        Self {
            finisher: self.finisher.clone(),
            output: Rc::clone(&self.output),
        }
    }
}

impl<O> fmt::Debug for ResultFinisher<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFinisher")
            .field("finisher", &self.finisher)
            .field("has_output", &self.output.is_set())
            .finish()
    }
}

impl<O> ResultFinisher<O> {
    /// Store `value` as the output, then finish.
    ///
    /// Ignored if the operation already finished.
    pub fn finish_with_result(&self, value: O) -> Result<()> {
        if self.finisher.operation().is_finished() {
            trace!(
                operation = %self.finisher.operation().name(),
                "ignored a result for an operation that already finished"
            );
            return Ok(());
        }

        self.output.set(value);
        self.finisher.finish()
    }

    /// Finish without a result. Only valid once the operation was
    /// cancelled; otherwise this fails with `MissingOutput`.
    pub fn finish(&self) -> Result<()> {
        self.finisher.finish()
    }

    pub fn operation(&self) -> &Operation {
        self.finisher.operation()
    }

    pub fn is_cancelled(&self) -> bool {
        self.finisher.is_cancelled()
    }
}

/// Input vanished between resolution and the body running.
fn abandon(finisher: &Finisher) {
    finisher.operation().cancel();
    if let Err(err) = finisher.finish() {
        error!(operation = %finisher.operation().name(), %err, "failed to finish operation without input");
        panic!("finishing '{}' without input failed: {err}", finisher.operation().name());
    }
}

/// Operation producing a value of type `O`.
pub struct OutputOperation<O> {
    operation: Operation,
    output: Rc<OutputPort<O>>,
}

impl<O: 'static> OutputOperation<O> {
    pub fn new(body: impl FnOnce(ResultFinisher<O>) + 'static) -> Self {
        Self::with_counter(&NameCounter::operations(), body)
    }

    pub fn with_counter(
        counter: &NameCounter,
        body: impl FnOnce(ResultFinisher<O>) + 'static,
    ) -> Self {
        let output = Rc::new(OutputPort::new());
        let port = Rc::clone(&output);
        let probe: Rc<dyn OutputProbe> = output.clone();

        let operation = Operation::from_parts(
            counter.next_name(),
            Box::new(move |finisher: Finisher| body(ResultFinisher { finisher, output: port })),
            None,
            Some(probe),
        );

        Self { operation, output }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

impl<O: 'static> HasOutput<O> for OutputOperation<O> {
    fn operation(&self) -> &Operation {
        &self.operation
    }

    fn output_port(&self) -> &Rc<OutputPort<O>> {
        &self.output
    }
}

/// Operation consuming a value of type `I`.
///
/// The body receives a clone of the resolved input.
pub struct InputOperation<I> {
    operation: Operation,
    input: Rc<InputPort<I>>,
}

impl<I: Clone + 'static> InputOperation<I> {
    pub fn new(body: impl FnOnce(I, Finisher) + 'static) -> Self {
        Self::with_counter(&NameCounter::operations(), body)
    }

    pub fn with_counter(counter: &NameCounter, body: impl FnOnce(I, Finisher) + 'static) -> Self {
        let input = Rc::new(InputPort::new());
        let port = Rc::clone(&input);
        let resolver: Rc<dyn InputResolver> = input.clone();

        let operation = Operation::from_parts(
            counter.next_name(),
            Box::new(move |finisher: Finisher| match port.get() {
                Some(value) => body(value, finisher),
                None => abandon(&finisher),
            }),
            Some(resolver),
            None,
        );

        Self { operation, input }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

impl<I: 'static> HasInput<I> for InputOperation<I> {
    fn operation(&self) -> &Operation {
        &self.operation
    }

    fn input_port(&self) -> &Rc<InputPort<I>> {
        &self.input
    }
}

/// Operation that both consumes an `I` and produces an `O`.
pub struct IoOperation<I, O> {
    operation: Operation,
    input: Rc<InputPort<I>>,
    output: Rc<OutputPort<O>>,
}

impl<I: Clone + 'static, O: 'static> IoOperation<I, O> {
    pub fn new(body: impl FnOnce(I, ResultFinisher<O>) + 'static) -> Self {
        Self::with_counter(&NameCounter::operations(), body)
    }

    pub fn with_counter(
        counter: &NameCounter,
        body: impl FnOnce(I, ResultFinisher<O>) + 'static,
    ) -> Self {
        let input = Rc::new(InputPort::new());
        let output = Rc::new(OutputPort::new());
        let in_port = Rc::clone(&input);
        let out_port = Rc::clone(&output);
        let resolver: Rc<dyn InputResolver> = input.clone();
        let probe: Rc<dyn OutputProbe> = output.clone();

        let operation = Operation::from_parts(
            counter.next_name(),
            Box::new(move |finisher: Finisher| match in_port.get() {
                Some(value) => body(
                    value,
                    ResultFinisher {
                        finisher,
                        output: out_port,
                    },
                ),
                None => abandon(&finisher),
            }),
            Some(resolver),
            Some(probe),
        );

        Self {
            operation,
            input,
            output,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

impl<I: 'static, O: 'static> HasInput<I> for IoOperation<I, O> {
    fn operation(&self) -> &Operation {
        &self.operation
    }

    fn input_port(&self) -> &Rc<InputPort<I>> {
        &self.input
    }
}

impl<I: 'static, O: 'static> HasOutput<O> for IoOperation<I, O> {
    fn operation(&self) -> &Operation {
        &self.operation
    }

    fn output_port(&self) -> &Rc<OutputPort<O>> {
        &self.output
    }
}

macro_rules! impl_operation_handle {
    ($ty:ident < $($param:ident),+ >) => {
        impl<$($param),+> Deref for $ty<$($param),+> {
            type Target = Operation;

            fn deref(&self) -> &Operation {
                &self.operation
            }
        }

        impl<$($param),+> AsRef<Operation> for $ty<$($param),+> {
            fn as_ref(&self) -> &Operation {
                &self.operation
            }
        }

        impl<$($param),+> fmt::Debug for $ty<$($param),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($ty)).field(&self.operation).finish()
            }
        }
    };
}

impl_operation_handle!(OutputOperation<O>);
impl_operation_handle!(InputOperation<I>);
impl_operation_handle!(IoOperation<I, O>);

impl<O> Clone for OutputOperation<O> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            output: Rc::clone(&self.output),
        }
    }
}

impl<I> Clone for InputOperation<I> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            input: Rc::clone(&self.input),
        }
    }
}

impl<I, O> Clone for IoOperation<I, O> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            input: Rc::clone(&self.input),
            output: Rc::clone(&self.output),
        }
    }
}
