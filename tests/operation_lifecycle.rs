// tests/operation_lifecycle.rs

use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use opqueue::state::StateMachine;
use opqueue::{
    Finisher, ManualScheduler, NameCounter, OpQueueError, Operation, OperationQueue,
    OperationState,
};
use opqueue_test_utils::{init_tracing, EventLog};

type TestResult = Result<(), Box<dyn Error>>;

const ALL_STATES: [OperationState; 4] = [
    OperationState::Initialized,
    OperationState::Pending,
    OperationState::Executing,
    OperationState::Finished,
];

/// Operation that parks its finisher so the test decides when it finishes.
fn parked() -> (Operation, Rc<RefCell<Option<Finisher>>>) {
    let slot: Rc<RefCell<Option<Finisher>>> = Rc::new(RefCell::new(None));
    let stash = Rc::clone(&slot);
    let op = Operation::new(move |finisher| {
        *stash.borrow_mut() = Some(finisher);
    });
    (op, slot)
}

#[test]
fn state_machine_only_moves_forward() {
    for (i, &from) in ALL_STATES.iter().enumerate() {
        for (j, &to) in ALL_STATES.iter().enumerate() {
            let mut machine = StateMachine::new();
            for &step in &ALL_STATES[1..=i] {
                machine.advance(step).unwrap();
            }
            assert_eq!(machine.current(), from);

            let result = machine.advance(to).map(|waiters| waiters.len());
            if j > i {
                assert!(result.is_ok(), "{from} -> {to} should be allowed");
                assert_eq!(machine.current(), to);
            } else {
                match result {
                    Err(OpQueueError::InvalidTransition { from: f, to: t }) => {
                        assert_eq!((f, t), (from, to));
                    }
                    other => panic!("{from} -> {to} should fail, got {other:?}"),
                }
                assert_eq!(machine.current(), from, "failed transition must not mutate");
            }
        }
    }
}

#[test]
fn state_waiters_fire_once_for_their_target_in_order() {
    let log = EventLog::new();
    let mut machine = StateMachine::new();

    for tag in ["finished-1", "finished-2"] {
        let log = log.clone();
        machine.subscribe(OperationState::Finished, Box::new(move || log.push(tag)));
    }
    let pending_log = log.clone();
    machine.subscribe(
        OperationState::Pending,
        Box::new(move || pending_log.push("pending")),
    );
    let executing_log = log.clone();
    machine.subscribe(
        OperationState::Executing,
        Box::new(move || executing_log.push("executing")),
    );

    for waiter in machine.advance(OperationState::Pending).unwrap() {
        waiter();
    }
    // Skipping `Executing` means its waiter never fires.
    for waiter in machine.advance(OperationState::Finished).unwrap() {
        waiter();
    }

    assert_eq!(log.events(), vec!["pending", "finished-1", "finished-2"]);
}

#[test]
fn unfired_waiters_are_released_once_finished() {
    let token = Rc::new(());
    let mut machine = StateMachine::new();

    let skipped = Rc::clone(&token);
    machine.subscribe(OperationState::Executing, Box::new(move || drop(skipped)));
    machine.advance(OperationState::Pending).unwrap();

    // Already reached: never stored.
    let late = Rc::clone(&token);
    machine.subscribe(OperationState::Pending, Box::new(move || drop(late)));
    assert_eq!(Rc::strong_count(&token), 2);

    let fired = machine.advance(OperationState::Finished).unwrap();
    assert!(fired.is_empty());
    assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn cancelled_operation_drops_its_executing_waiter() {
    let token = Rc::new(());
    let op = Operation::new(|finisher| finisher.finish().unwrap());
    let held = Rc::clone(&token);
    op.on_state(OperationState::Executing, move || drop(held));

    op.cancel();

    assert!(op.is_finished());
    assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn states_display_lowercase() {
    let names: Vec<String> = ALL_STATES.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["initialized", "pending", "executing", "finished"]);
}

#[test]
fn configuration_is_rejected_after_enqueue() -> TestResult {
    init_tracing();

    let (op, _slot) = parked();
    let other = Operation::new(|finisher| finisher.finish().unwrap());
    let scheduler = ManualScheduler::new();
    let queue = OperationQueue::with_scheduler("config", scheduler.clone());

    queue.add(&op)?;

    assert!(matches!(
        op.add_dependency(&other),
        Err(OpQueueError::NotInitialized { state: OperationState::Pending, .. })
    ));
    assert!(matches!(
        op.add_dependencies([&other]),
        Err(OpQueueError::NotInitialized { .. })
    ));
    assert!(matches!(
        op.add_observer(EventLog::new().observer()),
        Err(OpQueueError::NotInitialized { .. })
    ));
    assert!(matches!(
        op.set_on_completion(|| {}),
        Err(OpQueueError::NotInitialized { .. })
    ));
    assert!(matches!(
        op.set_name("late"),
        Err(OpQueueError::NotInitialized { .. })
    ));
    assert!(op.dependencies().is_empty());

    scheduler.run_until_idle()?;
    assert!(matches!(
        op.add_dependency(&other),
        Err(OpQueueError::NotInitialized { state: OperationState::Executing, .. })
    ));
    Ok(())
}

#[test]
fn dependencies_returns_a_copy_in_insertion_order() -> TestResult {
    let a = Operation::new(|f| f.finish().unwrap());
    let b = Operation::new(|f| f.finish().unwrap());
    let c = Operation::new(|f| f.finish().unwrap());

    c.add_dependency(&b)?;
    c.add_dependency(&a)?;

    let mut deps = c.dependencies();
    assert_eq!(deps, vec![b.clone(), a.clone()]);
    deps.clear();
    assert_eq!(c.dependencies().len(), 2);
    Ok(())
}

#[test]
fn completion_handler_is_replaced_not_stacked() -> TestResult {
    let log = EventLog::new();
    let op = Operation::new(|f| f.finish().unwrap());
    let first = log.clone();
    op.set_on_completion(move || first.push("first"))?;
    let second = log.clone();
    op.set_on_completion(move || second.push("second"))?;

    op.cancel();

    assert_eq!(log.events(), vec!["second"]);
    Ok(())
}

#[test]
fn finishing_twice_notifies_once() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let op = Operation::new(|finisher| {
        finisher.finish().unwrap();
        finisher.finish().unwrap();
    });
    op.add_observer(log.observer())?;
    let completion = log.clone();
    op.set_on_completion(move || completion.push("completion"))?;

    let scheduler = ManualScheduler::new();
    let queue = OperationQueue::with_scheduler("idempotent", scheduler.clone());
    queue.add(&op)?;
    scheduler.run_until_idle()?;

    assert_eq!(log.count("finished"), 1);
    assert_eq!(log.count("completion"), 1);
    assert_eq!(log.count("cancelled"), 0);
    Ok(())
}

#[test]
fn cancel_while_executing_waits_for_finish() -> TestResult {
    init_tracing();

    let log = EventLog::new();
    let (op, slot) = parked();
    op.add_observer(log.observer())?;
    let completion = log.clone();
    op.set_on_completion(move || completion.push("completion"))?;

    let scheduler = ManualScheduler::new();
    let queue = OperationQueue::with_scheduler("executing", scheduler.clone());
    queue.add(&op)?;
    scheduler.run_until_idle()?;
    assert!(op.is_executing());

    op.cancel();
    assert!(op.is_cancelled());
    assert!(op.is_executing(), "the running body is not interrupted");
    assert_eq!(log.events(), vec!["enqueued", "will_execute"]);
    assert_eq!(queue.len(), 1);

    let finisher = slot.borrow_mut().take().expect("body ran");
    assert!(finisher.is_cancelled());
    finisher.finish()?;

    assert!(op.is_finished());
    assert_eq!(
        log.events(),
        vec!["enqueued", "will_execute", "cancelled", "completion"]
    );
    assert!(queue.is_empty());

    // Cancelling a finished operation changes nothing.
    op.cancel();
    assert_eq!(log.count("cancelled"), 1);
    Ok(())
}

#[test]
fn operation_left_unfinished_stays_executing() -> TestResult {
    let (op, _slot) = parked();
    let scheduler = ManualScheduler::new();
    let queue = OperationQueue::with_scheduler("stuck", scheduler.clone());
    queue.add(&op)?;
    scheduler.run_until_idle()?;

    op.cancel();
    scheduler.run_until_idle()?;

    assert!(op.is_cancelled());
    assert_eq!(op.state(), OperationState::Executing);
    assert_eq!(queue.len(), 1);
    Ok(())
}

#[test]
fn default_names_come_from_the_counter() -> TestResult {
    let counter = NameCounter::new();
    let first = Operation::with_counter(&counter, |f| f.finish().unwrap());
    let second = Operation::with_counter(&counter, |f| f.finish().unwrap());
    assert_eq!(first.name(), "1");
    assert_eq!(second.name(), "2");

    counter.reset();
    let again = Operation::with_counter(&counter, |f| f.finish().unwrap());
    assert_eq!(again.name(), "1");

    again.set_name("renamed")?;
    assert_eq!(again.name(), "renamed");

    // The shared counters are independent of explicit ones.
    let shared = Operation::new(|f| f.finish().unwrap());
    assert!(shared.name().parse::<u64>().is_ok());
    Ok(())
}

#[test]
fn handles_compare_by_identity() {
    let op = Operation::new(|f| f.finish().unwrap());
    let same = op.clone();
    let other = Operation::new(|f| f.finish().unwrap());

    assert_eq!(op, same);
    assert_eq!(op.id(), same.id());
    assert_ne!(op, other);
    assert_ne!(op.id(), other.id());

    let weak = op.downgrade();
    assert_eq!(weak.upgrade(), Some(op.clone()));
    drop(op);
    drop(same);
    assert!(weak.upgrade().is_none());
}
