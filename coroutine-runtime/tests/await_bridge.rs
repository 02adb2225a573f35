//! Tests for running blocking work from inside routines

use coroutine_runtime::{
    await_blocking, yield_now, Builder, Dedicated, Ordinator, RoutineId, RoutineState,
    SharedStack, Strategy,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

fn ordinator<S: Strategy>() -> Ordinator<S> {
    Builder::new()
        .poll_interval(Duration::from_millis(1))
        .build_with::<S>()
}

/// Round-robin every routine until all have finished
fn drive<S: Strategy>(ord: &Ordinator<S>, ids: &[RoutineId]) {
    let mut live = ids.to_vec();
    while !live.is_empty() {
        live.retain(|id| ord.resume(*id).unwrap() != RoutineState::Finished);
    }
}

fn siblings_run_while_awaiting<S: Strategy>() {
    let ord = ordinator::<S>();
    let events = Rc::new(RefCell::new(Vec::new()));

    let waiter = ord.create({
        let events = Rc::clone(&events);
        move || {
            let value = await_blocking(|| {
                thread::sleep(Duration::from_millis(50));
                42
            })
            .unwrap();
            events.borrow_mut().push(format!("waiter got {value}"));
        }
    });
    let sibling = ord.create({
        let events = Rc::clone(&events);
        move || {
            for _ in 0..3 {
                yield_now();
            }
            events.borrow_mut().push("sibling done".to_string());
        }
    });

    drive(&ord, &[waiter, sibling]);

    assert_eq!(
        *events.borrow(),
        vec!["sibling done".to_string(), "waiter got 42".to_string()],
        "sibling should finish while the waiter is parked on its worker"
    );
    assert!(ord.stats().yields > 3, "waiter should have yielded while polling");
}

#[test]
fn test_siblings_run_while_awaiting_shared() {
    siblings_run_while_awaiting::<SharedStack>();
}

#[test]
fn test_siblings_run_while_awaiting_dedicated() {
    siblings_run_while_awaiting::<Dedicated>();
}

/// The awaited value comes back unchanged, including non-Copy values
#[test]
fn test_value_is_returned() {
    let ord = ordinator::<SharedStack>();
    let out = Rc::new(RefCell::new(None));
    let id = ord.create({
        let out = Rc::clone(&out);
        move || {
            let value = await_blocking(|| vec![String::from("a"), String::from("b")]).unwrap();
            *out.borrow_mut() = Some(value);
        }
    });

    drive(&ord, &[id]);
    assert_eq!(
        out.borrow().as_deref(),
        Some(&[String::from("a"), String::from("b")][..])
    );
}

/// A panic in the worker surfaces in the routine, then at its resumer
#[test]
fn test_worker_panic_propagates() {
    let ord = ordinator::<Dedicated>();
    let id = ord.create(|| {
        let _ = await_blocking(|| -> u32 { panic!("worker failed") }).unwrap();
    });

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| drive(&ord, &[id])));
    let payload = outcome.expect_err("worker panic should reach the scheduler");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"worker failed"));
    assert_eq!(ord.state(id), Some(RoutineState::Finished));
}

/// The routine may catch the worker's panic itself and carry on
#[test]
fn test_worker_panic_can_be_caught_in_routine() {
    let ord = ordinator::<SharedStack>();
    let caught = Rc::new(RefCell::new(false));
    let id = ord.create({
        let caught = Rc::clone(&caught);
        move || {
            let outcome = std::panic::catch_unwind(|| await_blocking(|| -> u32 { panic!("nope") }));
            *caught.borrow_mut() = outcome.is_err();
            yield_now();
        }
    });

    assert_eq!(ord.resume(id).unwrap(), RoutineState::Suspended);
    while ord.resume(id).unwrap() != RoutineState::Finished {}
    assert!(*caught.borrow());
}

/// Outside any routine the caller blocks on the worker instead of yielding
#[test]
fn test_await_from_scheduler_blocks() {
    let start = Instant::now();
    let value = await_blocking(|| {
        thread::sleep(Duration::from_millis(30));
        "done"
    })
    .unwrap();

    assert_eq!(value, "done");
    assert!(start.elapsed() >= Duration::from_millis(30));
}
