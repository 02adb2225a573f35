//! A producer/consumer queue built only from yield, resume and current_routine
//!
//! Consumers block by yielding until an item shows up. A push records the
//! value and, when called from the scheduler flow, resumes one parked
//! consumer right away; from inside a routine it leaves the wakeup to polling.

use coroutine_runtime::{current_routine, yield_now, Builder, Ordinator, RoutineId, RoutineState};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

struct Queue<T> {
    items: RefCell<VecDeque<T>>,
    waiting: RefCell<VecDeque<RoutineId>>,
}

impl<T> Queue<T> {
    fn new() -> Self {
        Self {
            items: RefCell::new(VecDeque::new()),
            waiting: RefCell::new(VecDeque::new()),
        }
    }

    fn pop(&self) -> T {
        loop {
            if let Some(item) = self.items.borrow_mut().pop_front() {
                return item;
            }
            let me = current_routine().expect("pop blocks, call it from a routine");
            if !self.waiting.borrow().contains(&me) {
                self.waiting.borrow_mut().push_back(me);
            }
            yield_now();
        }
    }

    fn push(&self, ordinator: &Ordinator, item: T) {
        self.items.borrow_mut().push_back(item);
        if current_routine().is_some() {
            return;
        }
        let next = self.waiting.borrow_mut().pop_front();
        if let Some(id) = next {
            ordinator.resume(id).unwrap();
        }
    }
}

#[test]
fn test_consumer_blocks_until_push() {
    let ordinator = Builder::new().build();
    let queue = Rc::new(Queue::new());
    let got = Rc::new(RefCell::new(Vec::new()));

    let consumer = ordinator.create({
        let queue = Rc::clone(&queue);
        let got = Rc::clone(&got);
        move || {
            for _ in 0..3 {
                let value = queue.pop();
                got.borrow_mut().push(value);
            }
        }
    });

    // Nothing queued yet: the consumer parks itself.
    assert_eq!(ordinator.resume(consumer).unwrap(), RoutineState::Suspended);
    assert!(got.borrow().is_empty());

    queue.push(&ordinator, 1);
    queue.push(&ordinator, 2);
    queue.push(&ordinator, 3);

    assert_eq!(*got.borrow(), vec![1, 2, 3]);
    assert_eq!(ordinator.state(consumer), Some(RoutineState::Finished));
}

#[test]
fn test_producer_routine_feeds_consumer() {
    let ordinator = Rc::new(Builder::new().build());
    let queue = Rc::new(Queue::new());
    let got = Rc::new(RefCell::new(Vec::new()));

    let producer = ordinator.create({
        let ordinator = Rc::clone(&ordinator);
        let queue = Rc::clone(&queue);
        move || {
            for n in 0..5 {
                queue.push(&ordinator, n);
                yield_now();
            }
        }
    });
    let consumer = ordinator.create({
        let queue = Rc::clone(&queue);
        let got = Rc::clone(&got);
        move || {
            for _ in 0..5 {
                let value = queue.pop();
                got.borrow_mut().push(value);
            }
        }
    });

    let mut live = vec![consumer, producer];
    while !live.is_empty() {
        live.retain(|id| ordinator.resume(*id).unwrap() != RoutineState::Finished);
    }

    assert_eq!(*got.borrow(), vec![0, 1, 2, 3, 4]);
}
