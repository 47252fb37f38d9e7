use affinity::{Dispatcher, Error};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn test_dispatcher_runs_in_fifo_order() {
    let dispatcher = Dispatcher::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let log = log.clone();
        dispatcher.enqueue(move || log.lock().unwrap().push(i));
    }
    dispatcher.enqueue_exit();

    dispatcher.run().unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_exit_is_honored_in_position() {
    let dispatcher = Dispatcher::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = log.clone();
    dispatcher.enqueue(move || first.lock().unwrap().push("before"));
    dispatcher.enqueue_exit();
    let second = log.clone();
    dispatcher.enqueue(move || second.lock().unwrap().push("after"));

    dispatcher.run().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["before"]);
    assert!(!dispatcher.is_idle(), "Action behind the exit should stay queued");

    // A second pump picks up where the first stopped.
    dispatcher.enqueue_exit();
    dispatcher.run().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
}

#[test]
fn test_current_is_set_only_inside_actions() {
    let dispatcher = Dispatcher::new();
    assert!(Dispatcher::current().is_none());

    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();
    dispatcher.enqueue(move || {
        *seen_clone.lock().unwrap() = Dispatcher::current();
    });
    dispatcher.enqueue_exit();
    dispatcher.run().unwrap();

    assert_eq!(seen.lock().unwrap().as_ref(), Some(&dispatcher));
    assert!(Dispatcher::current().is_none());
}

#[test]
fn test_actions_enqueued_from_actions_run_later() {
    let dispatcher = Dispatcher::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let inner_dispatcher = dispatcher.clone();
    let outer_log = log.clone();
    dispatcher.enqueue(move || {
        let nested_log = outer_log.clone();
        inner_dispatcher.enqueue(move || nested_log.lock().unwrap().push("nested"));
        inner_dispatcher.enqueue_exit();
        outer_log.lock().unwrap().push("outer");
    });

    dispatcher.run().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["outer", "nested"]);
}

#[test]
fn test_enqueue_from_other_threads() {
    let dispatcher = Dispatcher::new();
    let counter = Arc::new(Mutex::new(0));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let counter = counter.clone();
                    dispatcher.enqueue(move || *counter.lock().unwrap() += 1);
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    dispatcher.enqueue_exit();
    dispatcher.run().unwrap();

    assert_eq!(*counter.lock().unwrap(), 100);
}

#[test]
fn test_second_pump_is_rejected() {
    let dispatcher = Dispatcher::new();
    let result = Arc::new(Mutex::new(None));

    let inner = dispatcher.clone();
    let result_clone = result.clone();
    dispatcher.enqueue(move || {
        *result_clone.lock().unwrap() = Some(inner.run());
        inner.enqueue_exit();
    });
    dispatcher.run().unwrap();

    let result = result.lock().unwrap().take().unwrap();
    assert!(matches!(result, Err(Error::AlreadyRunning)));
    assert!(!dispatcher.is_running());
}
