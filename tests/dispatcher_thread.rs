use affinity::{Dispatcher, DispatcherThread, DispatcherThreadBuilder, Error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

#[test]
fn test_builder_names_thread() {
    let worker = DispatcherThreadBuilder::new()
        .name("affinity-test")
        .stack_size(256 * 1024)
        .build();
    worker.start().unwrap();

    let name = worker
        .do_sync(|| thread::current().name().map(str::to_string))
        .unwrap();
    assert_eq!(name.as_deref(), Some("affinity-test"));
    worker.join().unwrap();
}

#[test]
fn test_start_twice_fails() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();

    assert!(matches!(worker.start(), Err(Error::AlreadyRunning)));
    worker.join().unwrap();
}

#[test]
fn test_name_can_only_be_set_once() {
    let worker = DispatcherThread::new();
    worker.set_name("first").unwrap();

    assert!(matches!(worker.set_name("second"), Err(Error::AlreadySet(_))));
    assert_eq!(worker.name().as_deref(), Some("first"));
}

#[test]
fn test_name_cannot_change_after_start() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();

    assert!(matches!(worker.set_name("late"), Err(Error::AlreadyRunning)));
    worker.join().unwrap();
}

#[test]
fn test_join_before_start_fails() {
    let worker = DispatcherThread::new();
    assert!(matches!(worker.join(), Err(Error::NotStarted)));
}

#[test]
fn test_work_queued_before_start_runs_first() {
    let worker = DispatcherThread::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let log = log.clone();
        worker.do_async(move || log.lock().unwrap().push(i));
    }
    worker.start().unwrap();

    let snapshot = {
        let log = log.clone();
        worker.do_sync(move || log.lock().unwrap().clone()).unwrap()
    };
    assert_eq!(snapshot, vec![0, 1, 2]);
    worker.join().unwrap();
}

#[test]
fn test_do_sync_returns_value_from_pump_thread() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();

    let (answer, current) = worker
        .do_sync(|| (21 * 2, Dispatcher::current()))
        .unwrap();
    assert_eq!(answer, 42);
    assert_eq!(current.as_ref(), Some(worker.dispatcher()));
    worker.join().unwrap();
}

#[test]
fn test_do_sync_reports_panic_and_thread_survives() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();

    let result = worker.do_sync(|| -> u32 { panic!("exploded") });
    match result {
        Err(Error::CallbackPanicked(message)) => assert_eq!(message, "exploded"),
        other => panic!("unexpected do_sync result: {other:?}"),
    }

    assert_eq!(worker.do_sync(|| 1).unwrap(), 1);
    worker.join().unwrap();
}

#[test]
fn test_panicking_action_aborts_pump() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let ran = Arc::new(AtomicBool::new(false));

    worker.do_async(|| panic!("boom"));
    let flag = ran.clone();
    worker.do_async(move || flag.store(true, Ordering::SeqCst));

    match worker.join() {
        Err(Error::PumpPanicked(message)) => assert_eq!(message, "boom"),
        other => panic!("unexpected join result: {other:?}"),
    }
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_join_drains_pending_work() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let (tx, rx) = mpsc::channel();

    for i in 0..5 {
        let tx = tx.clone();
        worker.do_async(move || tx.send(i).unwrap());
    }
    worker.join().unwrap();
    drop(tx);

    assert_eq!(rx.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_drop_stops_thread() {
    let (tx, rx) = mpsc::channel();
    {
        let worker = DispatcherThread::new();
        worker.start().unwrap();
        worker.do_async(move || tx.send(()).unwrap());
    }

    rx.recv().unwrap();
}
