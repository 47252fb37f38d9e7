use affinity::dispatch::DefaultContext;
use affinity::{DispatcherThread, Error, Timeout, Timer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

#[test]
fn test_timer_requires_serialized_context() {
    assert!(matches!(
        Timer::new(),
        Err(Error::InsufficientCapabilities { .. })
    ));
    assert!(Timer::with_context(Arc::new(DefaultContext)).is_err());
}

#[test]
fn test_single_shot_fires_once() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let (tx, rx) = mpsc::channel();

    let timer = Timer::with_context(worker.context()).unwrap();
    timer.on_elapsed(move |_| tx.send(()).unwrap());
    timer.set_single_shot(Duration::from_millis(10));

    rx.recv_timeout(WAIT).unwrap();
    assert!(rx.recv_timeout(QUIET).is_err(), "Single-shot timer fired twice");
    assert!(!timer.enabled());
    worker.join().unwrap();
}

#[test]
fn test_restart_inside_single_shot_handler_fires_again() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let (tx, rx) = mpsc::channel();
    let fires = Arc::new(AtomicUsize::new(0));

    let timer = worker
        .do_sync(move || {
            let timer = Timer::new().unwrap();
            timer.on_elapsed(move |timer| {
                let count = fires.fetch_add(1, Ordering::SeqCst) + 1;
                if count == 1 {
                    timer.restart();
                }
                tx.send(count).unwrap();
            });
            timer.set_single_shot(Duration::ZERO);
            timer
        })
        .unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
    assert!(rx.recv_timeout(QUIET).is_err());
    drop(timer);
    worker.join().unwrap();
}

#[test]
fn test_cancel_inside_periodic_handler_stops_timer() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let (tx, rx) = mpsc::channel();

    let timer = Timer::with_context(worker.context()).unwrap();
    timer.on_elapsed(move |timer| {
        timer.cancel();
        tx.send(()).unwrap();
    });
    timer.set_periodic(Duration::from_millis(5));

    rx.recv_timeout(WAIT).unwrap();
    assert!(rx.recv_timeout(QUIET).is_err(), "Cancelled timer kept firing");
    assert!(!timer.enabled());
    worker.join().unwrap();
}

#[test]
fn test_periodic_timer_keeps_firing() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let (tx, rx) = mpsc::channel();

    let timer = Timer::with_context(worker.context()).unwrap();
    timer.on_elapsed(move |_| {
        let _ = tx.send(());
    });
    timer.set_periodic(Duration::from_millis(5));

    for _ in 0..3 {
        rx.recv_timeout(WAIT).unwrap();
    }
    assert!(timer.enabled());
    timer.dispose();
    worker.join().unwrap();
}

#[test]
fn test_handler_sees_its_own_changes() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let (tx, rx) = mpsc::channel();

    let timer = Timer::with_context(worker.context()).unwrap();
    timer.on_elapsed(move |timer| {
        let enabled_on_entry = timer.enabled();
        timer.set_interval(Duration::from_secs(60));
        tx.send((enabled_on_entry, timer.interval())).unwrap();
    });
    timer.set_single_shot(Duration::from_millis(5));

    let (enabled_on_entry, interval) = rx.recv_timeout(WAIT).unwrap();
    assert!(!enabled_on_entry, "Single-shot timer reports enabled inside its handler");
    assert_eq!(interval, Duration::from_secs(60));
    assert_eq!(timer.interval(), Duration::from_secs(60));
    worker.join().unwrap();
}

#[test]
fn test_dispose_suppresses_queued_expiry() {
    let worker = DispatcherThread::new();
    let fires = Arc::new(AtomicUsize::new(0));

    // The pump is not running yet, so the expiry waits in the queue.
    let timer = Timer::with_context(worker.context()).unwrap();
    let fires_clone = fires.clone();
    timer.on_elapsed(move |_| {
        fires_clone.fetch_add(1, Ordering::SeqCst);
    });
    timer.set_single_shot(Duration::ZERO);
    std::thread::sleep(Duration::from_millis(50));
    timer.dispose();

    worker.start().unwrap();
    worker.do_sync(|| {}).unwrap();
    assert_eq!(fires.load(Ordering::SeqCst), 0);
    worker.join().unwrap();
}

#[test]
fn test_timeout_fires_once() {
    let (tx, rx) = mpsc::channel();
    let _timeout =
        Timeout::start(Duration::from_millis(10), move || tx.send(()).unwrap()).unwrap();

    rx.recv_timeout(WAIT).unwrap();
}

#[test]
fn test_cancelled_timeout_never_fires() {
    let worker = DispatcherThread::new();
    worker.start().unwrap();
    let fires = Arc::new(AtomicUsize::new(0));

    let fires_clone = fires.clone();
    let mut timeout = Timeout::with_context(
        Duration::from_millis(20),
        worker.context(),
        move || {
            fires_clone.fetch_add(1, Ordering::SeqCst);
        },
    )
    .unwrap();
    timeout.cancel();

    std::thread::sleep(QUIET);
    worker.do_sync(|| {}).unwrap();
    assert_eq!(fires.load(Ordering::SeqCst), 0);
    worker.join().unwrap();
}
