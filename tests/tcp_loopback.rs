use affinity::{
    AsyncTcpConnection, AsyncTcpListener, ConnectionConfig, DispatcherThread, Error, WriteTag,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn echo_server(worker: &DispatcherThread) -> AsyncTcpListener {
    let listener =
        AsyncTcpListener::bind_with_context(loopback(), worker.context(), ConnectionConfig::new())
            .unwrap();

    listener
        .listen(|accepted| {
            let connection = accepted.unwrap();
            let echo = connection.clone();
            connection.on_read(move |result| match result {
                Ok(data) if !data.is_empty() => {
                    echo.write(data, WriteTag(0)).unwrap();
                    echo.read().unwrap();
                }
                _ => echo.close(),
            });
            connection.read().unwrap();
        })
        .unwrap();

    listener
}

#[test]
fn test_echo_round_trip() {
    let server = DispatcherThread::new();
    server.start().unwrap();
    let client = DispatcherThread::new();
    client.start().unwrap();

    let listener = echo_server(&server);
    let address = listener.local_addr().unwrap();

    let (tx, rx) = mpsc::channel();
    let (written_tx, written_rx) = mpsc::channel();
    let keep = Arc::new(Mutex::new(None));
    let slot = keep.clone();

    AsyncTcpConnection::connect_with_context(
        address,
        client.context(),
        ConnectionConfig::new(),
        move |result| {
            let connection = result.unwrap();
            let reader = connection.clone();
            connection.on_read(move |result| {
                let data = result.unwrap();
                let done = data.is_empty();
                tx.send(data).unwrap();
                if !done {
                    reader.read().unwrap();
                }
            });
            connection.on_write(move |completion| {
                written_tx.send((completion.tag, completion.result.is_ok())).unwrap();
            });
            connection.write(b"ping".to_vec(), WriteTag(7)).unwrap();
            connection.read().unwrap();
            *slot.lock().unwrap() = Some(connection);
        },
    )
    .unwrap();

    assert_eq!(written_rx.recv_timeout(WAIT).unwrap(), (WriteTag(7), true));

    let mut echoed = Vec::new();
    while echoed.len() < 4 {
        echoed.extend(rx.recv_timeout(WAIT).unwrap());
    }
    assert_eq!(echoed, b"ping");

    let connection = keep.lock().unwrap().take().unwrap();
    assert_eq!(connection.remote_addr().unwrap(), address);
    connection.close();
    listener.close();
    client.join().unwrap();
    server.join().unwrap();
}

#[test]
fn test_connect_to_closed_port_fails() {
    let address = {
        let reserved = std::net::TcpListener::bind(loopback()).unwrap();
        reserved.local_addr().unwrap()
    };
    let client = DispatcherThread::new();
    client.start().unwrap();
    let (tx, rx) = mpsc::channel();

    AsyncTcpConnection::connect_with_context(
        address,
        client.context(),
        ConnectionConfig::new(),
        move |result| tx.send(result.is_err()).unwrap(),
    )
    .unwrap();

    assert!(rx.recv_timeout(WAIT).unwrap(), "Connect to a closed port succeeded");
    client.join().unwrap();
}

#[test]
fn test_listen_twice_and_after_close() {
    let server = DispatcherThread::new();
    server.start().unwrap();
    let listener =
        AsyncTcpListener::bind_with_context(loopback(), server.context(), ConnectionConfig::new())
            .unwrap();

    listener.listen(|_| {}).unwrap();
    assert!(matches!(listener.listen(|_| {}), Err(Error::AlreadySet(_))));

    listener.close();
    assert!(matches!(listener.listen(|_| {}), Err(Error::Closed)));
    server.join().unwrap();
}

#[test]
fn test_dropping_listener_stops_accepting() {
    let server = DispatcherThread::new();
    server.start().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let address = {
        let listener = AsyncTcpListener::bind_with_context(
            loopback(),
            server.context(),
            ConnectionConfig::new(),
        )
        .unwrap();
        let counter = accepted.clone();
        listener
            .listen(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let copy = listener.clone();
        drop(copy);
        listener.local_addr().unwrap()
    };

    assert!(std::net::TcpStream::connect(address).is_err());
    thread::sleep(Duration::from_millis(50));
    server.do_sync(|| {}).unwrap();

    assert_eq!(accepted.load(Ordering::SeqCst), 0);
    server.join().unwrap();
}

#[test]
fn test_peer_shutdown_reads_end_of_stream() {
    let server = DispatcherThread::new();
    server.start().unwrap();
    let (tx, rx) = mpsc::channel();

    let listener =
        AsyncTcpListener::bind_with_context(loopback(), server.context(), ConnectionConfig::new())
            .unwrap();
    listener
        .listen(move |accepted| {
            let connection = accepted.unwrap();
            let tx = tx.clone();
            let reader = connection.clone();
            connection.on_read(move |result| {
                let data = result.unwrap();
                let done = data.is_empty();
                tx.send(data).unwrap();
                if done {
                    reader.close();
                } else {
                    reader.read().unwrap();
                }
            });
            connection.read().unwrap();
        })
        .unwrap();

    let mut stream = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    std::io::Write::write_all(&mut stream, b"bye").unwrap();
    stream.shutdown(std::net::Shutdown::Write).unwrap();

    let mut received = Vec::new();
    loop {
        let data = rx.recv_timeout(WAIT).unwrap();
        if data.is_empty() {
            break;
        }
        received.extend(data);
    }
    assert_eq!(received, b"bye");

    listener.close();
    server.join().unwrap();
}
