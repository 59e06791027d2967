//! End-to-end check that a watchdog expiry unblocks a real socket read.

use std::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use imap_wire::{Connection, ReadWatchdog, WireError};

#[test]
fn watchdog_interrupts_a_stalled_socket_read() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // The server accepts and then stays silent until told to quit, so
    // the client read blocks for real.
    let (quit_tx, quit_rx) = mpsc::channel::<()>();
    let server = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        let _ = quit_rx.recv();
        drop(socket);
    });

    let stream = TcpStream::connect(addr).unwrap();
    let kick = stream.try_clone().unwrap();
    let mut conn = Connection::new(BufReader::new(stream), "127.0.0.1").with_user("itest");

    let watchdog = ReadWatchdog::new(Duration::from_millis(10)).unwrap();
    let guard = watchdog.watch(Duration::from_millis(50), conn.cancel_token(), Box::new(kick));

    let started = Instant::now();
    let err = conn.read_response(None).unwrap_err();
    let elapsed = started.elapsed();

    assert!(guard.is_expired());
    assert!(
        matches!(err, WireError::Interrupted { ref host, ref user }
            if host == "127.0.0.1" && user.as_deref() == Some("itest")),
        "unexpected error: {err:?}"
    );
    // Well before the server would have produced anything.
    assert!(elapsed < Duration::from_secs(5), "read took {elapsed:?}");

    drop(guard);
    quit_tx.send(()).unwrap();
    server.join().unwrap();
}

#[test]
fn prompt_response_is_not_interrupted() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        use std::io::Write;
        let mut socket = socket;
        socket.write_all(b"* OK server ready\r\n").unwrap();
        // Hold the socket open until the client is done reading.
        thread::sleep(Duration::from_millis(200));
    });

    let stream = TcpStream::connect(addr).unwrap();
    let kick = stream.try_clone().unwrap();
    let mut conn = Connection::new(BufReader::new(stream), "127.0.0.1");

    let watchdog = ReadWatchdog::new(Duration::from_millis(10)).unwrap();
    let guard = watchdog.watch(Duration::from_secs(30), conn.cancel_token(), Box::new(kick));

    let response = conn.read_response(None).unwrap();
    drop(guard);

    assert_eq!(response.as_bytes(), b"* OK server ready\r\n");
    server.join().unwrap();
}
