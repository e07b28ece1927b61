use http::{Method, Response, Version};
use reactor_web::{Bytes, Error, Server, ServerBuilder};
use std::io::{Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open() -> Server {
    init_tracing();

    ServerBuilder::new().port(0).open().expect("open server")
}

fn connect(server: &Server) -> StdTcpStream {
    let client = StdTcpStream::connect(server.local_addr()).expect("connect");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");

    client
}

fn ok(body_len: usize) -> Response<()> {
    Response::builder()
        .status(200)
        .version(Version::HTTP_11)
        .header("content-length", body_len.to_string())
        .body(())
        .expect("response")
}

fn read_exactly(client: &mut StdTcpStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    client.read_exact(&mut buf).expect("read_exact");

    String::from_utf8(buf).expect("utf8")
}

fn read_to_close(client: &mut StdTcpStream) -> String {
    let mut received = String::new();
    client.read_to_string(&mut received).expect("read to end");

    received
}

/// Drives `server` without blocking until `client` has finished.
fn drive_until_done<T>(server: &mut Server, client: thread::JoinHandle<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !client.is_finished() {
        assert!(Instant::now() < deadline, "client did not finish in time");
        assert!(server.try_read().expect("try_read").is_none());
        thread::sleep(Duration::from_millis(1));
    }

    client.join().expect("client thread")
}

#[test]
fn serves_keep_alive_then_closes() {
    let mut server = open();
    let mut client = connect(&server);

    client
        .write_all(b"GET /hello HTTP/1.1\r\nHost: test\r\n\r\n")
        .expect("write");

    let exchange = server.read().expect("read");
    assert_eq!(exchange.request.method(), Method::GET);
    assert_eq!(exchange.request.uri().path(), "/hello");
    assert_eq!(exchange.request.headers()["host"], "test");
    assert!(exchange.body.is_empty());

    server
        .write(exchange.handle, ok(5), Bytes::from_static(b"hello"))
        .expect("write");

    let expected = "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello";
    assert_eq!(read_exactly(&mut client, expected.len()), expected);

    client.write_all(b"GET /bye HTTP/1.1\r\n\r\n").expect("write");

    let exchange = server.read().expect("read");
    assert_eq!(exchange.request.uri().path(), "/bye");

    let closing = Response::builder()
        .status(200)
        .header("connection", "close")
        .header("content-length", "3")
        .body(())
        .expect("response");
    server
        .write(exchange.handle, closing, Bytes::from_static(b"bye"))
        .expect("write");

    assert_eq!(
        read_to_close(&mut client),
        "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 3\r\n\r\nbye"
    );

    server.close();
}

#[test]
fn malformed_request_gets_canned_400() {
    let mut server = open();
    let addr = server.local_addr();

    let client = thread::spawn(move || {
        let mut client = StdTcpStream::connect(addr).expect("connect");
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        client.write_all(b"NOT A REQUEST\r\n\r\n").expect("write");

        read_to_close(&mut client)
    });

    let received = drive_until_done(&mut server, client);

    assert_eq!(received, "HTTP/1.0 400 Bad Request\r\ncontent-length: 0\r\n\r\n");
}

#[test]
fn pipelined_requests_wait_for_their_turn() {
    let mut server = open();
    let mut client = connect(&server);

    client
        .write_all(b"GET /one HTTP/1.1\r\n\r\nPOST /two HTTP/1.1\r\nContent-Length: 4\r\n\r\ndata")
        .expect("write");

    let first = server.read().expect("read");
    assert_eq!(first.request.uri().path(), "/one");

    // The second request stays unread until the first is answered.
    assert!(server.try_read().expect("try_read").is_none());

    server
        .write(first.handle, ok(1), Bytes::from_static(b"1"))
        .expect("write");

    let second = server.read().expect("read");
    assert_eq!(second.request.method(), Method::POST);
    assert_eq!(second.request.uri().path(), "/two");
    assert_eq!(second.body, Bytes::from_static(b"data"));

    let mut closing = ok(1);
    *closing.version_mut() = Version::HTTP_10;
    server
        .write(second.handle, closing, Bytes::from_static(b"2"))
        .expect("write");

    assert_eq!(
        read_to_close(&mut client),
        "HTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\n1\
         HTTP/1.0 200 OK\r\ncontent-length: 1\r\n\r\n2"
    );
}

#[test]
fn foreign_handle_is_returned_untouched() {
    let mut server = open();
    let mut other = open();
    let mut client = connect(&server);

    client.write_all(b"GET / HTTP/1.0\r\n\r\n").expect("write");
    let exchange = server.read().expect("read");

    let handle = match other.write(exchange.handle, ok(0), Bytes::new()) {
        Err(Error::ForeignHandle(handle)) => handle,
        result => panic!("expected a foreign handle error, got {result:?}"),
    };
    assert!(handle.is_waiting());

    let mut response = ok(2);
    *response.version_mut() = Version::HTTP_10;
    server
        .write(handle, response, Bytes::from_static(b"ok"))
        .expect("write");

    assert_eq!(
        read_to_close(&mut client),
        "HTTP/1.0 200 OK\r\ncontent-length: 2\r\n\r\nok"
    );
}

#[test]
fn close_releases_every_connection() {
    let mut server = open();
    let addr = server.local_addr();

    let mut clients: Vec<StdTcpStream> = (0..3).map(|_| connect(&server)).collect();
    for (index, client) in clients.iter_mut().enumerate() {
        client
            .write_all(format!("GET /{index} HTTP/1.1\r\n\r\n").as_bytes())
            .expect("write");
    }

    let handles: Vec<_> = (0..3)
        .map(|_| server.read().expect("read").handle)
        .collect();
    assert!(handles.iter().all(|handle| handle.is_waiting()));

    server.close();

    assert!(handles.iter().all(|handle| !handle.is_waiting()));
    for client in &mut clients {
        assert_eq!(read_to_close(client), "");
    }
    assert!(StdTcpStream::connect(addr).is_err());
}

#[test]
fn serves_on_a_prebuilt_listener() {
    init_tracing();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mut server = ServerBuilder::new()
        .listener(listener)
        .backlog(16)
        .open()
        .expect("open server");
    assert_eq!(server.local_addr(), addr);

    let mut client = connect(&server);
    client.write_all(b"GET /adopted HTTP/1.0\r\n\r\n").expect("write");

    let exchange = server.read().expect("read");
    assert_eq!(exchange.request.version(), Version::HTTP_10);
    assert_eq!(exchange.request.uri().path(), "/adopted");

    let response = Response::builder()
        .status(404)
        .version(Version::HTTP_10)
        .body(())
        .expect("response");
    server
        .write(exchange.handle, response, Bytes::from_static(b"missing"))
        .expect("write");

    assert_eq!(
        read_to_close(&mut client),
        "HTTP/1.0 404 Not Found\r\ncontent-length: 7\r\n\r\nmissing"
    );
}

#[test]
fn runtime_tasks_share_the_server_thread() {
    let mut server = open();

    let task = server.runtime().spawn(async { 6 * 7 });
    assert_eq!(server.runtime().run_until(task).expect("run"), Some(42));

    let mut client = connect(&server);
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").expect("write");

    let exchange = server.read().expect("read");
    server
        .write(exchange.handle, ok(0), Bytes::new())
        .expect("write");

    let expected = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n";
    assert_eq!(read_exactly(&mut client, expected.len()), expected);
}

/// Opens a server on a listener that is then shut down underneath it, so the
/// next `accept` fails.
#[cfg(target_os = "linux")]
fn server_with_dead_listener() -> Server {
    use std::os::unix::io::AsRawFd;

    init_tracing();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let fd = listener.as_raw_fd();
    let server = ServerBuilder::new()
        .listener(listener)
        .open()
        .expect("open server");

    assert_eq!(unsafe { libc::shutdown(fd, libc::SHUT_RDWR) }, 0);

    server
}

#[cfg(target_os = "linux")]
#[test]
fn read_reports_accept_loop_death_once() {
    let mut server = server_with_dead_listener();

    assert!(matches!(server.read(), Err(Error::AcceptLoop(_))));
    assert!(matches!(server.read(), Err(Error::AcceptLoopStopped)));
    assert!(matches!(server.try_read(), Err(Error::AcceptLoopStopped)));
}

#[cfg(target_os = "linux")]
#[test]
fn try_read_reports_accept_loop_death_once() {
    let mut server = server_with_dead_listener();
    let deadline = Instant::now() + Duration::from_secs(5);

    loop {
        match server.try_read() {
            Ok(None) => {
                assert!(Instant::now() < deadline, "accept loop never failed");
                thread::sleep(Duration::from_millis(1));
            }
            Err(Error::AcceptLoop(_)) => break,
            other => panic!("expected the accept loop to fail, got {other:?}"),
        }
    }

    assert!(matches!(server.try_read(), Err(Error::AcceptLoopStopped)));
    assert!(matches!(server.read(), Err(Error::AcceptLoopStopped)));
}
