//! HTTP/1.x wire format for a connection.
//!
//! Requests are parsed with `httparse` straight out of the connection's read
//! buffer; the body is framed by `Content-Length` or chunked transfer coding.
//! Responses are serialized into the connection's write buffer and leave the
//! socket on the next flush.

use crate::connection::keep_alive;
use crate::error::{Error, Result};
use crate::net::buffered::BufferedStream;

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Version};
use std::io;

/// Most headers accepted in one request head.
pub const MAX_HEADERS: usize = 64;

/// Largest request head (request line plus headers) accepted.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

const MAX_CHUNK_LINE: usize = 1024;

/// Reads and parses one request head.
///
/// Bytes after the head stay buffered for [`parse_body`] or the next request.
///
/// # Errors
/// [`Error::Parse`] for malformed or truncated input, [`Error::Io`] when the
/// socket itself fails.
pub(crate) async fn parse_request(stream: &mut BufferedStream) -> Result<Request<()>> {
    let mut head = Vec::new();

    loop {
        let chunk = stream.fill_buf().await?;
        if chunk.is_empty() {
            return Err(malformed("connection closed inside the request head"));
        }

        let before = head.len();
        let chunk_len = chunk.len();
        head.extend_from_slice(chunk);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);

        match parsed.parse(&head) {
            Ok(httparse::Status::Complete(length)) => {
                let request = build_request(&parsed)?;
                stream.consume(length - before);

                return Ok(request);
            }
            Ok(httparse::Status::Partial) => {
                stream.consume(chunk_len);

                if head.len() > MAX_HEAD_BYTES {
                    return Err(malformed("request head too large"));
                }
            }
            Err(error) => return Err(malformed(error)),
        }
    }
}

/// Reads the body that follows `request`'s head.
///
/// A request with neither `Transfer-Encoding: chunked` nor `Content-Length`
/// has an empty body.
pub(crate) async fn parse_body(request: &Request<()>, stream: &mut BufferedStream) -> Result<Bytes> {
    let headers = request.headers();

    if is_chunked(headers) {
        return read_chunked(stream).await;
    }

    match content_length(headers)? {
        Some(length) => {
            let body = stream.read_exact(length).await.map_err(truncated)?;
            Ok(Bytes::from(body))
        }
        None => Ok(Bytes::new()),
    }
}

/// Queues `response` and `body` on the connection's write buffer.
pub(crate) fn serialize_response(response: &Response<()>, body: &[u8], stream: &mut BufferedStream) {
    stream.write(&encode_head(response, body.len()));

    if !body.is_empty() {
        stream.write(body);
    }
}

/// Status line and headers, terminated by the blank line.
///
/// `content-length` is added when the response declares no framing of its
/// own and either carries a body or keeps the connection open. An empty
/// keep-alive response without it would leave the client reading until the
/// connection closes. Statuses that never carry a body (1xx, 204, 304) are
/// left alone when empty.
pub fn encode_head(response: &Response<()>, body_len: usize) -> Vec<u8> {
    let (major, minor) = version_pair(response.version());
    let status = response.status();
    let headers = response.headers();

    let mut head = Vec::with_capacity(128);
    head.extend_from_slice(
        format!(
            "HTTP/{major}.{minor} {} {}\r\n",
            status.as_str(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );

    for (name, value) in headers {
        push_header(&mut head, name, value);
    }

    let framed = headers.contains_key(CONTENT_LENGTH) || headers.contains_key(TRANSFER_ENCODING);
    let needs_length = body_len > 0 || (allows_body(status) && keep_alive(response));

    if !framed && needs_length {
        push_header(&mut head, &CONTENT_LENGTH, &HeaderValue::from(body_len));
    }

    head.extend_from_slice(b"\r\n");

    head
}

/// The canned reply to a request that could not be parsed:
/// `HTTP/1.0 400`, `content-length: 0`, no body.
pub fn bad_request() -> Response<()> {
    let mut response = Response::new(());
    *response.status_mut() = StatusCode::BAD_REQUEST;
    *response.version_mut() = Version::HTTP_10;
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

    response
}

/// Protocol version as a `(major, minor)` pair.
pub fn version_pair(version: Version) -> (u8, u8) {
    if version == Version::HTTP_09 {
        (0, 9)
    } else if version == Version::HTTP_10 {
        (1, 0)
    } else if version == Version::HTTP_11 {
        (1, 1)
    } else if version == Version::HTTP_2 {
        (2, 0)
    } else if version == Version::HTTP_3 {
        (3, 0)
    } else {
        (0, 0)
    }
}

/// Lower-cased tokens of every `connection` header, e.g. `close`.
pub fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    header_tokens(headers, &CONNECTION)
}

fn header_tokens(headers: &HeaderMap, name: &HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn build_request(parsed: &httparse::Request<'_, '_>) -> Result<Request<()>> {
    let method = parsed.method.ok_or_else(|| malformed("missing method"))?;
    let path = parsed.path.ok_or_else(|| malformed("missing request target"))?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        other => return Err(malformed(format!("unsupported version {other:?}"))),
    };

    let mut builder = Request::builder().method(method).uri(path).version(version);
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }

    builder.body(()).map_err(malformed)
}

fn allows_body(status: StatusCode) -> bool {
    !status.is_informational() && status != StatusCode::NO_CONTENT && status != StatusCode::NOT_MODIFIED
}

fn is_chunked(headers: &HeaderMap) -> bool {
    header_tokens(headers, &TRANSFER_ENCODING)
        .last()
        .is_some_and(|coding| coding == "chunked")
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>> {
    let mut length = None;

    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|text| text.trim().parse::<usize>().ok())
            .ok_or_else(|| malformed("invalid content-length"))?;

        match length {
            Some(previous) if previous != parsed => {
                return Err(malformed("conflicting content-length headers"));
            }
            _ => length = Some(parsed),
        }
    }

    Ok(length)
}

async fn read_chunked(stream: &mut BufferedStream) -> Result<Bytes> {
    let mut body = Vec::new();

    loop {
        let line = stream.read_line(MAX_CHUNK_LINE).await.map_err(truncated)?;
        let line = std::str::from_utf8(&line).map_err(|_| malformed("chunk size is not ASCII"))?;
        let size = line
            .trim_end_matches(['\r', '\n'])
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        let size = usize::from_str_radix(size, 16)
            .map_err(|_| malformed(format!("invalid chunk size {size:?}")))?;

        if size == 0 {
            break;
        }

        body.extend_from_slice(&stream.read_exact(size).await.map_err(truncated)?);

        if stream.read_exact(2).await.map_err(truncated)? != b"\r\n" {
            return Err(malformed("chunk not terminated by CRLF"));
        }
    }

    // Trailer fields are read and discarded.
    loop {
        let trailer = stream.read_line(MAX_HEAD_BYTES).await.map_err(truncated)?;
        if trailer == b"\r\n" || trailer == b"\n" {
            return Ok(Bytes::from(body));
        }
    }
}

fn push_header(head: &mut Vec<u8>, name: &HeaderName, value: &HeaderValue) {
    head.extend_from_slice(name.as_str().as_bytes());
    head.extend_from_slice(b": ");
    head.extend_from_slice(value.as_bytes());
    head.extend_from_slice(b"\r\n");
}

fn malformed(reason: impl ToString) -> Error {
    Error::Parse(reason.to_string())
}

// A short read inside a framed body is the client's fault, not the socket's.
fn truncated(error: io::Error) -> Error {
    match error.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
            malformed(format!("request body: {error}"))
        }
        _ => Error::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Runtime;
    use crate::net::tcp_stream::TcpStream;
    use http::Method;
    use std::io::Write;
    use std::net::Shutdown;
    use std::os::unix::io::IntoRawFd;
    use std::os::unix::net::UnixStream;

    fn connection(runtime: &Runtime, input: &[u8]) -> BufferedStream {
        let (ours, mut theirs) = UnixStream::pair().expect("socket pair");
        ours.set_nonblocking(true).expect("nonblocking");
        theirs.write_all(input).expect("write input");
        theirs.shutdown(Shutdown::Write).expect("shutdown");

        let stream = TcpStream::new(ours.into_raw_fd(), runtime.reactor());
        BufferedStream::new(stream, 1024)
    }

    fn parse(input: &[u8]) -> Result<(Request<()>, Bytes)> {
        let runtime = Runtime::new().expect("runtime");
        let mut stream = connection(&runtime, input);

        runtime
            .run_until(async {
                let request = parse_request(&mut stream).await?;
                let body = parse_body(&request, &mut stream).await?;
                Ok::<_, Error>((request, body))
            })
            .expect("run")
            .expect("completed")
    }

    #[test]
    fn parses_head_and_sized_body() {
        let (request, body) = parse(
            b"POST /items?id=4 HTTP/1.1\r\nHost: example.test\r\nContent-Length: 5\r\n\r\nhello",
        )
        .expect("parse");

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri().path(), "/items");
        assert_eq!(request.uri().query(), Some("id=4"));
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.headers()["host"], "example.test");
        assert_eq!(body, Bytes::from_static(b"hello"));
    }

    #[test]
    fn request_without_framing_has_empty_body() {
        let (request, body) = parse(b"GET / HTTP/1.0\r\n\r\n").expect("parse");

        assert_eq!(request.version(), Version::HTTP_10);
        assert!(body.is_empty());
    }

    #[test]
    fn decodes_chunked_body_with_trailers() {
        let (_, body) = parse(
            b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nExpires: never\r\n\r\n",
        )
        .expect("parse");

        assert_eq!(body, Bytes::from_static(b"Wikipedia"));
    }

    #[test]
    fn head_is_left_for_the_next_request() {
        let runtime = Runtime::new().expect("runtime");
        let mut stream = connection(
            &runtime,
            b"GET /one HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\n\r\n",
        );

        let paths = runtime
            .run_until(async {
                let first = parse_request(&mut stream).await.expect("first");
                let second = parse_request(&mut stream).await.expect("second");
                (first.uri().path().to_owned(), second.uri().path().to_owned())
            })
            .expect("run")
            .expect("completed");

        assert_eq!(paths, ("/one".to_owned(), "/two".to_owned()));
    }

    #[test]
    fn rejects_garbage() {
        let error = parse(b"this is not http\r\n\r\n").expect_err("malformed");

        assert!(matches!(error, Error::Parse(_)));
    }

    #[test]
    fn rejects_truncated_head_and_body() {
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nHost: x").expect_err("truncated head"),
            Error::Parse(_)
        ));
        assert!(matches!(
            parse(b"PUT / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").expect_err("truncated body"),
            Error::Parse(_)
        ));
    }

    #[test]
    fn rejects_conflicting_lengths() {
        let error = parse(b"POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab")
            .expect_err("conflict");

        assert!(matches!(error, Error::Parse(_)));
    }

    #[test]
    fn encodes_status_line_and_headers() {
        let response = Response::builder()
            .status(200)
            .header("content-length", "5")
            .body(())
            .expect("response");

        assert_eq!(
            encode_head(&response, 5),
            b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\n"
        );
    }

    #[test]
    fn adds_missing_content_length() {
        let response = Response::builder()
            .status(404)
            .version(Version::HTTP_10)
            .body(())
            .expect("response");

        assert_eq!(
            encode_head(&response, 3),
            b"HTTP/1.0 404 Not Found\r\ncontent-length: 3\r\n\r\n"
        );
        assert_eq!(encode_head(&response, 0), b"HTTP/1.0 404 Not Found\r\n\r\n");
    }

    #[test]
    fn empty_keep_alive_response_is_framed() {
        let response = Response::new(());
        assert!(keep_alive(&response));

        assert_eq!(
            encode_head(&response, 0),
            b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[test]
    fn bodiless_statuses_get_no_length() {
        let no_content = Response::builder().status(204).body(()).expect("response");
        let not_modified = Response::builder().status(304).body(()).expect("response");
        let closing = Response::builder()
            .status(200)
            .header("connection", "close")
            .body(())
            .expect("response");

        assert_eq!(encode_head(&no_content, 0), b"HTTP/1.1 204 No Content\r\n\r\n");
        assert_eq!(encode_head(&not_modified, 0), b"HTTP/1.1 304 Not Modified\r\n\r\n");
        assert_eq!(
            encode_head(&closing, 0),
            b"HTTP/1.1 200 OK\r\nconnection: close\r\n\r\n"
        );
    }

    #[test]
    fn canned_bad_request() {
        assert_eq!(
            encode_head(&bad_request(), 0),
            b"HTTP/1.0 400 Bad Request\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[test]
    fn splits_connection_tokens() {
        let mut headers = HeaderMap::new();
        headers.append(CONNECTION, HeaderValue::from_static("Keep-Alive, Upgrade"));
        headers.append(CONNECTION, HeaderValue::from_static(" close "));

        assert_eq!(connection_tokens(&headers), vec!["keep-alive", "upgrade", "close"]);
    }

    #[test]
    fn maps_versions_to_pairs() {
        assert_eq!(version_pair(Version::HTTP_09), (0, 9));
        assert_eq!(version_pair(Version::HTTP_10), (1, 0));
        assert_eq!(version_pair(Version::HTTP_11), (1, 1));
        assert_eq!(version_pair(Version::HTTP_2), (2, 0));
    }
}
