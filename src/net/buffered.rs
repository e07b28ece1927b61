//! Buffered reading and writing on top of [`TcpStream`].
//!
//! Reads go through a fixed-size buffer so a request head can be parsed in
//! place and a single byte can be peeked to detect end of stream. Writes are
//! collected until [`BufferedStream::flush`].

use crate::net::tcp_stream::TcpStream;

use std::io;

pub(crate) struct BufferedStream {
    stream: TcpStream,
    read_buffer: Box<[u8]>,
    start: usize,
    end: usize,
    write_buffer: Vec<u8>,
}

impl BufferedStream {
    pub(crate) fn new(stream: TcpStream, read_capacity: usize) -> Self {
        Self {
            stream,
            read_buffer: vec![0; read_capacity.max(1)].into_boxed_slice(),
            start: 0,
            end: 0,
            write_buffer: Vec::new(),
        }
    }

    pub(crate) fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    /// Returns the buffered bytes, reading from the socket if none are left.
    /// An empty slice means end of stream.
    pub(crate) async fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.start == self.end {
            let read = self.stream.read(&mut self.read_buffer).await?;
            self.start = 0;
            self.end = read;
        }

        Ok(&self.read_buffer[self.start..self.end])
    }

    /// Marks `amount` buffered bytes as read.
    pub(crate) fn consume(&mut self, amount: usize) {
        self.start = (self.start + amount).min(self.end);
    }

    /// Looks at the next byte without consuming it; `None` at end of stream.
    pub(crate) async fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.fill_buf().await?.first().copied())
    }

    /// Reads exactly `length` bytes.
    pub(crate) async fn read_exact(&mut self, length: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(length.min(64 * 1024));

        while out.len() < length {
            let available = self.fill_buf().await?;
            if available.is_empty() {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }

            let take = available.len().min(length - out.len());
            out.extend_from_slice(&available[..take]);
            self.consume(take);
        }

        Ok(out)
    }

    /// Reads up to and including the next `\n`, failing past `limit` bytes.
    pub(crate) async fn read_line(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let available = self.fill_buf().await?;
            if available.is_empty() {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }

            let (take, done) = match available.iter().position(|&byte| byte == b'\n') {
                Some(index) => (index + 1, true),
                None => (available.len(), false),
            };

            line.extend_from_slice(&available[..take]);
            self.consume(take);

            if done {
                return Ok(line);
            }
            if line.len() > limit {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
            }
        }
    }

    /// Queues bytes for the next flush.
    pub(crate) fn write(&mut self, bytes: &[u8]) {
        self.write_buffer.extend_from_slice(bytes);
    }

    /// Writes every queued byte to the socket.
    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.write_buffer).await?;
        self.write_buffer.clear();

        Ok(())
    }

    pub(crate) fn into_inner(self) -> TcpStream {
        self.stream
    }
}
