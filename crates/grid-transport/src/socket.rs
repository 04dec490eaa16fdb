//! A nonblocking, internally buffered TCP stream.
//!
//! Reads are served out of a ring buffer filled in bulk from the kernel;
//! writes accumulate in a plain `Vec` and go out in one `flush`. Blocking
//! reads/writes spin with a short backoff instead of calling `poll(2)`
//! directly, since this crate doesn't carry a libc/mio dependency — see
//! `DESIGN.md`.

use crate::error::{TransportError, TransportResult};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const BUFFER_SIZE: usize = 4096;
const POLL_BACKOFF: Duration = Duration::from_micros(200);

pub struct Socket {
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
    head: usize,
    tail: usize,
    write_buffer: Vec<u8>,
}

impl Socket {
    pub fn new() -> Self {
        Socket {
            stream: None,
            buffer: vec![0u8; BUFFER_SIZE],
            head: 0,
            tail: 0,
            write_buffer: Vec::new(),
        }
    }

    pub fn from_stream(stream: TcpStream) -> TransportResult<Self> {
        stream.set_nonblocking(true)?;
        Ok(Socket { stream: Some(stream), buffer: vec![0u8; BUFFER_SIZE], head: 0, tail: 0, write_buffer: Vec::new() })
    }

    pub fn connect(host: &str, port: u16) -> TransportResult<Self> {
        let stream = TcpStream::connect((host, port))?;
        Self::from_stream(stream)
    }

    pub fn close(&mut self) {
        self.stream = None;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn buffer_size(&self) -> usize {
        self.tail - self.head
    }

    fn space_in_buffer(&self) -> usize {
        self.buffer.len() - self.tail
    }

    fn cycle_buffer(&mut self) {
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        } else {
            let size = self.tail - self.head;
            self.buffer.copy_within(self.head..self.tail, 0);
            self.head = 0;
            self.tail = size;
        }
    }

    fn fill_from_kernel(&mut self) -> TransportResult<bool> {
        self.cycle_buffer();
        let tail = self.tail;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        match stream.read(&mut self.buffer[tail..]) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                self.tail += n;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Read exactly `out.len()` bytes, blocking (spin-backoff) until they
    /// arrive if `block` is true; otherwise return as many as are
    /// immediately available (possibly zero).
    pub fn read(&mut self, out: &mut [u8], block: bool) -> TransportResult<usize> {
        let mut total = 0;
        let mut did = false;
        let mut remaining = out.len();
        let mut cursor = 0;

        while remaining > 0 {
            if self.buffer_size() > 0 {
                let copy_size = remaining.min(self.buffer_size());
                out[cursor..cursor + copy_size].copy_from_slice(&self.buffer[self.head..self.head + copy_size]);
                self.head += copy_size;
                cursor += copy_size;
                remaining -= copy_size;
                total += copy_size;
            } else {
                if !block && did {
                    return Ok(total);
                }

                if self.fill_from_kernel()? {
                    did = true;
                } else {
                    if !block {
                        return Ok(total);
                    }
                    std::thread::sleep(POLL_BACKOFF);
                }
            }
        }

        Ok(total)
    }

    pub fn write(&mut self, data: &[u8]) {
        self.write_buffer.extend_from_slice(data);
    }

    /// Drain the write buffer to the kernel, blocking (spin-backoff) on
    /// `WouldBlock`.
    pub fn flush(&mut self) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut written = 0;
        while written < self.write_buffer.len() {
            match stream.write(&self.write_buffer[written..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(POLL_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.write_buffer.clear();
        Ok(())
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn round_trips_bytes_over_a_loopback_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let mut client = Socket::connect(&addr.ip().to_string(), addr.port()).unwrap();
        client.write(b"hello");
        client.flush().unwrap();

        let received = server.join().unwrap();
        assert_eq!(&received, b"hello");
    }

    #[test]
    fn nonblocking_read_returns_immediately_with_no_data() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = std::thread::spawn(move || listener.accept().unwrap());

        let mut client = Socket::connect(&addr.ip().to_string(), addr.port()).unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf, false).unwrap();
        assert_eq!(n, 0);
    }
}
