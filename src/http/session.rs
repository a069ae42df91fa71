//! Session operations abstraction
//!
//! The HTTP/2 code never touches sockets directly. It reads and writes
//! through `SessionOps`, which the TLS layer implements, and through
//! `HttpSession`, which adds readiness polling with a timeout.

use super::{Error, Result};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Session operations trait
///
/// This trait defines the operations that can be performed on a session,
/// independent of how the bytes are protected on the wire.
pub trait SessionOps {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<()>;

    /// Close the session
    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Wait for readiness on a raw descriptor.
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }

    Ok(result > 0)
}

/// Session wrapper with a per-operation readiness timeout
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a new session with the default 10 second timeout
    pub fn new(session: S) -> Self {
        HttpSession {
            session,
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Read data with timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Read, self.timeout)? {
            return Err(Error::Timeout);
        }

        self.session.read(buf)
    }

    /// Fill `buf` completely, failing on EOF
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }

    /// Write all of `buf` and flush
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            if !self.session.poll(PollEvents::Write, self.timeout)? {
                return Err(Error::Timeout);
            }
            let n = self.session.write(&buf[written..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            written += n;
        }
        self.session.flush()
    }

    /// Close the session
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Get a reference to the underlying session
    pub fn get_ref(&self) -> &S {
        &self.session
    }

    /// Get a mutable reference to the underlying session
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory session that is always ready
    struct MemorySession {
        input: VecDeque<u8>,
        output: Vec<u8>,
        chunk: usize,
    }

    impl SessionOps for MemorySession {
        fn poll(&self, _events: PollEvents, _timeout: Option<Duration>) -> Result<bool> {
            Ok(true)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let n = buf.len().min(self.chunk).min(self.input.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.input.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            let n = buf.len().min(self.chunk);
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_exact_across_short_reads() {
        let mut session = HttpSession::new(MemorySession {
            input: b"abcdefg".iter().copied().collect(),
            output: Vec::new(),
            chunk: 2,
        });

        let mut buf = [0u8; 5];
        session.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcde");
    }

    #[test]
    fn test_read_exact_reports_eof() {
        let mut session = HttpSession::new(MemorySession {
            input: b"ab".iter().copied().collect(),
            output: Vec::new(),
            chunk: 8,
        });

        let mut buf = [0u8; 4];
        assert!(matches!(session.read_exact(&mut buf), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_write_all_across_short_writes() {
        let mut session = HttpSession::new(MemorySession {
            input: VecDeque::new(),
            output: Vec::new(),
            chunk: 3,
        });

        session.write_all(b"hello world").unwrap();
        assert_eq!(session.get_ref().output, b"hello world");
    }

    #[test]
    fn test_poll_fd_times_out_on_idle_socket() {
        use std::net::{TcpListener, TcpStream};
        use std::os::fd::AsRawFd;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let _peer = listener.accept().unwrap();

        let ready = poll_fd(
            stream.as_raw_fd(),
            PollEvents::Read,
            Some(Duration::from_millis(50)),
        )
        .unwrap();
        assert!(!ready);
    }
}
