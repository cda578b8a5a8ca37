//! Byte transport abstraction.
//!
//! The session engine speaks to its peer through these traits and stays
//! ignorant of sockets, OS pipes, or anything else concrete. Methods take
//! `&self` so one endpoint can be shared between the read pump and a
//! closer: `close` must be callable while another thread is blocked in
//! `read`, and must wake it.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// A blocking byte source.
pub trait Reader: Send + Sync {
    /// Blocks until at least one byte is available, then copies up to
    /// `buf.len()` bytes and returns how many. Returns 0 once the stream is
    /// closed and drained.
    fn read(&self, buf: &mut [u8]) -> usize;

    fn is_open(&self) -> bool;

    /// Idempotent. Wakes any blocked `read`.
    fn close(&self);
}

/// A blocking byte sink.
pub trait Writer: Send + Sync {
    /// Returns false once the stream is closed or broken.
    fn write(&self, bytes: &[u8]) -> bool;

    fn is_open(&self) -> bool;

    /// Idempotent.
    fn close(&self);
}

/// A bidirectional transport.
pub trait ReaderWriter: Reader + Writer {}

impl<T: Reader + Writer> ReaderWriter for T {}

/// Creates an in-memory unidirectional FIFO: bytes written to it come back
/// out of `read` in order. Two crossed pipes form a duplex link between two
/// in-process sessions.
pub fn pipe() -> Arc<Pipe> {
    Arc::new(Pipe {
        state: Mutex::new(PipeState {
            buf: VecDeque::new(),
            closed: false,
        }),
        readable: Condvar::new(),
    })
}

pub struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

impl Reader for Pipe {
    fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let mut state = self.state.lock().unwrap();
        while state.buf.is_empty() && !state.closed {
            state = self.readable.wait(state).unwrap();
        }
        // Buffered bytes written before close are still delivered.
        let n = state.buf.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.buf.pop_front().unwrap();
        }
        n
    }

    fn is_open(&self) -> bool {
        !self.state.lock().unwrap().closed
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.readable.notify_all();
    }
}

impl Writer for Pipe {
    fn write(&self, bytes: &[u8]) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return false;
        }
        state.buf.extend(bytes);
        self.readable.notify_all();
        true
    }

    fn is_open(&self) -> bool {
        Reader::is_open(self)
    }

    fn close(&self) {
        Reader::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn write_then_read() {
        let p = pipe();
        assert!(p.write(b"hello"));
        let mut buf = [0u8; 16];
        assert_eq!(p.read(&mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn read_blocks_until_data_arrives() {
        let p = pipe();
        let writer = Arc::clone(&p);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.write(b"x");
        });
        let mut buf = [0u8; 1];
        assert_eq!(p.read(&mut buf), 1);
        handle.join().unwrap();
    }

    #[test]
    fn close_unblocks_reader_with_eof() {
        let p = pipe();
        let closer = Arc::clone(&p);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            Reader::close(&*closer);
        });
        let mut buf = [0u8; 1];
        assert_eq!(p.read(&mut buf), 0);
        handle.join().unwrap();
    }

    #[test]
    fn buffered_bytes_survive_close() {
        let p = pipe();
        assert!(p.write(b"ab"));
        Reader::close(&*p);
        Reader::close(&*p); // idempotent
        assert!(!Reader::is_open(&*p));
        assert!(!p.write(b"c"));
        let mut buf = [0u8; 1];
        assert_eq!(p.read(&mut buf), 1);
        assert_eq!(buf[0], b'a');
        assert_eq!(p.read(&mut buf), 1);
        assert_eq!(buf[0], b'b');
        assert_eq!(p.read(&mut buf), 0);
    }
}
