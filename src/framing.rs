//! `Content-Length` framed message stream.
//!
//! Every message on the wire is
//! `Content-Length: <decimal>\r\n<other headers>\r\n\r\n<payload bytes>`.
//! The reader is resync-capable: anything that is not a well-formed header
//! block is discarded until the next `Content-Length:` token, so one
//! corrupted frame never poisons the rest of the stream.

use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::io::{Reader, Writer};

const HEADER_KEY: &[u8] = b"content-length:";

/// Upper bound on the header block after the length value. Anything larger
/// is treated as garbage and rescanned.
const MAX_HEADER_BLOCK: usize = 8 * 1024;

const READ_CHUNK: usize = 4 * 1024;

/// Writes framed payloads to a [`Writer`].
pub struct ContentWriter {
    writer: Arc<dyn Writer>,
}

impl ContentWriter {
    pub fn new(writer: Arc<dyn Writer>) -> Self {
        ContentWriter { writer }
    }

    /// Emits the header and the payload. Length is the byte count.
    pub fn write(&self, payload: &[u8]) -> bool {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        self.writer.write(header.as_bytes()) && self.writer.write(payload)
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_open()
    }

    pub fn close(&self) {
        self.writer.close()
    }
}

/// Reads framed payloads from a [`Reader`], resynchronizing across
/// unframeable input.
pub struct ContentReader {
    reader: Arc<dyn Reader>,
    buf: BytesMut,
    skipped: usize,
}

enum HeaderScan {
    /// Offset of the first payload byte relative to the buffer start.
    Complete(usize),
    NeedMore,
    Malformed,
}

impl ContentReader {
    pub fn new(reader: Arc<dyn Reader>) -> Self {
        ContentReader {
            reader,
            buf: BytesMut::new(),
            skipped: 0,
        }
    }

    /// Returns the next well-framed payload, or `None` once the stream is
    /// closed. Partial frames cut off by EOF are discarded.
    pub fn read(&mut self) -> Option<Vec<u8>> {
        loop {
            if let Some(payload) = self.scan() {
                tracing::trace!(len = payload.len(), "read frame");
                return Some(payload);
            }
            if !self.fill() {
                self.skipped += self.buf.len();
                self.buf.clear();
                return None;
            }
        }
    }

    /// Bytes discarded while resynchronizing since the last call.
    pub fn take_skipped(&mut self) -> usize {
        std::mem::take(&mut self.skipped)
    }

    fn fill(&mut self) -> bool {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.reader.read(&mut chunk);
        if n == 0 {
            return false;
        }
        self.buf.extend_from_slice(&chunk[..n]);
        true
    }

    /// Extracts one frame from the buffer, discarding garbage as needed.
    /// `None` means more input is required.
    fn scan(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(start) = find_ignore_ascii_case(&self.buf, HEADER_KEY) else {
                // Drop everything except a tail that could still grow into
                // the header key.
                let keep = tail_key_prefix(&self.buf);
                let drop = self.buf.len() - keep;
                if drop > 0 {
                    self.skipped += drop;
                    self.buf.advance(drop);
                }
                return None;
            };
            if start > 0 {
                self.skipped += start;
                self.buf.advance(start);
            }

            let mut i = HEADER_KEY.len();
            while matches!(self.buf.get(i), Some(&b' ') | Some(&b'\t')) {
                i += 1;
            }
            let digits_start = i;
            let mut length: usize = 0;
            let mut overflow = false;
            while let Some(&b) = self.buf.get(i) {
                if !b.is_ascii_digit() {
                    break;
                }
                match length
                    .checked_mul(10)
                    .and_then(|l| l.checked_add((b - b'0') as usize))
                {
                    Some(l) => length = l,
                    None => {
                        overflow = true;
                        break;
                    }
                }
                i += 1;
            }
            if !overflow && i == self.buf.len() {
                // The value may continue in the next chunk.
                return None;
            }
            if overflow || i == digits_start {
                self.resync();
                continue;
            }

            match self.header_block_end(i) {
                HeaderScan::Complete(body) => {
                    if self.buf.len() < body + length {
                        return None;
                    }
                    self.buf.advance(body);
                    return Some(self.buf.split_to(length).to_vec());
                }
                HeaderScan::NeedMore => return None,
                HeaderScan::Malformed => {
                    self.resync();
                }
            }
        }
    }

    /// Consumes `\r\n`, any additional header lines (ignored), and the
    /// terminating blank line, starting at `pos`.
    fn header_block_end(&self, mut pos: usize) -> HeaderScan {
        const CRLF: &[u8] = b"\r\n";
        match self.buf.get(pos..pos + 2) {
            None => return HeaderScan::NeedMore,
            Some(sep) if sep == CRLF => pos += 2,
            Some(_) => return HeaderScan::Malformed,
        }
        loop {
            match self.buf.get(pos..pos + 2) {
                None => return HeaderScan::NeedMore,
                Some(sep) if sep == CRLF => return HeaderScan::Complete(pos + 2),
                Some(_) => {
                    // Another header; skip its line.
                    match find_crlf(&self.buf[pos..]) {
                        Some(n) => pos += n + 2,
                        None if self.buf.len() - pos > MAX_HEADER_BLOCK => {
                            return HeaderScan::Malformed
                        }
                        None => return HeaderScan::NeedMore,
                    }
                }
            }
        }
    }

    /// Skips past the matched header key so the scan restarts after it.
    fn resync(&mut self) {
        self.skipped += HEADER_KEY.len();
        self.buf.advance(HEADER_KEY.len());
    }
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Length of the longest buffer suffix that is a proper prefix of the
/// header key.
fn tail_key_prefix(buf: &[u8]) -> usize {
    let max = (HEADER_KEY.len() - 1).min(buf.len());
    for len in (1..=max).rev() {
        if buf[buf.len() - len..].eq_ignore_ascii_case(&HEADER_KEY[..len]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pipe;

    fn reader_over(chunks: &[&[u8]]) -> ContentReader {
        let p = pipe();
        for chunk in chunks {
            assert!(p.write(chunk));
        }
        Reader::close(&*p);
        ContentReader::new(p)
    }

    #[test]
    fn write_emits_framing_verbatim() {
        let p = pipe();
        let cw = ContentWriter::new(p.clone());
        assert!(cw.write(b"Content payload number one"));
        assert!(cw.write(b"Content payload number two"));
        assert!(cw.write(b"Content payload number three"));
        Writer::close(&*p);

        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = Reader::read(&*p, &mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Content-Length: 26\r\n\r\nContent payload number one\
             Content-Length: 26\r\n\r\nContent payload number two\
             Content-Length: 28\r\n\r\nContent payload number three"
        );
    }

    #[test]
    fn read_skips_unrecognized_garbage() {
        let mut cr = reader_over(&[
            b"Content-Length: 26\r\n\r\nContent payload number one",
            b"some unrecognised garbage",
            b"Content-Length: 26\r\n\r\nContent payload number two",
            b"some more unrecognised garbage",
            b"Content-Length: 28\r\n\r\nContent payload number three",
        ]);
        assert_eq!(cr.read().as_deref(), Some(b"Content payload number one" as &[u8]));
        assert_eq!(cr.read().as_deref(), Some(b"Content payload number two" as &[u8]));
        assert!(cr.take_skipped() > 0);
        assert_eq!(cr.read().as_deref(), Some(b"Content payload number three" as &[u8]));
        assert_eq!(cr.read(), None);
    }

    #[test]
    fn resyncs_across_junk_and_yields_remaining_frames() {
        let mut cr = reader_over(&[
            b"junk\r\nContent-Length: 3\r\n\r\nabc",
            b"trash",
            b"Content-Length: 2\r\n\r\nok",
        ]);
        assert_eq!(cr.read().as_deref(), Some(b"abc" as &[u8]));
        assert_eq!(cr.read().as_deref(), Some(b"ok" as &[u8]));
        assert_eq!(cr.read(), None);
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let mut cr = reader_over(&[b"CONTENT-LENGTH: 2\r\n\r\nhi"]);
        assert_eq!(cr.read().as_deref(), Some(b"hi" as &[u8]));
    }

    #[test]
    fn additional_headers_are_ignored() {
        let mut cr = reader_over(&[
            b"Content-Length: 5\r\nContent-Type: application/json\r\nX-Junk: 1\r\n\r\nhello",
        ]);
        assert_eq!(cr.read().as_deref(), Some(b"hello" as &[u8]));
        assert_eq!(cr.take_skipped(), 0);
    }

    #[test]
    fn malformed_length_resyncs_to_next_frame() {
        let mut cr = reader_over(&[
            b"Content-Length: oops\r\n\r\n",
            b"Content-Length: 2\r\n\r\nok",
        ]);
        assert_eq!(cr.read().as_deref(), Some(b"ok" as &[u8]));
        assert!(cr.take_skipped() > 0);
    }

    #[test]
    fn truncated_frame_at_eof_is_discarded() {
        let mut cr = reader_over(&[b"Content-Length: 100\r\n\r\nonly a few bytes"]);
        assert_eq!(cr.read(), None);
        assert!(cr.take_skipped() > 0);
    }

    #[test]
    fn frame_split_across_chunks_reassembles() {
        let mut cr = reader_over(&[b"Content-Le", b"ngth: 1", b"1\r\n\r\nhello", b" world"]);
        assert_eq!(cr.read().as_deref(), Some(b"hello world" as &[u8]));
        assert_eq!(cr.take_skipped(), 0);
    }

    #[test]
    fn empty_payload_frame() {
        let mut cr = reader_over(&[b"Content-Length: 0\r\n\r\nContent-Length: 1\r\n\r\nz"]);
        assert_eq!(cr.read().as_deref(), Some(b"" as &[u8]));
        assert_eq!(cr.read().as_deref(), Some(b"z" as &[u8]));
        assert_eq!(cr.read(), None);
    }
}
