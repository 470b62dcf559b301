//! Output capture for child processes.
//!
//! Each child stream is drained to EOF by [`capture_stream`]. Every chunk goes
//! to the task's output file in full and into a [`BoundedBuffer`] that keeps
//! at most [`MAX_CAPTURE_BYTES`] in memory.

use std::io;
use std::sync::OnceLock;

use regex::bytes::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// In-memory ceiling per captured stream.
pub const MAX_CAPTURE_BYTES: usize = 10 * 1024 * 1024;

/// Appended once when a stream goes over the ceiling.
pub const TRUNCATION_MARKER: &str = "\n[output truncated at 10MB]\n";

const READ_CHUNK: usize = 8 * 1024;

/// Byte buffer that accepts every write but stores at most `limit` bytes.
#[derive(Debug)]
pub struct BoundedBuffer {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl BoundedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append a chunk. Never fails; overflow is dropped after the marker.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.truncated || chunk.is_empty() {
            return;
        }
        let room = self.limit.saturating_sub(self.buf.len());
        if chunk.len() <= room {
            self.buf.extend_from_slice(chunk);
            return;
        }
        self.buf.extend_from_slice(&chunk[..room]);
        self.buf.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        self.truncated = true;
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// What a drained stream produced.
#[derive(Debug, Default)]
pub struct CaptureOutput {
    /// Bounded in-memory copy of the stream.
    pub bytes: Vec<u8>,

    /// True if the in-memory copy hit the ceiling.
    pub truncated: bool,

    /// First error writing to the output file. Later chunks skip the file.
    pub write_error: Option<io::Error>,
}

/// Drain `reader` to EOF, mirroring it to `sink` and a bounded buffer.
///
/// A failed write to `sink` does not stop the drain, so the child never
/// blocks on a full pipe.
pub async fn capture_stream<R, W>(mut reader: R, mut sink: W, limit: usize) -> CaptureOutput
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = BoundedBuffer::new(limit);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut write_error: Option<io::Error> = None;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "Capture read failed, treating as EOF");
                break;
            }
        };
        let data = &chunk[..n];

        if write_error.is_none() {
            if let Err(e) = sink.write_all(data).await {
                warn!(error = %e, "Output file write failed, continuing to drain");
                write_error = Some(e);
            }
        }
        buffer.push(data);
    }

    if write_error.is_none() {
        if let Err(e) = sink.flush().await {
            warn!(error = %e, "Output file flush failed");
            write_error = Some(e);
        }
    }

    CaptureOutput {
        truncated: buffer.is_truncated(),
        bytes: buffer.into_bytes(),
        write_error,
    }
}

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?-u)\x1b\[[0-9;?]*[a-zA-Z]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)")
            .expect("valid ANSI regex")
    })
}

/// Remove CSI and OSC escape sequences.
pub fn strip_ansi(bytes: &[u8]) -> Vec<u8> {
    ansi_regex().replace_all(bytes, &b""[..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_buffer_under_limit() {
        let mut buf = BoundedBuffer::new(16);
        buf.push(b"hello ");
        buf.push(b"world");
        assert!(!buf.is_truncated());
        assert_eq!(buf.into_bytes(), b"hello world");
    }

    #[test]
    fn test_bounded_buffer_exact_limit_is_not_truncated() {
        let mut buf = BoundedBuffer::new(4);
        buf.push(b"abcd");
        assert!(!buf.is_truncated());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_bounded_buffer_single_marker() {
        let mut buf = BoundedBuffer::new(8);
        buf.push(b"12345");
        buf.push(b"67890");
        buf.push(b"more");
        buf.push(b"and more");
        assert!(buf.is_truncated());

        let bytes = buf.into_bytes();
        let expected = format!("12345678{}", TRUNCATION_MARKER);
        assert_eq!(bytes, expected.as_bytes());
    }

    #[tokio::test]
    async fn test_capture_ceiling_keeps_file_complete() {
        let input: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut file = Vec::new();

        let out = capture_stream(&input[..], &mut file, 4096).await;

        assert!(out.truncated);
        assert!(out.write_error.is_none());
        assert_eq!(file, input);
        assert_eq!(out.bytes.len(), 4096 + TRUNCATION_MARKER.len());
        assert_eq!(&out.bytes[..4096], &input[..4096]);
        assert!(out.bytes.ends_with(TRUNCATION_MARKER.as_bytes()));

        let marker_count = out
            .bytes
            .windows(TRUNCATION_MARKER.len())
            .filter(|w| *w == TRUNCATION_MARKER.as_bytes())
            .count();
        assert_eq!(marker_count, 1);
    }

    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<io::Result<usize>> {
            std::task::Poll::Ready(Err(io::Error::other("disk full")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_capture_continues_after_write_error() {
        let input = vec![b'x'; 3 * READ_CHUNK];
        let out = capture_stream(&input[..], FailingWriter, MAX_CAPTURE_BYTES).await;

        let err = out.write_error.expect("write error recorded");
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(out.bytes, input);
    }

    #[test]
    fn test_empty_capture_output() {
        let empty = CaptureOutput::default();
        assert!(empty.bytes.is_empty());
        assert!(!empty.truncated);
        assert!(empty.write_error.is_none());
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi(b"\x1b[31mred\x1b[0m text"), b"red text");
        assert_eq!(strip_ansi(b"\x1b[1;32mbold\x1b[m"), b"bold");
        assert_eq!(strip_ansi(b"\x1b]0;title\x07after"), b"after");
        assert_eq!(strip_ansi(b"\x1b]8;;http://x\x1b\\link"), b"link");
        assert_eq!(strip_ansi(b"plain"), b"plain");
    }

    #[test]
    fn test_strip_ansi_invalid_utf8() {
        assert_eq!(strip_ansi(b"\xff\x1b[0m\xfe"), b"\xff\xfe");
    }
}
