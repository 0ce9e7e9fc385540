use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::{ArchiveError, Result};

/// Block size for streamed entry bodies.
pub const COPY_BLOCK_SIZE: usize = 8 * 1024;

/// Stream `reader` into `writer` in fixed-size blocks, re-checking the
/// cancellation flag before each block is requested.
///
/// This loop is the only place cancellation latency is bounded for entry
/// bodies: worst case is one block's worth of I/O. A short read terminates
/// the copy successfully.
///
/// Read failures surface as [`ArchiveError::Unknown`] and write failures as
/// [`ArchiveError::ExtractFailed`]. Callers rely on the distinction: a decode
/// error under a password may mean the password was wrong, but a failure to
/// write the destination never does.
///
/// Returns the number of bytes copied.
pub fn copy_cancellable<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    cancel: &AtomicBool,
) -> Result<u64> {
    let mut buf = [0u8; COPY_BLOCK_SIZE];
    let mut copied = 0u64;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(ArchiveError::OperationCancelled);
        }
        let read = match reader.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::Unknown(e.to_string())),
        };
        writer
            .write_all(&buf[..read])
            .map_err(|e| ArchiveError::ExtractFailed(e.to_string()))?;
        copied += read as u64;
    }
}

/// Reader adapter that observes the cancellation flag on every read.
///
/// Used when a codec drives the copy itself (tar body appends, 7z entry
/// pushes) and we cannot interpose our own block loop. A set flag surfaces as
/// an I/O error, which the orchestrator reclassifies as a cancellation once
/// the blocking call returns.
pub struct CancelGate<R> {
    inner: R,
    cancel: Arc<AtomicBool>,
}

impl<R: Read> CancelGate<R> {
    pub fn new(inner: R, cancel: Arc<AtomicBool>) -> Self {
        Self { inner, cancel }
    }
}

impl<R: Read> Read for CancelGate<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "operation cancelled",
            ));
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_copy_full_stream() {
        let data = vec![0xA5u8; COPY_BLOCK_SIZE * 3 + 17];
        let mut src = Cursor::new(data.clone());
        let mut dst = Vec::new();
        let cancel = AtomicBool::new(false);

        let copied = copy_cancellable(&mut src, &mut dst, &cancel).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(dst, data);
    }

    #[test]
    fn test_copy_empty_stream() {
        let mut src = Cursor::new(Vec::<u8>::new());
        let mut dst = Vec::new();
        let cancel = AtomicBool::new(false);

        assert_eq!(copy_cancellable(&mut src, &mut dst, &cancel).unwrap(), 0);
        assert!(dst.is_empty());
    }

    #[test]
    fn test_copy_aborts_when_cancelled() {
        let mut src = Cursor::new(vec![0u8; 1024]);
        let mut dst = Vec::new();
        let cancel = AtomicBool::new(true);

        let result = copy_cancellable(&mut src, &mut dst, &cancel);
        assert!(matches!(result, Err(ArchiveError::OperationCancelled)));
        assert!(dst.is_empty());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad block"))
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_failure_is_unknown() {
        let mut dst = Vec::new();
        let cancel = AtomicBool::new(false);

        let result = copy_cancellable(&mut FailingReader, &mut dst, &cancel);
        assert!(matches!(result, Err(ArchiveError::Unknown(_))));
    }

    #[test]
    fn test_write_failure_is_not_unknown() {
        let mut src = Cursor::new(vec![0u8; 64]);
        let cancel = AtomicBool::new(false);

        let result = copy_cancellable(&mut src, &mut FailingWriter, &cancel);
        assert!(matches!(result, Err(ArchiveError::ExtractFailed(_))));
    }

    #[test]
    fn test_cancel_gate_passes_data_through() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut gate = CancelGate::new(Cursor::new(b"hello".to_vec()), cancel);
        let mut out = Vec::new();
        std::io::copy(&mut gate, &mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_cancel_gate_fails_once_flagged() {
        let cancel = Arc::new(AtomicBool::new(true));
        let mut gate = CancelGate::new(Cursor::new(b"hello".to_vec()), cancel);
        let mut out = Vec::new();
        assert!(std::io::copy(&mut gate, &mut out).is_err());
    }
}
