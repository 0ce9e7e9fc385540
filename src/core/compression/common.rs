// Shared types for the per-format archive handlers

use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::models::{Codec, Result};

/// Type of a single archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata for one archive member, produced lazily while walking a source
/// tree or iterating an existing archive.
///
/// `path` is archive-relative, posix-style, with no leading `.` or `..`
/// segments. Directories have size 0.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    /// POSIX permission bits.
    pub mode: u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    /// Whether the member is encrypted (read path only).
    pub encrypted: bool,
}

/// One handler per container family; the dispatcher in `mod.rs` picks the
/// handler from the detected container kind.
pub trait ArchiveHandler: Send + Sync {
    /// Unpack the archive into `dest`, preserving hierarchy, mode bits and
    /// mtimes, honouring the cancellation flag at every block boundary.
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        password: Option<&str>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()>;

    /// Whether at least one member of the archive is encrypted.
    fn has_encrypted_entries(&self, archive_path: &Path) -> Result<bool>;
}

/// Write-side codec wrapper. `finish` must be called to flush the trailer;
/// dropping an encoder mid-stream produces a truncated file.
pub enum StreamEncoder<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Bzip2(BzEncoder<W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> StreamEncoder<W> {
    pub fn new(codec: Codec, writer: W) -> Self {
        match codec {
            Codec::None => Self::Plain(writer),
            Codec::Gzip => Self::Gzip(GzEncoder::new(writer, flate2::Compression::default())),
            Codec::Bzip2 => Self::Bzip2(BzEncoder::new(writer, bzip2::Compression::default())),
            Codec::Xz => Self::Xz(XzEncoder::new(writer, 6)),
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            Self::Gzip(e) => e.finish(),
            Self::Bzip2(e) => e.finish(),
            Self::Xz(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for StreamEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(e) => e.write(buf),
            Self::Bzip2(e) => e.write(buf),
            Self::Xz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(e) => e.flush(),
            Self::Bzip2(e) => e.flush(),
            Self::Xz(e) => e.flush(),
        }
    }
}

/// Read-side codec wrapper.
pub enum StreamDecoder<R: Read> {
    Plain(R),
    Gzip(GzDecoder<R>),
    Bzip2(BzDecoder<R>),
    Xz(XzDecoder<R>),
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(codec: Codec, reader: R) -> Self {
        match codec {
            Codec::None => Self::Plain(reader),
            Codec::Gzip => Self::Gzip(GzDecoder::new(reader)),
            Codec::Bzip2 => Self::Bzip2(BzDecoder::new(reader)),
            Codec::Xz => Self::Xz(XzDecoder::new(reader)),
        }
    }
}

impl<R: Read> Read for StreamDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(d) => d.read(buf),
            Self::Bzip2(d) => d.read(buf),
            Self::Xz(d) => d.read(buf),
        }
    }
}

/// Resolve an archive member path against the destination root, rejecting
/// absolute paths and parent-directory escapes (zip-slip).
pub fn sanitize_entry_path(dest_root: &Path, raw_path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for comp in raw_path.components() {
        match comp {
            Component::Normal(v) => clean.push(v),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        return None;
    }
    Some(dest_root.join(clean))
}

/// Restore permission bits and mtime on an extracted file.
///
/// mtime resolution is one second; directories are left with creation-time
/// metadata since their mtimes change as children are written anyway.
pub fn restore_file_metadata(file: &std::fs::File, mode: Option<u32>, mtime: Option<i64>) {
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        let _ = file.set_permissions(std::fs::Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    let _ = mode;

    if let Some(secs) = mtime {
        if secs >= 0 {
            let when = std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs as u64);
            let _ = file.set_modified(when);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sanitize_blocks_unsafe_paths() {
        let root = PathBuf::from("/tmp/base");
        assert_eq!(
            sanitize_entry_path(&root, Path::new("ok/file.txt")),
            Some(PathBuf::from("/tmp/base/ok/file.txt"))
        );
        assert!(sanitize_entry_path(&root, Path::new("../evil")).is_none());
        assert!(sanitize_entry_path(&root, Path::new("/abs/path")).is_none());
        assert!(sanitize_entry_path(&root, Path::new("")).is_none());
    }

    #[test]
    fn test_sanitize_strips_curdir() {
        let root = PathBuf::from("/tmp/base");
        assert_eq!(
            sanitize_entry_path(&root, Path::new("./a/./b.txt")),
            Some(PathBuf::from("/tmp/base/a/b.txt"))
        );
    }

    #[test]
    fn test_stream_codec_roundtrip() {
        for codec in [Codec::None, Codec::Gzip, Codec::Bzip2, Codec::Xz] {
            let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);

            let mut encoder = StreamEncoder::new(codec, Vec::new());
            encoder.write_all(&payload).unwrap();
            let compressed = encoder.finish().unwrap();

            let mut decoder = StreamDecoder::new(codec, Cursor::new(compressed));
            let mut restored = Vec::new();
            decoder.read_to_end(&mut restored).unwrap();
            assert_eq!(restored, payload, "codec {:?}", codec);
        }
    }
}
