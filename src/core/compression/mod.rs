// Archive compression modules
pub mod common;
pub mod stream_handler;
pub mod tar_handler;
pub mod zip_handler;

#[path = "7z_handler.rs"]
pub mod sevenz_handler;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use common::{ArchiveHandler, StreamDecoder};
use sevenz_handler::SevenZHandler;
use stream_handler::StreamHandler;
use tar_handler::TarHandler;
use zip_handler::ZipHandler;

use crate::models::{ArchiveError, ArchiveFormat, Codec, ContainerKind, Result};

const ZIP_LOCAL_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const SEVENZ_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const XZ_MAGIC: &[u8] = &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// Offset of the `ustar` marker inside a tar header block.
const TAR_MAGIC_OFFSET: usize = 257;

const SNIFF_LEN: usize = 512;

/// Identify the container by content, never by file name.
///
/// Compressed tarballs are told apart from bare streams by decoding the
/// first header block and looking for the `ustar` marker; a stream that does
/// not decode that far is treated as a bare stream and any corruption
/// surfaces during extraction.
pub fn detect_container(archive_path: &Path) -> Result<Option<ContainerKind>> {
    let mut file = File::open(archive_path)
        .map_err(|e| ArchiveError::OpenFileFailed(format!("{}: {}", archive_path.display(), e)))?;
    let mut header = [0u8; SNIFF_LEN];
    let n = read_prefix(&mut file, &mut header)?;
    let header = &header[..n];

    if header.starts_with(ZIP_LOCAL_MAGIC) || header.starts_with(ZIP_EMPTY_MAGIC) {
        return Ok(Some(ContainerKind::Zip));
    }
    if header.starts_with(SEVENZ_MAGIC) {
        return Ok(Some(ContainerKind::SevenZ));
    }

    let codec = if header.starts_with(GZIP_MAGIC) {
        Some(Codec::Gzip)
    } else if header.len() >= 4 && header.starts_with(b"BZh") && header[3].is_ascii_digit() {
        Some(Codec::Bzip2)
    } else if header.starts_with(XZ_MAGIC) {
        Some(Codec::Xz)
    } else {
        None
    };

    if let Some(codec) = codec {
        let file = File::open(archive_path).map_err(|e| {
            ArchiveError::OpenFileFailed(format!("{}: {}", archive_path.display(), e))
        })?;
        let mut decoder = StreamDecoder::new(codec, file);
        let mut decoded = [0u8; SNIFF_LEN];
        let n = read_prefix(&mut decoder, &mut decoded).unwrap_or(0);
        if has_tar_magic(&decoded[..n]) {
            return Ok(Some(ContainerKind::Tar(codec)));
        }
        return Ok(Some(ContainerKind::Stream(codec)));
    }

    if has_tar_magic(header) {
        return Ok(Some(ContainerKind::Tar(Codec::None)));
    }
    Ok(None)
}

fn has_tar_magic(block: &[u8]) -> bool {
    block.len() >= TAR_MAGIC_OFFSET + 5 && &block[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::ReadEntryFailed(e.to_string())),
        }
    }
    Ok(filled)
}

fn handler_for(kind: ContainerKind) -> Box<dyn ArchiveHandler> {
    match kind {
        ContainerKind::Zip => Box::new(ZipHandler::new()),
        ContainerKind::SevenZ => Box::new(SevenZHandler::new()),
        ContainerKind::Tar(codec) => Box::new(TarHandler::new(codec)),
        ContainerKind::Stream(codec) => Box::new(StreamHandler::new(codec)),
    }
}

/// Extract an archive into `dest_dir`, detecting the format from content.
pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    password: Option<&str>,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    let kind = detect_container(archive_path)?.ok_or(ArchiveError::UnsupportedFormat)?;
    tracing::debug!(archive = %archive_path.display(), ?kind, "detected container");
    handler_for(kind).extract(archive_path, dest_dir, password, cancel)
}

/// Create an archive of the requested format from one or more source roots.
pub fn compress_archive(
    sources: &[PathBuf],
    output_path: &Path,
    format: &ArchiveFormat,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    if sources.is_empty() {
        return Err(ArchiveError::CompressFailed("no source paths given".into()));
    }
    match format.container() {
        ContainerKind::Zip => {
            ZipHandler::new().create(sources, output_path, format.password(), cancel)
        }
        ContainerKind::SevenZ => {
            SevenZHandler::new().create(sources, output_path, format.password(), cancel)
        }
        ContainerKind::Tar(codec) => TarHandler::new(codec).create(sources, output_path, cancel),
        ContainerKind::Stream(codec) => {
            StreamHandler::new(codec).create(sources, output_path, cancel)
        }
    }
}

/// Whether any member of the archive is encrypted (so extraction will need a
/// password).
pub fn archive_has_encrypted_entries(archive_path: &Path) -> Result<bool> {
    let kind = detect_container(archive_path)?.ok_or(ArchiveError::UnsupportedFormat)?;
    handler_for(kind).has_encrypted_entries(archive_path)
}

/// Whether the file is an archive this engine can open.
pub fn is_supported_archive(archive_path: &Path) -> Result<bool> {
    Ok(detect_container(archive_path)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn sample_dir() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("subdir")).unwrap();
        fs::write(temp.path().join("file1.txt"), b"test content 1").unwrap();
        fs::write(temp.path().join("subdir/file2.txt"), b"test content 2").unwrap();
        temp
    }

    fn make(format: ArchiveFormat, name: &str) -> (TempDir, PathBuf, std::ffi::OsString) {
        let source = sample_dir();
        let out_dir = TempDir::new().unwrap();
        let archive = out_dir.path().join(name);
        compress_archive(
            &[source.path().to_path_buf()],
            &archive,
            &format,
            &flag(),
        )
        .unwrap();
        let base = source.path().file_name().unwrap().to_os_string();
        (out_dir, archive, base)
    }

    #[test]
    fn test_detection_ignores_file_extension() {
        // A zip written with a misleading name is still detected as zip.
        let (_keep, archive, _) = make(ArchiveFormat::Zip(None), "mislabeled.tar.gz");
        assert_eq!(detect_container(&archive).unwrap(), Some(ContainerKind::Zip));
    }

    #[test]
    fn test_detect_all_formats() {
        let cases: Vec<(ArchiveFormat, &str, ContainerKind)> = vec![
            (ArchiveFormat::Zip(None), "a.zip", ContainerKind::Zip),
            (ArchiveFormat::SevenZ(None), "a.7z", ContainerKind::SevenZ),
            (ArchiveFormat::Tar, "a.tar", ContainerKind::Tar(Codec::None)),
            (ArchiveFormat::TarGz, "a.tar.gz", ContainerKind::Tar(Codec::Gzip)),
            (
                ArchiveFormat::TarBz2,
                "a.tar.bz2",
                ContainerKind::Tar(Codec::Bzip2),
            ),
            (ArchiveFormat::TarXz, "a.tar.xz", ContainerKind::Tar(Codec::Xz)),
        ];
        for (format, name, expected) in cases {
            let (_keep, archive, _) = make(format, name);
            assert_eq!(detect_container(&archive).unwrap(), Some(expected), "{}", name);
        }
    }

    #[test]
    fn test_detect_bare_stream_vs_tarball() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("notes.txt");
        fs::write(&source, b"just text").unwrap();
        let archive = temp.path().join("notes.txt.gz");
        compress_archive(&[source], &archive, &ArchiveFormat::Gzip, &flag()).unwrap();

        assert_eq!(
            detect_container(&archive).unwrap(),
            Some(ContainerKind::Stream(Codec::Gzip))
        );
    }

    #[test]
    fn test_unrecognized_content() {
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("file.zip");
        fs::write(&bogus, b"plain text pretending to be an archive").unwrap();
        assert_eq!(detect_container(&bogus).unwrap(), None);
        assert!(!is_supported_archive(&bogus).unwrap());

        let dest = TempDir::new().unwrap();
        let result = extract_archive(&bogus, dest.path(), None, &flag());
        assert!(matches!(result, Err(ArchiveError::UnsupportedFormat)));
    }

    #[test]
    fn test_empty_file_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        fs::write(&empty, b"").unwrap();
        assert_eq!(detect_container(&empty).unwrap(), None);
    }

    #[test]
    fn test_is_supported_archive() {
        let (_keep, archive, _) = make(ArchiveFormat::TarXz, "a.tar.xz");
        assert!(is_supported_archive(&archive).unwrap());
    }

    #[test]
    fn test_compress_requires_sources() {
        let temp = TempDir::new().unwrap();
        let result = compress_archive(
            &[],
            &temp.path().join("out.zip"),
            &ArchiveFormat::Zip(None),
            &flag(),
        );
        assert!(matches!(result, Err(ArchiveError::CompressFailed(_))));
    }

    #[test]
    fn test_roundtrip_through_detection() {
        let (_keep, archive, base) = make(ArchiveFormat::TarBz2, "round.tar.bz2");
        let dest = TempDir::new().unwrap();
        extract_archive(&archive, dest.path(), None, &flag()).unwrap();
        let root = dest.path().join(base);
        assert_eq!(
            fs::read_to_string(root.join("file1.txt")).unwrap(),
            "test content 1"
        );
        assert_eq!(
            fs::read_to_string(root.join("subdir/file2.txt")).unwrap(),
            "test content 2"
        );
    }

    #[test]
    fn test_encryption_query_routes_by_format() {
        let (_keep, archive, _) = make(ArchiveFormat::Zip(Some("pw".into())), "enc.zip");
        assert!(archive_has_encrypted_entries(&archive).unwrap());

        let (_keep, plain, _) = make(ArchiveFormat::Tar, "plain.tar");
        assert!(!archive_has_encrypted_entries(&plain).unwrap());
    }
}
