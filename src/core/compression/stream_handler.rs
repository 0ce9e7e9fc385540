use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::core::compression::common::{ArchiveHandler, StreamDecoder, StreamEncoder};
use crate::core::file_ops::copy_cancellable;
use crate::models::{ArchiveError, Codec, Result};

/// Handler for bare compressed streams (`.gz`, `.bz2`, `.xz`) that carry a
/// single payload and no entry container.
pub struct StreamHandler {
    codec: Codec,
}

impl StreamHandler {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }

    /// Compress a single file. Raw streams have no container, so exactly one
    /// regular-file source is accepted.
    pub fn create(
        &self,
        sources: &[PathBuf],
        output_path: &Path,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        let source = match sources {
            [single] => single,
            _ => {
                return Err(ArchiveError::CompressFailed(
                    "raw stream compression accepts exactly one source file".into(),
                ))
            }
        };
        let meta = fs::metadata(source)
            .map_err(|e| ArchiveError::OpenFileFailed(format!("{}: {}", source.display(), e)))?;
        if !meta.is_file() {
            return Err(ArchiveError::CompressFailed(format!(
                "raw stream compression requires a regular file: {}",
                source.display()
            )));
        }

        let mut src = File::open(source)
            .map_err(|e| ArchiveError::OpenFileFailed(format!("{}: {}", source.display(), e)))?;
        let out = File::create(output_path).map_err(|e| {
            ArchiveError::CreateArchiveFailed(format!("{}: {}", output_path.display(), e))
        })?;

        let mut encoder = StreamEncoder::new(self.codec, out);
        // Here the write side is the archive being produced.
        copy_cancellable(&mut src, &mut encoder, cancel).map_err(|e| match e {
            ArchiveError::ExtractFailed(detail) => ArchiveError::CompressFailed(detail),
            other => other,
        })?;
        encoder
            .finish()
            .map_err(|e| ArchiveError::CreateArchiveFailed(format!("finalize failed: {}", e)))?;
        Ok(())
    }

    /// Output file name for a decompressed stream: the archive name with its
    /// compression suffix stripped, or `data` when there is nothing to strip.
    fn output_name(archive_path: &Path) -> String {
        let name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lower = name.to_ascii_lowercase();
        for suffix in [".gz", ".bz2", ".xz"] {
            if lower.ends_with(suffix) && name.len() > suffix.len() {
                return name[..name.len() - suffix.len()].to_string();
            }
        }
        "data".to_string()
    }
}

impl ArchiveHandler for StreamHandler {
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        _password: Option<&str>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        let file = File::open(archive_path).map_err(|e| {
            ArchiveError::OpenFileFailed(format!("{}: {}", archive_path.display(), e))
        })?;

        fs::create_dir_all(dest_dir).map_err(|e| {
            ArchiveError::ExtractFailed(format!(
                "failed to create destination {}: {}",
                dest_dir.display(),
                e
            ))
        })?;

        let output_path = dest_dir.join(Self::output_name(archive_path));
        let mut output_file = File::create(&output_path).map_err(|e| {
            ArchiveError::ExtractFailed(format!(
                "failed to create output file {}: {}",
                output_path.display(),
                e
            ))
        })?;

        let mut decoder = StreamDecoder::new(self.codec, BufReader::new(file));
        copy_cancellable(&mut decoder, &mut output_file, cancel).map_err(|e| match e {
            ArchiveError::Unknown(detail) => ArchiveError::ExtractFailed(detail),
            other => other,
        })?;
        Ok(())
    }

    fn has_encrypted_entries(&self, _archive_path: &Path) -> Result<bool> {
        Ok(false)
    }
}
