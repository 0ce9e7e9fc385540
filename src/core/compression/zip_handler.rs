use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use zip::result::ZipError;
use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::compression::common::{
    restore_file_metadata, sanitize_entry_path, ArchiveHandler, EntryKind,
};
use crate::core::file_ops::{copy_cancellable, SourceWalker};
use crate::models::{ArchiveError, Result};

/// ZIP archive handler
///
/// Extraction and creation of ZIP archives, preserving directory hierarchy,
/// permission bits and modification times. Passwords use the traditional
/// ZipCrypto scheme, which is what stock archivers produce and accept.
pub struct ZipHandler;

impl ZipHandler {
    pub fn new() -> Self {
        Self
    }

    /// Create a ZIP archive from the given source roots.
    ///
    /// Each root's base name becomes a top-level entry. A password switches
    /// every member to ZipCrypto encryption.
    pub fn create(
        &self,
        sources: &[PathBuf],
        output_path: &Path,
        password: Option<&str>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        let file = File::create(output_path).map_err(|e| {
            ArchiveError::CreateArchiveFailed(format!("{}: {}", output_path.display(), e))
        })?;
        let mut zip = ZipWriter::new(file);

        for walked in SourceWalker::new(sources, Arc::clone(cancel)) {
            let walked = walked?;
            let entry = &walked.entry;

            let mut opts = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(entry.mode)
                .large_file(entry.size >= u32::MAX as u64);
            if let Some(dt) = zip_datetime(entry.mtime) {
                opts = opts.last_modified_time(dt);
            }
            if let Some(pass) = password {
                opts = opts.with_deprecated_encryption(pass.as_bytes());
            }

            match entry.kind {
                EntryKind::Directory => {
                    zip.add_directory(&entry.path, opts).map_err(|e| {
                        ArchiveError::CompressFailed(format!(
                            "failed to add directory {}: {}",
                            entry.path, e
                        ))
                    })?;
                }
                EntryKind::File => {
                    zip.start_file(&entry.path, opts).map_err(|e| {
                        ArchiveError::CompressFailed(format!(
                            "failed to start entry {}: {}",
                            entry.path, e
                        ))
                    })?;
                    let mut src = File::open(&walked.source).map_err(|e| {
                        ArchiveError::OpenFileFailed(format!(
                            "{}: {}",
                            walked.source.display(),
                            e
                        ))
                    })?;
                    // Here the write side is the archive being produced.
                    copy_cancellable(&mut src, &mut zip, cancel).map_err(|e| match e {
                        ArchiveError::ExtractFailed(detail) => {
                            ArchiveError::CompressFailed(detail)
                        }
                        other => other,
                    })?;
                }
            }
        }

        zip.finish()
            .map_err(|e| ArchiveError::CreateArchiveFailed(format!("finalize failed: {}", e)))?;
        Ok(())
    }

    fn open(archive_path: &Path) -> Result<ZipArchive<File>> {
        let file = File::open(archive_path).map_err(|e| {
            ArchiveError::OpenFileFailed(format!("{}: {}", archive_path.display(), e))
        })?;
        ZipArchive::new(file)
            .map_err(|e| ArchiveError::OpenFileFailed(format!("not a readable zip: {}", e)))
    }
}

impl ArchiveHandler for ZipHandler {
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        password: Option<&str>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        let mut archive = Self::open(archive_path)?;

        fs::create_dir_all(dest_dir).map_err(|e| {
            ArchiveError::ExtractFailed(format!(
                "failed to create destination {}: {}",
                dest_dir.display(),
                e
            ))
        })?;

        for i in 0..archive.len() {
            let mut file = match password {
                Some(pass) => archive.by_index_decrypt(i, pass.as_bytes()),
                None => archive.by_index(i),
            }
            .map_err(classify_zip_error)?;

            // Skip entries whose names would escape the destination.
            let output_path = match file
                .enclosed_name()
                .and_then(|p| sanitize_entry_path(dest_dir, &p))
            {
                Some(path) => path,
                None => {
                    tracing::warn!(name = file.name(), "skipping entry with unsafe path");
                    continue;
                }
            };

            if file.is_dir() {
                fs::create_dir_all(&output_path).map_err(|e| {
                    ArchiveError::ExtractFailed(format!(
                        "failed to create directory {}: {}",
                        output_path.display(),
                        e
                    ))
                })?;
            } else {
                if let Some(parent) = output_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        ArchiveError::ExtractFailed(format!(
                            "failed to create parent directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }

                let mut output_file = File::create(&output_path).map_err(|e| {
                    ArchiveError::ExtractFailed(format!(
                        "failed to create output file {}: {}",
                        output_path.display(),
                        e
                    ))
                })?;

                // ZipCrypto's check byte misses roughly one wrong password
                // in 256; those slip through to a checksum failure here,
                // which is still reported as a password problem. Only the
                // read side is reclassified; a failure to write the output
                // file keeps its own error.
                copy_cancellable(&mut file, &mut output_file, cancel).map_err(|e| match e {
                    ArchiveError::Unknown(detail) if password.is_some() => {
                        tracing::debug!(error = %detail, "decode failure under password");
                        ArchiveError::WrongPassword
                    }
                    other => other,
                })?;

                let mtime = file
                    .last_modified()
                    .and_then(|dt| time::OffsetDateTime::try_from(dt).ok())
                    .map(|t| t.unix_timestamp());
                restore_file_metadata(&output_file, file.unix_mode(), mtime);
            }
        }

        Ok(())
    }

    /// A member counts as encrypted when opening it without a password fails
    /// with the password-required condition.
    fn has_encrypted_entries(&self, archive_path: &Path) -> Result<bool> {
        let mut archive = Self::open(archive_path)?;
        for i in 0..archive.len() {
            match archive.by_index(i) {
                Ok(_) => {}
                Err(ZipError::UnsupportedArchive(msg)) if msg == ZipError::PASSWORD_REQUIRED => {
                    return Ok(true);
                }
                Err(e) => {
                    return Err(ArchiveError::ReadEntryFailed(e.to_string()));
                }
            }
        }
        Ok(false)
    }
}

impl Default for ZipHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_zip_error(e: ZipError) -> ArchiveError {
    match e {
        ZipError::UnsupportedArchive(msg) if msg == ZipError::PASSWORD_REQUIRED => {
            ArchiveError::PasswordRequired
        }
        ZipError::InvalidPassword => ArchiveError::WrongPassword,
        other => ArchiveError::ReadEntryFailed(other.to_string()),
    }
}

/// DOS timestamps have two-second resolution and a 1980 floor; out-of-range
/// times are simply not recorded.
fn zip_datetime(mtime: i64) -> Option<zip::DateTime> {
    let odt = time::OffsetDateTime::from_unix_timestamp(mtime).ok()?;
    zip::DateTime::try_from(odt).ok()
}
