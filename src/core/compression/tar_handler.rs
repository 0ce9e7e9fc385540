use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tar::{Archive, Builder, EntryType, Header};

use crate::core::compression::common::{
    restore_file_metadata, sanitize_entry_path, ArchiveHandler, EntryKind, StreamDecoder,
    StreamEncoder,
};
use crate::core::file_ops::{copy_cancellable, CancelGate, SourceWalker};
use crate::models::{ArchiveError, Codec, Result};

/// Tar archive handler, optionally wrapped in a stream codec.
///
/// One handler serves plain `.tar` as well as `.tar.gz`, `.tar.bz2` and
/// `.tar.xz`; the codec is applied outside the container so the tar logic
/// never sees compressed bytes.
pub struct TarHandler {
    codec: Codec,
}

impl TarHandler {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }

    pub fn create(
        &self,
        sources: &[PathBuf],
        output_path: &Path,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        let file = File::create(output_path).map_err(|e| {
            ArchiveError::CreateArchiveFailed(format!("{}: {}", output_path.display(), e))
        })?;
        let mut builder = Builder::new(StreamEncoder::new(self.codec, file));

        for walked in SourceWalker::new(sources, Arc::clone(cancel)) {
            let walked = walked?;
            let entry = &walked.entry;

            let mut header = Header::new_gnu();
            header.set_mode(entry.mode);
            header.set_mtime(entry.mtime.max(0) as u64);

            match entry.kind {
                EntryKind::Directory => {
                    header.set_entry_type(EntryType::dir());
                    header.set_size(0);
                    builder
                        .append_data(&mut header, format!("{}/", entry.path), io::empty())
                        .map_err(|e| {
                            ArchiveError::CompressFailed(format!(
                                "failed to add directory {}: {}",
                                entry.path, e
                            ))
                        })?;
                }
                EntryKind::File => {
                    header.set_entry_type(EntryType::file());
                    header.set_size(entry.size);
                    let src = File::open(&walked.source).map_err(|e| {
                        ArchiveError::OpenFileFailed(format!(
                            "{}: {}",
                            walked.source.display(),
                            e
                        ))
                    })?;
                    let gated = CancelGate::new(src, Arc::clone(cancel));
                    builder
                        .append_data(&mut header, &entry.path, gated)
                        .map_err(|e| {
                            if cancel.load(Ordering::Relaxed) {
                                ArchiveError::OperationCancelled
                            } else {
                                ArchiveError::CompressFailed(format!(
                                    "failed to add entry {}: {}",
                                    entry.path, e
                                ))
                            }
                        })?;
                }
            }
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| ArchiveError::CreateArchiveFailed(format!("finalize failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| ArchiveError::CreateArchiveFailed(format!("finalize failed: {}", e)))?;
        Ok(())
    }
}

impl ArchiveHandler for TarHandler {
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
        let mut archive = Archive::new(StreamDecoder::new(self.codec, BufReader::new(file)));

        fs::create_dir_all(dest_dir).map_err(|e| {
            ArchiveError::ExtractFailed(format!(
                "failed to create destination {}: {}",
                dest_dir.display(),
                e
            ))
        })?;

        let entries = archive
            .entries()
            .map_err(|e| ArchiveError::ReadEntryFailed(e.to_string()))?;

        for entry in entries {
            if cancel.load(Ordering::Relaxed) {
                return Err(ArchiveError::OperationCancelled);
            }
            let mut entry = entry.map_err(|e| ArchiveError::ReadEntryFailed(e.to_string()))?;

            let raw_path = entry
                .path()
                .map_err(|e| ArchiveError::ReadEntryFailed(e.to_string()))?
                .into_owned();
            let output_path = match sanitize_entry_path(dest_dir, &raw_path) {
                Some(path) => path,
                None => {
                    tracing::warn!(name = %raw_path.display(), "skipping entry with unsafe path");
                    continue;
                }
            };

            match entry.header().entry_type() {
                EntryType::Directory => {
                    fs::create_dir_all(&output_path).map_err(|e| {
                        ArchiveError::ExtractFailed(format!(
                            "failed to create directory {}: {}",
                            output_path.display(),
                            e
                        ))
                    })?;
                }
                EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
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
                    copy_cancellable(&mut entry, &mut output_file, cancel)?;

                    let mode = entry.header().mode().ok();
                    let mtime = entry.header().mtime().ok().map(|t| t as i64);
                    restore_file_metadata(&output_file, mode, mtime);
                }
                other => {
                    tracing::debug!(
                        name = %raw_path.display(),
                        entry_type = ?other,
                        "skipping unsupported entry type"
                    );
                }
            }
        }

        Ok(())
    }

    /// Tar has no encryption concept.
    fn has_encrypted_entries(&self, _archive_path: &Path) -> Result<bool> {
        Ok(false)
    }
}
