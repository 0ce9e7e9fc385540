use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::core::compression::common::{Entry, EntryKind};
use crate::models::{ArchiveError, Result};

/// One walked filesystem object: the absolute source path plus the archive
/// entry derived from it. The root itself is yielded with an empty relative
/// path so callers can prefix their own base name.
#[derive(Debug)]
pub struct WalkedEntry {
    pub source: PathBuf,
    pub entry: Entry,
}

/// Lazy pre-order walk over a source tree.
///
/// Directories are yielded before their children, in directory-entry order
/// (not sorted). Entries whose metadata cannot be read are skipped so a
/// single unreadable file does not sink a whole backup; only a failure to
/// open the root itself is fatal. The cancellation flag is observed once per
/// yielded entry.
///
/// Entries are produced one at a time and never collected into a list, so
/// memory stays constant over arbitrarily large trees.
pub struct DirWalker {
    root: PathBuf,
    iter: walkdir::IntoIter,
    cancel: Arc<AtomicBool>,
    yielded_root: bool,
    done: bool,
}

impl DirWalker {
    pub fn new(root: &Path, cancel: Arc<AtomicBool>) -> Self {
        Self {
            root: root.to_path_buf(),
            iter: WalkDir::new(root).follow_links(false).into_iter(),
            cancel,
            yielded_root: false,
            done: false,
        }
    }

    fn make_entry(&self, dent: &walkdir::DirEntry) -> Option<WalkedEntry> {
        let meta = match dent.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %dent.path().display(), error = %e, "skipping unreadable entry");
                return None;
            }
        };

        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else if meta.is_file() {
            EntryKind::File
        } else {
            // Symlinks and special files are not archived.
            return None;
        };

        let relative = dent
            .path()
            .strip_prefix(&self.root)
            .unwrap_or_else(|_| dent.path());
        let path = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(v) => Some(v.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o7777
        };
        #[cfg(not(unix))]
        let mode = if meta.is_dir() { 0o755 } else { 0o644 };

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Some(WalkedEntry {
            source: dent.path().to_path_buf(),
            entry: Entry {
                path,
                kind,
                size: if meta.is_file() { meta.len() } else { 0 },
                mode,
                mtime,
                encrypted: false,
            },
        })
    }
}

impl Iterator for DirWalker {
    type Item = Result<WalkedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                self.done = true;
                return Some(Err(ArchiveError::OperationCancelled));
            }
            match self.iter.next() {
                None => return None,
                Some(Err(e)) => {
                    if !self.yielded_root {
                        // The root itself could not be opened.
                        self.done = true;
                        return Some(Err(ArchiveError::OpenFileFailed(e.to_string())));
                    }
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                }
                Some(Ok(dent)) => {
                    self.yielded_root = true;
                    if let Some(walked) = self.make_entry(&dent) {
                        return Some(Ok(walked));
                    }
                }
            }
        }
    }
}

/// Walk over several source roots, prefixing each root's entries with the
/// root's base name so sibling trees land side by side in the archive.
///
/// A root that is a plain file yields a single entry named after the file; a
/// directory root yields itself (as `basename/`) followed by its subtree.
pub struct SourceWalker {
    roots: std::vec::IntoIter<PathBuf>,
    current: Option<(String, DirWalker)>,
    cancel: Arc<AtomicBool>,
    failed: bool,
}

impl SourceWalker {
    pub fn new(sources: &[PathBuf], cancel: Arc<AtomicBool>) -> Self {
        Self {
            roots: sources.to_vec().into_iter(),
            current: None,
            cancel,
            failed: false,
        }
    }

    fn file_entry(root: &Path, base: String) -> Result<WalkedEntry> {
        let meta = std::fs::metadata(root)
            .map_err(|e| ArchiveError::OpenFileFailed(format!("{}: {}", root.display(), e)))?;

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o7777
        };
        #[cfg(not(unix))]
        let mode = 0o644;

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(WalkedEntry {
            source: root.to_path_buf(),
            entry: Entry {
                path: base,
                kind: EntryKind::File,
                size: meta.len(),
                mode,
                mtime,
                encrypted: false,
            },
        })
    }
}

impl Iterator for SourceWalker {
    type Item = Result<WalkedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some((base, walker)) = self.current.as_mut() {
                match walker.next() {
                    Some(Ok(mut walked)) => {
                        walked.entry.path = if walked.entry.path.is_empty() {
                            base.clone()
                        } else {
                            format!("{}/{}", base, walked.entry.path)
                        };
                        return Some(Ok(walked));
                    }
                    Some(Err(e)) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
                continue;
            }

            let root = self.roots.next()?;
            let base = match root.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => {
                    self.failed = true;
                    return Some(Err(ArchiveError::OpenFileFailed(format!(
                        "source path has no file name: {}",
                        root.display()
                    ))));
                }
            };

            match std::fs::metadata(&root) {
                Ok(meta) if meta.is_dir() => {
                    self.current = Some((base, DirWalker::new(&root, Arc::clone(&self.cancel))));
                }
                Ok(meta) if meta.is_file() => {
                    return Some(Self::file_entry(&root, base));
                }
                Ok(_) => {
                    tracing::warn!(path = %root.display(), "skipping special source file");
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(ArchiveError::OpenFileFailed(format!(
                        "{}: {}",
                        root.display(),
                        e
                    ))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn collect_paths(root: &Path) -> Vec<String> {
        DirWalker::new(root, flag())
            .map(|r| r.unwrap().entry.path)
            .collect()
    }

    #[test]
    fn test_walk_yields_root_first_with_empty_path() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"a").unwrap();

        let paths = collect_paths(temp.path());
        assert_eq!(paths[0], "");
        assert!(paths.contains(&"a.txt".to_string()));
    }

    #[test]
    fn test_walk_preorder_directories_before_children() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("sub/inner")).unwrap();
        fs::write(temp.path().join("sub/inner/deep.txt"), b"x").unwrap();

        let paths = collect_paths(temp.path());
        let dir_pos = paths.iter().position(|p| p == "sub").unwrap();
        let inner_pos = paths.iter().position(|p| p == "sub/inner").unwrap();
        let file_pos = paths.iter().position(|p| p == "sub/inner/deep.txt").unwrap();
        assert!(dir_pos < inner_pos);
        assert!(inner_pos < file_pos);
    }

    #[test]
    fn test_walk_records_sizes_and_kinds() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("data.bin"), vec![0u8; 123]).unwrap();
        fs::create_dir(temp.path().join("d")).unwrap();

        for walked in DirWalker::new(temp.path(), flag()) {
            let walked = walked.unwrap();
            match walked.entry.path.as_str() {
                "data.bin" => {
                    assert_eq!(walked.entry.kind, EntryKind::File);
                    assert_eq!(walked.entry.size, 123);
                }
                "d" | "" => {
                    assert_eq!(walked.entry.kind, EntryKind::Directory);
                    assert_eq!(walked.entry.size, 0);
                }
                other => panic!("unexpected entry {}", other),
            }
        }
    }

    #[test]
    fn test_walk_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("no-such-dir");
        let mut walker = DirWalker::new(&missing, flag());
        match walker.next() {
            Some(Err(ArchiveError::OpenFileFailed(_))) => {}
            other => panic!("expected OpenFileFailed, got {:?}", other.map(|r| r.err())),
        }
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_walk_stops_on_cancellation() {
        let temp = TempDir::new().unwrap();
        for i in 0..10 {
            fs::write(temp.path().join(format!("f{}.txt", i)), b"x").unwrap();
        }

        let cancel = flag();
        let mut walker = DirWalker::new(temp.path(), Arc::clone(&cancel));
        assert!(walker.next().unwrap().is_ok());

        cancel.store(true, Ordering::Relaxed);
        match walker.next() {
            Some(Err(ArchiveError::OperationCancelled)) => {}
            other => panic!("expected cancellation, got {:?}", other.map(|r| r.err())),
        }
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_source_walker_prefixes_with_basename() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        fs::write(docs.join("readme.md"), b"hi").unwrap();
        let standalone = temp.path().join("notes.txt");
        fs::write(&standalone, b"note").unwrap();

        let paths: Vec<String> = SourceWalker::new(&[docs, standalone], flag())
            .map(|r| r.unwrap().entry.path)
            .collect();
        assert_eq!(paths, vec!["docs", "docs/readme.md", "notes.txt"]);
    }

    #[test]
    fn test_source_walker_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        let mut walker = SourceWalker::new(&[missing], flag());
        assert!(matches!(
            walker.next(),
            Some(Err(ArchiveError::OpenFileFailed(_)))
        ));
        assert!(walker.next().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_captures_mode_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("script.sh");
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o754)).unwrap();

        let walked = DirWalker::new(temp.path(), flag())
            .map(|r| r.unwrap())
            .find(|w| w.entry.path == "script.sh")
            .unwrap();
        assert_eq!(walked.entry.mode, 0o754);
    }
}
