use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an in-flight engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What kind of filesystem output a task produces, for cleanup purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputKind {
    /// No output to clean (inspection operations).
    None,
    /// A directory the archive is being unpacked into.
    ExtractDestination,
    /// The archive file being written.
    ArchiveFile,
}
