//! Archive engine: compression and extraction for zip, 7z, tar (plain and
//! gz/bz2/xz) and bare compressed streams, with optional passwords for zip
//! and 7z, background workers, progress reporting and cooperative
//! cancellation.

// Module declarations
pub mod core;
pub mod engine;
pub mod models;

pub use engine::progress::{CompleteFn, ProgressFn};
pub use engine::ArchiveEngine;
pub use models::{ArchiveError, ArchiveFormat, Codec, ContainerKind, OutputKind, Result, TaskId};
