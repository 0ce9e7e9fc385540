// Shared data types
pub mod error;
pub mod format;
pub mod task;

pub use error::{ArchiveError, Result};
pub use format::{ArchiveFormat, Codec, ContainerKind};
pub use task::{OutputKind, TaskId};
