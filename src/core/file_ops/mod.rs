// Filesystem primitives shared by the format handlers
pub mod copy;
pub mod walker;

pub use copy::{copy_cancellable, CancelGate, COPY_BLOCK_SIZE};
pub use walker::{DirWalker, SourceWalker, WalkedEntry};
