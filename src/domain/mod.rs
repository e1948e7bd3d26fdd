//! Domain types: the content-addressed object model and workspace state

pub mod file_state;
pub mod hash;
pub mod identity;
pub mod object;
pub mod snapshot;

pub use file_state::{FileState, FileStatus};
pub use hash::ObjectHash;
pub use identity::Identity;
pub use object::{Blob, Chunk, DecodeError, Object, ObjectKind, Seal, SealOverwrite, Tree, TreeEntry};
pub use snapshot::{SnapshotFile, WorkspaceSnapshot};
