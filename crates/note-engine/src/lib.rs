//! Hierarchical note store engine
//!
//! Loads a flat directory of `*.md` notes and `*.schema.yml` schemas, derives
//! the tree implied by their dotted names, and keeps files and tree in step
//! as documents are written and deleted.

pub mod config;
pub mod document;
pub mod engine;
pub mod fs;
pub mod id;
pub mod index;
pub mod native_fs;
pub mod reconcile;
pub mod registry;

pub use config::EngineConfig;
pub use document::{Document, DocumentError, RawDocument, RawFormat};
pub use engine::{DeleteOutcome, EngineError, InitReport, NoteEngine, QueryResult, WriteOptions};
pub use fs::{FileSystem, FsError, InMemoryFs};
pub use id::{DocId, IdAllocator, IdError};
pub use index::{IndexError, NamespaceView, PathIndex};
pub use native_fs::NativeFs;
pub use reconcile::ReconcileReport;
pub use registry::{EngineRegistry, SharedEngine};

pub use note_fs::Namespace;
