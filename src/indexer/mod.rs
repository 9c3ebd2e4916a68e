//! Turning the upload directory into a searchable index.
pub mod chunker;
pub mod core;
pub mod loader;

pub use chunker::{Chunk, Chunker};
pub use self::core::{IndexManager, IndexState, SyncReport};
pub use loader::{Document, DocumentFormat};
