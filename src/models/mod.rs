//! Data models for docmill.

mod document;
mod error;

pub use document::{
    union_coordinates, Chunk, ChunkType, Coordinates, Document, FileFeatures, FileRef, MetaInfo,
    Payload,
};
pub use error::{ErrorKind, ProcessingError, StageError};
