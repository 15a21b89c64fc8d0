//! Chunking: length regularization of extracted text chunks.
//!
//! Two chunkers exist. [`StandardChunker`] is the full
//! split/filter/merge/clean pass used for extractor output with
//! arbitrary chunk lengths. [`SimpleChunker`] is the lighter variant
//! for markdown-origin documents where chunks already follow line
//! groups. Both leave locked and non-text chunks untouched.

mod clean;
mod partition;
mod sentences;
mod simple;
mod spellcheck;
mod standard;

pub use clean::clean_text;
pub use partition::balanced_partition;
pub use sentences::split_sentences;
pub use simple::SimpleChunker;
pub use spellcheck::Lexicons;
pub use standard::{ChunkLimits, StandardChunker};
