//! Extractor stages: one module per external capability.

mod file_info;
mod grobid;
mod markdown;
mod office_meta;
mod partition;
mod raw_text;
mod tika;
mod visual;

pub use file_info::FileInfoExtractor;
pub use grobid::GrobidTextExtractor;
pub use markdown::MarkdownExtractor;
pub use office_meta::OfficeMetaExtractor;
pub use partition::PartitionTextExtractor;
pub use raw_text::RawTextExtractor;
pub use tika::{TikaExtractor, TikaSpreadsheetExtractor};
pub use visual::VisualPageExtractor;
