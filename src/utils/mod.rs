//! Shared utility functions.
//!
//! - `shell`: subprocess execution for external tools
//! - `text`: token counting, line grouping, hyphenation repair
//! - `lang`: natural-language identification
//! - `xml`: office metadata XML cleanup

pub mod lang;
pub mod shell;
pub mod text;
pub mod xml;

pub use lang::detect_language;
pub use shell::{check_tools, run_command, ShellError};
pub use text::{count_tokens_rough, remove_hyphenation, split_text_by_lines, truncate_chars};
pub use xml::clean_xml;
