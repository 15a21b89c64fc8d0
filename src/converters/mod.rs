//! Format converters.

mod libreoffice;

pub use libreoffice::LibreOfficeConverter;
