//! Process-wide configuration.
//!
//! All knobs are read from the environment once at startup and frozen
//! into a [`Settings`] value that is threaded by reference into the
//! dispatcher and every adapter. Nothing here mutates after startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// OCR strategy forwarded to the Tika server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TikaOcrStrategy {
    NoOcr,
    Auto,
    OcrOnly,
    OcrAndTextExtraction,
}

impl TikaOcrStrategy {
    /// Header value understood by Tika's PDF parser.
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Self::NoOcr => "no_ocr",
            Self::Auto => "auto",
            Self::OcrOnly => "ocr_only",
            Self::OcrAndTextExtraction => "ocr_and_text_extraction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NO_OCR" => Some(Self::NoOcr),
            "AUTO" => Some(Self::Auto),
            "OCR_ONLY" => Some(Self::OcrOnly),
            "OCR_AND_TEXT_EXTRACTION" => Some(Self::OcrAndTextExtraction),
            _ => None,
        }
    }
}

/// Which capability extracts PDF text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfExtractorKind {
    Tika,
    Grobid,
    Partition,
}

impl PdfExtractorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tika" => Some(Self::Tika),
            "grobid" => Some(Self::Grobid),
            "partition" | "unstructured" => Some(Self::Partition),
            _ => None,
        }
    }
}

/// Immutable runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Worker count for parallel stages.
    pub nproc: usize,
    /// Items submitted concurrently per executor batch.
    pub batch_size: usize,
    /// GROBID server base URL.
    pub grobid_url: String,
    /// Tika server base URL.
    pub tika_url: String,
    /// OCR strategy forwarded to Tika for PDFs.
    pub tika_ocr_strategy: TikaOcrStrategy,
    /// Partitioner service base URL.
    pub partition_url: String,
    /// Text-extraction capability used for PDFs.
    pub pdf_extractor: PdfExtractorKind,
    /// Directory of `<lang>.txt` word lists for the quality filter.
    pub dictionary_dir: Option<std::path::PathBuf>,
    /// Whether the chunker's cleanup pass runs.
    pub clean_chunks: bool,
    /// Whether the post-processor rewrites table chunks with LLM
    /// descriptions (costs one model call per table).
    pub llm_table_descriptions: bool,
    /// Page cap for text extraction and OCR.
    pub max_pages: u32,
    /// Pages rasterized for the visual extractor.
    pub visual_max_pages: u32,
    /// Maximum chunk length for the simple chunker.
    pub max_chunk_len: usize,
    /// Overlap copied into prefix/suffix by the simple chunker.
    pub chunk_overlap: usize,
    /// Minimum characters the first three pages must yield before the
    /// OCR fallback kicks in. Empirical; see the file-info stage.
    pub ocr_trigger_chars: usize,
    /// LLM API base URL (chat-completions shape).
    pub llm_base_url: String,
    /// LLM API key, if the endpoint requires one.
    pub llm_api_key: Option<String>,
    /// Timeout applied to every external HTTP call.
    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Default for Settings {
    fn default() -> Self {
        let nproc = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            nproc,
            batch_size: 2 * nproc,
            grobid_url: "http://localhost:8070".to_string(),
            tika_url: "http://localhost:9998".to_string(),
            tika_ocr_strategy: TikaOcrStrategy::NoOcr,
            partition_url: "http://localhost:8000".to_string(),
            pdf_extractor: PdfExtractorKind::Tika,
            dictionary_dir: None,
            clean_chunks: true,
            llm_table_descriptions: false,
            max_pages: 30,
            visual_max_pages: 3,
            max_chunk_len: 2000,
            chunk_overlap: 100,
            ocr_trigger_chars: 50,
            llm_base_url: "http://localhost:11434/v1".to_string(),
            llm_api_key: None,
            http_timeout: Duration::from_secs(120),
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let nproc = env_parse("DOCMILL_NPROC", defaults.nproc);
        Self {
            nproc,
            batch_size: env_parse("DOCMILL_BATCH_SIZE", 2 * nproc),
            grobid_url: env_string("DOCMILL_GROBID_URL", &defaults.grobid_url),
            tika_url: env_string("DOCMILL_TIKA_URL", &defaults.tika_url),
            tika_ocr_strategy: std::env::var("DOCMILL_TIKA_OCR_STRATEGY")
                .ok()
                .and_then(|v| TikaOcrStrategy::parse(&v))
                .unwrap_or(defaults.tika_ocr_strategy),
            partition_url: env_string("DOCMILL_PARTITION_URL", &defaults.partition_url),
            pdf_extractor: std::env::var("DOCMILL_PDF_EXTRACTOR")
                .ok()
                .and_then(|v| PdfExtractorKind::parse(&v))
                .unwrap_or(defaults.pdf_extractor),
            dictionary_dir: std::env::var("DOCMILL_DICTIONARY_DIR")
                .ok()
                .map(std::path::PathBuf::from),
            clean_chunks: env_parse("DOCMILL_CLEAN_CHUNKS", defaults.clean_chunks),
            llm_table_descriptions: env_parse(
                "DOCMILL_LLM_TABLE_DESCRIPTIONS",
                defaults.llm_table_descriptions,
            ),
            max_pages: env_parse("DOCMILL_MAX_PAGES", defaults.max_pages),
            visual_max_pages: env_parse("DOCMILL_VISUAL_MAX_PAGES", defaults.visual_max_pages),
            max_chunk_len: env_parse("DOCMILL_MAX_CHUNK_LEN", defaults.max_chunk_len),
            chunk_overlap: env_parse("DOCMILL_CHUNK_OVERLAP", defaults.chunk_overlap),
            ocr_trigger_chars: env_parse("DOCMILL_OCR_TRIGGER_CHARS", defaults.ocr_trigger_chars),
            llm_base_url: env_string("DOCMILL_LLM_BASE_URL", &defaults.llm_base_url),
            llm_api_key: std::env::var("DOCMILL_LLM_API_KEY").ok(),
            http_timeout: Duration::from_secs(env_parse(
                "DOCMILL_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )),
        }
    }
}
