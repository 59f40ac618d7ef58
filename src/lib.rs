//! Radio Times scraper for the BBC Genome archive.
//!
//! Genome serves every issue as numbered page images with no index, so the number
//! of pages is only found by requesting page after page until one is missing.
//! Each issue is fetched, stitched into a PDF and cleaned up on its own; a batch
//! runs many issues side by side.

pub mod assemble;
pub mod config;
mod error;
pub mod fetch;
pub mod issue;
mod macros;
pub mod pipeline;
pub mod process;
pub mod request;
pub mod storage;

pub use config::{AbsencePolicy, Config};
pub use error::{Error, Result};
pub use issue::{decade_of, ArchiveContext, IssueId};
pub use pipeline::{IssueOutcome, IssuePipeline};
pub use process::{process_batch, BatchReport, BatchSummary};

const START_PAGE: usize = 1;
const PAGE_EXTENSION: &str = "jpg";
pub const ARCHIVE_ROOT: &str = "https://genome.ch.bbc.co.uk/i/asset/";
/// London.
pub const DEFAULT_REGION: &str = "l";
