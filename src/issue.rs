use std::fmt;

use crate::{Error, Result, PAGE_EXTENSION};

/// Rounds a year down to its decade: 2023 -> 2020, 1969 -> 1960.
pub fn decade_of(year: i32) -> i32 {
    year - year.rem_euclid(10)
}

/// A single Radio Times issue: the issue number tagged with its regional edition, e.g. `4000l`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssueId {
    number: u32,
    region: String,
}

impl IssueId {
    /// The region ends up in URLs and file names, so only ASCII alphanumerics are accepted.
    pub fn new(number: u32, region: impl Into<String>) -> Result<Self> {
        let region = region.into();
        if region.is_empty() || !region.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidRegion(region));
        }
        Ok(Self { number, region })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.region)
    }
}

/// Year and decade of a run. Shared read-only by every issue of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveContext {
    pub year: i32,
    pub decade: i32,
}

impl ArchiveContext {
    pub fn from_year(year: i32) -> Self {
        Self {
            year,
            decade: decade_of(year),
        }
    }

    /// `{archive_root}{decade}/{year}/{issue}/{issue}/`
    ///
    /// `archive_root` is expected to end with a `/`.
    pub fn fetch_root(&self, archive_root: &str, issue: &IssueId) -> String {
        format!(
            "{archive_root}{}/{}/{issue}/{issue}/",
            self.decade, self.year
        )
    }
}

/// URL of a single page below an issue's fetch root.
#[inline]
pub fn page_url(root: &str, page_num: usize) -> String {
    format!("{root}{page_num}.{PAGE_EXTENSION}")
}
