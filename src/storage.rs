//! Temporary page storage.
//!
//! Pages live as `{tmp_dir}/{issue}_{page_num}.jpg` between fetching and assembly.
//! The issue prefix partitions the directory, so concurrent issues never touch each
//! other's files.

use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, warn};

use crate::issue::IssueId;
use crate::{Result, PAGE_EXTENSION};

#[derive(Debug, Clone)]
pub struct PageStore {
    dir: PathBuf,
}

impl PageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn page_path(&self, issue: &IssueId, page_num: usize) -> PathBuf {
        self.dir.join(format!("{issue}_{page_num}.{PAGE_EXTENSION}"))
    }

    pub async fn write_page(
        &self,
        issue: &IssueId,
        page_num: usize,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.page_path(issue, page_num);
        fs::write(&path, bytes).await?;
        debug!(%issue, page_num, "saved page");
        Ok(path)
    }

    /// All stored pages of `issue`, sorted by page number (numerically, so 2 comes before 10).
    pub async fn list_pages(&self, issue: &IssueId) -> Result<Vec<(usize, PathBuf)>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{issue}_");
        let mut pages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(page_num) = parse_page_num(name, &prefix) {
                pages.push((page_num, entry.path()));
            }
        }
        pages.sort_unstable_by_key(|(page_num, _)| *page_num);
        Ok(pages)
    }

    /// Deletes every stored page of `issue` and returns how many were removed.
    /// Safe to call when nothing is stored.
    pub async fn cleanup(&self, issue: &IssueId) -> Result<usize> {
        let mut removed = 0;
        for (_, path) in self.list_pages(issue).await? {
            debug!("cleanup: deleting {}", path.display());
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("cleanup: couldn't delete {}: {e}", path.display()),
            }
        }
        Ok(removed)
    }
}

/// `"4000l_12.jpg"` with prefix `"4000l_"` -> `Some(12)`.
fn parse_page_num(file_name: &str, prefix: &str) -> Option<usize> {
    file_name
        .strip_prefix(prefix)?
        .strip_suffix(PAGE_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}
