use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::{Error, Result, ARCHIVE_ROOT};

/// Which responses end an issue's page sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbsencePolicy {
    /// Only `404 Not Found` and `410 Gone` mean "no such page". Any other
    /// non-success status fails the issue instead of silently truncating it.
    #[default]
    NotFoundOnly,
    /// Every non-success status ends the sequence.
    AnyNonSuccess,
}

impl AbsencePolicy {
    pub fn is_absent(self, status: StatusCode) -> bool {
        match self {
            AbsencePolicy::NotFoundOnly => {
                status == StatusCode::NOT_FOUND || status == StatusCode::GONE
            }
            AbsencePolicy::AnyNonSuccess => !status.is_success(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub archive_root: String,
    /// Temporary page files, one per fetched page.
    pub tmp_dir: PathBuf,
    /// Finished PDFs, one per issue.
    pub out_dir: PathBuf,
    pub max_concurrent_issues: usize,
    /// Applied to every single page request.
    pub request_timeout: Duration,
    /// How many pages are requested at once per issue. 1 probes strictly one after another.
    pub lookahead: usize,
    pub absence: AbsencePolicy,
    pub resolution_dpi: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_root: ARCHIVE_ROOT.to_string(),
            tmp_dir: PathBuf::from("tmp"),
            out_dir: PathBuf::from("out"),
            max_concurrent_issues: 8,
            request_timeout: Duration::from_secs(30),
            lookahead: 1,
            absence: AbsencePolicy::default(),
            resolution_dpi: 100.0,
        }
    }
}

impl Config {
    /// Checks the limits and normalises `archive_root` to end with a `/`.
    pub fn validate(mut self) -> Result<Self> {
        if self.max_concurrent_issues == 0 {
            return Err(Error::Config(
                "max_concurrent_issues must be at least 1".into(),
            ));
        }
        if self.lookahead == 0 {
            return Err(Error::Config("lookahead must be at least 1".into()));
        }
        if !(self.resolution_dpi > 0.0) {
            return Err(Error::Config(format!(
                "resolution_dpi must be positive, got {}",
                self.resolution_dpi
            )));
        }
        if self.archive_root.is_empty() {
            return Err(Error::Config("archive_root is empty".into()));
        }
        if !self.archive_root.ends_with('/') {
            self.archive_root.push('/');
        }
        Ok(self)
    }

    pub fn build_client(&self) -> Result<Client> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}
