use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rt_scrap::{AbsencePolicy, Config, ARCHIVE_ROOT, DEFAULT_REGION};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rt-scrap",
    version,
    about = "Scrape Radio Times issues from Genome into PDFs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,

    /// Radio Times region, defaults to London (l)
    #[arg(long, global = true, default_value = DEFAULT_REGION, env = "RT_SCRAP_REGION")]
    pub region: String,

    /// Log every saved page and deleted temp file
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "tmp", env = "RT_SCRAP_TMP_DIR")]
    pub tmp_dir: PathBuf,

    #[arg(long, global = true, default_value = "out", env = "RT_SCRAP_OUT_DIR")]
    pub out_dir: PathBuf,

    /// Issues downloaded at the same time in batch mode
    #[arg(long, global = true, default_value_t = 8, env = "RT_SCRAP_MAX_CONCURRENT")]
    pub max_concurrent: usize,

    /// Timeout for a single page request, in seconds
    #[arg(long, global = true, default_value_t = 30, env = "RT_SCRAP_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Pages requested at once per issue (1 = strictly one after another)
    #[arg(long, global = true, default_value_t = 1)]
    pub lookahead: usize,

    /// Treat every non-success response as "no more pages", not just 404/410
    #[arg(long, global = true)]
    pub lenient_absence: bool,

    #[arg(long, global = true, default_value = ARCHIVE_ROOT, env = "RT_SCRAP_ARCHIVE_ROOT")]
    pub archive_root: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// single-issue download mode
    Single {
        /// Year of Radio Times issue - decade will be automatically guessed
        #[arg(long)]
        year: i32,
        /// Radio Times issue number
        #[arg(long = "issue")]
        issue_number: u32,
    },
    /// batch download mode
    Batch {
        /// Year of Radio Times issues - decade will be automatically guessed
        #[arg(long)]
        year: i32,
        /// Starting issue number
        #[arg(long = "from")]
        start_issue: u32,
        /// Ending issue number
        #[arg(long = "to")]
        end_issue: u32,
    },
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            archive_root: self.archive_root.clone(),
            tmp_dir: self.tmp_dir.clone(),
            out_dir: self.out_dir.clone(),
            max_concurrent_issues: self.max_concurrent,
            request_timeout: Duration::from_secs(self.timeout_secs),
            lookahead: self.lookahead,
            absence: if self.lenient_absence {
                AbsencePolicy::AnyNonSuccess
            } else {
                AbsencePolicy::NotFoundOnly
            },
            ..Config::default()
        }
    }
}
