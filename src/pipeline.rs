use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::assemble::{assemble, Assembly};
use crate::config::Config;
use crate::fetch::fetch_pages;
use crate::issue::{ArchiveContext, IssueId};
use crate::storage::PageStore;
use crate::{Error, Result};

/// How a single issue ended.
#[derive(Debug)]
pub enum IssueOutcome {
    Success {
        issue: IssueId,
        artifact: PathBuf,
        pages: usize,
    },
    /// The first page was already missing. Not an error, but worth a warning.
    NoPages { issue: IssueId },
    FetchFailed { issue: IssueId, error: Error },
    AssemblyFailed { issue: IssueId, error: Error },
    Cancelled { issue: IssueId },
    /// The issue's task panicked or was torn down by the runtime.
    Aborted { issue: IssueId, error: Error },
}

impl IssueOutcome {
    pub fn issue(&self) -> &IssueId {
        match self {
            IssueOutcome::Success { issue, .. }
            | IssueOutcome::NoPages { issue }
            | IssueOutcome::FetchFailed { issue, .. }
            | IssueOutcome::AssemblyFailed { issue, .. }
            | IssueOutcome::Cancelled { issue }
            | IssueOutcome::Aborted { issue, .. } => issue,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IssueOutcome::Success { .. })
    }
}

/// Fetch, assemble and clean up a single issue.
///
/// Cloning is cheap: the client and config are shared.
#[derive(Debug, Clone)]
pub struct IssuePipeline {
    client: Client,
    config: Arc<Config>,
    store: PageStore,
    context: ArchiveContext,
}

impl IssuePipeline {
    pub fn new(client: Client, config: Arc<Config>, context: ArchiveContext) -> Self {
        let store = PageStore::new(&config.tmp_dir);
        Self {
            client,
            config,
            store,
            context,
        }
    }

    /// Builds the client from `config`.
    pub fn from_config(config: Config, context: ArchiveContext) -> Result<Self> {
        let config = config.validate()?;
        let client = config.build_client()?;
        Ok(Self::new(client, Arc::new(config), context))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the issue to a terminal outcome. Pages left over from an earlier, interrupted
    /// run are removed first, and the issue's temporary pages are removed afterwards no
    /// matter how it ended.
    pub async fn run(&self, issue: IssueId, cancel: &CancellationToken) -> IssueOutcome {
        let span = info_span!("issue", %issue);
        async {
            self.cleanup(&issue).await;
            let outcome = self.fetch_and_assemble(issue.clone(), cancel).await;
            self.cleanup(&issue).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn fetch_and_assemble(
        &self,
        issue: IssueId,
        cancel: &CancellationToken,
    ) -> IssueOutcome {
        let root = self.context.fetch_root(&self.config.archive_root, &issue);

        let fetched = match self.store.ensure_dir().await {
            Ok(()) => {
                fetch_pages(&self.client, &self.store, &self.config, &root, &issue, cancel).await
            }
            Err(e) => Err(e),
        };
        let page_count = match fetched {
            Ok(0) => return IssueOutcome::NoPages { issue },
            Ok(page_count) => page_count,
            Err(Error::Cancelled) => return IssueOutcome::Cancelled { issue },
            Err(error) => return IssueOutcome::FetchFailed { issue, error },
        };

        match assemble(
            &self.store,
            &issue,
            page_count,
            &self.config.out_dir,
            self.config.resolution_dpi,
        )
        .await
        {
            Ok(Assembly::Written { path, pages }) => IssueOutcome::Success {
                issue,
                artifact: path,
                pages,
            },
            Ok(Assembly::NoPages) => IssueOutcome::NoPages { issue },
            Err(error) => IssueOutcome::AssemblyFailed { issue, error },
        }
    }

    /// Best effort: a failed cleanup is logged, never reported as the issue's outcome.
    pub(crate) async fn cleanup(&self, issue: &IssueId) {
        if let Err(e) = self.store.cleanup(issue).await {
            warn!("cleanup failed for issue {issue}: {e}");
        }
    }
}
