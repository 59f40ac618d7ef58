use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::issue::IssueId;
use crate::pipeline::{IssueOutcome, IssuePipeline};
use crate::{info_time, Error, Result};

/// Every issue's terminal outcome, ordered by issue number.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<IssueOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub no_pages: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.no_pages + self.failed + self.cancelled
    }
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for outcome in &self.outcomes {
            match outcome {
                IssueOutcome::Success { .. } => summary.succeeded += 1,
                IssueOutcome::NoPages { .. } => summary.no_pages += 1,
                IssueOutcome::FetchFailed { .. }
                | IssueOutcome::AssemblyFailed { .. }
                | IssueOutcome::Aborted { .. } => summary.failed += 1,
                IssueOutcome::Cancelled { .. } => summary.cancelled += 1,
            }
        }
        summary
    }

    /// True only if every issue produced an artifact.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(IssueOutcome::is_success)
    }
}

/// Downloads every issue in `issues` (inclusive) concurrently, at most
/// `max_concurrent_issues` of them at a time, and waits for all of them to finish.
///
/// One issue failing never stops the others. Cancelling `cancel` stops every issue at
/// its next network request; their temporary pages are still cleaned up.
pub async fn process_batch(
    pipeline: IssuePipeline,
    region: &str,
    issues: RangeInclusive<u32>,
    cancel: CancellationToken,
) -> Result<BatchReport> {
    let (start, end) = (*issues.start(), *issues.end());
    if start > end {
        return Err(Error::InvalidRange { start, end });
    }
    let issue_ids = issues
        .map(|number| IssueId::new(number, region))
        .collect::<Result<Vec<_>>>()?;

    let start_time = Local::now();
    info_time!("{} issues will be downloaded", issue_ids.len());

    let permits = Arc::new(Semaphore::new(pipeline.config().max_concurrent_issues));
    let mut task_set = JoinSet::new();
    let mut task_issues = HashMap::with_capacity(issue_ids.len());

    for issue in issue_ids {
        let handle = task_set.spawn({
            let pipeline = pipeline.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            let issue = issue.clone();

            async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return IssueOutcome::Cancelled { issue },
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        // The semaphore is never closed.
                        Err(_) => return IssueOutcome::Cancelled { issue },
                    },
                };
                pipeline.run(issue, &cancel).await
            }
        });
        task_issues.insert(handle.id(), issue);
    }

    let mut outcomes = Vec::with_capacity(task_issues.len());
    while let Some(joined) = task_set.join_next_with_id().await {
        let outcome = match joined {
            Ok((_, outcome)) => outcome,
            Err(join_error) => match task_issues.remove(&join_error.id()) {
                Some(issue) => aborted_outcome(&pipeline, issue, join_error).await,
                None => return Err(join_error.into()),
            },
        };
        log_outcome(&outcome);
        outcomes.push(outcome);
    }
    outcomes.sort_by_key(|outcome| outcome.issue().number());

    let report = BatchReport { outcomes };
    let summary = report.summary();
    info!(
        succeeded = summary.succeeded,
        no_pages = summary.no_pages,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "batch finished"
    );
    info_time!(start_time, "Finished {} issues.", summary.total());
    Ok(report)
}

/// A dead task never reached its own cleanup, so its pages are removed here.
async fn aborted_outcome(
    pipeline: &IssuePipeline,
    issue: IssueId,
    join_error: JoinError,
) -> IssueOutcome {
    error!("task for issue {issue} died: {join_error}");
    pipeline.cleanup(&issue).await;
    IssueOutcome::Aborted {
        issue,
        error: join_error.into(),
    }
}

fn log_outcome(outcome: &IssueOutcome) {
    match outcome {
        IssueOutcome::Success {
            issue,
            artifact,
            pages,
        } => info!("issue {issue}: {pages} pages -> {}", artifact.display()),
        IssueOutcome::NoPages { issue } => warn!("issue {issue}: no pages found"),
        IssueOutcome::FetchFailed { issue, error } => {
            error!("issue {issue}: download failed: {error}")
        }
        IssueOutcome::AssemblyFailed { issue, error } => {
            error!("issue {issue}: building the PDF failed: {error}")
        }
        IssueOutcome::Cancelled { issue } => warn!("issue {issue}: cancelled"),
        IssueOutcome::Aborted { issue, error } => error!("issue {issue}: aborted: {error}"),
    }
}
