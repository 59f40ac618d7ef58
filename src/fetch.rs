use chrono::Local;
use reqwest::Client;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::issue::IssueId;
use crate::request::{request_block, FetchOutcome};
use crate::storage::PageStore;
use crate::{info_time, Error, Result, START_PAGE};

/// Pages of one block that came back present, plus the page that ended the issue, if any.
#[derive(Debug)]
struct ResolvedBlock {
    pages: Vec<(usize, Vec<u8>)>,
    first_absent: Option<usize>,
}

/// Discovers and stores every page of `issue`, starting at page 1 and stopping at the
/// first absent page. Returns the page count (0 if the very first page is missing).
///
/// Pages are requested `config.lookahead` at a time. A block is settled as soon as its
/// lowest pages are known: all present, or cut off by the first absent page or error.
/// Anything still in flight past that point is aborted and pages past the first absent
/// one are never stored, so stored pages are always exactly `1..=count`.
///
/// Cancellation is only observed while waiting on the network.
pub async fn fetch_pages(
    client: &Client,
    store: &PageStore,
    config: &Config,
    root: &str,
    issue: &IssueId,
    cancel: &CancellationToken,
) -> Result<usize> {
    let start_time = Local::now();
    info_time!("Downloading issue {}...", issue);

    let block_len = config.lookahead.max(1);
    let mut next_page = START_PAGE;

    loop {
        let block = request_block(client, root, next_page, block_len, config.absence);
        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resolved = resolve_block(block, next_page, block_len) => resolved?,
        };

        for (page_num, bytes) in &resolved.pages {
            store.write_page(issue, *page_num, bytes).await?;
        }

        match resolved.first_absent {
            Some(START_PAGE) => {
                warn!("No pages for issue {issue}, check issue number!");
                return Ok(0);
            }
            Some(absent_page) => {
                let count = absent_page - START_PAGE;
                info_time!(start_time, "Issue {} has {} pages", issue, count);
                return Ok(count);
            }
            None => {
                debug!(%issue, next_page, block_len, "block complete, requesting next");
                next_page += block_len;
            }
        }
    }
}

/// Awaits the block's tasks until its lowest pages decide how it ends, then drops the rest.
async fn resolve_block(
    mut block: JoinSet<(usize, Result<FetchOutcome>)>,
    first_page: usize,
    block_len: usize,
) -> Result<ResolvedBlock> {
    let mut slots: Vec<Option<Result<FetchOutcome>>> = (0..block_len).map(|_| None).collect();

    while let Some(task) = block.join_next().await {
        let (page_num, outcome) = task?;
        slots[page_num - first_page] = Some(outcome);

        if is_settled(&slots) {
            block.abort_all();
            break;
        }
    }
    into_resolved(slots, first_page)
}

fn is_settled(slots: &[Option<Result<FetchOutcome>>]) -> bool {
    for slot in slots {
        match slot {
            None => return false,
            Some(Ok(FetchOutcome::Present(_))) => continue,
            Some(_) => return true,
        }
    }
    true
}

fn into_resolved(
    slots: Vec<Option<Result<FetchOutcome>>>,
    first_page: usize,
) -> Result<ResolvedBlock> {
    let mut pages = Vec::with_capacity(slots.len());
    for (offset, slot) in slots.into_iter().enumerate() {
        let page_num = first_page + offset;
        match slot {
            Some(Ok(FetchOutcome::Present(bytes))) => pages.push((page_num, bytes)),
            Some(Ok(FetchOutcome::Absent)) => {
                return Ok(ResolvedBlock {
                    pages,
                    first_absent: Some(page_num),
                })
            }
            Some(Err(e)) => return Err(e),
            // Unfilled slots only ever follow a settling one.
            None => break,
        }
    }
    Ok(ResolvedBlock {
        pages,
        first_absent: None,
    })
}
