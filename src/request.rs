use reqwest::Client;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::AbsencePolicy;
use crate::issue::page_url;
use crate::{Error, Result};

/// What a single page request found. Transport failures come back as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Present(Vec<u8>),
    Absent,
}

/// Requests `{root}{page_num}.jpg` and classifies the response.
///
/// A status the `absence` policy doesn't consider "absent" and that isn't a success
/// becomes [`Error::UnexpectedStatus`].
pub async fn probe_page(
    client: &Client,
    root: &str,
    page_num: usize,
    absence: AbsencePolicy,
) -> Result<FetchOutcome> {
    let url = page_url(root, page_num);
    let res = client.get(&url).send().await?;
    let status = res.status();

    if status.is_success() {
        let bytes = res.bytes().await?;
        debug!(page_num, len = bytes.len(), "page present");
        return Ok(FetchOutcome::Present(bytes.to_vec()));
    }
    if absence.is_absent(status) {
        debug!(page_num, %status, "page absent");
        return Ok(FetchOutcome::Absent);
    }
    Err(Error::UnexpectedStatus { url, status })
}

/// Returns a `JoinSet` of the page requests `first_page..first_page + block_len`, so that
/// they can be awaited. Every task yields its page number alongside the outcome.
pub(crate) fn request_block(
    client: &Client,
    root: &str,
    first_page: usize,
    block_len: usize,
    absence: AbsencePolicy,
) -> JoinSet<(usize, Result<FetchOutcome>)> {
    let mut task_set = JoinSet::new();

    for page_num in first_page..first_page + block_len {
        task_set.spawn({
            // Client uses Arc so we can clone cheaply
            let client = client.clone();
            let root = root.to_string();

            async move {
                let outcome = probe_page(&client, &root, page_num, absence).await;
                (page_num, outcome)
            }
        });
    }
    task_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(page: &str, template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn success_is_present_with_body() {
        let server =
            server_with("/1.jpg", ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3])).await;
        let root = format!("{}/", server.uri());

        let outcome = probe_page(&Client::new(), &root, 1, AbsencePolicy::NotFoundOnly)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Present(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn not_found_is_absent() {
        let server = MockServer::start().await;
        let root = format!("{}/", server.uri());

        // wiremock answers unmatched requests with 404
        let outcome = probe_page(&Client::new(), &root, 7, AbsencePolicy::NotFoundOnly)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Absent);
    }

    #[tokio::test]
    async fn server_error_depends_on_policy() {
        let server = server_with("/2.jpg", ResponseTemplate::new(503)).await;
        let root = format!("{}/", server.uri());
        let client = Client::new();

        let strict = probe_page(&client, &root, 2, AbsencePolicy::NotFoundOnly).await;
        match strict {
            Err(Error::UnexpectedStatus { url, status }) => {
                assert_eq!(status.as_u16(), 503);
                assert!(url.ends_with("/2.jpg"));
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }

        let lenient = probe_page(&client, &root, 2, AbsencePolicy::AnyNonSuccess)
            .await
            .unwrap();
        assert_eq!(lenient, FetchOutcome::Absent);
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_error() {
        let server = MockServer::start().await;
        let root = format!("{}/", server.uri());
        drop(server);

        let outcome = probe_page(&Client::new(), &root, 1, AbsencePolicy::AnyNonSuccess).await;
        assert!(matches!(outcome, Err(Error::Reqwest(_))));
    }

    #[tokio::test]
    async fn block_reports_every_page_number() {
        let server = server_with("/3.jpg", ResponseTemplate::new(200)).await;
        let root = format!("{}/", server.uri());

        let mut block = request_block(&Client::new(), &root, 2, 3, AbsencePolicy::NotFoundOnly);
        let mut seen = Vec::new();
        while let Some(task) = block.join_next().await {
            let (page_num, outcome) = task.unwrap();
            let present = matches!(outcome.unwrap(), FetchOutcome::Present(_));
            seen.push((page_num, present));
        }
        seen.sort();
        assert_eq!(seen, vec![(2, false), (3, true), (4, false)]);
    }
}
