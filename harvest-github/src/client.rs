//! GraphQL search client
//!
//! Speaks the repository search endpoint with bearer authentication. The
//! client owns the rate-limit policy: a limited response is slept on until
//! the advertised reset and the identical page request is re-issued, while
//! transient faults go through the shared backoff helper. Callers only ever
//! see a page, an exhausted transient error, or a fatal error.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use harvest_core::{
    not_found_error, retry_async, ErrorContext, GithubConfig, HarvestError, HarvestResult,
    RepositoryRecord, RepositorySearch, RetryConfig, SearchPage,
};
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tokio::time::{sleep, Duration};

/// Safety margin added on top of the server-advertised reset time
pub(crate) const RATE_LIMIT_SAFETY_MARGIN_SECS: u64 = 5;
/// Flat wait when a rate-limit response carries no usable reset information
pub(crate) const FALLBACK_RATE_LIMIT_WAIT_MS: u64 = 60_000;
/// Error type the endpoint uses for in-payload rate limiting
const GRAPHQL_RATE_LIMITED: &str = "RATE_LIMITED";

const SEARCH_QUERY: &str = r#"
query CollectRepositories($searchQuery: String!, $pageSize: Int!, $cursor: String) {
  search(query: $searchQuery, type: REPOSITORY, first: $pageSize, after: $cursor) {
    pageInfo {
      endCursor
      hasNextPage
    }
    nodes {
      ... on Repository {
        nameWithOwner
        stargazers {
          totalCount
        }
        createdAt
        pushedAt
        primaryLanguage {
          name
        }
        releases {
          totalCount
        }
        pullRequests(states: MERGED) {
          totalCount
        }
        issues {
          totalCount
        }
        closedIssues: issues(states: CLOSED) {
          totalCount
        }
      }
    }
  }
}
"#;

/// Client for the repository search API
pub struct SearchClient {
    client: reqwest::Client,
    api_url: String,
    search_query: String,
    retry: RetryConfig,
}

impl SearchClient {
    /// Create a search client from the API section of the configuration.
    ///
    /// The token is baked into the default headers so every request carries
    /// it; a missing token must be caught before this point.
    pub fn new(config: &GithubConfig, token: &str, retry: RetryConfig) -> HarvestResult<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("bearer {}", token)).map_err(|e| {
            HarvestError::Config {
                message: format!("Token does not form a valid authorization header: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("search_client")
                    .with_operation("create_client")
                    .with_suggestion("Check GITHUB_TOKEN for stray whitespace or control characters"),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| HarvestError::Config {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("search_client").with_operation("create_client"),
            })?;

        info!("Created search client for {}", config.api_url);

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            search_query: config.search_query.clone(),
            retry,
        })
    }

    /// One POST against the endpoint, classified by status code
    async fn request_page(
        client: reqwest::Client,
        api_url: String,
        body: serde_json::Value,
    ) -> HarvestResult<SearchPage> {
        let response = client
            .post(&api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| HarvestError::Network {
                message: format!("Search request failed: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("search_client")
                    .with_operation("request_page")
                    .with_suggestion("Check network connectivity to the API endpoint"),
            })?;

        let status = response.status();
        match status.as_u16() {
            401 => Err(HarvestError::Auth {
                message: "The search API rejected the token (401 Unauthorized)".to_string(),
                context: ErrorContext::new("search_client")
                    .with_operation("request_page")
                    .with_suggestion("Check that GITHUB_TOKEN is valid and not expired"),
            }),
            403 | 429 => {
                let wait_ms = rate_limit_wait_ms(
                    header_u64(response.headers(), "retry-after"),
                    header_u64(response.headers(), "x-ratelimit-reset"),
                    Utc::now().timestamp().max(0) as u64,
                );
                Err(HarvestError::RateLimited {
                    message: format!("Search API returned HTTP {}", status.as_u16()),
                    retry_after_ms: Some(wait_ms),
                    context: ErrorContext::new("search_client").with_operation("request_page"),
                })
            }
            404 => Err(not_found_error!("search endpoint", "search_client")),
            code if !status.is_success() => {
                let error_body = response.text().await.unwrap_or_default();
                Err(HarvestError::Network {
                    message: format!("Search API returned HTTP {}: {}", code, error_body),
                    source: None,
                    context: ErrorContext::new("search_client")
                        .with_operation("request_page")
                        .with_suggestion("Check the API status page for outages"),
                })
            }
            _ => {
                let text = response.text().await.map_err(|e| HarvestError::Network {
                    message: format!("Failed to read search response body: {}", e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("search_client").with_operation("request_page"),
                })?;
                parse_search_page(&text)
            }
        }
    }
}

#[async_trait]
impl RepositorySearch for SearchClient {
    async fn fetch_page(&self, cursor: Option<&str>, page_size: u32) -> HarvestResult<SearchPage> {
        let body = search_request_body(&self.search_query, page_size, cursor);
        debug!("Fetching search page (cursor: {:?})", cursor);

        loop {
            let attempt = {
                let client = self.client.clone();
                let api_url = self.api_url.clone();
                let request = body.clone();
                retry_async(
                    move || {
                        let client = client.clone();
                        let api_url = api_url.clone();
                        let request = request.clone();
                        async move { Self::request_page(client, api_url, request).await }.boxed()
                    },
                    self.retry.clone(),
                    "search_page",
                )
                .await
            };

            match attempt {
                Err(HarvestError::RateLimited {
                    message,
                    retry_after_ms,
                    ..
                }) => {
                    let wait_ms = retry_after_ms.unwrap_or(FALLBACK_RATE_LIMIT_WAIT_MS);
                    warn!(
                        "{}; sleeping {} ms before re-issuing the same page",
                        message, wait_ms
                    );
                    sleep(Duration::from_millis(wait_ms)).await;
                    // Loop around with the identical request body and cursor
                }
                Err(HarvestError::NotFound { .. }) => {
                    info!("Search returned no results; treating as end of data");
                    return Ok(SearchPage::empty());
                }
                other => return other,
            }
        }
    }
}

/// Build the POST body for one search page.
///
/// The search expression, page size and cursor travel as GraphQL variables,
/// so the document itself never changes between requests.
pub(crate) fn search_request_body(
    search_query: &str,
    page_size: u32,
    cursor: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "query": SEARCH_QUERY,
        "variables": {
            "searchQuery": search_query,
            "pageSize": page_size,
            "cursor": cursor,
        }
    })
}

/// Wait before re-issuing a rate-limited request.
///
/// `Retry-After` is authoritative when present; otherwise the advertised
/// reset timestamp plus a safety margin, floored at one second. Without
/// either the flat fallback applies.
pub(crate) fn rate_limit_wait_ms(
    retry_after_secs: Option<u64>,
    reset_epoch: Option<u64>,
    now_epoch: u64,
) -> u64 {
    if let Some(secs) = retry_after_secs {
        return secs.max(1) * 1000;
    }
    if let Some(reset) = reset_epoch {
        let wait_secs = reset.saturating_sub(now_epoch) + RATE_LIMIT_SAFETY_MARGIN_SECS;
        return wait_secs.max(1) * 1000;
    }
    FALLBACK_RATE_LIMIT_WAIT_MS
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

/// Decode one GraphQL response body into a page of records
pub(crate) fn parse_search_page(body: &str) -> HarvestResult<SearchPage> {
    let response: GraphQlResponse =
        serde_json::from_str(body).map_err(|e| HarvestError::Network {
            message: format!("Failed to parse search response: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("search_client").with_operation("parse_search_page"),
        })?;

    if let Some(errors) = &response.errors {
        if errors
            .iter()
            .any(|e| e.error_type.as_deref() == Some(GRAPHQL_RATE_LIMITED))
        {
            return Err(HarvestError::RateLimited {
                message: "Search API reported rate limiting in the response payload".to_string(),
                retry_after_ms: None,
                context: ErrorContext::new("search_client").with_operation("parse_search_page"),
            });
        }
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            // The endpoint reports transient degradation this way; treated
            // like a network fault so the backoff helper re-attempts it
            return Err(HarvestError::Network {
                message: format!("Search API returned errors: {}", joined),
                source: None,
                context: ErrorContext::new("search_client").with_operation("parse_search_page"),
            });
        }
    }

    let search = match response.data {
        Some(data) => data.search,
        None => {
            return Err(HarvestError::Network {
                message: "Search response carried neither data nor errors".to_string(),
                source: None,
                context: ErrorContext::new("search_client").with_operation("parse_search_page"),
            })
        }
    };

    let items = search
        .nodes
        .into_iter()
        .map(|node| RepositoryRecord {
            full_name: node.name_with_owner,
            stars: node.stargazers.total_count,
            created_at: node.created_at,
            pushed_at: node.pushed_at,
            primary_language: node.primary_language.map(|l| l.name),
            releases: Some(node.releases.total_count),
            merged_pull_requests: node.pull_requests.total_count,
            total_issues: node.issues.total_count,
            closed_issues: node.closed_issues.total_count,
        })
        .collect();

    Ok(SearchPage {
        items,
        next_cursor: search.page_info.end_cursor,
        has_more: search.page_info.has_next_page,
    })
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    search: SearchResults,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResults {
    page_info: PageInfo,
    nodes: Vec<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    name_with_owner: String,
    stargazers: CountField,
    created_at: chrono::DateTime<Utc>,
    pushed_at: chrono::DateTime<Utc>,
    primary_language: Option<NamedField>,
    releases: CountField,
    pull_requests: CountField,
    issues: CountField,
    closed_issues: CountField,
}

#[derive(Debug, Deserialize)]
struct CountField {
    #[serde(rename = "totalCount")]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    name: String,
}
