use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use super::convert::to_descriptor;
use super::types::{GitHubErrorBody, GitHubRepo, GitHubUser};
use crate::credentials::TokenProvider;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::remote::{
    EntityType, InventoryBatch, InventoryClient, InventoryRequest, QuotaRateLimiter,
    RateLimitInfo, RemoteError,
};
use crate::retry::{RetryConfig, retry_transient};
use crate::sync::{ProgressCallback, SyncProgress, emit};

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size for repository listings (GitHub's maximum).
pub const PER_PAGE: usize = 100;

/// How many times a rate-limited request waits for a reset before giving up.
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 3;

/// Fallback wait when a rate-limit response carries no reset information.
const DEFAULT_RATE_LIMIT_BACKOFF_SECS: i64 = 60;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("gitbatch/", env!("CARGO_PKG_VERSION"));

/// Inventory client for the GitHub REST API.
///
/// All collaborators are injected: the HTTP transport, the token provider,
/// and the quota limiter (which owns the clock). Pages are fetched strictly
/// sequentially.
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenProvider>,
    limiter: Arc<QuotaRateLimiter>,
    api_base: String,
    workspace_root: PathBuf,
    retry: RetryConfig,
    max_rate_limit_waits: u32,
}

impl GitHubClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenProvider>,
        limiter: Arc<QuotaRateLimiter>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            tokens,
            limiter,
            api_base: DEFAULT_API_URL.to_string(),
            workspace_root: workspace_root.into(),
            retry: RetryConfig::default(),
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
        }
    }

    /// Point at a GitHub Enterprise instance (`https://host/api/v3`).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_max_rate_limit_waits(mut self, waits: u32) -> Self {
        self.max_rate_limit_waits = waits;
        self
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Build an API URL from path segments (percent-encoded) and query pairs.
    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| RemoteError::parse(format!("invalid API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::parse("API base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// One request, no retries. Updates the quota from the response headers.
    async fn send_once(&self, url: &Url) -> Result<HttpResponse, RemoteError> {
        let mut request = HttpRequest::get(url.as_str())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT);
        if let Some(token) = self.tokens.token()? {
            request = request.header("Authorization", format!("Bearer {}", token.expose()));
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RemoteError::transient(e.to_string()))?;

        let rate = parse_rate_limit_headers(&response);
        if let Some(info) = rate {
            self.limiter.update(info);
        }

        classify_response(response, rate, self.limiter.now(), url.path())
    }

    /// GET with quota waits, transient retries and rate-limit retries.
    async fn get(
        &self,
        url: &Url,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<HttpResponse, RemoteError> {
        let mut waits = 0;
        loop {
            self.limiter.wait(on_progress).await?;

            let result =
                retry_transient(&self.retry, url.path(), on_progress, || self.send_once(url)).await;

            match result {
                Err(RemoteError::RateLimited { reset_at }) if waits < self.max_rate_limit_waits => {
                    waits += 1;
                    tracing::debug!(
                        path = url.path(),
                        reset_at = %reset_at,
                        attempt = waits,
                        "Rate limited, waiting for reset before retrying"
                    );
                    self.limiter.mark_exhausted(reset_at);
                }
                other => return other,
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<T, RemoteError> {
        let response = self.get(url, on_progress).await?;
        response
            .json()
            .map_err(|e| RemoteError::parse(format!("{}: {e}", url.path())))
    }

    /// Login of the authenticated user, or `None` without a token.
    async fn authenticated_login(
        &self,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Option<String>, RemoteError> {
        if self.tokens.token()?.is_none() {
            return Ok(None);
        }
        let url = self.endpoint(&["user"], &[])?;
        let user: GitHubUser = self.get_json(&url, on_progress).await?;
        Ok(Some(user.login))
    }

    /// Listing path segments and query for the request, without paging.
    async fn listing(
        &self,
        request: &InventoryRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(Vec<String>, Vec<(&'static str, String)>), RemoteError> {
        let name = request.entity_name.clone();
        let visibility = request.visibility.as_str().to_string();
        match request.entity_type {
            EntityType::Org => Ok((
                vec!["orgs".into(), name, "repos".into()],
                vec![("type", visibility)],
            )),
            EntityType::User => {
                let login = self.authenticated_login(on_progress).await?;
                if login.is_some_and(|l| l.eq_ignore_ascii_case(&name)) {
                    Ok((
                        vec!["user".into(), "repos".into()],
                        vec![("affiliation", "owner".to_string()), ("visibility", visibility)],
                    ))
                } else {
                    Ok((
                        vec!["users".into(), name, "repos".into()],
                        vec![("type", "owner".to_string())],
                    ))
                }
            }
        }
    }

    async fn fetch_all_pages(
        &self,
        request: &InventoryRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<GitHubRepo>, RemoteError> {
        let (segments, base_query) = self.listing(request, on_progress).await?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        let mut all = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut query = base_query.clone();
            query.push(("per_page", PER_PAGE.to_string()));
            query.push(("page", page.to_string()));
            let url = self.endpoint(&segments, &query)?;

            let repos: Vec<GitHubRepo> = self.get_json(&url, on_progress).await?;
            if repos.is_empty() {
                break;
            }

            let count = repos.len();
            all.extend(repos);
            tracing::debug!(entity = %request.entity_name, page, count, "Fetched page");
            emit(
                on_progress,
                SyncProgress::FetchedPage {
                    entity: request.entity_name.clone(),
                    page,
                    count,
                    total_so_far: all.len(),
                },
            );
            page += 1;
        }
        Ok(all)
    }
}

#[async_trait]
impl InventoryClient for GitHubClient {
    async fn fetch_inventory(
        &self,
        request: &InventoryRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<InventoryBatch, RemoteError> {
        emit(
            on_progress,
            SyncProgress::FetchingRepos {
                entity: request.entity_name.clone(),
            },
        );

        let repos = self.fetch_all_pages(request, on_progress).await?;
        let descriptors = repos
            .into_iter()
            .filter(|r| request.visibility.admits(r.private))
            .map(|r| to_descriptor(r, &self.workspace_root, &request.entity_name))
            .collect();

        let batch = InventoryBatch::new(
            request.entity_type,
            request.entity_name.clone(),
            self.limiter.now(),
            descriptors,
        );

        tracing::info!(
            entity = %request.entity_name,
            entity_type = %request.entity_type,
            total = batch.total_count(),
            "Inventory fetched"
        );
        emit(
            on_progress,
            SyncProgress::FetchComplete {
                entity: request.entity_name.clone(),
                total: batch.total_count(),
            },
        );
        Ok(batch)
    }
}

/// Read `x-ratelimit-*` headers. All three must be present.
pub fn parse_rate_limit_headers(response: &HttpResponse) -> Option<RateLimitInfo> {
    let limit = response.header("x-ratelimit-limit")?.trim().parse::<usize>().ok()?;
    let remaining = response
        .header("x-ratelimit-remaining")?
        .trim()
        .parse::<usize>()
        .ok()?;
    let reset_epoch = response.header("x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset_epoch, 0)?;
    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

fn error_message(response: &HttpResponse) -> String {
    match response.json::<GitHubErrorBody>() {
        Ok(body) => body.message,
        Err(_) => response.text().chars().take(200).collect(),
    }
}

fn rate_limit_reset(
    response: &HttpResponse,
    rate: Option<RateLimitInfo>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(info) = rate {
        return info.reset_at;
    }
    let secs = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF_SECS);
    now + chrono::Duration::seconds(secs)
}

/// Map an HTTP response onto success or the remote error taxonomy.
fn classify_response(
    response: HttpResponse,
    rate: Option<RateLimitInfo>,
    now: DateTime<Utc>,
    resource: &str,
) -> Result<HttpResponse, RemoteError> {
    match response.status {
        200..=299 => Ok(response),
        401 => Err(RemoteError::auth(error_message(&response))),
        403 => {
            let message = error_message(&response);
            let exhausted = rate.is_some_and(|r| r.remaining == 0)
                || message.to_ascii_lowercase().contains("rate limit");
            if exhausted {
                Err(RemoteError::RateLimited {
                    reset_at: rate_limit_reset(&response, rate, now),
                })
            } else {
                Err(RemoteError::auth(message))
            }
        }
        429 => Err(RemoteError::RateLimited {
            reset_at: rate_limit_reset(&response, rate, now),
        }),
        404 => Err(RemoteError::not_found(resource)),
        500..=599 => Err(RemoteError::transient(format!(
            "HTTP {}: {}",
            response.status,
            error_message(&response)
        ))),
        status => Err(RemoteError::Rejected {
            status,
            message: error_message(&response),
        }),
    }
}
