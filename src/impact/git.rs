//! Remote repository sources
//!
//! Builds a corpus from GitHub or GitLab through their REST APIs, or from
//! every recently active repository of a GitHub organization. Remote
//! loading is best-effort: a file or repository that fails to fetch is
//! skipped and only reduces coverage.

use super::scanner::{has_extension, Corpus, SourceFile};
use super::ImpactError;
use crate::config::ScannerConfig;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

const AGENT: &str = concat!("schemalens-api/", env!("CARGO_PKG_VERSION"));

/// Path fragments that mark a file as worth fetching in organization scans
pub const KEY_DIRS: &[&str] = &["src/", "main/", "service/", "controller/", "repository/", "dao/", "model/"];

static GITHUB_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"github\.com[/:]([^/]+)/([^/.]+)").expect("valid github url regex"));
static GITLAB_URL_GIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"gitlab\.com[/:](.+)\.git$").expect("valid gitlab url regex"));
static GITLAB_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"gitlab\.com[/:](.+)$").expect("valid gitlab url regex"));

/// (owner, repo) from an https or ssh GitHub URL
pub fn parse_github_url(url: &str) -> Result<(String, String), ImpactError> {
    GITHUB_URL
        .captures(url)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .ok_or_else(|| ImpactError::InvalidRepoUrl(format!("Invalid GitHub URL format: {}", url)))
}

/// Full project path from a GitLab URL, `.git` suffix removed
pub fn parse_gitlab_url(url: &str) -> Result<String, ImpactError> {
    GITLAB_URL_GIT
        .captures(url)
        .or_else(|| GITLAB_URL.captures(url))
        .map(|c| c[1].trim_end_matches('/').to_string())
        .ok_or_else(|| ImpactError::InvalidRepoUrl(format!("Invalid GitLab URL format: {}", url)))
}

/// Percent-encode a path as a single URL segment (`/` included)
pub fn encode_project_path(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// `base` extended with percent-encoded path segments and query pairs
pub fn api_url<'a, I>(base: &str, segments: I, query: &[(&str, &str)]) -> Result<Url, ImpactError>
where
    I: IntoIterator<Item = &'a str>,
{
    let invalid = || ImpactError::Upstream(format!("Invalid API base URL: {}", base));
    let mut url = Url::parse(base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

/// Cut `text` to at most `max` bytes on a char boundary
pub fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Organization fast-scan selection: allowed extension, and either under a
/// key directory or at most two path segments deep
pub fn is_key_file(path: &str, extensions: &[String]) -> bool {
    has_extension(path, extensions)
        && (KEY_DIRS.iter().any(|d| path.contains(d)) || path.split('/').count() <= 2)
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct GithubTree {
    #[serde(default)]
    tree: Vec<TreeItem>,
}

#[derive(Debug, Deserialize)]
struct GithubContent {
    content: String,
}

/// Repository entry of the organization listing
#[derive(Debug, Clone, Deserialize)]
pub struct OrgRepo {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// Repositories updated within `window_days` and not archived, in listing
/// order, at most `cap`
pub fn select_active(repos: Vec<OrgRepo>, now: DateTime<Utc>, window_days: i64, cap: usize) -> Vec<OrgRepo> {
    let cutoff = now - ChronoDuration::days(window_days);
    repos
        .into_iter()
        .filter(|r| r.updated_at > cutoff && !r.archived)
        .take(cap)
        .collect()
}

fn blob_paths(items: Vec<TreeItem>) -> Vec<String> {
    items
        .into_iter()
        .filter(|i| i.kind == "blob")
        .map(|i| i.path)
        .collect()
}

/// Outcome of an organization scan
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgScanSummary {
    pub active_repos: usize,
    pub completed_repos: usize,
    /// The time budget ran out before every repository finished
    pub timed_out: bool,
}

/// API client for the supported Git providers
#[derive(Clone)]
pub struct RepoFetcher {
    client: Client,
    config: ScannerConfig,
    token: Option<String>,
}

impl RepoFetcher {
    /// `token` overrides the configured one when present
    pub fn new(client: Client, config: &ScannerConfig, token: Option<String>) -> Self {
        let token = token
            .filter(|t| !t.is_empty())
            .or_else(|| config.git_token.clone());
        Self {
            client,
            config: config.clone(),
            token,
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, AGENT)
            .timeout(Duration::from_secs(self.config.request_timeout_secs));
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("token {}", token)),
            None => request,
        }
    }

    async fn github_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>, ImpactError> {
        let url = api_url(
            &self.config.github_api,
            ["repos", owner, repo, "git", "trees", branch],
            &[("recursive", "1")],
        )?;
        let response = self.get(url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(ImpactError::Upstream(format!(
                "GitHub API error: {}",
                response.status().as_u16()
            )));
        }
        let tree: GithubTree = response.json().await?;
        Ok(blob_paths(tree.tree))
    }

    async fn github_file(&self, owner: &str, repo: &str, path: &str, branch: &str) -> Option<String> {
        let segments = ["repos", owner, repo, "contents"].into_iter().chain(path.split('/'));
        let url = match api_url(&self.config.github_api, segments, &[("ref", branch)]) {
            Ok(url) => url,
            Err(e) => {
                debug!("Skipping {}: {}", path, e);
                return None;
            }
        };
        let response = match self.get(url.as_str()).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Skipping {}: HTTP {}", path, r.status().as_u16());
                return None;
            }
            Err(e) => {
                debug!("Skipping {}: {}", path, e);
                return None;
            }
        };
        let body: GithubContent = response.json().await.ok()?;
        let encoded: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn gitlab_tree(&self, project_id: &str, branch: &str) -> Result<Vec<String>, ImpactError> {
        let mut paths = Vec::new();
        let mut page = String::from("1");
        loop {
            let url = format!(
                "{}/projects/{}/repository/tree?recursive=true&ref={}&per_page=100&page={}",
                self.config.gitlab_api,
                project_id,
                encode_project_path(branch),
                page
            );
            let response = self.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(ImpactError::Upstream(format!(
                    "GitLab API error: {}",
                    response.status().as_u16()
                )));
            }
            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let items: Vec<TreeItem> = response.json().await?;
            paths.extend(blob_paths(items));

            match next {
                Some(n) => page = n,
                None => break,
            }
        }
        Ok(paths)
    }

    async fn gitlab_file(&self, project_id: &str, path: &str, branch: &str) -> Option<String> {
        let url = format!(
            "{}/projects/{}/repository/files/{}/raw?ref={}",
            self.config.gitlab_api,
            project_id,
            encode_project_path(path),
            encode_project_path(branch)
        );
        match self.get(&url).send().await {
            Ok(r) if r.status().is_success() => r.text().await.ok(),
            Ok(r) => {
                debug!("Skipping {}: HTTP {}", path, r.status().as_u16());
                None
            }
            Err(e) => {
                debug!("Skipping {}: {}", path, e);
                None
            }
        }
    }

    /// Single GitHub repository
    pub async fn github_repo(&self, url: &str, branch: &str, extensions: &[String]) -> Result<Corpus, ImpactError> {
        let (owner, repo) = parse_github_url(url)?;
        let paths = self.github_tree(&owner, &repo, branch).await?;

        let mut files = Vec::new();
        for path in paths
            .iter()
            .filter(|p| has_extension(p, extensions))
            .take(self.config.repo_file_cap)
        {
            if let Some(content) = self.github_file(&owner, &repo, path, branch).await {
                let content = truncate_bytes(&content, self.config.repo_byte_cap);
                files.push(SourceFile::new(path.clone(), content));
            }
        }

        info!("Fetched {} files from github {}/{}@{}", files.len(), owner, repo, branch);
        Ok(Corpus::new(files))
    }

    /// Single GitLab project
    pub async fn gitlab_repo(&self, url: &str, branch: &str, extensions: &[String]) -> Result<Corpus, ImpactError> {
        let project_id = encode_project_path(&parse_gitlab_url(url)?);
        let paths = self.gitlab_tree(&project_id, branch).await?;

        let mut files = Vec::new();
        for path in paths
            .iter()
            .filter(|p| has_extension(p, extensions))
            .take(self.config.repo_file_cap)
        {
            if let Some(content) = self.gitlab_file(&project_id, path, branch).await {
                let content = truncate_bytes(&content, self.config.repo_byte_cap);
                files.push(SourceFile::new(path.clone(), content));
            }
        }

        info!("Fetched {} files from gitlab {}@{}", files.len(), project_id, branch);
        Ok(Corpus::new(files))
    }

    /// Active repositories of a GitHub organization
    pub async fn active_repos(&self, org: &str) -> Result<Vec<OrgRepo>, ImpactError> {
        let url = api_url(
            &self.config.github_api,
            ["orgs", org, "repos"],
            &[("sort", "updated"), ("per_page", "50")],
        )?;
        let response = self.get(url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(ImpactError::Upstream(format!(
                "GitHub API error: {}",
                response.status().as_u16()
            )));
        }
        let repos: Vec<OrgRepo> = response.json().await?;
        Ok(select_active(
            repos,
            Utc::now(),
            self.config.active_window_days,
            self.config.active_repo_cap,
        ))
    }

    /// Reduced scan of one organization repository, paths prefixed `repo/`
    async fn fast_repo(&self, org: &str, repo: &str, branch: &str, extensions: &[String]) -> Vec<SourceFile> {
        let paths = match self.github_tree(org, repo, branch).await {
            Ok(paths) => paths,
            Err(e) => {
                debug!("Skipping repository {}: {}", repo, e);
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        for path in paths
            .iter()
            .filter(|p| is_key_file(p, extensions))
            .take(self.config.org_file_cap)
        {
            if let Some(content) = self.github_file(org, repo, path, branch).await {
                let content = truncate_bytes(&content, self.config.org_byte_cap);
                files.push(SourceFile::new(format!("{}/{}", repo, path), content));
            }
        }
        files
    }

    /// Fan out over the active repositories with bounded concurrency.
    /// Repositories still running when the budget expires are aborted and
    /// contribute nothing.
    pub async fn github_org(
        &self,
        org: &str,
        fallback_branch: &str,
        extensions: &[String],
    ) -> Result<(Corpus, OrgScanSummary), ImpactError> {
        let repos = self.active_repos(org).await?;
        let mut summary = OrgScanSummary {
            active_repos: repos.len(),
            ..Default::default()
        };

        let permits = Arc::new(Semaphore::new(self.config.org_workers));
        let mut tasks = JoinSet::new();
        for repo in repos {
            let fetcher = self.clone();
            let permits = permits.clone();
            let org = org.to_string();
            let extensions = extensions.to_vec();
            let branch = repo
                .default_branch
                .clone()
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| fallback_branch.to_string());
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                Some(fetcher.fast_repo(&org, &repo.name, &branch, &extensions).await)
            });
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.org_budget_secs);
        let mut corpus = Corpus::default();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(Some(files)))) => {
                    summary.completed_repos += 1;
                    corpus.extend(Corpus::new(files));
                }
                Ok(Some(Ok(None))) => {}
                Ok(Some(Err(e))) => warn!("Repository scan task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    summary.timed_out = true;
                    warn!(
                        "Organization scan of {} hit its {}s budget; abandoning {} repositories",
                        org,
                        self.config.org_budget_secs,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        info!(
            "Organization {}: {} of {} repositories scanned, {} files",
            org,
            summary.completed_repos,
            summary.active_repos,
            corpus.len()
        );
        Ok((corpus, summary))
    }
}
