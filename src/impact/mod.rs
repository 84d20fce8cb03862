//! Impact Module
//!
//! Finds where tables and columns are referenced in source code. This
//! module provides:
//! - Pattern batteries for table and column targets
//! - The scanner (reference mode and unused-objects mode)
//! - Corpus sources: a local directory, GitHub, GitLab or a GitHub
//!   organization

pub mod corpus;
pub mod git;
pub mod patterns;
pub mod scanner;

pub use git::{OrgScanSummary, RepoFetcher};
pub use patterns::{PatternBattery, Target};
pub use scanner::{Corpus, ImpactResult, Scanner, UnusedReport};

use crate::error::AppError;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImpactError {
    #[error("Repository path does not exist: {0}")]
    PathNotFound(String),

    #[error("{0}")]
    InvalidRepoUrl(String),

    #[error("Invalid reference pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{0}")]
    Upstream(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<ImpactError> for AppError {
    fn from(err: ImpactError) -> Self {
        match err {
            ImpactError::PathNotFound(_) => AppError::NotFound(err.to_string()),
            ImpactError::InvalidRepoUrl(msg) => AppError::Validation(msg),
            ImpactError::Pattern(_) => AppError::Validation(err.to_string()),
            ImpactError::Upstream(msg) => AppError::Upstream(msg),
            ImpactError::Http(e) => AppError::Upstream(e.to_string()),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

/// Where the corpus comes from
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CorpusSource {
    Local {
        path: PathBuf,
    },
    Github {
        url: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
    Gitlab {
        url: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
    /// Each repository is read at its own default branch; `branch` is used
    /// only when the listing has none
    GithubOrg {
        org: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
}

impl CorpusSource {
    pub fn describe(&self) -> String {
        match self {
            CorpusSource::Local { path } => format!("local:{}", path.display()),
            CorpusSource::Github { url, branch } => format!("github:{}@{}", url, branch),
            CorpusSource::Gitlab { url, branch } => format!("gitlab:{}@{}", url, branch),
            CorpusSource::GithubOrg { org, .. } => format!("github-org:{}", org),
        }
    }
}

/// Load the corpus for `source`, filtered to `extensions`
pub async fn load_corpus(
    source: &CorpusSource,
    extensions: &[String],
    fetcher: &RepoFetcher,
) -> Result<(Corpus, Option<OrgScanSummary>), ImpactError> {
    let (mut corpus, summary) = match source {
        CorpusSource::Local { path } => {
            let path = path.clone();
            let exts = extensions.to_vec();
            let corpus = tokio::task::spawn_blocking(move || corpus::load_local(&path, &exts))
                .await
                .map_err(|e| ImpactError::Upstream(format!("Local scan aborted: {}", e)))??;
            (corpus, None)
        }
        CorpusSource::Github { url, branch } => (fetcher.github_repo(url, branch, extensions).await?, None),
        CorpusSource::Gitlab { url, branch } => (fetcher.gitlab_repo(url, branch, extensions).await?, None),
        CorpusSource::GithubOrg { org, branch } => {
            let (corpus, summary) = fetcher.github_org(org, branch, extensions).await?;
            (corpus, Some(summary))
        }
    };
    corpus.retain_extensions(extensions);
    Ok((corpus, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScannerConfig;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_source_deserialization() {
        let source: CorpusSource =
            serde_json::from_str(r#"{"github":{"url":"https://github.com/a/b"}}"#).unwrap();
        assert!(matches!(source, CorpusSource::Github { ref branch, .. } if branch == "main"));

        let source: CorpusSource = serde_json::from_str(r#"{"githubOrg":{"org":"acme"}}"#).unwrap();
        assert_eq!(source.describe(), "github-org:acme");
    }

    #[tokio::test]
    async fn test_local_source_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("OrderDao.java"), "String q = \"SELECT * FROM orders\";\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "orders").unwrap();

        let fetcher = RepoFetcher::new(reqwest::Client::new(), &ScannerConfig::default(), None);
        let source = CorpusSource::Local { path: dir.path().to_path_buf() };
        let (corpus, summary) = load_corpus(&source, &[".java".to_string()], &fetcher).await.unwrap();
        assert!(summary.is_none());
        assert_eq!(corpus.len(), 1);

        let battery = PatternBattery::for_table("orders").unwrap();
        let result = Scanner::scan(&corpus, &battery, "orders");
        assert_eq!(result.files[0].path, "OrderDao.java");
        assert_eq!(result.total_references, 2);
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = ImpactError::InvalidRepoUrl("bad".into()).into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err: AppError = ImpactError::PathNotFound("/x".into()).into();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
