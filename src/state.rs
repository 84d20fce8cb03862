//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::erd::{EnumTablePolicy, ExclusionRecord, ACTIVITY_EXTRA_KEYWORDS};
use crate::error::AppError;
use crate::impact::RepoFetcher;
use crate::metadata::MySqlIntrospector;
use crate::snapshot::{CacheKey, MetadataCache, SchemaSnapshot};
use crate::tunnel::AwsCredentials;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,

    /// One session (pool plus optional tunnel) per environment
    pub connections: ConnectionManager,

    /// Schema snapshots keyed by (environment, schema)
    pub cache: MetadataCache,

    /// Credentials posted through the API; used when a connect request
    /// carries none of its own
    pub credentials: RwLock<Option<AwsCredentials>>,

    /// Exclusion lists of the last generation per schema selection
    pub exclusions: RwLock<HashMap<String, Vec<ExclusionRecord>>>,

    /// Shared client for Git provider APIs
    pub http: reqwest::Client,

    /// Lookup-table keywords of the ERD filter
    pub enum_policy: EnumTablePolicy,

    /// ERD keywords plus the extras used for the active/unused split
    pub activity_policy: EnumTablePolicy,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("schemalens-api/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.scanner.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            connections: ConnectionManager::new(&settings),
            cache: MetadataCache::new(),
            credentials: RwLock::new(None),
            exclusions: RwLock::new(HashMap::new()),
            http,
            enum_policy: EnumTablePolicy::new(&settings.erd.enum_keywords),
            activity_policy: EnumTablePolicy::new(&settings.erd.enum_keywords).extended(ACTIVITY_EXTRA_KEYWORDS),
            settings,
        })
    }

    /// Cached snapshot for (environment, schema), loaded on a miss. The
    /// environment must be connected; a snapshot that fails to load is
    /// cached empty.
    pub async fn snapshot(&self, environment: &str, schema: &str) -> Result<Arc<SchemaSnapshot>, AppError> {
        let (name, _) = self.connections.resolve_environment(environment)?;
        let key = CacheKey::new(&name, schema);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let pool = self.connections.ensure_connected(&name).await?;
        self.cache
            .get_or_load(&key, || async move {
                Ok::<_, AppError>(MySqlIntrospector::load_schema_snapshot(&pool, schema).await)
            })
            .await
    }

    /// Drop the cached snapshot and load it again
    pub async fn reload_snapshot(&self, environment: &str, schema: &str) -> Result<Arc<SchemaSnapshot>, AppError> {
        let (name, _) = self.connections.resolve_environment(environment)?;
        self.cache.invalidate(&CacheKey::new(&name, schema)).await;
        self.snapshot(&name, schema).await
    }

    /// Fetcher for one impact request; a request token beats the configured one
    pub fn repo_fetcher(&self, token: Option<String>) -> RepoFetcher {
        RepoFetcher::new(self.http.clone(), &self.settings.scanner, token)
    }

    /// Credentials for a connect request: explicit, then stored
    pub async fn resolve_credentials(&self, explicit: Option<AwsCredentials>) -> Option<AwsCredentials> {
        match explicit {
            Some(creds) => Some(creds),
            None => self.credentials.read().await.clone(),
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let settings = Settings::from_toml(
            r#"
[environments.QA]
target = "i-0abc"
host = "qa.db.internal"
region = "us-east-1"
local_port = 3307
remote_port = 3306
"#,
        )
        .unwrap();
        AppState::new(settings).unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_requires_connection() {
        let state = state();
        let err = state.snapshot("qa", "app").await.unwrap_err();
        assert_eq!(err.code(), "NOT_CONNECTED");

        let err = state.snapshot("PROD", "app").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cached_snapshot_served_without_connection() {
        let state = state();
        let (name, _) = state.connections.resolve_environment("qa").unwrap();
        state
            .cache
            .insert(CacheKey::new(name, "app"), SchemaSnapshot::empty("app"))
            .await;
        let snap = state.snapshot("qa", "app").await.unwrap();
        assert_eq!(snap.schema, "app");
        assert!(state.snapshot("QA", "app").await.is_ok());
    }

    #[tokio::test]
    async fn test_stored_credentials_are_fallback() {
        let state = state();
        assert!(state.resolve_credentials(None).await.is_none());

        let stored = AwsCredentials {
            access_key_id: "AKIA".into(),
            secret_access_key: "secret".into(),
            session_token: "token".into(),
        };
        *state.credentials.write().await = Some(stored.clone());
        assert_eq!(
            state.resolve_credentials(None).await.map(|c| c.access_key_id),
            Some("AKIA".to_string())
        );
    }
}
