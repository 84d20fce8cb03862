//! Environment Connection Manager
//!
//! Holds one live session per configured environment: the tunnel process,
//! a MySQL pool pointed at the forwarded port, and the schemas visible to
//! the login. Connections are verified with a bounded retry, and a lost
//! connection is re-established transparently once before the session is
//! dropped.

use crate::config::{DatabaseConfig, EnvironmentConfig, RetryConfig, Settings};
use crate::error::AppError;
use crate::metadata::{queries, MySqlIntrospector};
use crate::snapshot::NameDiff;
use crate::tunnel::{AwsCredentials, TunnelHandle, TunnelLauncher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Fixed-delay retry for transient connection loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or `max_retries` extra attempts are spent
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what,
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A connected environment
#[derive(Debug)]
struct Session {
    environment: String,
    config: EnvironmentConfig,
    pool: MySqlPool,
    tunnel: Option<TunnelHandle>,
    /// Kept so the session can be re-established without the caller
    credentials: Option<AwsCredentials>,
    host: String,
    port: u16,
    schemas: Vec<String>,
    connected_at: DateTime<Utc>,
}

impl Session {
    /// False once a tunnel's forwarding process has exited
    fn tunnel_alive(&mut self) -> bool {
        self.tunnel.as_mut().map_or(true, TunnelHandle::is_running)
    }

    async fn close(self) {
        self.pool.close().await;
        if let Some(tunnel) = self.tunnel {
            tunnel.close().await;
        }
    }
}

/// Public connection info (safe to expose to the frontend)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub target: String,
    pub region: String,
    pub tunneled: bool,
    pub tunnel_pid: Option<u32>,
    pub schemas: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

impl From<&Session> for ConnectionInfo {
    fn from(session: &Session) -> Self {
        Self {
            environment: session.environment.clone(),
            host: session.host.clone(),
            port: session.port,
            target: session.config.target.clone(),
            region: session.config.region.clone(),
            tunneled: session.tunnel.is_some(),
            tunnel_pid: session.tunnel.as_ref().and_then(TunnelHandle::pid),
            schemas: session.schemas.clone(),
            connected_at: session.connected_at,
        }
    }
}

/// Connection Manager - one session per environment
pub struct ConnectionManager {
    sessions: RwLock<HashMap<String, Session>>,
    environments: BTreeMap<String, EnvironmentConfig>,
    database: DatabaseConfig,
    retry: RetryPolicy,
    launcher: TunnelLauncher,
}

impl ConnectionManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            environments: settings.environments.clone(),
            database: settings.database.clone(),
            retry: RetryPolicy::from(&settings.retry),
            launcher: TunnelLauncher::new(settings.tunnel.clone()),
        }
    }

    /// Configured environment names
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    /// Canonical name and config for an environment (case-insensitive)
    pub fn resolve_environment(&self, name: &str) -> Result<(String, EnvironmentConfig), AppError> {
        self.environments
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, env)| (key.clone(), env.clone()))
            .ok_or_else(|| AppError::NotFound(format!("Unknown environment '{}'", name)))
    }

    fn build_pool(&self, host: &str, port: u16) -> MySqlPool {
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&self.database.username)
            .password(&self.database.password);

        MySqlPoolOptions::new()
            .max_connections(self.database.max_connections)
            .acquire_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .connect_lazy_with(options)
    }

    /// Open the tunnel (when enabled), build and verify the pool, list schemas
    async fn establish(
        &self,
        name: &str,
        config: &EnvironmentConfig,
        credentials: Option<AwsCredentials>,
    ) -> Result<Session, AppError> {
        let (tunnel, host, port) = if self.launcher.enabled() {
            let creds = match credentials.clone() {
                Some(creds) => creds,
                None => AwsCredentials::from_env()?,
            };
            let handle = self.launcher.open(config, &creds).await?;
            let port = handle.local_port;
            (Some(handle), self.database.local_host.clone(), port)
        } else {
            debug!("Tunnel disabled, connecting to {} directly", config.host);
            (None, config.host.clone(), config.remote_port)
        };

        let pool = self.build_pool(&host, port);
        self.retry
            .run("Connection check", || async {
                sqlx::query(queries::PING).execute(&pool).await.map(|_| ())
            })
            .await?;

        let schemas = MySqlIntrospector::list_schemas(&pool).await?;

        Ok(Session {
            environment: name.to_string(),
            config: config.clone(),
            pool,
            tunnel,
            credentials,
            host,
            port,
            schemas,
            connected_at: Utc::now(),
        })
    }

    /// Connect an environment, replacing any existing session for it
    pub async fn connect(
        &self,
        environment: &str,
        credentials: Option<AwsCredentials>,
    ) -> Result<ConnectionInfo, AppError> {
        let (name, config) = self.resolve_environment(environment)?;

        // The old tunnel holds the local port; release it first
        let previous = self.sessions.write().await.remove(&name);
        if let Some(old) = previous {
            old.close().await;
        }

        let session = self.establish(&name, &config, credentials).await?;
        let info = ConnectionInfo::from(&session);
        self.sessions.write().await.insert(name.clone(), session);

        info!(
            "Connected to {} on {}:{} ({} schemas)",
            name,
            info.host,
            info.port,
            info.schemas.len()
        );
        Ok(info)
    }

    /// Pool for a connected environment, without a liveness check
    pub async fn pool(&self, environment: &str) -> Result<MySqlPool, AppError> {
        let (name, _) = self.resolve_environment(environment)?;
        self.sessions
            .read()
            .await
            .get(&name)
            .map(|s| s.pool.clone())
            .ok_or_else(|| AppError::NotConnected(format!("Environment '{}' is not connected", name)))
    }

    /// Pool for a connected environment after a tunnel check and a ping. A
    /// dead connection is re-established once (tunnel and retry included);
    /// if that fails the session is dropped and the error surfaces.
    pub async fn ensure_connected(&self, environment: &str) -> Result<MySqlPool, AppError> {
        let (name, config) = self.resolve_environment(environment)?;
        let (pool, tunnel_alive) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&name)
                .ok_or_else(|| AppError::NotConnected(format!("Environment '{}' is not connected", name)))?;
            (session.pool.clone(), session.tunnel_alive())
        };

        if tunnel_alive {
            if sqlx::query(queries::PING).execute(&pool).await.is_ok() {
                return Ok(pool);
            }
            warn!("Connection to {} lost, attempting reconnect", name);
        } else {
            warn!("Tunnel for {} exited, attempting reconnect", name);
        }

        let Some(old) = self.sessions.write().await.remove(&name) else {
            return Err(AppError::NotConnected(format!("Environment '{}' is not connected", name)));
        };
        let credentials = old.credentials.clone();
        old.close().await;

        match self.establish(&name, &config, credentials).await {
            Ok(session) => {
                let pool = session.pool.clone();
                self.sessions.write().await.insert(name.clone(), session);
                info!("Connection to {} restored", name);
                Ok(pool)
            }
            Err(e) => {
                warn!("Reconnect to {} failed, session cleared: {}", name, e);
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self, environment: &str) -> Result<(), AppError> {
        let (name, _) = self.resolve_environment(environment)?;
        let session = self
            .sessions
            .write()
            .await
            .remove(&name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}' is not connected", name)))?;
        session.close().await;
        info!("Disconnected from {}", name);
        Ok(())
    }

    pub async fn disconnect_all(&self) {
        let sessions: Vec<Session> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
        info!("Disconnected from all environments");
    }

    /// Connected environments, sorted by name
    pub async fn list(&self) -> Vec<ConnectionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<ConnectionInfo> = sessions.values().map(ConnectionInfo::from).collect();
        infos.sort_by(|a, b| a.environment.cmp(&b.environment));
        infos
    }

    /// Schemas listed when the environment connected
    pub async fn schemas(&self, environment: &str) -> Result<Vec<String>, AppError> {
        let (name, _) = self.resolve_environment(environment)?;
        self.sessions
            .read()
            .await
            .get(&name)
            .map(|s| s.schemas.clone())
            .ok_or_else(|| AppError::NotConnected(format!("Environment '{}' is not connected", name)))
    }

    /// Schema names only in one of two connected environments
    pub async fn schema_diff(&self, left: &str, right: &str) -> Result<NameDiff, AppError> {
        let a = self.schemas(left).await?;
        let b = self.schemas(right).await?;
        Ok(NameDiff::between(&a, &b))
    }
}
