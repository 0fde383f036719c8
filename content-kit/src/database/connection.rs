use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use scylla::transport::session::PoolSize;
use scylla::{Session, SessionBuilder};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::query_builder::QueryBuilder;
use super::retry::RetryPolicy;
use crate::config::{DatabaseConfig, RetrySettings};
use crate::errors::StoreError;
use crate::metrics;
use crate::retry::{Retrier, TracingObserver};

/// Cluster connectivity for one keyspace.
///
/// The driver session (a shared connection pool) is established lazily on
/// first use, through the retry executor. Each operation then holds a lease
/// on it for its own duration via [`ClusterAccessor::with_session`].
pub struct ClusterAccessor {
    config: DatabaseConfig,
    retrier: Retrier,
    statement_policy: RetryPolicy,
    session: OnceCell<Arc<Session>>,
}

impl ClusterAccessor {
    pub fn new(config: &DatabaseConfig, retry: RetrySettings) -> Result<Self, StoreError> {
        config.validate()?;

        Ok(Self {
            config: config.clone(),
            retrier: Retrier::new(retry).with_observer(Arc::new(TracingObserver)),
            statement_policy: RetryPolicy::from_settings(&retry),
            session: OnceCell::new(),
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }

    pub fn statement_policy(&self) -> &RetryPolicy {
        &self.statement_policy
    }

    /// Establishes the shared session now instead of on first use.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        self.session(cancel).await.map(|_| ())
    }

    async fn session(&self, cancel: &CancellationToken) -> Result<Arc<Session>, StoreError> {
        self.session
            .get_or_try_init(|| async {
                info!("Connecting to cluster: {:?}", self.config.hosts);
                let session = self
                    .retrier
                    .execute_and_return(cancel, || self.build_session())
                    .await?;
                info!("Connected to cluster for keyspace: {}", self.config.keyspace);
                Ok::<_, StoreError>(Arc::new(session))
            })
            .await
            .cloned()
    }

    async fn build_session(&self) -> Result<Session, StoreError> {
        let pool_size = NonZeroUsize::new(self.config.pool_size as usize)
            .unwrap_or(NonZeroUsize::MIN);

        let mut session_builder = SessionBuilder::new()
            .known_nodes(self.config.contact_points())
            .connection_timeout(self.config.connection_timeout())
            .pool_size(PoolSize::PerShard(pool_size));

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            session_builder = session_builder.user(username, password);
        }

        session_builder.build().await.map_err(|e| {
            error!("Failed to connect to cluster: {}", e);
            StoreError::ConnectionError(format!("Connection failed: {}", e))
        })
    }

    /// Runs `f` with a session lease that is released on every exit path,
    /// including errors, panics and the returned future being dropped.
    pub async fn with_session<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let session = self.session(cancel).await?;
        leased(&self.config.keyspace, session, f).await
    }

    /// Runs one statement under the exponential backoff policy.
    pub async fn run_statement<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        operation: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.statement_policy.execute(cancel, statement, operation).await
    }

    pub async fn create_keyspace(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        let cql = QueryBuilder::build_create_keyspace(&self.config.keyspace);
        self.execute_ddl(cancel, "create_keyspace", cql).await?;
        info!("Keyspace {} is ready", self.config.keyspace);
        Ok(())
    }

    pub async fn drop_keyspace(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        let cql = QueryBuilder::build_drop_keyspace(&self.config.keyspace);
        self.execute_ddl(cancel, "drop_keyspace", cql).await?;
        info!("Keyspace {} dropped", self.config.keyspace);
        Ok(())
    }

    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        self.execute_ddl(cancel, "health_check", "SELECT now() FROM system.local".to_string())
            .await
    }

    pub(crate) async fn execute_ddl(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        cql: String,
    ) -> Result<(), StoreError> {
        debug!("Executing {}: {}", statement, cql);
        self.with_session(cancel, |session| async move {
            self.run_statement(cancel, statement, || {
                let session = session.clone();
                let cql = cql.clone();
                async move {
                    session.query_unpaged(cql, ()).await?;
                    Ok::<_, StoreError>(())
                }
            })
            .await
        })
        .await
    }
}

async fn leased<S, F, Fut, T>(keyspace: &str, session: S, f: F) -> Result<T, StoreError>
where
    F: FnOnce(S) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let _lease = SessionLease::acquire(keyspace);
    f(session).await
}

/// Counts a held session in the active-sessions gauge until dropped.
struct SessionLease {
    keyspace: String,
}

impl SessionLease {
    fn acquire(keyspace: &str) -> Self {
        metrics::ACTIVE_SESSIONS.with_label_values(&[keyspace]).inc();
        Self {
            keyspace: keyspace.to_string(),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        metrics::ACTIVE_SESSIONS
            .with_label_values(&[self.keyspace.as_str()])
            .dec();
    }
}
