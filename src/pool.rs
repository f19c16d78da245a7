//! Multi-provider session pool with priority failover
//!
//! Each provider gets its own bb8 pool (session recycling, broken-session
//! removal, idle reaping) and a semaphore holding exactly
//! `max_connections` permits. A [`PooledSession`] owns one permit for as
//! long as it lives, so the number of sessions lent from a provider can
//! never exceed its cap, whatever bb8 does internally.
//!
//! # Example
//!
//! ```no_run
//! use nntp_courier::{PoolConfig, ProviderConfig, ProviderPool, TcpConnector};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> nntp_courier::Result<()> {
//! let providers = vec![
//!     ProviderConfig::tls("news-primary.example.com", "user", "pass").with_priority(0),
//!     ProviderConfig::tls("news-backup.example.com", "user", "pass").with_priority(10),
//! ];
//! let pool = ProviderPool::new(providers, PoolConfig::default(), Arc::new(TcpConnector))?;
//!
//! let mut session = pool.acquire(Duration::from_secs(30)).await?;
//! session.join_group("alt.binaries.test").await?;
//! pool.release(session, true);
//! # Ok(())
//! # }
//! ```

use crate::config::{PoolConfig, ProviderConfig};
use crate::error::{NntpError, Result};
use crate::provider::{Admission, ProviderCounters, ProviderHealth, ProviderStats};
use crate::session::{NntpSession, SessionConnector};
use bb8::{Pool, PooledConnection, RunError};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// bb8 manager opening sessions for one provider through a connector
pub struct SessionManager {
    provider: Arc<ProviderConfig>,
    connector: Arc<dyn SessionConnector>,
}

impl SessionManager {
    /// Create a manager for one provider
    pub fn new(provider: Arc<ProviderConfig>, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            provider,
            connector,
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("provider", &self.provider.label())
            .finish()
    }
}

impl bb8::ManageConnection for SessionManager {
    type Connection = Box<dyn NntpSession>;
    type Error = NntpError;

    async fn connect(&self) -> Result<Self::Connection> {
        debug!("Opening session to {}", self.provider.label());
        self.connector.connect(&self.provider).await
    }

    async fn is_valid(&self, _conn: &mut Self::Connection) -> Result<()> {
        // Sessions are checked by has_broken on return instead
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}

struct ProviderSlot {
    config: Arc<ProviderConfig>,
    sessions: Pool<SessionManager>,
    permits: Arc<Semaphore>,
    health: Mutex<ProviderHealth>,
    counters: ProviderCounters,
}

impl ProviderSlot {
    fn health(&self) -> MutexGuard<'_, ProviderHealth> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_use(&self) -> u32 {
        let available = u32::try_from(self.permits.available_permits()).unwrap_or(u32::MAX);
        self.config.max_connections.saturating_sub(available)
    }
}

struct PoolInner {
    providers: Vec<ProviderSlot>,
    config: PoolConfig,
    released: Notify,
}

impl PoolInner {
    /// Wake callers that skipped a provider while its trial was in flight
    fn trial_settled(&self) {
        self.released.notify_waiters();
    }

    fn record_failure(&self, index: usize, error: &NntpError) {
        let slot = &self.providers[index];
        slot.counters.record_failed();
        let tripped = slot
            .health()
            .record_failure(&self.config.cooldown, Instant::now());
        match tripped {
            Some(window) => warn!(
                "Provider {} entering cooldown for {:?} after: {}",
                slot.config.label(),
                window,
                error
            ),
            None => debug!("Provider {} failure: {}", slot.config.label(), error),
        }
    }
}

/// Priority-ordered pool of NNTP sessions across providers
///
/// Cloning is cheap; clones share providers, counters and sessions.
#[derive(Clone)]
pub struct ProviderPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field(
                "providers",
                &self
                    .inner
                    .providers
                    .iter()
                    .map(|p| p.config.label())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ProviderPool {
    /// Build a pool over the enabled providers, ordered by priority
    ///
    /// No connection is opened until the first [`acquire`](Self::acquire).
    /// Must be called from within a Tokio runtime (bb8 spawns an idle
    /// reaper per provider).
    ///
    /// # Errors
    ///
    /// Returns [`NntpError::Config`] if no provider is enabled or a
    /// provider fails validation.
    pub fn new(
        providers: Vec<ProviderConfig>,
        config: PoolConfig,
        connector: Arc<dyn SessionConnector>,
    ) -> Result<Self> {
        let mut enabled: Vec<ProviderConfig> =
            providers.into_iter().filter(|p| p.enabled).collect();
        if enabled.is_empty() {
            return Err(NntpError::Config("no enabled providers".to_string()));
        }
        for provider in &enabled {
            provider.validate()?;
        }
        enabled.sort_by_key(|p| p.priority);

        let providers = enabled
            .into_iter()
            .map(|provider| {
                let provider = Arc::new(provider);
                debug!(
                    "Creating session pool for {} (priority {}, max size {})",
                    provider.label(),
                    provider.priority,
                    provider.max_connections
                );
                let connect_timeout = provider.connect_timeout() + provider.command_timeout();
                let sessions = Pool::builder()
                    .max_size(provider.max_connections)
                    .min_idle(None)
                    .connection_timeout(connect_timeout.max(Duration::from_millis(1)))
                    .idle_timeout(Some(config.idle_timeout()))
                    .retry_connection(false)
                    .test_on_check_out(false)
                    .build_unchecked(SessionManager::new(provider.clone(), connector.clone()));
                ProviderSlot {
                    permits: Arc::new(Semaphore::new(provider.max_connections as usize)),
                    config: provider,
                    sessions,
                    health: Mutex::new(ProviderHealth::default()),
                    counters: ProviderCounters::default(),
                }
            })
            .collect();

        Ok(Self {
            inner: Arc::new(PoolInner {
                providers,
                config,
                released: Notify::new(),
            }),
        })
    }

    /// Borrow a session using the configured acquire timeout
    pub async fn acquire_default(&self) -> Result<PooledSession> {
        self.acquire(self.acquire_timeout()).await
    }

    /// Configured acquire timeout
    pub fn acquire_timeout(&self) -> Duration {
        self.inner.config.acquire_timeout()
    }

    /// Borrow a ready session from the highest-priority provider with
    /// spare capacity that is not cooling down
    ///
    /// Waits for a release or a cooldown expiry when every provider is
    /// saturated or cooling.
    ///
    /// # Errors
    ///
    /// Returns [`NntpError::PoolExhausted`] when nothing became available
    /// within `timeout`.
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledSession> {
        self.acquire_excluding(timeout, &[]).await
    }

    /// Like [`acquire`](Self::acquire) but never lends from the providers
    /// at the given indices
    ///
    /// Lets a worker retry an operation on a different provider.
    pub async fn acquire_excluding(&self, timeout: Duration, skip: &[usize]) -> Result<PooledSession> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before scanning so a release in between is not lost
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let mut wake_at = deadline;
            for (index, slot) in self.inner.providers.iter().enumerate() {
                if skip.contains(&index) {
                    continue;
                }

                let admission = slot.health().admit(Instant::now());
                let on_trial = match admission {
                    Admission::Ready => false,
                    Admission::Trial => true,
                    Admission::CoolingUntil(until) => {
                        wake_at = wake_at.min(until);
                        continue;
                    }
                    Admission::TrialInFlight => continue,
                };

                let Ok(permit) = slot.permits.clone().try_acquire_owned() else {
                    if on_trial {
                        slot.health().cancel_trial();
                        self.inner.trial_settled();
                    }
                    continue;
                };

                if on_trial {
                    info!("Trying provider {} again after cooldown", slot.config.label());
                }

                match tokio::time::timeout_at(deadline, slot.sessions.get_owned()).await {
                    Ok(Ok(session)) => {
                        slot.health().record_success();
                        if on_trial {
                            self.inner.trial_settled();
                        }
                        slot.counters.record_acquired();
                        return Ok(PooledSession {
                            session: Some(session),
                            permit: Some(permit),
                            provider: index,
                            pool: self.inner.clone(),
                        });
                    }
                    Ok(Err(RunError::User(e))) => {
                        drop(permit);
                        self.inner.record_failure(index, &e);
                        if on_trial {
                            self.inner.trial_settled();
                        }
                    }
                    Ok(Err(RunError::TimedOut)) => {
                        drop(permit);
                        self.inner.record_failure(index, &NntpError::Timeout);
                        if on_trial {
                            self.inner.trial_settled();
                        }
                    }
                    Err(_) => {
                        drop(permit);
                        if on_trial {
                            slot.health().cancel_trial();
                            self.inner.trial_settled();
                        }
                        return Err(NntpError::PoolExhausted);
                    }
                }
            }

            if Instant::now() >= deadline {
                debug!("Acquire deadline reached with no provider available");
                return Err(NntpError::PoolExhausted);
            }

            // A failure that did not trip leaves the provider ready; rescan now
            if self.any_ready(skip) {
                continue;
            }

            let _ = tokio::time::timeout_at(wake_at, released).await;
        }
    }

    fn any_ready(&self, skip: &[usize]) -> bool {
        let now = Instant::now();
        self.inner
            .providers
            .iter()
            .enumerate()
            .any(|(index, slot)| {
                if skip.contains(&index) || slot.permits.available_permits() == 0 {
                    return false;
                }
                let health = slot.health();
                health.cooldown_until.is_none_or(|until| now >= until) && !health.on_trial
            })
    }

    /// Return a session
    ///
    /// Healthy sessions go back to their provider for reuse. Unhealthy
    /// ones are closed and count as a provider failure.
    pub fn release(&self, mut session: PooledSession, healthy: bool) {
        session.finish(healthy);
    }

    /// Per-provider statistics in priority order
    pub fn stats(&self) -> Vec<ProviderStats> {
        let now = Instant::now();
        self.inner
            .providers
            .iter()
            .map(|slot| {
                let (acquired, released, failed, discarded) = slot.counters.snapshot();
                let health = slot.health();
                ProviderStats {
                    name: slot.config.label(),
                    priority: slot.config.priority,
                    max_connections: slot.config.max_connections,
                    in_use: slot.in_use(),
                    acquired,
                    released,
                    failed,
                    discarded,
                    consecutive_failures: health.consecutive_failures,
                    trips: health.trips,
                    cooling_down: health.is_cooling(now),
                }
            })
            .collect()
    }

    /// Sum of every provider's connection cap
    pub fn total_capacity(&self) -> usize {
        self.inner
            .providers
            .iter()
            .map(|slot| slot.config.max_connections as usize)
            .sum()
    }

    /// Sessions currently lent from the provider at `index` (priority order)
    pub fn in_use(&self, index: usize) -> u32 {
        self.inner.providers.get(index).map_or(0, ProviderSlot::in_use)
    }

    /// Index of the provider with the given label
    pub fn provider_index(&self, name: &str) -> Option<usize> {
        self.inner
            .providers
            .iter()
            .position(|slot| slot.config.label() == name)
    }

    /// Number of enabled providers
    pub fn provider_count(&self) -> usize {
        self.inner.providers.len()
    }
}

/// A session on loan from a [`ProviderPool`]
///
/// Dereferences to the session. Dropping it without
/// [`ProviderPool::release`] returns it as healthy.
pub struct PooledSession {
    session: Option<PooledConnection<'static, SessionManager>>,
    permit: Option<OwnedSemaphorePermit>,
    provider: usize,
    pool: Arc<PoolInner>,
}

impl PooledSession {
    /// Index of the lending provider, usable with
    /// [`ProviderPool::acquire_excluding`]
    pub fn provider_index(&self) -> usize {
        self.provider
    }

    /// Label of the lending provider
    pub fn provider_name(&self) -> String {
        self.pool.providers[self.provider].config.label()
    }

    /// Configuration of the lending provider
    pub fn provider_config(&self) -> &ProviderConfig {
        &self.pool.providers[self.provider].config
    }

    fn finish(&mut self, healthy: bool) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let slot = &self.pool.providers[self.provider];
        if !healthy {
            session.mark_broken();
            self.pool.record_failure(
                self.provider,
                &NntpError::TransientIo("session released unhealthy".to_string()),
            );
        }
        slot.counters.record_released(healthy);
        // bb8 discards it here if broken, otherwise keeps it idle
        drop(session);
        drop(self.permit.take());
        self.pool.released.notify_waiters();
    }
}

impl Deref for PooledSession {
    type Target = dyn NntpSession;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => &***session,
            None => unreachable!("session used after release"),
        }
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.session {
            Some(session) => &mut ***session,
            None => unreachable!("session used after release"),
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        self.finish(true);
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("provider", &self.provider_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;
    use crate::commands::{GroupInfo, GroupList, XoverEntries};
    use crate::config::CooldownConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NullSession {
        broken: bool,
    }

    #[async_trait]
    impl NntpSession for NullSession {
        async fn join_group(&mut self, newsgroup: &str) -> Result<GroupInfo> {
            Ok(GroupInfo {
                name: newsgroup.to_string(),
                count: 0,
                first: 0,
                last: 0,
            })
        }
        async fn fetch_header(&mut self, id: &str) -> Result<Vec<String>> {
            Err(NntpError::NoSuchArticle(id.to_string()))
        }
        async fn fetch_body(&mut self, id: &str) -> Result<Vec<u8>> {
            Err(NntpError::NoSuchArticle(id.to_string()))
        }
        async fn fetch_article(&mut self, id: &str) -> Result<Article> {
            Err(NntpError::NoSuchArticle(id.to_string()))
        }
        async fn stat(&mut self, _id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn post(&mut self, article: &Article) -> Result<String> {
            Ok(article.message_id.clone())
        }
        async fn list_groups(&mut self, _filter: Option<&str>) -> Result<GroupList> {
            Ok(GroupList::new(Vec::new(), None))
        }
        async fn xover(&mut self, _start: u64, _end: u64) -> Result<XoverEntries> {
            Ok(XoverEntries::new(Vec::new()))
        }
        async fn quit(&mut self) -> Result<()> {
            self.broken = true;
            Ok(())
        }
        fn is_broken(&self) -> bool {
            self.broken
        }
        fn mark_broken(&mut self) {
            self.broken = true;
        }
    }

    /// Fails for hosts starting with "down", counts connects per call
    #[derive(Default)]
    struct TestConnector {
        connects: AtomicU32,
    }

    #[async_trait]
    impl SessionConnector for TestConnector {
        async fn connect(&self, provider: &Arc<ProviderConfig>) -> Result<Box<dyn NntpSession>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if provider.host.starts_with("down") {
                return Err(NntpError::AuthRejected(provider.host.clone()));
            }
            Ok(Box::new(NullSession { broken: false }))
        }
    }

    fn pool_config(threshold: u32) -> PoolConfig {
        PoolConfig {
            acquire_timeout_ms: 1_000,
            idle_timeout_secs: 300,
            cooldown: CooldownConfig {
                failure_threshold: threshold,
                base_ms: 10_000,
                max_ms: 60_000,
                jitter: false,
            },
        }
    }

    #[tokio::test]
    async fn test_priority_order_and_cap() {
        let providers = vec![
            ProviderConfig::plain("backup").with_priority(5).with_max_connections(2),
            ProviderConfig::plain("primary").with_priority(1).with_max_connections(1),
        ];
        let pool =
            ProviderPool::new(providers, pool_config(3), Arc::new(TestConnector::default()))
                .unwrap();
        assert_eq!(pool.total_capacity(), 3);
        assert_eq!(pool.provider_index("primary"), Some(0));

        let a = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(a.provider_name(), "primary");
        let b = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(b.provider_name(), "backup");
        let c = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(c.provider_name(), "backup");
        assert_eq!(pool.in_use(0), 1);
        assert_eq!(pool.in_use(1), 2);

        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, NntpError::PoolExhausted));

        pool.release(a, true);
        let d = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(d.provider_name(), "primary");
        drop((b, c, d));
        assert_eq!(pool.in_use(0) + pool.in_use(1), 0);
    }

    #[tokio::test]
    async fn test_waiter_woken_by_release() {
        let providers = vec![ProviderConfig::plain("only").with_max_connections(1)];
        let pool =
            ProviderPool::new(providers, pool_config(3), Arc::new(TestConnector::default()))
                .unwrap();
        let held = pool.acquire(Duration::from_millis(100)).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.release(held, true);

        let session = waiter.await.unwrap().unwrap();
        assert_eq!(session.provider_name(), "only");
    }

    #[tokio::test]
    async fn test_failover_and_cooldown() {
        let providers = vec![
            ProviderConfig::plain("down.example").with_priority(0),
            ProviderConfig::plain("up.example").with_priority(1),
        ];
        let connector = Arc::new(TestConnector::default());
        let pool = ProviderPool::new(providers, pool_config(1), connector.clone()).unwrap();

        let session = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(session.provider_name(), "up.example");

        let stats = pool.stats();
        assert!(stats[0].cooling_down);
        assert_eq!(stats[0].trips, 1);
        assert_eq!(stats[0].failed, 1);
        assert_eq!(stats[1].acquired, 1);

        // Cooling provider is skipped without another connect attempt
        let before = connector.connects.load(Ordering::SeqCst);
        let second = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.provider_name(), "up.example");
        assert_eq!(connector.connects.load(Ordering::SeqCst), before + 1);
    }

    /// Refuses the first connect, then answers slowly
    #[derive(Default)]
    struct RecoveringConnector {
        connects: AtomicU32,
    }

    #[async_trait]
    impl SessionConnector for RecoveringConnector {
        async fn connect(&self, provider: &Arc<ProviderConfig>) -> Result<Box<dyn NntpSession>> {
            if self.connects.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(NntpError::TransientIo(format!("{} refused", provider.host)));
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(Box::new(NullSession { broken: false }))
        }
    }

    #[tokio::test]
    async fn test_recovered_provider_wakes_waiters() {
        let providers = vec![ProviderConfig::plain("flaky").with_max_connections(2)];
        let mut config = pool_config(1);
        config.cooldown.base_ms = 50;
        let pool = ProviderPool::new(providers, config, Arc::new(RecoveringConnector::default()))
            .unwrap();

        // First connect fails and trips the provider
        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, NntpError::PoolExhausted));
        assert!(pool.stats()[0].cooling_down);
        tokio::time::sleep(Duration::from_millis(80)).await;

        let trial = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(10)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(10)).await })
        };

        // The trial session stays lent, so only the settled trial can wake the waiter
        let trial_session = trial.await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter stayed parked after the trial succeeded")
            .unwrap()
            .unwrap();
        assert_eq!(pool.in_use(0), 2);
        drop((trial_session, second));
    }

    #[tokio::test]
    async fn test_unhealthy_release_discards() {
        let providers = vec![ProviderConfig::plain("only").with_max_connections(1)];
        let connector = Arc::new(TestConnector::default());
        let pool = ProviderPool::new(providers, pool_config(5), connector.clone()).unwrap();

        let session = pool.acquire(Duration::from_millis(100)).await.unwrap();
        pool.release(session, false);
        let stats = &pool.stats()[0];
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.consecutive_failures, 1);

        let _again = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_healthy_release_reuses() {
        let providers = vec![ProviderConfig::plain("only").with_max_connections(1)];
        let connector = Arc::new(TestConnector::default());
        let pool = ProviderPool::new(providers, pool_config(5), connector.clone()).unwrap();

        for _ in 0..3 {
            let session = pool.acquire(Duration::from_millis(100)).await.unwrap();
            pool.release(session, true);
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats()[0].released, 3);
    }

    #[tokio::test]
    async fn test_rejects_empty_provider_list() {
        let mut disabled = ProviderConfig::plain("off");
        disabled.enabled = false;
        let err = ProviderPool::new(
            vec![disabled],
            PoolConfig::default(),
            Arc::new(TestConnector::default()),
        )
        .unwrap_err();
        assert!(matches!(err, NntpError::Config(_)));
    }
}
