//! Maps inbound requests to live sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::crypto::{generate_session_key, is_well_formed_key, pack_remote_ip};
use crate::events::{EventRegistry, SessionEvent};
use crate::provider::{GcReport, Provider, ProviderRegistry};
use crate::repository::{AuthUser, SessionRecordRepository, UserRepository};
use crate::request::{RequestContext, SessionCookie};
use crate::session::SessionRef;
use crate::{SessionError, key_prefix};

type InflightMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Session manager: cookie handling, lookup with durable-store revival, and
/// creation on login.
///
/// Requests for different tokens never wait on each other. Concurrent
/// requests presenting the same unresolved token queue on a per-token
/// marker, so only the first one goes to the durable store and the rest
/// find the revived session in the provider.
///
/// Construction starts a background sweep that calls [`Provider::gc`]
/// every [`SessionConfig::gc_interval`]. It stops on [`shutdown`](Self::shutdown)
/// or when the manager is dropped.
pub struct SessionManager<S, U> {
    config: SessionConfig,
    provider: Arc<dyn Provider>,
    sessions: Arc<S>,
    users: Arc<U>,
    events: Arc<EventRegistry>,
    inflight: InflightMap,
    cancel: CancellationToken,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, U> SessionManager<S, U>
where
    S: SessionRecordRepository + 'static,
    U: UserRepository + 'static,
{
    /// Creates a manager using the provider named by `config.provider`.
    ///
    /// # Errors
    ///
    /// - `SessionError::ProviderNotRegistered` if the provider is unknown
    /// - `SessionError::InvalidConfiguration` / `InvalidProviderName` if
    ///   `config` fails validation, or if called outside a Tokio runtime
    pub fn new(
        registry: &ProviderRegistry,
        config: SessionConfig,
        sessions: S,
        users: U,
    ) -> Result<Self, SessionError> {
        Self::with_events(registry, config, sessions, users, EventRegistry::new())
    }

    /// Same as [`new`](Self::new), dispatching lifecycle events to `events`.
    pub fn with_events(
        registry: &ProviderRegistry,
        config: SessionConfig,
        sessions: S,
        users: U,
        events: EventRegistry,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let provider = registry.get(&config.provider)?;

        let interval = config.gc_interval.to_std().map_err(|_| {
            SessionError::InvalidConfiguration("gc_interval out of range".to_owned())
        })?;

        let runtime = Handle::try_current().map_err(|_| {
            SessionError::InvalidConfiguration(
                "session manager must be created inside a Tokio runtime".to_owned(),
            )
        })?;

        let sessions = Arc::new(sessions);
        let events = Arc::new(events);
        let cancel = CancellationToken::new();

        let gc_task = spawn_gc(
            &runtime,
            Arc::clone(&provider),
            Arc::clone(&sessions),
            Arc::clone(&events),
            config.session_lifetime,
            interval,
            cancel.clone(),
        );

        log::info!(
            target: "latchkey",
            "msg=\"session manager started\" provider=\"{}\" cookie=\"{}\" lifetime_secs={}",
            config.provider,
            config.cookie_name,
            config.session_lifetime.num_seconds()
        );

        Ok(Self {
            config,
            provider,
            sessions,
            users: Arc::new(users),
            events,
            inflight: Mutex::new(HashMap::new()),
            cancel,
            gc_task: Mutex::new(Some(gc_task)),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Number of sessions currently live in the provider.
    pub async fn live_sessions(&self) -> usize {
        self.provider.len().await
    }

    /// Resolves the session for a request.
    ///
    /// Returns `None` for anonymous requests: no cookie, a malformed cookie,
    /// or a token neither the provider nor the durable store knows. Store
    /// failures are logged and also yield `None`.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "session_get", skip_all))]
    pub async fn session_get<C>(&self, ctx: &C) -> Option<SessionRef>
    where
        C: RequestContext + ?Sized,
    {
        let key = self.cookie_key(ctx)?;

        if let Some(session) = self.provider.session_read(&key).await {
            session.touch();
            return Some(session);
        }

        self.revive(&key).await
    }

    /// Returns a live session for `user`, creating one if needed.
    ///
    /// A session named by the request cookie is reused (or revived from the
    /// durable store) when it belongs to `user`. Otherwise a new token is
    /// minted, persisted, and sent back in a fresh cookie.
    ///
    /// # Errors
    ///
    /// - `SessionError::InactiveUser` if `user` is deactivated
    /// - `SessionError::StoreUnavailable` if the new session could not be
    ///   persisted; nothing is left in the provider in that case
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "session_start", skip_all, fields(user_id = user.id), err)
    )]
    pub async fn session_start<C>(
        &self,
        ctx: &mut C,
        user: &AuthUser,
    ) -> Result<SessionRef, SessionError>
    where
        C: RequestContext + ?Sized,
    {
        if !user.active {
            return Err(SessionError::InactiveUser(user.id));
        }

        if let Some(key) = self.cookie_key(ctx) {
            let existing = match self.provider.session_read(&key).await {
                Some(session) => {
                    session.touch();
                    Some(session)
                }
                None => self.revive(&key).await,
            };

            if let Some(session) = existing {
                if session.user_id() == user.id {
                    return Ok(session);
                }

                log::info!(
                    target: "latchkey",
                    "msg=\"session owner changed, replacing\" key_prefix=\"{}\" previous_user_id={} user_id={}",
                    key_prefix(&key),
                    session.user_id(),
                    user.id
                );
                let _claim = InflightClaim::acquire(&self.inflight, &key).await;
                if let Err(e) = self.discard(&session).await {
                    log::warn!(target: "latchkey", "msg=\"failed to archive replaced session\" error=\"{e}\"");
                }
            }
        }

        self.create(ctx, user).await
    }

    /// Ends the session named by the request cookie.
    ///
    /// Removes it from the provider, archives its durable record and queues
    /// a removal cookie. Requests without a session only get the removal
    /// cookie.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreUnavailable` if the record could not be
    /// archived. The in-memory session is gone either way.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "session_destroy", skip_all, err))]
    pub async fn session_destroy<C>(&self, ctx: &mut C) -> Result<(), SessionError>
    where
        C: RequestContext + ?Sized,
    {
        let key = self.cookie_key(ctx);
        ctx.set_cookie(self.removal_cookie());

        let Some(key) = key else {
            return Ok(());
        };

        // Waits out any revival of this key so it cannot resurface afterwards.
        let _claim = InflightClaim::acquire(&self.inflight, &key).await;

        match self.provider.session_read(&key).await {
            Some(session) => self.discard(&session).await,
            None => self.sessions.archive_session_record(&key).await,
        }
    }

    /// Runs one sweep now, outside the background schedule.
    pub async fn run_gc(&self) -> GcReport {
        sweep(
            self.provider.as_ref(),
            self.sessions.as_ref(),
            &self.events,
            self.config.session_lifetime,
        )
        .await
    }

    async fn create<C>(&self, ctx: &mut C, user: &AuthUser) -> Result<SessionRef, SessionError>
    where
        C: RequestContext + ?Sized,
    {
        let key = generate_session_key();
        let ip = ctx
            .remote_addr()
            .map_or(0, |addr| pack_remote_ip(&addr));

        self.sessions
            .insert_session_record(&key, user.id, ip, 0)
            .await
            .inspect_err(|e| {
                log::error!(
                    target: "latchkey",
                    "msg=\"failed to persist new session\" user_id={} error=\"{e}\"",
                    user.id
                );
            })?;

        let session = self.provider.session_init(&key).await;
        session.set_ip(ip);
        populate(&session, user);

        ctx.set_cookie(self.session_cookie(&key));

        log::info!(
            target: "latchkey",
            "msg=\"session created\" user_id={} key_prefix=\"{}\"",
            user.id,
            key_prefix(&key)
        );

        self.events
            .dispatch(SessionEvent::Created {
                user_id: user.id,
                key_prefix: key_prefix(&key),
                ip,
                at: Utc::now(),
            })
            .await;

        Ok(session)
    }

    /// Rebuilds the session for `key` from the durable store, coalescing
    /// concurrent attempts for the same key.
    async fn revive(&self, key: &str) -> Option<SessionRef> {
        let _claim = InflightClaim::acquire(&self.inflight, key).await;

        // An earlier holder of the claim may have revived it already.
        if let Some(session) = self.provider.session_read(key).await {
            session.touch();
            return Some(session);
        }

        self.load_from_store(key).await
    }

    async fn load_from_store(&self, key: &str) -> Option<SessionRef> {
        let record = match self.sessions.find_session_record(key).await {
            Ok(Some(record)) if !record.is_archived() => record,
            Ok(Some(_)) => {
                log::debug!(target: "latchkey", "msg=\"session record archived\" key_prefix=\"{}\"", key_prefix(key));
                return None;
            }
            Ok(None) => return None,
            Err(e) => {
                log::warn!(
                    target: "latchkey",
                    "msg=\"session revival failed\" stage=\"session_record\" key_prefix=\"{}\" error=\"{e}\"",
                    key_prefix(key)
                );
                return None;
            }
        };

        let user = match self.users.find_user_by_id(record.user_id).await {
            Ok(Some(user)) if user.active => user,
            Ok(Some(_)) => {
                log::debug!(target: "latchkey", "msg=\"session owner inactive\" user_id={}", record.user_id);
                return None;
            }
            Ok(None) => return None,
            Err(e) => {
                log::warn!(
                    target: "latchkey",
                    "msg=\"session revival failed\" stage=\"user\" user_id={} error=\"{e}\"",
                    record.user_id
                );
                return None;
            }
        };

        let session = self.provider.session_init(key).await;
        session.set_ip(record.ip);
        populate(&session, &user);

        log::info!(
            target: "latchkey",
            "msg=\"session revived from store\" user_id={} key_prefix=\"{}\"",
            user.id,
            key_prefix(key)
        );

        self.events
            .dispatch(SessionEvent::Revived {
                user_id: user.id,
                key_prefix: key_prefix(key),
                at: Utc::now(),
            })
            .await;

        Some(session)
    }

    async fn discard(&self, session: &SessionRef) -> Result<(), SessionError> {
        let key = session.key();
        self.provider.session_destroy(key).await;

        self.events
            .dispatch(SessionEvent::Destroyed {
                user_id: session.user_id(),
                key_prefix: key_prefix(key),
                at: Utc::now(),
            })
            .await;

        self.sessions.archive_session_record(key).await
    }
}

impl<S, U> SessionManager<S, U> {
    /// Stops the background sweep and waits for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let task = self
            .gc_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!(target: "latchkey", "msg=\"session sweep task ended abnormally\" error=\"{e}\"");
            }
        }
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn cookie_key<C>(&self, ctx: &C) -> Option<String>
    where
        C: RequestContext + ?Sized,
    {
        let value = ctx.cookie(&self.config.cookie_name)?;
        if value.is_empty() {
            return None;
        }
        if !is_well_formed_key(&value) {
            log::debug!(target: "latchkey", "msg=\"malformed session cookie ignored\" cookie_prefix=\"{}\"", key_prefix(&value));
            return None;
        }
        Some(value)
    }

    fn session_cookie(&self, key: &str) -> SessionCookie {
        SessionCookie {
            name: self.config.cookie_name.clone(),
            value: key.to_owned(),
            path: self.config.cookie_path.clone(),
            domain: self.config.cookie_domain.clone(),
            http_only: true,
            expires: Utc::now() + self.config.session_lifetime,
        }
    }

    fn removal_cookie(&self) -> SessionCookie {
        SessionCookie {
            name: self.config.cookie_name.clone(),
            value: String::new(),
            path: self.config.cookie_path.clone(),
            domain: self.config.cookie_domain.clone(),
            http_only: true,
            expires: DateTime::UNIX_EPOCH,
        }
    }
}

impl<S, U> Drop for SessionManager<S, U> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn populate(session: &SessionRef, user: &AuthUser) {
    session.set_user_id(user.id);
    session.set_perm(user.perm);
    session.set_name(&user.name);
    session.set_email(&user.email);
}

async fn sweep(
    provider: &dyn Provider,
    store: &dyn SessionRecordRepository,
    events: &EventRegistry,
    lifetime: chrono::Duration,
) -> GcReport {
    let report = provider.gc(lifetime, store).await;

    let now = Utc::now();
    for key in &report.expired {
        events
            .dispatch(SessionEvent::Expired {
                key_prefix: key_prefix(key),
                at: now,
            })
            .await;
    }

    report
}

fn spawn_gc<S>(
    runtime: &Handle,
    provider: Arc<dyn Provider>,
    store: Arc<S>,
    events: Arc<EventRegistry>,
    lifetime: chrono::Duration,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: SessionRecordRepository + 'static,
{
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    sweep(provider.as_ref(), store.as_ref(), &events, lifetime).await;
                }
            }
        }

        log::debug!(target: "latchkey", "msg=\"session sweep stopped\"");
    })
}

/// Exclusive right to resolve one key from the durable store.
///
/// Dropping the claim releases the key; the map entry is removed by the
/// last holder.
struct InflightClaim<'a> {
    map: &'a InflightMap,
    key: String,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> InflightClaim<'a> {
    async fn acquire(map: &'a InflightMap, key: &str) -> InflightClaim<'a> {
        let slot = {
            let mut slots = map.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.to_owned()).or_default())
        };

        let guard = Arc::clone(&slot).lock_owned().await;

        InflightClaim {
            map,
            key: key.to_owned(),
            slot,
            guard: Some(guard),
        }
    }
}

impl Drop for InflightClaim<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if idle {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::sync::Notify;

    use super::*;
    use crate::crypto::SESSION_KEY_LEN;
    use crate::events::Listener;
    use crate::provider::MemoryProvider;
    use crate::repository::{MockSessionRecordRepository, MockUserRepository, SessionRecord};
    use crate::request::RequestParts;
    use crate::session::Permission;

    const COOKIE: &str = "latchkey_session";

    type TestManager = SessionManager<MockSessionRecordRepository, MockUserRepository>;

    struct Fixture {
        manager: TestManager,
        provider: Arc<MemoryProvider>,
        records: MockSessionRecordRepository,
        users: MockUserRepository,
    }

    async fn fixture_with(config: SessionConfig, events: EventRegistry) -> Fixture {
        let provider = Arc::new(MemoryProvider::new());
        let mut registry = ProviderRegistry::new();
        registry
            .register_shared("memory", provider.clone())
            .await
            .unwrap();

        let records = MockSessionRecordRepository::new();
        let users = MockUserRepository::with_users(vec![
            AuthUser::mock_with_id(1),
            AuthUser::mock_admin(2),
        ]);

        let manager = SessionManager::with_events(
            &registry,
            config,
            records.clone(),
            users.clone(),
            events,
        )
        .unwrap();

        Fixture {
            manager,
            provider,
            records,
            users,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(SessionConfig::default(), EventRegistry::new()).await
    }

    fn seed_record(records: &MockSessionRecordRepository, user_id: i64, ip: u32) -> String {
        let key = generate_session_key();
        records.insert(SessionRecord {
            key: key.clone(),
            user_id,
            ip,
            access_time: Utc::now(),
            flags: 0,
        });
        key
    }

    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl Listener for Recorder {
        async fn handle(&self, event: &SessionEvent) {
            self.0.lock().unwrap().push(event.name());
        }
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_construction() {
        let registry = ProviderRegistry::new();
        let result = SessionManager::new(
            &registry,
            SessionConfig::default(),
            MockSessionRecordRepository::new(),
            MockUserRepository::new(),
        );
        assert!(matches!(
            result,
            Err(SessionError::ProviderNotRegistered(name)) if name == "memory"
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_construction() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("memory", MemoryProvider::new())
            .await
            .unwrap();

        let config = SessionConfig {
            cookie_name: String::new(),
            ..Default::default()
        };
        let result = SessionManager::new(
            &registry,
            config,
            MockSessionRecordRepository::new(),
            MockUserRepository::new(),
        );
        assert!(matches!(result, Err(SessionError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_get_without_cookie_is_anonymous() {
        let f = fixture().await;
        let request = RequestParts::new();
        assert!(f.manager.session_get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_get_with_malformed_cookie_is_anonymous() {
        let f = fixture().await;
        let request = RequestParts::new().with_cookie(COOKIE, "../../etc/passwd");
        assert!(f.manager.session_get(&request).await.is_none());
        assert_eq!(f.records.lookups(), 0);
    }

    #[tokio::test]
    async fn test_start_without_cookie_creates_session() {
        let f = fixture().await;
        let user = AuthUser::mock_admin(2);
        let mut request = RequestParts::new().with_remote_addr("192.168.1.10:51234");

        let session = f.manager.session_start(&mut request, &user).await.unwrap();

        assert_eq!(session.key().len(), SESSION_KEY_LEN);
        assert_eq!(session.user_id(), 2);
        assert_eq!(session.perm(), Permission::Admin);
        assert_eq!(session.name(), "User 2");
        assert_eq!(session.email(), "user2@example.com");
        assert_eq!(session.ip(), 0xC0A8_010A);

        let cookie = request.issued_cookie(COOKIE).unwrap();
        assert_eq!(cookie.value, session.key());
        assert_eq!(cookie.path, "/");
        assert!(cookie.http_only);
        assert!(cookie.expires > Utc::now() + Duration::hours(23));

        let record = f.records.get(session.key()).unwrap();
        assert_eq!(record.user_id, 2);
        assert_eq!(record.ip, 0xC0A8_010A);
        assert_eq!(f.provider.len().await, 1);
    }

    #[tokio::test]
    async fn test_start_with_unparsable_address_stores_zero_ip() {
        let f = fixture().await;
        let mut request = RequestParts::new().with_remote_addr("[::1]:8080");

        let session = f
            .manager
            .session_start(&mut request, &AuthUser::mock_with_id(1))
            .await
            .unwrap();

        assert_eq!(session.ip(), 0);
        assert_eq!(f.records.get(session.key()).unwrap().ip, 0);
    }

    #[tokio::test]
    async fn test_cookie_carries_configured_domain() {
        let config = SessionConfig {
            cookie_domain: Some("example.com".to_owned()),
            ..Default::default()
        };
        let f = fixture_with(config, EventRegistry::new()).await;
        let mut request = RequestParts::new();

        f.manager
            .session_start(&mut request, &AuthUser::mock_with_id(1))
            .await
            .unwrap();

        let cookie = request.issued_cookie(COOKIE).unwrap();
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_get_refreshes_access_time() {
        let f = fixture().await;
        let mut login = RequestParts::new();
        let session = f
            .manager
            .session_start(&mut login, &AuthUser::mock_with_id(1))
            .await
            .unwrap();

        let earlier = Utc::now() - Duration::minutes(30);
        session.set_access_time(earlier);

        let request = RequestParts::new().with_cookie(COOKIE, session.key());
        let found = f.manager.session_get(&request).await.unwrap();

        assert_eq!(found.key(), session.key());
        assert!(found.access_time() > earlier);
    }

    #[tokio::test]
    async fn test_start_reuses_live_session_for_same_user() {
        let f = fixture().await;
        let user = AuthUser::mock_with_id(1);

        let mut first = RequestParts::new();
        let session = f.manager.session_start(&mut first, &user).await.unwrap();

        let mut second = RequestParts::new().with_cookie(COOKIE, session.key());
        let again = f.manager.session_start(&mut second, &user).await.unwrap();

        assert_eq!(again.key(), session.key());
        assert!(second.issued_cookies().is_empty());
        assert_eq!(f.provider.len().await, 1);
        assert_eq!(f.records.len(), 1);
    }

    #[tokio::test]
    async fn test_start_replaces_session_of_other_user() {
        let f = fixture().await;

        let mut first = RequestParts::new();
        let original = f
            .manager
            .session_start(&mut first, &AuthUser::mock_with_id(1))
            .await
            .unwrap();
        let original_key = original.key().to_owned();

        let mut second = RequestParts::new().with_cookie(COOKIE, original_key.as_str());
        let replaced = f
            .manager
            .session_start(&mut second, &AuthUser::mock_admin(2))
            .await
            .unwrap();

        assert_ne!(replaced.key(), original_key);
        assert_eq!(replaced.user_id(), 2);
        assert!(f.provider.session_read(&original_key).await.is_none());
        assert!(f.records.get(&original_key).unwrap().is_archived());
        assert_eq!(second.issued_cookie(COOKIE).unwrap().value, replaced.key());
    }

    #[tokio::test]
    async fn test_get_revives_from_store() {
        let f = fixture().await;
        let key = seed_record(&f.records, 2, 0x0A00_0005);

        let request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        let session = f.manager.session_get(&request).await.unwrap();

        assert_eq!(session.key(), key);
        assert_eq!(session.user_id(), 2);
        assert_eq!(session.ip(), 0x0A00_0005);
        assert_eq!(session.perm(), Permission::Admin);
        assert_eq!(session.name(), "User 2");
        assert_eq!(session.email(), "user2@example.com");

        // revival populates the provider
        let cached = f.provider.session_read(&key).await.unwrap();
        assert_eq!(cached.snapshot(), session.snapshot());
    }

    #[tokio::test]
    async fn test_get_does_not_revive_archived_record() {
        let f = fixture().await;
        let key = seed_record(&f.records, 1, 0);
        f.records.archive_session_record(&key).await.unwrap();

        let request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        assert!(f.manager.session_get(&request).await.is_none());
        assert!(f.provider.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_does_not_revive_for_missing_user() {
        let f = fixture().await;
        let key = seed_record(&f.records, 99, 0);

        let request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        assert!(f.manager.session_get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_get_does_not_revive_for_inactive_user() {
        let f = fixture().await;
        f.users.insert(AuthUser {
            active: false,
            ..AuthUser::mock_with_id(7)
        });
        let key = seed_record(&f.records, 7, 0);

        let request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        assert!(f.manager.session_get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_get_degrades_when_store_unavailable() {
        let f = fixture().await;
        let key = seed_record(&f.records, 1, 0);
        f.records.set_unavailable(true);

        let request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        assert!(f.manager.session_get(&request).await.is_none());

        f.records.set_unavailable(false);
        f.users.set_unavailable(true);
        assert!(f.manager.session_get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_start_revives_known_cookie() {
        let f = fixture().await;
        let key = seed_record(&f.records, 1, 0x0A00_0001);

        let mut request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        let session = f
            .manager
            .session_start(&mut request, &AuthUser::mock_with_id(1))
            .await
            .unwrap();

        assert_eq!(session.key(), key);
        assert!(request.issued_cookies().is_empty());
        assert_eq!(f.records.len(), 1);
    }

    #[tokio::test]
    async fn test_start_with_stale_cookie_mints_new_session() {
        let f = fixture().await;
        let stale = generate_session_key();

        let mut request = RequestParts::new().with_cookie(COOKIE, stale.as_str());
        let session = f
            .manager
            .session_start(&mut request, &AuthUser::mock_with_id(1))
            .await
            .unwrap();

        assert_ne!(session.key(), stale);
        let cookie = request.issued_cookie(COOKIE).unwrap();
        assert_eq!(cookie.value, session.key());
        assert_ne!(cookie.value, stale);
        assert!(f.records.get(session.key()).is_some());
    }

    #[tokio::test]
    async fn test_start_surfaces_store_failure() {
        let f = fixture().await;
        f.records.set_unavailable(true);

        let mut request = RequestParts::new();
        let result = f
            .manager
            .session_start(&mut request, &AuthUser::mock_with_id(1))
            .await;

        assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
        assert!(f.provider.is_empty().await);
        assert!(request.issued_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_start_rejects_inactive_user() {
        let f = fixture().await;
        let user = AuthUser {
            active: false,
            ..AuthUser::mock_with_id(1)
        };

        let mut request = RequestParts::new();
        let result = f.manager.session_start(&mut request, &user).await;

        assert_eq!(result.err(), Some(SessionError::InactiveUser(1)));
        assert!(f.records.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_without_cookie() {
        let f = fixture().await;
        let manager = Arc::new(f.manager);

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let mut request = RequestParts::new();
                    let session = manager
                        .session_start(&mut request, &AuthUser::mock_with_id(1))
                        .await
                        .unwrap();
                    session.key().to_owned()
                })
            })
            .collect();

        let mut keys = HashSet::new();
        for task in tasks {
            keys.insert(task.await.unwrap());
        }

        assert_eq!(keys.len(), 100);
        assert_eq!(f.provider.len().await, 100);
        assert_eq!(f.records.len(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_revivals_coalesce() {
        let f = fixture().await;
        let key = seed_record(&f.records, 1, 0);
        let manager = Arc::new(f.manager);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let key = key.clone();
                tokio::spawn(async move {
                    let request = RequestParts::new().with_cookie(COOKIE, key);
                    manager.session_get(&request).await.map(|s| s.key().to_owned())
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().as_deref(), Some(key.as_str()));
        }

        assert_eq!(f.records.lookups(), 1);
        assert_eq!(f.provider.len().await, 1);
        assert!(manager.inflight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_ends_session() {
        let f = fixture().await;
        let mut login = RequestParts::new();
        let session = f
            .manager
            .session_start(&mut login, &AuthUser::mock_with_id(1))
            .await
            .unwrap();
        let key = session.key().to_owned();

        let mut logout = RequestParts::new().with_cookie(COOKIE, key.as_str());
        f.manager.session_destroy(&mut logout).await.unwrap();

        assert!(logout.issued_cookie(COOKIE).unwrap().is_removal());
        assert!(f.provider.session_read(&key).await.is_none());
        assert!(f.records.get(&key).unwrap().is_archived());

        // the archived record cannot be revived
        let request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        assert!(f.manager.session_get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_destroy_without_cookie() {
        let f = fixture().await;
        let mut request = RequestParts::new();
        f.manager.session_destroy(&mut request).await.unwrap();
        assert!(request.issued_cookie(COOKIE).unwrap().is_removal());
    }

    /// User lookups that park on the first call until released.
    #[derive(Clone)]
    struct GatedUsers {
        inner: MockUserRepository,
        armed: Arc<AtomicBool>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl UserRepository for GatedUsers {
        async fn find_user_by_id(&self, id: i64) -> Result<Option<AuthUser>, SessionError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.find_user_by_id(id).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_logout_during_revival_stays_logged_out() {
        let provider = Arc::new(MemoryProvider::new());
        let mut registry = ProviderRegistry::new();
        registry
            .register_shared("memory", provider.clone())
            .await
            .unwrap();

        let records = MockSessionRecordRepository::new();
        let users = GatedUsers {
            inner: MockUserRepository::with_users(vec![AuthUser::mock_with_id(1)]),
            armed: Arc::new(AtomicBool::new(true)),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let manager = Arc::new(
            SessionManager::new(
                &registry,
                SessionConfig::default(),
                records.clone(),
                users.clone(),
            )
            .unwrap(),
        );
        let key = seed_record(&records, 1, 0);

        let revival = tokio::spawn({
            let manager = Arc::clone(&manager);
            let key = key.clone();
            async move {
                let request = RequestParts::new().with_cookie(COOKIE, key);
                manager.session_get(&request).await.is_some()
            }
        });
        users.entered.notified().await;

        let logout = tokio::spawn({
            let manager = Arc::clone(&manager);
            let key = key.clone();
            async move {
                let mut request = RequestParts::new().with_cookie(COOKIE, key);
                manager.session_destroy(&mut request).await
            }
        });

        // logout must queue behind the revival holding the key
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!logout.is_finished());

        users.release.notify_one();
        revival.await.unwrap();
        logout.await.unwrap().unwrap();

        assert!(provider.session_read(&key).await.is_none());
        assert!(records.get(&key).unwrap().is_archived());

        let request = RequestParts::new().with_cookie(COOKIE, key.as_str());
        assert!(manager.session_get(&request).await.is_none());
    }

    #[test]
    fn test_construction_outside_runtime_fails() {
        let registry = tokio::runtime::Runtime::new().unwrap().block_on(async {
            let mut registry = ProviderRegistry::new();
            registry
                .register("memory", MemoryProvider::new())
                .await
                .unwrap();
            registry
        });

        let result = SessionManager::new(
            &registry,
            SessionConfig::default(),
            MockSessionRecordRepository::new(),
            MockUserRepository::new(),
        );
        assert!(matches!(result, Err(SessionError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_run_gc_expires_and_archives() {
        let f = fixture().await;
        let mut login = RequestParts::new();
        let session = f
            .manager
            .session_start(&mut login, &AuthUser::mock_with_id(1))
            .await
            .unwrap();
        let key = session.key().to_owned();

        session.set_access_time(Utc::now() - Duration::hours(24) - Duration::seconds(1));
        let report = f.manager.run_gc().await;

        assert_eq!(report.expired, vec![key.clone()]);
        assert!(f.provider.session_read(&key).await.is_none());
        assert!(f.records.get(&key).unwrap().is_archived());
    }

    #[tokio::test]
    async fn test_events_dispatched() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventRegistry::new();
        events.listen(Recorder(Arc::clone(&seen)));
        let f = fixture_with(SessionConfig::default(), events).await;

        let revivable = seed_record(&f.records, 1, 0);
        let request = RequestParts::new().with_cookie(COOKIE, revivable.as_str());
        f.manager.session_get(&request).await.unwrap();

        let mut login = RequestParts::new();
        let session = f
            .manager
            .session_start(&mut login, &AuthUser::mock_with_id(1))
            .await
            .unwrap();

        let mut logout = RequestParts::new().with_cookie(COOKIE, session.key());
        f.manager.session_destroy(&mut logout).await.unwrap();

        let stale = f.provider.session_read(&revivable).await.unwrap();
        stale.set_access_time(Utc::now() - Duration::days(2));
        f.manager.run_gc().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "session.revived",
                "session.created",
                "session.destroyed",
                "session.expired"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_runs_on_interval() {
        let config = SessionConfig {
            session_lifetime: Duration::minutes(10),
            gc_interval: Duration::minutes(5),
            ..Default::default()
        };
        let f = fixture_with(config, EventRegistry::new()).await;

        let session = f.provider.session_init("idle").await;
        session.set_access_time(Utc::now() - Duration::hours(1));

        tokio::time::sleep(std::time::Duration::from_secs(5 * 60 + 1)).await;
        // let the sweep task run to completion
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(f.provider.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweep() {
        let f = fixture().await;
        assert!(!f.manager.is_shut_down());

        f.manager.shutdown().await;
        assert!(f.manager.is_shut_down());
        assert!(f.manager.gc_task.lock().unwrap().is_none());

        // idempotent
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_cancels_sweep() {
        let f = fixture().await;
        let cancel = f.manager.cancel.clone();
        drop(f.manager);
        assert!(cancel.is_cancelled());
    }

    struct CountingProvider {
        inner: MemoryProvider,
        sweeps: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        async fn init(&self) {
            self.inner.init().await;
        }
        async fn session_init(&self, key: &str) -> SessionRef {
            self.inner.session_init(key).await
        }
        async fn session_read(&self, key: &str) -> Option<SessionRef> {
            self.inner.session_read(key).await
        }
        async fn session_destroy(&self, key: &str) {
            self.inner.session_destroy(key).await;
        }
        async fn len(&self) -> usize {
            self.inner.len().await
        }
        async fn gc(&self, lifetime: Duration, store: &dyn SessionRecordRepository) -> GcReport {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            self.inner.gc(lifetime, store).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sweeps_after_shutdown() {
        let sweeps = Arc::new(AtomicUsize::new(0));
        let mut registry = ProviderRegistry::new();
        registry
            .register(
                "counting",
                CountingProvider {
                    inner: MemoryProvider::new(),
                    sweeps: Arc::clone(&sweeps),
                },
            )
            .await
            .unwrap();

        let config = SessionConfig {
            provider: "counting".to_owned(),
            gc_interval: Duration::seconds(1),
            ..Default::default()
        };
        let manager = SessionManager::new(
            &registry,
            config,
            MockSessionRecordRepository::new(),
            MockUserRepository::new(),
        )
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2_500)).await;
        manager.shutdown().await;
        let after_shutdown = sweeps.load(Ordering::SeqCst);
        assert!(after_shutdown >= 1);

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert_eq!(sweeps.load(Ordering::SeqCst), after_shutdown);
    }
}
