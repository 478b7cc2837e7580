//! Generic signed-data cache.
//!
//! A [`SignedCache`] owns one [`Snapshot`] and decides when to go to the
//! network. A refresh first fetches the detached signature; the payload is
//! only downloaded when the verified hash differs from the cached one.
//!
//! Concurrent refreshes are not serialized. Each may hit the network and
//! each installs its own result; the last install wins. The snapshot lock is
//! never held across an await point.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{DateService, SystemDateService};
use crate::client::RemoteFetcher;
use crate::error::{CacheError, CacheResult};
use crate::policy;
use crate::settings::{self, SettingsStore};
use crate::snapshot::{SignedData, Snapshot};
use crate::store::EncryptedStore;
use crate::types::CacheConfig;

/// Callback run with the payload whenever the snapshot changes.
pub type UpdateHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Builder for [`SignedCache`].
pub struct SignedCacheBuilder<T: SignedData> {
    config: CacheConfig,
    fetcher: Arc<dyn RemoteFetcher>,
    store: EncryptedStore,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn DateService>,
    on_update: Option<UpdateHook<T>>,
}

impl<T: SignedData> SignedCacheBuilder<T> {
    /// Use `clock` instead of the system clock.
    pub fn with_date_service(mut self, clock: Arc<dyn DateService>) -> Self {
        self.clock = clock;
        self
    }

    /// Run `hook` after loading and after every install.
    pub fn on_update(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(hook));
        self
    }

    /// Load the persisted snapshot and start one background refresh.
    ///
    /// Never fails: an unreadable or undecodable blob starts the cache empty,
    /// and background refresh errors are only logged. Must be called from
    /// within a tokio runtime.
    pub async fn open(self) -> SignedCache<T> {
        let ids = &self.config.storage;
        self.store.migrate_legacy(ids).await;

        let mut snapshot = match self.store.load(ids).await {
            Some(bytes) => Snapshot::<T>::from_bytes(&bytes).unwrap_or_else(|e| {
                warn!(dataset = %ids.blob_name, error = %e, "discarding persisted snapshot");
                Snapshot::empty()
            }),
            None => Snapshot::empty(),
        };
        if snapshot.has_data() {
            if let Some(at) =
                settings::load_timestamp(self.settings.as_ref(), &self.config.last_update_key).await
            {
                snapshot.last_update = at;
            }
        }
        debug!(
            dataset = %ids.blob_name,
            has_data = snapshot.has_data(),
            last_update = %snapshot.last_update,
            "opened signed cache"
        );

        if let Some(hook) = &self.on_update {
            hook(&snapshot.payload);
        }

        let cache = SignedCache {
            inner: Arc::new(Inner {
                config: self.config,
                fetcher: self.fetcher,
                store: self.store,
                settings: self.settings,
                clock: RwLock::new(self.clock),
                state: RwLock::new(snapshot),
                on_update: self.on_update,
                initial_refresh: Mutex::new(None),
            }),
        };

        let background = cache.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = background.refresh(false).await {
                warn!(dataset = %background.name(), error = %e, "background refresh failed");
            }
        });
        *lock_mutex(&cache.inner.initial_refresh) = Some(handle);

        cache
    }
}

struct Inner<T: SignedData> {
    config: CacheConfig,
    fetcher: Arc<dyn RemoteFetcher>,
    store: EncryptedStore,
    settings: Arc<dyn SettingsStore>,
    clock: RwLock<Arc<dyn DateService>>,
    state: RwLock<Snapshot<T>>,
    on_update: Option<UpdateHook<T>>,
    initial_refresh: Mutex<Option<JoinHandle<()>>>,
}

/// Cache of one signed dataset. Cheap to clone; clones share state.
pub struct SignedCache<T: SignedData> {
    inner: Arc<Inner<T>>,
}

impl<T: SignedData> Clone for SignedCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SignedData> fmt::Debug for SignedCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("SignedCache")
            .field("dataset", &self.name())
            .field("has_data", &state.has_data())
            .field("last_update", &state.last_update)
            .finish()
    }
}

impl<T: SignedData> SignedCache<T> {
    /// Start building a cache for `config`.
    pub fn builder(
        config: CacheConfig,
        fetcher: Arc<dyn RemoteFetcher>,
        store: EncryptedStore,
        settings: Arc<dyn SettingsStore>,
    ) -> SignedCacheBuilder<T> {
        SignedCacheBuilder {
            config,
            fetcher,
            store,
            settings,
            clock: Arc::new(SystemDateService),
            on_update: None,
        }
    }

    /// Dataset name (the blob name).
    pub fn name(&self) -> &str {
        &self.inner.config.storage.blob_name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn state(&self) -> RwLockReadGuard<'_, Snapshot<T>> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, Snapshot<T>> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.date_service().now()
    }

    /// Current clock.
    pub fn date_service(&self) -> Arc<dyn DateService> {
        self.inner
            .clock
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap the clock used for all later decisions.
    pub fn update_date_service(&self, clock: Arc<dyn DateService>) {
        *self.inner.clock.write().unwrap_or_else(|e| e.into_inner()) = clock;
    }

    /// Wait for the refresh started by `open` to finish.
    pub async fn settled(&self) {
        let handle = lock_mutex(&self.inner.initial_refresh).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(dataset = %self.name(), error = %e, "background refresh task failed");
            }
        }
    }

    /// Refresh if due (always when `force`).
    ///
    /// Errors leave the snapshot untouched.
    pub async fn refresh(&self, force: bool) -> CacheResult<()> {
        let config = &self.inner.config;
        let (last_update, has_data) = {
            let state = self.state();
            (state.last_update, state.has_data())
        };

        let now = self.now();
        if !policy::is_refresh_due(last_update, config.update_interval, force, has_data, now) {
            debug!(dataset = %self.name(), "skipping data update");
            return Ok(());
        }

        let hash = self.inner.fetcher.fetch_verified_hash(now).await?;
        let unchanged = self.state().hash == hash;
        if unchanged {
            debug!(dataset = %self.name(), "signature unchanged, payload not downloaded");
            self.mark_checked().await;
            return Ok(());
        }

        let body = self.inner.fetcher.fetch_payload().await?;
        let payload = T::decode(&body).and_then(|payload| {
            if payload.is_empty() {
                return Err(CacheError::Decode {
                    message: "downloaded payload contains no data".to_string(),
                });
            }
            Ok(payload)
        });
        let payload = payload.map_err(|e| {
            error!(dataset = %self.name(), error = %e, "cannot decode downloaded payload");
            e
        })?;
        self.install(payload, hash).await;
        Ok(())
    }

    /// Refresh now regardless of freshness; errors are returned as they are.
    pub async fn force_refresh(&self) -> CacheResult<()> {
        self.refresh(true).await.map_err(|e| {
            error!(dataset = %self.name(), error = %e, "cannot refresh data");
            e
        })
    }

    /// Best-effort refresh, then fail with [`CacheError::DataExpired`] if the
    /// snapshot is past its maximum age.
    pub async fn ensure_current(&self) -> CacheResult<()> {
        self.refresh_best_effort().await;
        self.check_expiry(self.state().last_update)
    }

    /// Current payload (see [`ensure_current`](Self::ensure_current)).
    pub async fn read(&self) -> CacheResult<T> {
        self.read_with(T::clone).await
    }

    /// Like [`read`](Self::read), but borrows the payload instead of cloning.
    pub async fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> CacheResult<R> {
        self.refresh_best_effort().await;
        let state = self.state();
        self.check_expiry(state.last_update)?;
        Ok(f(&state.payload))
    }

    async fn refresh_best_effort(&self) {
        if let Err(e) = self.refresh(false).await {
            warn!(dataset = %self.name(), error = %e, "cannot refresh data, serving cached snapshot");
        }
    }

    fn check_expiry(&self, last_update: DateTime<Utc>) -> CacheResult<()> {
        let maximum_age = self.inner.config.maximum_age;
        if policy::is_expired(last_update, maximum_age, self.now()) {
            return Err(CacheError::DataExpired {
                expired_at: policy::expiration_date(last_update, maximum_age),
            });
        }
        Ok(())
    }

    /// Signature confirmed the cached payload: only the timestamp moves.
    ///
    /// The persisted timestamp never gets ahead of the blob on disk: a
    /// snapshot whose earlier write failed is written again first.
    async fn mark_checked(&self) {
        let now = self.now();
        let unsaved = {
            let mut state = self.state_mut();
            state.last_update = now;
            (!state.persisted).then(|| (state.hash.clone(), state.to_bytes()))
        };
        if let Some((hash, encoded)) = unsaved {
            if !self.persist_snapshot(&hash, encoded).await {
                warn!(dataset = %self.name(), "snapshot still not stored, last update kept");
                return;
            }
        }
        self.persist_timestamp(now).await;
    }

    async fn install(&self, payload: T, hash: Vec<u8>) {
        let now = self.now();
        let snapshot = Snapshot {
            payload,
            hash,
            last_update: now,
            persisted: false,
        };
        let encoded = snapshot.to_bytes();
        let hash = snapshot.hash.clone();
        *self.state_mut() = snapshot;
        info!(dataset = %self.name(), "installed new snapshot");

        if self.persist_snapshot(&hash, encoded).await {
            self.persist_timestamp(now).await;
        }

        if let Some(hook) = &self.inner.on_update {
            hook(&self.state().payload);
        }
    }

    /// Write `encoded`; on success the in-memory snapshot counts as stored if
    /// it still carries `hash`.
    async fn persist_snapshot(&self, hash: &[u8], encoded: CacheResult<Vec<u8>>) -> bool {
        let saved = match encoded {
            Ok(bytes) => self.inner.store.save(&self.inner.config.storage, &bytes).await,
            Err(e) => {
                error!(dataset = %self.name(), error = %e, "cannot encode data for storing");
                false
            }
        };
        if saved {
            let mut state = self.state_mut();
            if state.hash == hash {
                state.persisted = true;
            }
        }
        saved
    }

    async fn persist_timestamp(&self, at: DateTime<Utc>) {
        let key = &self.inner.config.last_update_key;
        if let Err(e) = settings::store_timestamp(self.inner.settings.as_ref(), key, at).await {
            warn!(dataset = %self.name(), key = %key, error = %e, "cannot persist last update");
        }
    }

    /// Last successful signature check (or install).
    pub fn last_update(&self) -> DateTime<Utc> {
        self.state().last_update
    }

    /// Instant after which reads fail with [`CacheError::DataExpired`].
    pub fn expiration_date(&self) -> DateTime<Utc> {
        policy::expiration_date(self.last_update(), self.inner.config.maximum_age)
    }

    pub fn is_expired(&self) -> bool {
        policy::is_expired(self.last_update(), self.inner.config.maximum_age, self.now())
    }

    pub fn has_data(&self) -> bool {
        self.state().has_data()
    }

    /// Content hash of the cached payload (empty before the first install).
    pub fn snapshot_hash(&self) -> Vec<u8> {
        self.state().hash.clone()
    }
}

fn lock_mutex<V>(mutex: &Mutex<V>) -> std::sync::MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
