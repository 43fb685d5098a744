//! Cached, de-duplicated access to the MCP registry for interactive consumers.
//!
//! The whole registry lives under one cache key. Reads share an in-flight
//! fetch; every mutation that reached the registry bumps the cache generation
//! and notifies subscribers through a `watch` channel.

use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::app_config::{AppType, McpApps, McpServer};
use crate::error::AppError;
use crate::services::{ConfigSnippetService, DeleteOutcome, McpService, UpsertOutcome};
use crate::store::AppState;

/// Cache key of the registry snapshot
pub const MCP_SERVERS_KEY: &str = "mcp-servers";

pub type RegistrySnapshot = Arc<IndexMap<String, McpServer>>;

type SharedFetch = Shared<BoxFuture<'static, Result<RegistrySnapshot, Arc<AppError>>>>;

#[derive(Default)]
struct CacheEntry {
    generation: u64,
    value: Option<RegistrySnapshot>,
    in_flight: Option<(u64, SharedFetch)>,
}

struct Inner {
    state: AppState,
    cache: Mutex<CacheEntry>,
    changed: watch::Sender<u64>,
    fetches: AtomicUsize,
}

impl Inner {
    fn cache(&self) -> MutexGuard<'_, CacheEntry> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate(&self) {
        let generation = {
            let mut cache = self.cache();
            cache.generation += 1;
            cache.value = None;
            cache.in_flight = None;
            cache.generation
        };
        self.changed.send_replace(generation);
        log::debug!("缓存 '{MCP_SERVERS_KEY}' 已失效 (generation {generation})");
    }
}

/// Whether a mutation result means the registry may have changed
fn reached_registry<T>(result: &Result<T, AppError>) -> bool {
    matches!(result, Ok(_) | Err(AppError::PartialFailure(_)))
}

#[derive(Clone)]
pub struct McpQueryClient {
    inner: Arc<Inner>,
}

impl McpQueryClient {
    pub fn new(state: AppState) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state,
                cache: Mutex::new(CacheEntry::default()),
                changed,
                fetches: AtomicUsize::new(0),
            }),
        }
    }

    /// Receives the new cache generation after every invalidation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    /// Number of registry reads started so far
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    fn start_fetch(&self) -> SharedFetch {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.inner.state.clone();
        async move {
            let servers = tokio::task::spawn_blocking(move || state.db.get_all_mcp_servers())
                .await
                .map_err(|e| Arc::new(AppError::Message(format!("读取 MCP 列表失败: {e}"))))?;
            servers.map(Arc::new).map_err(Arc::new)
        }
        .boxed()
        .shared()
    }

    /// Registry snapshot; served from cache or from the fetch already in flight
    pub async fn list_servers(&self) -> Result<RegistrySnapshot, AppError> {
        let (generation, fetch) = {
            let mut cache = self.inner.cache();
            if let Some(value) = &cache.value {
                return Ok(value.clone());
            }
            let generation = cache.generation;
            let pending = cache
                .in_flight
                .as_ref()
                .filter(|(g, _)| *g == generation)
                .map(|(_, fetch)| fetch.clone());
            let fetch = match pending {
                Some(fetch) => fetch,
                None => {
                    let fetch = self.start_fetch();
                    cache.in_flight = Some((generation, fetch.clone()));
                    fetch
                }
            };
            (generation, fetch)
        };

        let result = fetch.await;

        {
            let mut cache = self.inner.cache();
            // A fetch overtaken by an invalidation is returned but never cached
            if cache.generation == generation {
                cache.in_flight = None;
                if let Ok(value) = &result {
                    cache.value = Some(value.clone());
                }
            }
        }

        result.map_err(|e| AppError::Message(e.to_string()))
    }

    /// Run a blocking mutation to completion on the blocking pool.
    ///
    /// Invalidation happens on the blocking thread as well, so dropping the
    /// returned future neither aborts the propagation nor skips the refresh.
    async fn mutate<T, F>(&self, always_invalidate: bool, op: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&AppState) -> Result<T, AppError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let result = op(&inner.state);
            if always_invalidate || reached_registry(&result) {
                inner.invalidate();
            }
            result
        })
        .await
        .map_err(|e| AppError::Message(format!("后台任务失败: {e}")))?
    }

    pub async fn upsert_server(&self, candidate: Value) -> Result<UpsertOutcome, AppError> {
        self.mutate(false, move |state| McpService::upsert_server(state, &candidate))
            .await
    }

    pub async fn set_app_enabled(
        &self,
        id: impl Into<String>,
        app: AppType,
        enabled: bool,
    ) -> Result<McpApps, AppError> {
        let id = id.into();
        self.mutate(false, move |state| {
            McpService::toggle_app(state, &id, app, enabled)
        })
        .await
    }

    pub async fn delete_server(&self, id: impl Into<String>) -> Result<DeleteOutcome, AppError> {
        let id = id.into();
        self.mutate(false, move |state| McpService::delete_server(state, &id))
            .await
    }

    /// Imports may insert rows before failing, so they always invalidate
    pub async fn import_from_app(&self, app: AppType) -> Result<usize, AppError> {
        self.mutate(true, move |state| McpService::import_from_app(state, app))
            .await
    }

    pub async fn sync_app(&self, app: AppType) -> Result<usize, AppError> {
        let state = self.inner.state.clone();
        tokio::task::spawn_blocking(move || McpService::sync_app(&state, app))
            .await
            .map_err(|e| AppError::Message(format!("后台任务失败: {e}")))?
    }

    pub async fn allocate_id(&self, name: impl Into<String>) -> Result<String, AppError> {
        let state = self.inner.state.clone();
        let name = name.into();
        tokio::task::spawn_blocking(move || McpService::allocate_id(&state, &name))
            .await
            .map_err(|e| AppError::Message(format!("后台任务失败: {e}")))?
    }

    pub async fn read_snippet(&self, app: AppType) -> Result<Option<String>, AppError> {
        let state = self.inner.state.clone();
        tokio::task::spawn_blocking(move || ConfigSnippetService::read(&state, app))
            .await
            .map_err(|e| AppError::Message(format!("后台任务失败: {e}")))?
    }

    pub async fn write_snippet(
        &self,
        app: AppType,
        text: impl Into<String>,
    ) -> Result<Option<String>, AppError> {
        let state = self.inner.state.clone();
        let text = text.into();
        tokio::task::spawn_blocking(move || ConfigSnippetService::write(&state, app, &text))
            .await
            .map_err(|e| AppError::Message(format!("后台任务失败: {e}")))?
    }
}
