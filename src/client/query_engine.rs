use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tokio::{sync::watch, time::Instant};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::{
    adapter::{ContractAdapter, ReadCall, ReadValue},
    client::transport::{RpcTransport, TransportSet},
    constants::QUERY_RETENTION_SECS,
    error::PioneerError,
    helpers::backoff::RetryPolicy,
    registry::{ChainConfig, ChainRegistry},
    types::ChainId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReadMethod {
    HasPioneer,
    PlayerPioneer,
    // hasPioneer, then getPlayerPioneer, then getPioneerData
    PlayerRecord,
    PioneerData(U256),
    TotalSupply,
    IsMintingAvailable,
}

impl ReadMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ReadMethod::HasPioneer => "hasPioneer",
            ReadMethod::PlayerPioneer => "getPlayerPioneer",
            ReadMethod::PlayerRecord => "playerRecord",
            ReadMethod::PioneerData(_) => "getPioneerData",
            ReadMethod::TotalSupply => "totalSupply",
            ReadMethod::IsMintingAvailable => "isMintingAvailable",
        }
    }

    pub fn requires_player(&self) -> bool {
        matches!(
            self,
            ReadMethod::HasPioneer | ReadMethod::PlayerPioneer | ReadMethod::PlayerRecord
        )
    }

    fn plan(&self, player: Option<Address>) -> Option<FetchPlan> {
        let plan = match (self, player) {
            (ReadMethod::HasPioneer, Some(player)) => FetchPlan::Single(ReadCall::HasPioneer(player)),
            (ReadMethod::PlayerPioneer, Some(player)) => {
                FetchPlan::Single(ReadCall::GetPlayerPioneer(player))
            }
            (ReadMethod::PlayerRecord, Some(player)) => FetchPlan::PlayerRecord(player),
            (ReadMethod::PioneerData(token_id), _) => {
                FetchPlan::Single(ReadCall::GetPioneerData(*token_id))
            }
            (ReadMethod::TotalSupply, _) => FetchPlan::Single(ReadCall::TotalSupply),
            (ReadMethod::IsMintingAvailable, _) => FetchPlan::Single(ReadCall::IsMintingAvailable),
            _ => return None,
        };
        Some(plan)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub chain_id: ChainId,
    pub scope: Option<Address>,
    pub method: &'static str,
    pub args: String,
}

impl QueryKey {
    fn new(chain_id: ChainId, method: ReadMethod, player: Option<Address>) -> Self {
        let scope = if method.requires_player() { player } else { None };
        let args = match method {
            ReadMethod::PioneerData(token_id) => serde_json::json!([token_id]),
            _ => serde_json::json!(scope.map(|player| vec![player]).unwrap_or_default()),
        };

        Self {
            chain_id,
            scope,
            method: method.name(),
            args: args.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub status: QueryStatus,
    // Last good value; kept while re-fetching
    pub value: Option<T>,
    pub error: Option<PioneerError>,
    pub fetched_at: Option<Instant>,
}

impl<T> QueryResult<T> {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            value: None,
            error: None,
            fetched_at: None,
        }
    }

    pub fn failed(error: PioneerError) -> Self {
        Self {
            status: QueryStatus::Error,
            value: None,
            error: Some(error),
            fetched_at: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, QueryStatus::Success | QueryStatus::Error)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        QueryResult {
            status: self.status,
            value: self.value.map(f),
            error: self.error,
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> Default for QueryResult<T> {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPlan {
    Single(ReadCall),
    PlayerRecord(Address),
}

struct QueryEntry {
    sender: watch::Sender<QueryResult<ReadValue>>,
    plan: FetchPlan,
    in_flight: bool,
    // Set by an invalidation the current value has not caught up with
    stale: bool,
}

impl QueryEntry {
    fn new(plan: FetchPlan) -> Self {
        let (sender, _) = watch::channel(QueryResult::idle());
        Self {
            sender,
            plan,
            in_flight: false,
            stale: false,
        }
    }

    fn needs_fetch(&self) -> bool {
        !self.in_flight && (self.stale || self.sender.borrow().status == QueryStatus::Idle)
    }

    fn begin_fetch(&mut self) {
        self.in_flight = true;
        self.stale = false;
        self.sender.send_modify(|state| {
            state.status = QueryStatus::Loading;
        });
    }

    fn publish(&mut self, outcome: Result<ReadValue, PioneerError>) {
        self.in_flight = false;
        let now = Instant::now();
        self.sender.send_modify(|state| {
            match outcome {
                Ok(value) => {
                    state.status = QueryStatus::Success;
                    state.value = Some(value);
                    state.error = None;
                }
                Err(error) => {
                    state.status = QueryStatus::Error;
                    state.error = Some(error);
                }
            }
            state.fetched_at = Some(now);
        });
    }
}

/// A live view on one query. Dropping it (or calling [`Subscription::cancel`])
/// only detaches this subscriber.
#[derive(Debug)]
pub struct Subscription {
    key: Option<QueryKey>,
    rx: watch::Receiver<QueryResult<ReadValue>>,
}

impl Subscription {
    // Missing player: never fetches, never changes
    pub(crate) fn idle() -> Self {
        let (_, rx) = watch::channel(QueryResult::idle());
        Self { key: None, rx }
    }

    // Unserviceable chain: settled on the error from the start
    pub(crate) fn failed(error: PioneerError) -> Self {
        let (_, rx) = watch::channel(QueryResult::failed(error));
        Self { key: None, rx }
    }

    pub fn key(&self) -> Option<&QueryKey> {
        self.key.as_ref()
    }

    pub fn is_gated(&self) -> bool {
        self.key.is_none()
    }

    pub fn current(&self) -> QueryResult<ReadValue> {
        self.rx.borrow().clone()
    }

    pub async fn changed(&mut self) -> Option<QueryResult<ReadValue>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// First Success or Error state (Idle right away for gated queries).
    pub async fn settled(&mut self) -> QueryResult<ReadValue> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if current.is_settled() || self.is_gated() {
                return current;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }

    pub fn into_stream(self) -> WatchStream<QueryResult<ReadValue>> {
        WatchStream::new(self.rx)
    }

    pub fn cancel(self) {}
}

struct EngineInner {
    registry: Arc<ChainRegistry>,
    transports: TransportSet,
    retry: RetryPolicy,
    entries: Mutex<HashMap<QueryKey, QueryEntry>>,
    fetches: AtomicU64,
}

#[derive(Clone)]
pub struct QueryEngine {
    inner: Arc<EngineInner>,
}

impl QueryEngine {
    pub fn new(registry: Arc<ChainRegistry>, transports: TransportSet, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                transports,
                retry,
                entries: Mutex::new(HashMap::new()),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, QueryEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to a query, starting a fetch unless one is running or a
    /// fresh value is cached. Must be called within a tokio runtime.
    pub fn query(
        &self,
        chain_id: ChainId,
        player: Option<Address>,
        method: ReadMethod,
    ) -> Subscription {
        let plan = match method.plan(player) {
            Some(plan) if self.is_servable(chain_id) => plan,
            _ => {
                debug!(chain_id, method = method.name(), "query gated, staying idle");
                return Subscription::idle();
            }
        };

        let key = QueryKey::new(chain_id, method, player);
        let (rx, start) = {
            let mut entries = self.entries();
            Self::evict_unwatched(&mut entries, Instant::now());
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| QueryEntry::new(plan));
            let rx = entry.sender.subscribe();
            let start = entry.needs_fetch();
            if start {
                entry.begin_fetch();
            }
            (rx, start)
        };

        if start {
            self.spawn_fetch(key.clone(), plan);
        }

        Subscription { key: Some(key), rx }
    }

    /// Forces a re-fetch: immediately when someone is subscribed, otherwise on
    /// the next subscription.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let plan = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(key) else {
                return false;
            };
            Self::mark_stale(entry)
        };

        if let Some(plan) = plan {
            self.spawn_fetch(key.clone(), plan);
        }
        true
    }

    /// Invalidates the player's queries and the chain-wide queries of a chain.
    pub fn invalidate_scope(&self, chain_id: ChainId, player: Address) -> usize {
        let restart: Vec<(QueryKey, Option<FetchPlan>)> = {
            let mut entries = self.entries();
            Self::evict_unwatched(&mut entries, Instant::now());
            entries
                .iter_mut()
                .filter(|(key, _)| {
                    key.chain_id == chain_id && key.scope.is_none_or(|scope| scope == player)
                })
                .map(|(key, entry)| (key.clone(), Self::mark_stale(entry)))
                .collect()
        };

        debug!(chain_id, %player, queries = restart.len(), "invalidated read scope");

        let count = restart.len();
        for (key, plan) in restart {
            if let Some(plan) = plan {
                self.spawn_fetch(key, plan);
            }
        }
        count
    }

    // Returns the plan to fetch now, if the entry should re-fetch right away
    fn mark_stale(entry: &mut QueryEntry) -> Option<FetchPlan> {
        if !entry.in_flight && entry.sender.receiver_count() > 0 {
            entry.begin_fetch();
            Some(entry.plan)
        } else {
            entry.stale = true;
            None
        }
    }

    /// Drops cached keys nobody has watched for the retention window.
    pub fn prune(&self) -> usize {
        Self::evict_unwatched(&mut self.entries(), Instant::now())
    }

    fn evict_unwatched(entries: &mut HashMap<QueryKey, QueryEntry>, now: Instant) -> usize {
        let retention = Duration::from_secs(QUERY_RETENTION_SECS);
        let before = entries.len();
        entries.retain(|_, entry| {
            if entry.in_flight || entry.sender.receiver_count() > 0 {
                return true;
            }
            entry
                .sender
                .borrow()
                .fetched_at
                .is_some_and(|fetched_at| now.duration_since(fetched_at) < retention)
        });
        before - entries.len()
    }

    /// Number of fetches started since creation (each may retry internally).
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    pub fn cached_keys(&self) -> usize {
        self.entries().len()
    }

    fn is_servable(&self, chain_id: ChainId) -> bool {
        self.inner.registry.resolve(chain_id).is_some() && self.inner.transports.contains(chain_id)
    }

    fn spawn_fetch(&self, key: QueryKey, plan: FetchPlan) {
        let engine = self.clone();
        tokio::spawn(async move { engine.run_fetch(key, plan).await });
    }

    async fn run_fetch(self, key: QueryKey, plan: FetchPlan) {
        loop {
            self.inner.fetches.fetch_add(1, Ordering::Relaxed);
            let outcome = self.fetch_with_retry(&key, plan).await;

            let refetch = {
                let mut entries = self.entries();
                match entries.get_mut(&key) {
                    None => return,
                    Some(entry) if entry.stale => {
                        entry.stale = false;
                        true
                    }
                    Some(entry) => {
                        entry.publish(outcome);
                        false
                    }
                }
            };

            if !refetch {
                return;
            }
            debug!(chain_id = key.chain_id, method = key.method, "invalidated while in flight, fetching again");
        }
    }

    async fn fetch_with_retry(&self, key: &QueryKey, plan: FetchPlan) -> Result<ReadValue, PioneerError> {
        let config = self
            .inner
            .registry
            .resolve(key.chain_id)
            .ok_or(PioneerError::NotFound(key.chain_id))?;
        let transport = self
            .inner
            .transports
            .get(key.chain_id)
            .ok_or(PioneerError::NotFound(key.chain_id))?;

        let retry = self.inner.retry;
        let mut attempt = 0;
        loop {
            debug!(chain_id = key.chain_id, method = key.method, attempt, "fetching");
            match fetch_once(config, transport.as_ref(), plan).await {
                Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                    attempt += 1;
                    let delay = retry.delay_for(attempt);
                    warn!(
                        chain_id = key.chain_id,
                        method = key.method,
                        attempt,
                        ?delay,
                        error = %err,
                        "transient read failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

async fn fetch_once(
    config: &ChainConfig,
    transport: &dyn RpcTransport,
    plan: FetchPlan,
) -> Result<ReadValue, PioneerError> {
    let adapter = ContractAdapter::new(config);

    match plan {
        FetchPlan::Single(call) => read(adapter, transport, &call).await,
        FetchPlan::PlayerRecord(player) => {
            let has_pioneer = read(adapter, transport, &ReadCall::HasPioneer(player))
                .await?
                .as_flag()
                .unwrap_or(false);
            if !has_pioneer {
                return Ok(ReadValue::Record(None));
            }

            let token_id = read(adapter, transport, &ReadCall::GetPlayerPioneer(player))
                .await?
                .as_token_id()
                .flatten();
            match token_id {
                Some(token_id) => {
                    read(adapter, transport, &ReadCall::GetPioneerData(token_id)).await
                }
                None => Ok(ReadValue::Record(None)),
            }
        }
    }
}

async fn read(
    adapter: ContractAdapter<'_>,
    transport: &dyn RpcTransport,
    call: &ReadCall,
) -> Result<ReadValue, PioneerError> {
    let descriptor = adapter.encode_read(call)?;
    let data = transport.call(&descriptor.call_request()).await?;
    adapter.decode_read(call, &data)
}
