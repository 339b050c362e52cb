use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{Address, TxHash, U256};
use anyhow::{Result, bail};
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::{
    adapter::{ContractAdapter, WriteCall},
    client::{
        query_engine::QueryEngine,
        transport::{RpcTransport, Signer, TransactionReceipt, TransactionRequest, TransportSet},
    },
    constants::EVENT_CHANNEL_CAPACITY,
    error::PioneerError,
    helpers::events::{receipt_outcome, transition_event},
    registry::{ChainConfig, ChainRegistry, GasPolicy},
    types::{ChainId, event::TransactionEvent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TxStatus {
    Building,
    Submitted,
    Pending,
    Confirmed,
    Failed,
    // Not included before the chain's timeout; may still land later
    TimedOut,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Confirmed | TxStatus::Failed | TxStatus::TimedOut
        )
    }

    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        use TxStatus::*;
        matches!(
            (self, next),
            (Building, Submitted)
                | (Building, Failed)
                | (Submitted, Pending)
                | (Pending, Confirmed)
                | (Pending, Failed)
                | (Pending, TimedOut)
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionHandle {
    pub id: u64,
    pub chain_id: ChainId,
    pub method: &'static str,
    pub args: String,
    pub player: Address,
    pub hash: Option<TxHash>,
    pub status: TxStatus,
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
    pub submitted_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub receipt: Option<TransactionReceipt>,
    pub error: Option<PioneerError>,
}

impl TransactionHandle {
    fn new(id: u64, chain_id: ChainId, call: &WriteCall, player: Address) -> Self {
        Self {
            id,
            chain_id,
            method: call.name(),
            args: serde_json::to_string(call).unwrap_or_default(),
            player,
            hash: None,
            status: TxStatus::Building,
            gas_price: None,
            gas_limit: None,
            submitted_at: None,
            finished_at: None,
            receipt: None,
            error: None,
        }
    }

    /// Moves to `next`, refusing anything that is not a forward edge of the
    /// lifecycle.
    pub fn transition(&mut self, next: TxStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            bail!(
                "Invalid transition {} -> {} for transaction {}",
                self.status,
                next,
                self.id
            );
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Instant::now());
        }
        Ok(())
    }

    pub fn elapsed(&self) -> Option<Duration> {
        Some(self.finished_at?.duration_since(self.submitted_at?))
    }
}

#[derive(Debug, Clone)]
pub struct TransactionTracker {
    id: u64,
    rx: watch::Receiver<TransactionHandle>,
}

impl TransactionTracker {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn current(&self) -> TransactionHandle {
        self.rx.borrow().clone()
    }

    pub async fn changed(&mut self) -> Option<TransactionHandle> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Terminal state, or the last known one if tracking stopped first.
    pub async fn wait_terminal(&mut self) -> TransactionHandle {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if current.status.is_terminal() {
                return current;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}

struct Tracked {
    sender: watch::Sender<TransactionHandle>,
    task: Option<JoinHandle<()>>,
}

struct ManagerInner {
    registry: Arc<ChainRegistry>,
    transports: TransportSet,
    signer: Arc<dyn Signer>,
    queries: QueryEngine,
    events: broadcast::Sender<TransactionEvent>,
    tracked: Mutex<HashMap<u64, Tracked>>,
    next_id: AtomicU64,
    retention: Duration,
}

#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl TransactionManager {
    pub fn new(
        registry: Arc<ChainRegistry>,
        transports: TransportSet,
        signer: Arc<dyn Signer>,
        queries: QueryEngine,
        retention: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                registry,
                transports,
                signer,
                queries,
                events,
                tracked: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                retention,
            }),
        }
    }

    fn tracked(&self) -> MutexGuard<'_, HashMap<u64, Tracked>> {
        self.inner
            .tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds, signs and submits `call` on `chain_id`.
    ///
    /// Fails only when the chain is unknown. Any later problem is reported
    /// through the returned tracker, which may already be `Failed`.
    pub async fn submit(
        &self,
        chain_id: ChainId,
        call: WriteCall,
    ) -> Result<TransactionTracker, PioneerError> {
        self.prune();

        let config = self
            .inner
            .registry
            .resolve(chain_id)
            .cloned()
            .ok_or(PioneerError::NotFound(chain_id))?;
        let transport = self
            .inner
            .transports
            .get(chain_id)
            .ok_or(PioneerError::NotFound(chain_id))?;

        let sender = self.inner.signer.address();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TransactionHandle::new(id, chain_id, &call, call.player(sender));
        let event = transition_event(&handle, None);

        let (tx, rx) = watch::channel(handle);
        self.tracked().insert(
            id,
            Tracked {
                sender: tx,
                task: None,
            },
        );
        let _ = self.inner.events.send(event);
        debug!(handle_id = id, chain_id, method = call.name(), "building transaction");

        match self.build_and_send(&config, transport.as_ref(), &call, sender).await {
            Err(error) => {
                self.advance(id, TxStatus::Failed, |handle| handle.error = Some(error));
            }
            Ok((hash, request)) => {
                let submitted_at = Instant::now();
                self.advance(id, TxStatus::Submitted, |handle| {
                    handle.hash = Some(hash);
                    handle.gas_price = Some(request.gas_price);
                    handle.gas_limit = request.gas_limit;
                    handle.submitted_at = Some(submitted_at);
                });

                let manager = self.clone();
                let player = call.player(sender);
                let task = tokio::spawn(async move {
                    manager
                        .track(id, chain_id, player, hash, config.gas_policy, transport, submitted_at)
                        .await
                });
                if let Some(entry) = self.tracked().get_mut(&id) {
                    entry.task = Some(task);
                }
            }
        }

        Ok(TransactionTracker { id, rx })
    }

    async fn build_and_send(
        &self,
        config: &ChainConfig,
        transport: &dyn RpcTransport,
        call: &WriteCall,
        sender: Address,
    ) -> Result<(TxHash, TransactionRequest), PioneerError> {
        let descriptor = ContractAdapter::new(config).encode_write(call, sender)?;

        let connected = self.inner.signer.chain_id();
        if connected != config.chain_id {
            return Err(PioneerError::WrongNetwork {
                expected: config.chain_id,
                actual: connected,
            });
        }

        let quoted = transport.gas_price().await?;
        let request = TransactionRequest {
            chain_id: config.chain_id,
            from: sender,
            to: descriptor.to,
            data: descriptor.data,
            value: U256::ZERO,
            gas_price: config.gas_policy.apply_price(quoted),
            gas_limit: config.gas_policy.gas_limit_override,
        };

        let hash = self.inner.signer.sign_and_submit(request.clone()).await?;
        info!(
            chain_id = config.chain_id,
            method = descriptor.signature,
            %hash,
            gas_price = request.gas_price,
            "transaction submitted"
        );
        Ok((hash, request))
    }

    #[allow(clippy::too_many_arguments)]
    async fn track(
        self,
        id: u64,
        chain_id: ChainId,
        player: Address,
        hash: TxHash,
        policy: GasPolicy,
        transport: Arc<dyn RpcTransport>,
        submitted_at: Instant,
    ) {
        if !self.advance(id, TxStatus::Pending, |_| {}) {
            return;
        }

        let deadline = submitted_at + policy.timeout();
        let polled =
            tokio::time::timeout_at(deadline, poll_receipt(id, transport.as_ref(), hash, policy.poll_interval()))
                .await;

        match polled {
            Ok(receipt) => {
                let (status, error) = receipt_outcome(&receipt);
                if status == TxStatus::Confirmed {
                    self.inner.queries.invalidate_scope(chain_id, player);
                }
                self.advance(id, status, |handle| {
                    handle.receipt = Some(receipt);
                    handle.error = error;
                });
            }
            Err(_) => {
                warn!(handle_id = id, chain_id, %hash, timeout_ms = policy.timeout_ms, "transaction not included in time");
                self.advance(id, TxStatus::TimedOut, |handle| {
                    handle.error = Some(PioneerError::TimedOut {
                        after_ms: policy.timeout_ms,
                    });
                });
            }
        }
    }

    // Applies one transition to a tracked handle, then broadcasts it. Returns
    // false when the handle is gone or the transition is refused.
    fn advance(&self, id: u64, next: TxStatus, apply: impl FnOnce(&mut TransactionHandle)) -> bool {
        let event = {
            let tracked = self.tracked();
            let Some(entry) = tracked.get(&id) else {
                debug!(handle_id = id, %next, "transition for an untracked handle dropped");
                return false;
            };

            let mut event = None;
            entry.sender.send_if_modified(|handle| {
                let from = handle.status;
                if let Err(err) = handle.transition(next) {
                    warn!(handle_id = id, error = %err, "transition rejected");
                    return false;
                }
                apply(handle);
                event = Some(transition_event(handle, Some(from)));
                true
            });
            event
        };

        let Some(event) = event else {
            return false;
        };
        if event.is_terminal() {
            info!(handle_id = id, chain_id = event.chain_id, status = %event.status, error = ?event.error, "transaction finished");
        } else {
            debug!(handle_id = id, chain_id = event.chain_id, status = %event.status, "transaction advanced");
        }
        let _ = self.inner.events.send(event);
        true
    }

    pub fn events(&self) -> BroadcastStream<TransactionEvent> {
        BroadcastStream::new(self.inner.events.subscribe())
    }

    pub fn handle(&self, id: u64) -> Option<TransactionHandle> {
        self.tracked().get(&id).map(|entry| entry.sender.borrow().clone())
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked().len()
    }

    /// Stops tracking a terminal handle. Returns false for unknown or still
    /// running handles.
    pub fn acknowledge(&self, id: u64) -> bool {
        let mut tracked = self.tracked();
        let terminal = tracked
            .get(&id)
            .is_some_and(|entry| entry.sender.borrow().status.is_terminal());
        if terminal {
            tracked.remove(&id);
        }
        terminal
    }

    /// Stops tracking locally, aborting the poll task. The transaction itself
    /// is not cancelled on chain.
    pub fn abandon(&self, id: u64) -> bool {
        let Some(entry) = self.tracked().remove(&id) else {
            return false;
        };
        if let Some(task) = entry.task {
            task.abort();
        }
        debug!(handle_id = id, "transaction abandoned");
        true
    }

    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let retention = self.inner.retention;
        let mut tracked = self.tracked();
        let before = tracked.len();
        tracked.retain(|_, entry| {
            let handle = entry.sender.borrow();
            match handle.finished_at {
                Some(finished_at) => now.duration_since(finished_at) < retention,
                None => true,
            }
        });
        before - tracked.len()
    }
}

// Sequential receipt polls, one per interval, until the transaction is included
async fn poll_receipt(
    id: u64,
    transport: &dyn RpcTransport,
    hash: TxHash,
    interval: Duration,
) -> TransactionReceipt {
    let mut polls = 0u32;
    loop {
        tokio::time::sleep(interval).await;
        polls += 1;
        match transport.get_receipt(hash).await {
            Ok(Some(receipt)) => return receipt,
            Ok(None) => debug!(handle_id = id, %hash, polls, "not included yet"),
            Err(err) => warn!(handle_id = id, %hash, polls, error = %err, "receipt poll failed"),
        }
    }
}
