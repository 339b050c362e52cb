use std::{sync::Arc, time::Duration};

use alloy_primitives::Address;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::{
    adapter::{PioneerAction, ReadValue, WriteCall},
    client::{
        query_engine::{QueryEngine, QueryResult, QueryStatus, ReadMethod, Subscription},
        transport::{Signer, TransportSet},
        tx_manager::{TransactionManager, TransactionTracker},
    },
    constants::HANDLE_RETENTION_SECS,
    error::PioneerError,
    helpers::backoff::RetryPolicy,
    registry::{ChainConfig, ChainRegistry},
    types::{ChainId, PioneerStatus, PioneerType, event::TransactionEvent},
};

/// The four reads behind a [`PioneerStatus`], fetched in parallel.
#[derive(Debug)]
pub struct StatusSubscription {
    has_pioneer: Subscription,
    record: Subscription,
    minting_available: Subscription,
    total_supply: Subscription,
}

impl StatusSubscription {
    fn gated() -> Self {
        Self {
            has_pioneer: Subscription::idle(),
            record: Subscription::idle(),
            minting_available: Subscription::idle(),
            total_supply: Subscription::idle(),
        }
    }

    fn unavailable(chain_id: ChainId) -> Self {
        let failed = || Subscription::failed(PioneerError::NotFound(chain_id));
        Self {
            has_pioneer: failed(),
            record: failed(),
            minting_available: failed(),
            total_supply: failed(),
        }
    }

    pub fn current(&self) -> QueryResult<PioneerStatus> {
        combine([
            &self.has_pioneer.current(),
            &self.record.current(),
            &self.minting_available.current(),
            &self.total_supply.current(),
        ])
    }

    pub async fn settled(&mut self) -> QueryResult<PioneerStatus> {
        let (has_pioneer, record, minting_available, total_supply) = tokio::join!(
            self.has_pioneer.settled(),
            self.record.settled(),
            self.minting_available.settled(),
            self.total_supply.settled(),
        );
        combine([&has_pioneer, &record, &minting_available, &total_supply])
    }
}

// Parts: hasPioneer, player record, isMintingAvailable, totalSupply
fn combine(parts: [&QueryResult<ReadValue>; 4]) -> QueryResult<PioneerStatus> {
    if let Some(error) = parts
        .iter()
        .find(|part| part.status == QueryStatus::Error)
        .and_then(|part| part.error.clone())
    {
        return QueryResult::failed(error);
    }

    let status = if parts.iter().all(|part| part.status == QueryStatus::Success) {
        QueryStatus::Success
    } else if parts.iter().all(|part| part.status == QueryStatus::Idle) {
        QueryStatus::Idle
    } else {
        QueryStatus::Loading
    };

    let [has_pioneer, record, minting_available, total_supply] = parts;
    let value = (|| {
        let has_pioneer = has_pioneer.value.as_ref()?.as_flag()?;
        // A record is only meaningful for a current holder
        let record = record
            .value
            .as_ref()?
            .as_record()?
            .filter(|_| has_pioneer)
            .cloned();
        Some(PioneerStatus {
            has_pioneer,
            record,
            minting_available: minting_available.value.as_ref()?.as_flag()?,
            total_supply: total_supply.value.as_ref()?.as_uint()?,
        })
    })();

    QueryResult {
        status,
        value,
        error: None,
        fetched_at: parts.iter().filter_map(|part| part.fetched_at).max(),
    }
}

pub struct PioneerService {
    registry: Arc<ChainRegistry>,
    transports: TransportSet,
    signer: Arc<dyn Signer>,
    retry: RetryPolicy,
    retention: Duration,
    queries: QueryEngine,
    transactions: TransactionManager,
}

impl PioneerService {
    pub fn new(registry: ChainRegistry, transports: TransportSet, signer: Arc<dyn Signer>) -> Self {
        Self::assemble(
            Arc::new(registry),
            transports,
            signer,
            RetryPolicy::default(),
            Duration::from_secs(HANDLE_RETENTION_SECS),
        )
    }

    fn assemble(
        registry: Arc<ChainRegistry>,
        transports: TransportSet,
        signer: Arc<dyn Signer>,
        retry: RetryPolicy,
        retention: Duration,
    ) -> Self {
        let queries = QueryEngine::new(registry.clone(), transports.clone(), retry);
        let transactions = TransactionManager::new(
            registry.clone(),
            transports.clone(),
            signer.clone(),
            queries.clone(),
            retention,
        );

        Self {
            registry,
            transports,
            signer,
            retry,
            retention,
            queries,
            transactions,
        }
    }

    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        Self::assemble(self.registry, self.transports, self.signer, retry, self.retention)
    }

    pub fn with_retention(self, retention: Duration) -> Self {
        Self::assemble(self.registry, self.transports, self.signer, self.retry, retention)
    }

    pub fn resolve(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.registry.resolve(chain_id)
    }

    pub fn queries(&self) -> &QueryEngine {
        &self.queries
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    fn is_servable(&self, chain_id: ChainId) -> bool {
        self.registry.resolve(chain_id).is_some() && self.transports.contains(chain_id)
    }

    /// Starts (or joins) the four status reads. Chains without a contract or
    /// transport settle on `Error(NotFound)`; without a player nothing is
    /// fetched and the subscription stays idle.
    pub fn watch_status(&self, chain_id: ChainId, player: Option<Address>) -> StatusSubscription {
        if !self.is_servable(chain_id) {
            warn!(chain_id, "status watched on an unsupported chain");
            return StatusSubscription::unavailable(chain_id);
        }
        let Some(player) = player else {
            return StatusSubscription::gated();
        };

        StatusSubscription {
            has_pioneer: self.queries.query(chain_id, Some(player), ReadMethod::HasPioneer),
            record: self.queries.query(chain_id, Some(player), ReadMethod::PlayerRecord),
            minting_available: self
                .queries
                .query(chain_id, Some(player), ReadMethod::IsMintingAvailable),
            total_supply: self.queries.query(chain_id, Some(player), ReadMethod::TotalSupply),
        }
    }

    pub async fn status(
        &self,
        chain_id: ChainId,
        player: Option<Address>,
    ) -> QueryResult<PioneerStatus> {
        self.watch_status(chain_id, player).settled().await
    }

    pub async fn mint(
        &self,
        chain_id: ChainId,
        pioneer_type: PioneerType,
        player: Address,
    ) -> Result<TransactionTracker, PioneerError> {
        self.transactions
            .submit(
                chain_id,
                WriteCall::MintPioneer {
                    pioneer_type,
                    player,
                },
            )
            .await
    }

    pub async fn action(
        &self,
        chain_id: ChainId,
        action: PioneerAction,
    ) -> Result<TransactionTracker, PioneerError> {
        self.transactions
            .submit(chain_id, WriteCall::Action(action))
            .await
    }

    pub fn player(&self) -> Address {
        self.signer.address()
    }

    pub fn transaction_events(&self) -> BroadcastStream<TransactionEvent> {
        self.transactions.events()
    }

    pub fn acknowledge(&self, id: u64) -> bool {
        self.transactions.acknowledge(id)
    }

    pub fn abandon(&self, id: u64) -> bool {
        self.transactions.abandon(id)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;
    use crate::{
        client::tx_manager::TxStatus,
        testing::{FakeNetwork, player},
        types::Variant,
    };

    const BASE: ChainId = 84532;
    const LOCAL: ChainId = 31337;

    fn service(network: &FakeNetwork) -> PioneerService {
        PioneerService::new(
            network.registry.clone(),
            network.transports.clone(),
            network.wallet.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_of_unknown_chain_is_not_found() {
        let network = FakeNetwork::builtin(BASE);
        let svc = service(&network);

        let result = svc.status(1, Some(player(0xaa))).await;
        assert_eq!(result.status, QueryStatus::Error);
        assert_eq!(result.error, Some(PioneerError::NotFound(1)));
        assert_eq!(svc.queries().fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_status_of_unknown_chain_is_not_found() {
        let network = FakeNetwork::builtin(BASE);
        let svc = service(&network);

        for watched in [Some(player(0xaa)), None] {
            let mut watch = svc.watch_status(1, watched);
            assert_eq!(watch.current().status, QueryStatus::Error);

            let result = watch.settled().await;
            assert_eq!(result.status, QueryStatus::Error);
            assert_eq!(result.error, Some(PioneerError::NotFound(1)));
            assert_eq!(result.value, None);
        }
        assert_eq!(svc.queries().fetch_count(), 0);
        assert_eq!(svc.queries().cached_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_events_follow_a_mint() {
        use tokio_stream::StreamExt;

        let network = FakeNetwork::builtin(BASE);
        let svc = service(&network);
        let mut events = svc.transaction_events();

        let mut tracker = svc.mint(BASE, PioneerType::Explorer, svc.player()).await.unwrap();
        let handle = tracker.wait_terminal().await;
        assert_eq!(handle.status, TxStatus::Confirmed);

        let mut seen = Vec::new();
        while seen.last() != Some(&TxStatus::Confirmed) {
            let event = events.next().await.unwrap().unwrap();
            assert_eq!(event.handle_id, tracker.id());
            assert_eq!(event.chain_id, BASE);
            seen.push(event.status);
        }
        assert_eq!(
            seen,
            vec![
                TxStatus::Building,
                TxStatus::Submitted,
                TxStatus::Pending,
                TxStatus::Confirmed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_without_player_is_idle() {
        let network = FakeNetwork::builtin(BASE);
        let svc = service(&network);

        let result = svc.status(BASE, None).await;
        assert_eq!(result.status, QueryStatus::Idle);
        assert_eq!(result.value, None);
        assert_eq!(network.chain(BASE).total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_of_a_holder() {
        let network = FakeNetwork::builtin(BASE);
        network
            .chain(BASE)
            .seed_pioneer(player(0xaa), PioneerType::Guardian, "Vesta");
        network.chain(BASE).set_minting_enabled(false);
        let svc = service(&network);

        let result = svc.status(BASE, Some(player(0xaa))).await;
        assert_eq!(result.status, QueryStatus::Success);
        assert!(result.fetched_at.is_some());

        let status = result.value.unwrap();
        assert!(status.has_pioneer);
        assert!(!status.minting_available);
        assert_eq!(status.total_supply, U256::from(1u64));
        let record = status.record.unwrap();
        assert_eq!(record.name, "Vesta");
        assert_eq!(record.pioneer_type, PioneerType::Guardian);
        assert_eq!(record.token_id, Some(U256::from(1u64)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_part_fails_the_status() {
        let network = FakeNetwork::builtin(BASE);
        network.chain(BASE).revert_reads(Some("paused"));
        let svc = service(&network).with_retry_policy(RetryPolicy::no_retries());

        let result = svc.status(BASE, Some(player(0xaa))).await;
        assert_eq!(result.status, QueryStatus::Error);
        assert_eq!(
            result.error,
            Some(PioneerError::Reverted {
                reason: Some("paused".into())
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_variant_mints_to_the_caller() {
        let network = FakeNetwork::builtin(LOCAL);
        let svc = service(&network);
        assert_eq!(svc.resolve(LOCAL).map(|c| c.variant), Some(Variant::Simple));

        let mut tracker = svc.mint(LOCAL, PioneerType::Explorer, svc.player()).await.unwrap();
        assert_eq!(tracker.wait_terminal().await.status, TxStatus::Confirmed);

        let status = svc.status(LOCAL, Some(svc.player())).await.value.unwrap();
        assert!(status.has_pioneer);
        assert_eq!(
            status.record.map(|r| r.pioneer_type),
            Some(PioneerType::Explorer)
        );

        // The simple contract has no player parameter
        let other = svc.mint(LOCAL, PioneerType::Explorer, player(0x02)).await.unwrap();
        let handle = other.current();
        assert_eq!(handle.status, TxStatus::Failed);
        assert!(matches!(handle.error, Some(PioneerError::Encoding(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_handles_leave_tracking() {
        let network = FakeNetwork::builtin(BASE);
        let svc = service(&network).with_retention(Duration::from_secs(5));

        let mut tracker = svc.mint(BASE, PioneerType::Builder, svc.player()).await.unwrap();
        tracker.wait_terminal().await;
        assert_eq!(svc.transactions().tracked_count(), 1);
        assert!(svc.acknowledge(tracker.id()));
        assert!(!svc.abandon(tracker.id()));
        assert_eq!(svc.transactions().tracked_count(), 0);
    }
}
