use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{Address, Bytes, TxHash, U256, keccak256};
use async_trait::async_trait;

use crate::{
    adapter::variants::{FieldKind, MintShape, encode_record, shape},
    basic_elements::{
        args::Args,
        serializers::{selector, split_call_data},
    },
    client::transport::{
        CallRequest, RpcTransport, Signer, SignerError, TransactionReceipt, TransactionRequest,
        TransportError, TransportSet,
    },
    registry::ChainRegistry,
    types::{ChainId, ExtensionValue, PioneerRecord, PioneerType, Variant},
};

pub fn player(byte: u8) -> Address {
    Address::with_last_byte(byte)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct PendingTx {
    request: TransactionRequest,
    polls_left: u32,
}

struct LedgerState {
    owners: HashMap<Address, U256>,
    records: HashMap<U256, PioneerRecord>,
    total_supply: u64,
    proposals: u64,
    minting_enabled: bool,
    nonce: u64,
    pending: HashMap<TxHash, PendingTx>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    submitted: Vec<TransactionRequest>,
    transient_failures: usize,
    failing_polls: usize,
    revert_reads: Option<String>,
    revert_next_write: Option<String>,
    never_include: bool,
    polls_before_inclusion: u32,
    call_delay: Duration,
    gas_price: u128,
    block_number: u64,
}

// A Pioneer contract of one variant, answering through [`RpcTransport`].
pub struct FakeChain {
    variant: Variant,
    state: Mutex<LedgerState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    polls: AtomicUsize,
}

impl FakeChain {
    pub fn new(variant: Variant) -> Arc<Self> {
        Arc::new(Self {
            variant,
            state: Mutex::new(LedgerState {
                owners: HashMap::new(),
                records: HashMap::new(),
                total_supply: 0,
                proposals: 0,
                minting_enabled: true,
                nonce: 0,
                pending: HashMap::new(),
                receipts: HashMap::new(),
                submitted: Vec::new(),
                transient_failures: 0,
                failing_polls: 0,
                revert_reads: None,
                revert_next_write: None,
                never_include: false,
                polls_before_inclusion: 1,
                call_delay: Duration::ZERO,
                gas_price: 1_000_000_000,
                block_number: 100,
            }),
            calls: Mutex::new(HashMap::new()),
            polls: AtomicUsize::new(0),
        })
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    fn signatures(&self) -> Vec<&'static str> {
        let shape = shape(self.variant);
        let mint = match shape.mint {
            MintShape::TypeAndPlayer(signature) | MintShape::CallerOnly(signature) => signature,
        };
        let mut signatures = vec![
            shape.has_pioneer,
            shape.player_pioneer,
            shape.pioneer_data,
            shape.total_supply,
            shape.minting_available,
            mint,
        ];
        signatures.extend(shape.actions.iter().map(|action| action.signature()));
        signatures
    }

    fn lookup<'d>(&self, data: &'d [u8]) -> Option<(&'static str, &'d [u8])> {
        let (sel, args) = split_call_data(data)?;
        self.signatures()
            .into_iter()
            .find(|signature| selector(signature) == sel)
            .map(|signature| (signature, args))
    }

    // --- Knobs ---

    pub fn fail_next_calls(&self, count: usize) {
        self.state().transient_failures = count;
    }

    pub fn fail_next_polls(&self, count: usize) {
        self.state().failing_polls = count;
    }

    pub fn revert_reads(&self, reason: Option<&str>) {
        self.state().revert_reads = reason.map(str::to_string);
    }

    pub fn revert_next_write(&self, reason: &str) {
        self.state().revert_next_write = Some(reason.to_string());
    }

    pub fn never_include(&self, never: bool) {
        self.state().never_include = never;
    }

    pub fn include_after_polls(&self, polls: u32) {
        self.state().polls_before_inclusion = polls;
    }

    pub fn set_call_delay(&self, delay: Duration) {
        self.state().call_delay = delay;
    }

    pub fn set_gas_price(&self, wei: u128) {
        self.state().gas_price = wei;
    }

    pub fn set_minting_enabled(&self, enabled: bool) {
        self.state().minting_enabled = enabled;
    }

    pub fn seed_pioneer(&self, owner: Address, pioneer_type: PioneerType, name: &str) -> U256 {
        let mut state = self.state();
        let token_id = Self::mint_into(self.variant, &mut state, owner, pioneer_type);
        if let Some(record) = state.records.get_mut(&token_id) {
            record.name = name.to_string();
        }
        token_id
    }

    // --- Inspection ---

    pub fn call_count(&self, signature: &str) -> usize {
        self.calls.lock().unwrap().get(signature).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<TransactionRequest> {
        self.state().submitted.clone()
    }

    // --- Ledger ---

    fn mint_into(
        variant: Variant,
        state: &mut LedgerState,
        owner: Address,
        pioneer_type: PioneerType,
    ) -> U256 {
        state.total_supply += 1;
        let token_id = U256::from(state.total_supply);

        let extensions: BTreeMap<String, ExtensionValue> = shape(variant)
            .extensions
            .iter()
            .map(|(field, kind)| {
                let value = match kind {
                    FieldKind::Uint => ExtensionValue::Uint(U256::ZERO),
                    FieldKind::Text => ExtensionValue::Text(String::new()),
                };
                (field.to_string(), value)
            })
            .collect();

        state.owners.insert(owner, token_id);
        state.records.insert(
            token_id,
            PioneerRecord {
                token_id: Some(token_id),
                pioneer_type,
                name: format!("Pioneer #{}", token_id),
                title: "Initiate".to_string(),
                realm: variant.to_string(),
                rarity: 1,
                minted_at: 1_700_000_000 + state.total_supply,
                is_active: true,
                extensions,
            },
        );
        token_id
    }

    // Executes an included transaction, returning the revert reason on failure
    fn execute(&self, state: &mut LedgerState, request: &TransactionRequest) -> Result<(), String> {
        if let Some(reason) = state.revert_next_write.take() {
            return Err(reason);
        }

        let (signature, data) = self
            .lookup(&request.data)
            .ok_or_else(|| "unknown function".to_string())?;
        let mut args = Args::from_bytes(data.to_vec());
        let shape = shape(self.variant);

        match shape.mint {
            MintShape::TypeAndPlayer(mint) if mint == signature => {
                let pioneer_type = args
                    .next_u8()
                    .ok()
                    .and_then(|byte| PioneerType::from_u8(byte).ok())
                    .ok_or("invalid pioneer type")?;
                let owner = args.next_address().map_err(|e| e.to_string())?;
                return self.mint_checked(state, owner, pioneer_type);
            }
            MintShape::CallerOnly(mint) if mint == signature => {
                let pioneer_type = args
                    .next_u8()
                    .ok()
                    .and_then(|byte| PioneerType::from_u8(byte).ok())
                    .ok_or("invalid pioneer type")?;
                return self.mint_checked(state, request.from, pioneer_type);
            }
            _ => {}
        }

        let token_id = *state
            .owners
            .get(&request.from)
            .ok_or("caller holds no pioneer")?;
        let record = state
            .records
            .get_mut(&token_id)
            .ok_or("missing record")?;

        match signature {
            "buildProtocol(string,uint256)" => {
                args.next_string().map_err(|e| e.to_string())?;
                let weight = args.next_u256().map_err(|e| e.to_string())?;
                bump(record, "protocolsBuilt", U256::from(1u64));
                bump(record, "communityScore", weight);
            }
            "makePrediction(string,uint256,uint8)" => {
                args.next_string().map_err(|e| e.to_string())?;
                args.next_u256().map_err(|e| e.to_string())?;
                let confidence = args.next_u8().map_err(|e| e.to_string())?;
                bump(record, "predictionsMade", U256::from(1u64));
                record.extensions.insert(
                    "predictionAccuracy".to_string(),
                    ExtensionValue::Uint(U256::from(confidence)),
                );
            }
            "weaveData(string,uint256)" => {
                args.next_string().map_err(|e| e.to_string())?;
                let size_bytes = args.next_u256().map_err(|e| e.to_string())?;
                bump(record, "datasetsWoven", U256::from(1u64));
                bump(record, "storageEfficiency", size_bytes);
            }
            "createProposal(string)" => {
                args.next_string().map_err(|e| e.to_string())?;
                bump(record, "proposalsCreated", U256::from(1u64));
                state.proposals += 1;
            }
            "castVote(uint256,bool)" => {
                let proposal_id = args.next_u256().map_err(|e| e.to_string())?;
                let support = args.next_bool().map_err(|e| e.to_string())?;
                if proposal_id.is_zero() || proposal_id > U256::from(state.proposals) {
                    return Err("unknown proposal".to_string());
                }
                if support {
                    bump(record, "votingPower", U256::from(1u64));
                }
            }
            "linkEnsName(string)" => {
                let name = args.next_string().map_err(|e| e.to_string())?;
                record
                    .extensions
                    .insert("ensName".to_string(), ExtensionValue::Text(name));
            }
            _ => {}
        }
        Ok(())
    }

    fn mint_checked(
        &self,
        state: &mut LedgerState,
        owner: Address,
        pioneer_type: PioneerType,
    ) -> Result<(), String> {
        if !state.minting_enabled {
            return Err("minting closed".to_string());
        }
        if state.owners.contains_key(&owner) {
            return Err("already a pioneer".to_string());
        }
        Self::mint_into(self.variant, state, owner, pioneer_type);
        Ok(())
    }

    fn accept(&self, request: TransactionRequest) -> TxHash {
        let mut state = self.state();
        state.nonce += 1;
        let mut seed = request.from.to_vec();
        seed.extend_from_slice(&state.nonce.to_be_bytes());
        let hash = keccak256(&seed);

        let polls_left = state.polls_before_inclusion;
        state.submitted.push(request.clone());
        state.pending.insert(
            hash,
            PendingTx {
                request,
                polls_left,
            },
        );
        hash
    }
}

fn bump(record: &mut PioneerRecord, field: &str, by: U256) {
    let current = record
        .extensions
        .get(field)
        .and_then(ExtensionValue::as_uint)
        .unwrap_or(U256::ZERO);
    record
        .extensions
        .insert(field.to_string(), ExtensionValue::Uint(current + by));
}

#[async_trait]
impl RpcTransport for FakeChain {
    async fn call(&self, request: &CallRequest) -> Result<Bytes, TransportError> {
        let delay = self.state().call_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (signature, data) = self.lookup(&request.data).ok_or(TransportError::Rpc {
            code: -32000,
            message: "unknown selector".to_string(),
        })?;
        *self.calls.lock().unwrap().entry(signature).or_default() += 1;

        let mut state = self.state();
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(TransportError::ConnectionReset("connection reset by peer".into()));
        }
        if let Some(reason) = state.revert_reads.clone() {
            return Err(TransportError::Reverted(Some(reason)));
        }

        let shape = shape(self.variant);
        let mut args = Args::from_bytes(data.to_vec());
        let bad_args = |e: anyhow::Error| TransportError::Reverted(Some(e.to_string()));
        let mut out = Args::new();

        if signature == shape.has_pioneer {
            let owner = args.next_address().map_err(bad_args)?;
            out.add_bool(state.owners.contains_key(&owner));
        } else if signature == shape.player_pioneer {
            let owner = args.next_address().map_err(bad_args)?;
            out.add_u256(state.owners.get(&owner).copied().unwrap_or(U256::ZERO));
        } else if signature == shape.pioneer_data {
            let token_id = args.next_u256().map_err(bad_args)?;
            let record = state
                .records
                .get(&token_id)
                .ok_or(TransportError::Reverted(Some("nonexistent token".into())))?;
            return Ok(Bytes::from(encode_record(self.variant, record)));
        } else if signature == shape.total_supply {
            out.add_u64(state.total_supply);
        } else if signature == shape.minting_available {
            out.add_bool(state.minting_enabled);
        } else {
            return Err(TransportError::Rpc {
                code: -32000,
                message: format!("{} is not a view function", signature),
            });
        }

        Ok(Bytes::from(out.serialize()))
    }

    async fn gas_price(&self) -> Result<u128, TransportError> {
        Ok(self.state().gas_price)
    }

    async fn get_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(TransportError::Timeout("receipt request timed out".into()));
        }

        if let Some(receipt) = state.receipts.get(&hash) {
            return Ok(Some(receipt.clone()));
        }
        if state.never_include {
            return Ok(None);
        }

        let Some(pending) = state.pending.get_mut(&hash) else {
            return Ok(None);
        };
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(None);
        }

        let Some(pending) = state.pending.remove(&hash) else {
            return Ok(None);
        };
        let outcome = self.execute(&mut state, &pending.request);
        state.block_number += 1;

        let receipt = TransactionReceipt {
            hash,
            block_number: state.block_number,
            gas_used: 120_000,
            success: outcome.is_ok(),
            revert_reason: outcome.err(),
        };
        state.receipts.insert(hash, receipt.clone());
        Ok(Some(receipt))
    }
}

// Wallet connected to one chain at a time, submitting into [`FakeChain`]s.
pub struct FakeWallet {
    address: Address,
    chain_id: AtomicU64,
    chains: HashMap<ChainId, Arc<FakeChain>>,
    reject: AtomicBool,
    sign_requests: AtomicUsize,
}

impl FakeWallet {
    pub fn new(address: Address, chain_id: ChainId, chains: HashMap<ChainId, Arc<FakeChain>>) -> Arc<Self> {
        Arc::new(Self {
            address,
            chain_id: AtomicU64::new(chain_id),
            chains,
            reject: AtomicBool::new(false),
            sign_requests: AtomicUsize::new(0),
        })
    }

    pub fn switch_chain(&self, chain_id: ChainId) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    pub fn reject_requests(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn sign_requests(&self) -> usize {
        self.sign_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for FakeWallet {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id.load(Ordering::SeqCst)
    }

    async fn sign_and_submit(&self, request: TransactionRequest) -> Result<TxHash, SignerError> {
        self.sign_requests.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(SignerError::Rejected("user denied transaction signature".into()));
        }

        let chain = self.chains.get(&request.chain_id).ok_or(SignerError::Network(
            TransportError::Rpc {
                code: -32002,
                message: format!("no route to chain {}", request.chain_id),
            },
        ))?;
        Ok(chain.accept(request))
    }
}

// One simulated contract per built-in chain and a wallet over all of them.
pub struct FakeNetwork {
    pub registry: ChainRegistry,
    pub transports: TransportSet,
    pub wallet: Arc<FakeWallet>,
    pub chains: HashMap<ChainId, Arc<FakeChain>>,
}

impl FakeNetwork {
    pub fn builtin(connected: ChainId) -> Self {
        init_tracing();
        let registry = ChainRegistry::builtin();

        let mut transports = TransportSet::new();
        let mut chains = HashMap::new();
        for config in registry.iter() {
            let chain = FakeChain::new(config.variant);
            transports.insert(config.chain_id, chain.clone());
            chains.insert(config.chain_id, chain);
        }

        let wallet = FakeWallet::new(player(0xaa), connected, chains.clone());
        Self {
            registry,
            transports,
            wallet,
            chains,
        }
    }

    pub fn chain(&self, chain_id: ChainId) -> &FakeChain {
        &self.chains[&chain_id]
    }
}
