// Read retries for transient network errors (writes are never retried)
pub const DEFAULT_READ_RETRIES: u32 = 2;
pub const READ_BACKOFF_BASE_MS: u64 = 250;
pub const READ_BACKOFF_MAX_JITTER_MS: u64 = 100;

// Fallbacks for registry entries loaded without a gas policy
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_TX_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_PRICE_MULTIPLIER: f64 = 1.0;

// Gas price multipliers are applied with three decimals
pub const GAS_MULTIPLIER_PRECISION: u64 = 1_000;

// Terminal handles nobody acknowledged are dropped after this window
pub const HANDLE_RETENTION_SECS: u64 = 600;

// Cached reads nobody watches are evicted after this window
pub const QUERY_RETENTION_SECS: u64 = 300;

pub const EVENT_CHANNEL_CAPACITY: usize = 128;

pub const REGISTRY_FILE_ENV: &str = "PIONEER_REGISTRY_FILE";
pub const CONTRACT_OVERRIDE_ENV_PREFIX: &str = "PIONEER_CONTRACT_";

pub enum PublicChain {
    BaseSepolia,
    LiskSepolia,
    FlareCoston2,
    EthereumSepolia,
    FilecoinCalibration,
    ArbitrumSepolia,
    LocalDevnet,
}

impl PublicChain {
    pub fn chain_id(&self) -> u64 {
        match self {
            PublicChain::BaseSepolia => 84532,
            PublicChain::LiskSepolia => 4202,
            PublicChain::FlareCoston2 => 114,
            PublicChain::EthereumSepolia => 11155111,
            PublicChain::FilecoinCalibration => 314159,
            PublicChain::ArbitrumSepolia => 421614,
            PublicChain::LocalDevnet => 31337,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PublicChain::BaseSepolia => "Base Sepolia",
            PublicChain::LiskSepolia => "Lisk Sepolia",
            PublicChain::FlareCoston2 => "Flare Coston2",
            PublicChain::EthereumSepolia => "Ethereum Sepolia",
            PublicChain::FilecoinCalibration => "Filecoin Calibration",
            PublicChain::ArbitrumSepolia => "Arbitrum Sepolia",
            PublicChain::LocalDevnet => "Local devnet",
        }
    }
}
