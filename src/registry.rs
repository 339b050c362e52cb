use std::{collections::HashMap, time::Duration};

use alloy_primitives::{Address, address};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    basic_elements::serializers::{scale_u128, string_to_address},
    constants::{
        CONTRACT_OVERRIDE_ENV_PREFIX, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PRICE_MULTIPLIER,
        DEFAULT_TX_TIMEOUT_MS, GAS_MULTIPLIER_PRECISION, PublicChain, REGISTRY_FILE_ENV,
    },
    types::{ChainId, Variant},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GasPolicy {
    pub price_multiplier: f64,
    // Used instead of the wallet's estimate on chains that under-estimate
    pub gas_limit_override: Option<u64>,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        GasPolicy {
            price_multiplier: DEFAULT_PRICE_MULTIPLIER,
            gas_limit_override: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: DEFAULT_TX_TIMEOUT_MS,
        }
    }
}

impl GasPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn apply_price(&self, quoted_wei: u128) -> u128 {
        scale_u128(quoted_wei, self.price_multiplier, GAS_MULTIPLIER_PRECISION)
    }

    fn validate(&self) -> Result<()> {
        if !(self.price_multiplier.is_finite() && self.price_multiplier > 0.0) {
            bail!("price multiplier must be positive, got {}", self.price_multiplier);
        }
        if self.poll_interval_ms == 0 {
            bail!("poll interval must be non-zero");
        }
        if self.timeout_ms == 0 {
            bail!("timeout must be non-zero");
        }
        if self.gas_limit_override == Some(0) {
            bail!("gas limit override must be non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: ChainId,
    #[serde(default)]
    pub name: String,
    pub contract_address: Address,
    pub variant: Variant,
    #[serde(default)]
    pub gas_policy: GasPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<ChainId, ChainConfig>,
}

impl ChainRegistry {
    pub fn new(configs: impl IntoIterator<Item = ChainConfig>) -> Result<Self> {
        let mut chains = HashMap::new();

        for config in configs {
            config
                .gas_policy
                .validate()
                .with_context(|| format!("Invalid gas policy for chain {}", config.chain_id))?;

            let chain_id = config.chain_id;
            if chains.insert(chain_id, config).is_some() {
                bail!("Chain {} is configured more than once", chain_id);
            }
        }

        Ok(Self { chains })
    }

    pub fn builtin() -> Self {
        let chains = builtin_chains()
            .into_iter()
            .map(|config| (config.chain_id, config))
            .collect();
        Self { chains }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let configs: Vec<ChainConfig> =
            serde_json::from_str(json).context("Failed to parse chain registry JSON")?;
        Self::new(configs)
    }

    /// Loads `.env`, then the registry file named by `PIONEER_REGISTRY_FILE`
    /// (built-in table otherwise), then `PIONEER_CONTRACT_<CHAIN_ID>` overrides.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let registry = match std::env::var(REGISTRY_FILE_ENV) {
            Ok(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read registry file '{}'", path))?;
                Self::from_json(&json)?
            }
            Err(_) => Self::builtin(),
        };

        registry.with_env_overrides(std::env::vars())
    }

    /// Applies `PIONEER_CONTRACT_<CHAIN_ID>=<address>` pairs; other keys are ignored.
    pub fn with_env_overrides(
        mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        for (key, value) in vars {
            let Some(chain) = key.strip_prefix(CONTRACT_OVERRIDE_ENV_PREFIX) else {
                continue;
            };
            let chain_id: ChainId = chain
                .parse()
                .with_context(|| format!("Invalid chain id in {}", key))?;
            let address = string_to_address(&value)?;

            match self.chains.get_mut(&chain_id) {
                Some(config) => {
                    debug!(chain_id, %address, "contract address overridden");
                    config.contract_address = address;
                }
                None => warn!(chain_id, "contract override for an unknown chain ignored"),
            }
        }

        Ok(self)
    }

    pub fn resolve(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.get(&chain_id)
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<ChainId> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

fn entry(
    chain: PublicChain,
    contract_address: Address,
    variant: Variant,
    gas_policy: GasPolicy,
) -> ChainConfig {
    ChainConfig {
        chain_id: chain.chain_id(),
        name: chain.name().to_string(),
        contract_address,
        variant,
        gas_policy,
    }
}

fn builtin_chains() -> Vec<ChainConfig> {
    vec![
        entry(
            PublicChain::BaseSepolia,
            address!("0x5f3c0e2b8a41d7e09c6b2a1f4e8d7c6b5a493827"),
            Variant::Standard,
            GasPolicy {
                price_multiplier: 1.0,
                gas_limit_override: None,
                poll_interval_ms: 2_000,
                timeout_ms: 60_000,
            },
        ),
        entry(
            PublicChain::LiskSepolia,
            address!("0x8b1e6d4c2a0f9e7d5c3b1a09f8e7d6c5b4a39281"),
            Variant::SocialArchitect,
            GasPolicy {
                price_multiplier: 1.1,
                gas_limit_override: None,
                poll_interval_ms: 3_000,
                timeout_ms: 120_000,
            },
        ),
        // Flare confirms slowly and under-estimates gas for string-heavy calls
        entry(
            PublicChain::FlareCoston2,
            address!("0x2d7f9a0c4e6b8d1f3a5c7e9b0d2f4a6c8e1b3d57"),
            Variant::OracleSeer,
            GasPolicy {
                price_multiplier: 1.0,
                gas_limit_override: Some(800_000),
                poll_interval_ms: 5_000,
                timeout_ms: 300_000,
            },
        ),
        entry(
            PublicChain::EthereumSepolia,
            address!("0xa4c6e8f0b2d4f6a8c0e2b4d6f8a0c2e4b6d8f0a2"),
            Variant::EnsGuardian,
            GasPolicy {
                price_multiplier: 1.2,
                gas_limit_override: None,
                poll_interval_ms: 6_000,
                timeout_ms: 180_000,
            },
        ),
        entry(
            PublicChain::FilecoinCalibration,
            address!("0x71b3d5f7a9c1e3b5d7f9a1c3e5b7d9f1a3c5e7b9"),
            Variant::DataWeaver,
            GasPolicy {
                price_multiplier: 1.0,
                gas_limit_override: Some(30_000_000),
                poll_interval_ms: 15_000,
                timeout_ms: 300_000,
            },
        ),
        entry(
            PublicChain::ArbitrumSepolia,
            address!("0xc0ffee254729296a45a3885639ac7e10f9d54979"),
            Variant::GovernanceGuardian,
            GasPolicy {
                price_multiplier: 1.0,
                gas_limit_override: None,
                poll_interval_ms: 1_000,
                timeout_ms: 45_000,
            },
        ),
        entry(
            PublicChain::LocalDevnet,
            address!("0x5fbdb2315678afecb367f032d93f642f64180aa3"),
            Variant::Simple,
            GasPolicy {
                price_multiplier: 1.0,
                gas_limit_override: None,
                poll_interval_ms: 1_000,
                timeout_ms: 30_000,
            },
        ),
    ]
}
