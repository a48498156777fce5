//! # Scenario Configuration
//!
//! The simulator reads a TOML scenario describing the chains, assets,
//! users, and a list of steps to run. `ferry-node init` writes the default
//! scenario below so there is always a working starting point.
//!
//! Amounts are `u64` here because TOML integers are; they widen to the
//! protocol's `u128` on the way in.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ferry_protocol::config::{DEFAULT_GAS_LIMIT, DEFAULT_MAX_GAS_LIMIT, DEFAULT_MIN_GAS_LIMIT};
use ferry_protocol::{Address, ChainId};
use serde::{Deserialize, Serialize};

/// Top-level scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub network: NetworkConfig,
    pub assets: Vec<AssetConfig>,
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Loopback transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Symbol of the asset fees are charged in.
    pub fee_symbol: String,
    pub base_fee: u64,
    #[serde(default)]
    pub fee_per_byte: u64,
    /// How often the relayer polls the queue.
    #[serde(default = "default_relay_interval")]
    pub relay_interval_ms: u64,
}

fn default_relay_interval() -> u64 {
    25
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub decimals: u8,
}

/// One chain and the instance deployed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: ChainId,
    pub name: String,
    /// Instance address.
    pub instance: Address,
    pub owner: Address,
    pub pauser: Address,
    /// Fee asset minted straight to the instance at start-up.
    #[serde(default)]
    pub fee_reserve: u64,
    /// Destinations to allowlist.
    #[serde(default)]
    pub allow: Vec<ChainId>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub min: u64,
    pub max: u64,
    pub gas_limit: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_GAS_LIMIT,
            max: DEFAULT_MAX_GAS_LIMIT,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// A vault to route one asset through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub asset: String,
    pub vault: Address,
    #[serde(default)]
    pub apy_bps: u32,
}

/// A user with starting wallet balances on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub address: Address,
    pub chain: ChainId,
    /// Symbol -> amount minted to the user's wallet.
    #[serde(default)]
    pub wallet: BTreeMap<String, u64>,
}

/// One simulator action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Deposit {
        chain: ChainId,
        user: String,
        asset: String,
        amount: u64,
    },
    Withdraw {
        chain: ChainId,
        user: String,
        asset: String,
        amount: u64,
    },
    Transfer {
        from: ChainId,
        to: ChainId,
        user: String,
        asset: String,
        amount: u64,
        #[serde(default)]
        memo: String,
    },
    /// Waits until every submitted message has been delivered.
    Relay,
    Pause {
        chain: ChainId,
    },
    Unpause {
        chain: ChainId,
    },
    AccrueYield {
        chain: ChainId,
        amount: u64,
    },
}

impl ScenarioConfig {
    /// Reads and validates a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let config: ScenarioConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse scenario {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the scenario as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).context("failed to encode scenario")?;
        std::fs::write(path, raw).with_context(|| format!("failed to write scenario {}", path.display()))
    }

    /// Checks that every reference in the file resolves.
    pub fn validate(&self) -> Result<()> {
        let known_asset = |s: &str| self.assets.iter().any(|a| a.symbol.eq_ignore_ascii_case(s));
        let known_chain = |c: &ChainId| self.chains.iter().any(|ch| ch.id == *c);
        let known_user = |u: &str| self.users.iter().any(|x| x.name == u);

        if !known_asset(self.network.fee_symbol.as_str()) {
            bail!("fee asset {} is not declared", self.network.fee_symbol);
        }
        for (i, chain) in self.chains.iter().enumerate() {
            if self.chains[..i].iter().any(|c| c.id == chain.id) {
                bail!("chain {} declared twice", chain.id);
            }
            if let Some(bad) = chain.allow.iter().find(|c| !known_chain(*c)) {
                bail!("chain {} allowlists unknown chain {}", chain.name, bad);
            }
            if let Some(strategy) = &chain.strategy {
                if !known_asset(strategy.asset.as_str()) {
                    bail!("chain {} routes unknown asset {}", chain.name, strategy.asset);
                }
            }
        }
        for user in &self.users {
            if !known_chain(&user.chain) {
                bail!("user {} lives on unknown chain {}", user.name, user.chain);
            }
            if let Some(bad) = user.wallet.keys().find(|s| !known_asset(s.as_str())) {
                bail!("user {} holds unknown asset {}", user.name, bad);
            }
        }
        for (i, step) in self.steps.iter().enumerate() {
            let (chains, user, asset): (Vec<&ChainId>, Option<&str>, Option<&str>) = match step {
                Step::Deposit { chain, user, asset, .. } | Step::Withdraw { chain, user, asset, .. } => {
                    (vec![chain], Some(user.as_str()), Some(asset.as_str()))
                }
                Step::Transfer {
                    from, to, user, asset, ..
                } => (vec![from, to], Some(user.as_str()), Some(asset.as_str())),
                Step::Pause { chain } | Step::Unpause { chain } => (vec![chain], None, None),
                Step::AccrueYield { chain, .. } => {
                    let routed = self
                        .chains
                        .iter()
                        .any(|c| c.id == *chain && c.strategy.is_some());
                    if !routed {
                        bail!("step {}: chain {} has no strategy to accrue yield in", i + 1, chain);
                    }
                    (vec![chain], None, None)
                }
                Step::Relay => (vec![], None, None),
            };
            if let Some(bad) = chains.into_iter().find(|c| !known_chain(*c)) {
                bail!("step {}: unknown chain {}", i + 1, bad);
            }
            if let Some(u) = user.filter(|u| !known_user(*u)) {
                bail!("step {}: unknown user {}", i + 1, u);
            }
            if let Some(a) = asset.filter(|a| !known_asset(*a)) {
                bail!("step {}: unknown asset {}", i + 1, a);
            }
        }
        Ok(())
    }
}

impl Default for ScenarioConfig {
    /// Two chains, a USDC vault on the first, one user bridging there and back.
    fn default() -> Self {
        let alpha = ChainId(1);
        let beta = ChainId(2);
        let owner = Address::repeat_byte(0x01);
        let pauser = Address::repeat_byte(0x02);

        let user = String::from("alice");
        let asset = String::from("USDC");

        Self {
            network: NetworkConfig {
                fee_symbol: "LINK".into(),
                base_fee: 15,
                fee_per_byte: 0,
                relay_interval_ms: default_relay_interval(),
            },
            assets: vec![
                AssetConfig {
                    symbol: "USDC".into(),
                    decimals: 6,
                },
                AssetConfig {
                    symbol: "LINK".into(),
                    decimals: 18,
                },
            ],
            chains: vec![
                ChainConfig {
                    id: alpha,
                    name: "alpha".into(),
                    instance: Address::repeat_byte(0xaa),
                    owner,
                    pauser,
                    fee_reserve: 1_000,
                    allow: vec![beta],
                    execution: ExecutionConfig::default(),
                    strategy: Some(StrategyConfig {
                        asset: "USDC".into(),
                        vault: Address::repeat_byte(0x5a),
                        apy_bps: 450,
                    }),
                },
                ChainConfig {
                    id: beta,
                    name: "beta".into(),
                    instance: Address::repeat_byte(0xbb),
                    owner,
                    pauser,
                    fee_reserve: 1_000,
                    allow: vec![alpha],
                    execution: ExecutionConfig::default(),
                    strategy: None,
                },
            ],
            users: vec![UserConfig {
                name: user.clone(),
                address: Address::repeat_byte(0xa1),
                chain: alpha,
                wallet: BTreeMap::from([(asset.clone(), 1_000)]),
            }],
            steps: vec![
                Step::Deposit {
                    chain: alpha,
                    user: user.clone(),
                    asset: asset.clone(),
                    amount: 600,
                },
                Step::AccrueYield {
                    chain: alpha,
                    amount: 12,
                },
                Step::Transfer {
                    from: alpha,
                    to: beta,
                    user: user.clone(),
                    asset: asset.clone(),
                    amount: 250,
                    memo: "to beta".into(),
                },
                Step::Relay,
                Step::Transfer {
                    from: beta,
                    to: alpha,
                    user: user.clone(),
                    asset: asset.clone(),
                    amount: 100,
                    memo: "and back".into(),
                },
                Step::Relay,
                Step::Withdraw {
                    chain: alpha,
                    user,
                    asset,
                    amount: 200,
                },
            ],
        }
    }
}
