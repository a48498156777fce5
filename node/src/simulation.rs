//! # Simulation
//!
//! Builds one asset bank, instance, and optional vault per chain from a
//! [`ScenarioConfig`], connects the chains through a [`LoopbackNetwork`],
//! and runs the scenario's steps in order.
//!
//! A background relayer task drains the network queue on a fixed interval
//! and reports each delivery over a channel. `relay` steps wait on that
//! channel until every submitted message has landed. Step failures are
//! recorded in the report rather than aborting the run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use ferry_adapters::{Envelope, InMemoryBank, LoopbackConfig, LoopbackNetwork, VaultStrategy};
use ferry_protocol::config::PROTOCOL_VERSION;
use ferry_protocol::{
    Address, Amount, AssetBank, AssetId, BasisPoints, ChainId, ExecutionBudget, FerryError,
    Instance, InstanceConfig, InstanceEvent, InstanceSnapshot, MessageId, ReceiptSummary,
    StrategyError, StrategyHandle, TransferRequest,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::{ChainConfig, ScenarioConfig, Step};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Everything `simulate` prints.
#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub protocol_version: &'static str,
    pub steps: Vec<StepReport>,
    pub deliveries: Vec<Delivery>,
    pub chains: Vec<ChainReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// 1-based position in the scenario.
    pub step: usize,
    pub action: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { detail: String },
    Failed { kind: String, error: String },
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok { .. })
    }
}

/// One envelope handed to its destination instance.
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub message_id: MessageId,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChainReport {
    pub name: String,
    pub snapshot: InstanceSnapshot,
    pub fee_reserve: Amount,
    pub assets: Vec<AssetReport>,
    pub users: BTreeMap<String, UserReport>,
    pub events: Vec<InstanceEvent>,
}

/// Backing of one asset on one chain.
#[derive(Debug, Serialize)]
pub struct AssetReport {
    pub symbol: String,
    pub ledger_total: Amount,
    pub direct: Amount,
    pub strategy_tvl: Amount,
    pub apy_bps: BasisPoints,
    pub stray: Amount,
    pub solvent: bool,
}

/// Non-zero balances by symbol.
#[derive(Debug, Default, Serialize)]
pub struct UserReport {
    pub ledger: BTreeMap<String, Amount>,
    pub wallet: BTreeMap<String, Amount>,
}

// ---------------------------------------------------------------------------
// Step failures
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Failure {
    kind: String,
    error: String,
}

impl Failure {
    fn scenario(error: impl Into<String>) -> Self {
        Self {
            kind: "Scenario".into(),
            error: error.into(),
        }
    }
}

impl From<FerryError> for Failure {
    fn from(e: FerryError) -> Self {
        Self {
            kind: format!("{:?}", e.kind()),
            error: e.to_string(),
        }
    }
}

impl From<StrategyError> for Failure {
    fn from(e: StrategyError) -> Self {
        Self {
            kind: "External".into(),
            error: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

struct ChainNode {
    config: ChainConfig,
    bank: Arc<InMemoryBank>,
    instance: Arc<Instance>,
    vault: Option<(AssetId, Arc<VaultStrategy>)>,
}

/// A fully wired set of chains ready to run a scenario.
pub struct Simulation {
    scenario: ScenarioConfig,
    network: Arc<LoopbackNetwork>,
    /// Upper-cased symbol to asset id; identical on every chain.
    assets: BTreeMap<String, AssetId>,
    chains: BTreeMap<ChainId, ChainNode>,
    users: BTreeMap<String, Address>,
}

impl Simulation {
    /// Creates banks, instances, vaults, and user wallets for `scenario`.
    ///
    /// # Errors
    ///
    /// Fails if the scenario does not validate or any instance rejects its
    /// configuration.
    pub fn build(scenario: ScenarioConfig) -> Result<Self> {
        scenario.validate()?;

        let mut assets = BTreeMap::new();
        let mut banks = BTreeMap::new();
        for chain in &scenario.chains {
            let bank = Arc::new(InMemoryBank::new());
            for asset in &scenario.assets {
                let id = match bank.asset_by_symbol(&asset.symbol) {
                    Some(id) => id,
                    None => bank
                        .register(&asset.symbol, asset.decimals)
                        .with_context(|| format!("failed to register {} on {}", asset.symbol, chain.name))?,
                };
                assets.insert(asset.symbol.to_uppercase(), id);
            }
            banks.insert(chain.id, bank);
        }

        let fee_asset = lookup(&assets, &scenario.network.fee_symbol)?;
        let network = LoopbackNetwork::new(LoopbackConfig {
            fee_asset,
            base_fee: scenario.network.base_fee.into(),
            fee_per_byte: scenario.network.fee_per_byte.into(),
        });
        for (chain, bank) in &banks {
            network.attach(*chain, Arc::clone(bank));
        }

        let mut chains = BTreeMap::new();
        for chain in &scenario.chains {
            let bank = banks
                .remove(&chain.id)
                .ok_or_else(|| anyhow!("chain {} has no bank", chain.id))?;
            let node = deploy(chain, bank, &network, &assets, fee_asset)?;
            chains.insert(chain.id, node);
        }

        let mut users = BTreeMap::new();
        for user in &scenario.users {
            let node = chains
                .get(&user.chain)
                .ok_or_else(|| anyhow!("user {} lives on unknown chain {}", user.name, user.chain))?;
            let spender = node.instance.address();
            for (symbol, amount) in &user.wallet {
                let asset = lookup(&assets, symbol)?;
                node.bank
                    .mint(&asset, &user.address, Amount::from(*amount))
                    .with_context(|| format!("failed to fund {}", user.name))?;
                node.bank
                    .approve(&asset, &user.address, &spender, Amount::MAX)
                    .with_context(|| format!("failed to approve for {}", user.name))?;
            }
            users.insert(user.name.clone(), user.address);
        }

        tracing::info!(
            chains = chains.len(),
            assets = assets.len(),
            users = users.len(),
            steps = scenario.steps.len(),
            "simulation ready"
        );

        Ok(Self {
            scenario,
            network,
            assets,
            chains,
            users,
        })
    }

    /// Runs every step, waits for outstanding deliveries, and reports.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures (the relayer dying) abort the run.
    pub async fn run(self, relay_timeout: Duration) -> Result<Report> {
        let interval = Duration::from_millis(self.scenario.network.relay_interval_ms.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (delivery_tx, mut delivery_rx) = mpsc::unbounded_channel();
        let instances = self
            .chains
            .iter()
            .map(|(id, node)| (*id, Arc::clone(&node.instance)))
            .collect();
        let relayer = tokio::spawn(relay_loop(
            Arc::clone(&self.network),
            instances,
            interval,
            delivery_tx,
            shutdown_rx,
        ));

        let mut steps = Vec::with_capacity(self.scenario.steps.len());
        let mut deliveries = Vec::new();
        let mut in_flight = 0usize;

        for (i, step) in self.scenario.steps.iter().enumerate() {
            let result = match step {
                Step::Relay => settle(&mut delivery_rx, &mut in_flight, &mut deliveries, relay_timeout)
                    .await
                    .map(|n| format!("{n} delivered")),
                other => self.execute(other),
            };
            let outcome = match result {
                Ok(detail) => {
                    if matches!(step, Step::Transfer { .. }) {
                        in_flight += 1;
                    }
                    Outcome::Ok { detail }
                }
                Err(Failure { kind, error }) => {
                    tracing::warn!(step = i + 1, action = action_name(step), %kind, %error, "step failed");
                    Outcome::Failed { kind, error }
                }
            };
            steps.push(StepReport {
                step: i + 1,
                action: action_name(step),
                outcome,
            });
        }

        if in_flight > 0 {
            if let Err(e) = settle(&mut delivery_rx, &mut in_flight, &mut deliveries, relay_timeout).await {
                tracing::warn!(error = %e.error, "messages left undelivered");
            }
        }

        // The relayer may already be gone if the receiver side closed.
        shutdown_tx.send(true).ok();
        relayer.await.context("relayer task failed")?;

        Ok(self.report(steps, deliveries))
    }

    fn execute(&self, step: &Step) -> Result<String, Failure> {
        match step {
            Step::Deposit {
                chain,
                user,
                asset,
                amount,
            } => {
                let node = self.chain(*chain)?;
                let balance = node
                    .instance
                    .deposit(&self.user(user)?, &self.asset(asset)?, Amount::from(*amount))?;
                Ok(format!("balance {balance}"))
            }
            Step::Withdraw {
                chain,
                user,
                asset,
                amount,
            } => {
                let node = self.chain(*chain)?;
                let balance = node
                    .instance
                    .withdraw(&self.user(user)?, &self.asset(asset)?, Amount::from(*amount))?;
                Ok(format!("balance {balance}"))
            }
            Step::Transfer {
                from,
                to,
                user,
                asset,
                amount,
                memo,
            } => {
                let source = self.chain(*from)?;
                let destination = self.chain(*to)?;
                let id = source.instance.request_transfer(
                    &self.user(user)?,
                    TransferRequest {
                        destination_chain: *to,
                        receiver: destination.instance.address(),
                        asset: self.asset(asset)?,
                        amount: Amount::from(*amount),
                        memo: memo.clone(),
                    },
                )?;
                Ok(format!("submitted {id}"))
            }
            Step::Pause { chain } => {
                let node = self.chain(*chain)?;
                node.instance.pause(&node.config.pauser)?;
                Ok("paused".into())
            }
            Step::Unpause { chain } => {
                let node = self.chain(*chain)?;
                node.instance.unpause(&node.config.pauser)?;
                Ok("unpaused".into())
            }
            Step::AccrueYield { chain, amount } => {
                let node = self.chain(*chain)?;
                let (asset, vault) = node
                    .vault
                    .as_ref()
                    .ok_or_else(|| Failure::scenario(format!("chain {chain} has no vault")))?;
                vault.accrue_yield(asset, Amount::from(*amount))?;
                Ok(format!("vault holds {}", vault.total_value_locked(asset)))
            }
            Step::Relay => Err(Failure::scenario("relay steps are awaited, not executed")),
        }
    }

    fn chain(&self, id: ChainId) -> Result<&ChainNode, Failure> {
        self.chains
            .get(&id)
            .ok_or_else(|| Failure::scenario(format!("unknown chain {id}")))
    }

    fn user(&self, name: &str) -> Result<Address, Failure> {
        self.users
            .get(name)
            .copied()
            .ok_or_else(|| Failure::scenario(format!("unknown user {name}")))
    }

    fn asset(&self, symbol: &str) -> Result<AssetId, Failure> {
        lookup(&self.assets, symbol).map_err(|e| Failure::scenario(e.to_string()))
    }

    fn report(&self, steps: Vec<StepReport>, deliveries: Vec<Delivery>) -> Report {
        let chains = self
            .chains
            .values()
            .map(|node| {
                let instance = &node.instance;
                let assets = self
                    .assets
                    .iter()
                    .map(|(symbol, asset)| AssetReport {
                        symbol: symbol.clone(),
                        ledger_total: instance.total_deposits(asset),
                        direct: instance.direct_balance(asset),
                        strategy_tvl: instance.strategy_tvl(asset),
                        apy_bps: instance.apy(asset),
                        stray: instance.stray_balance(asset),
                        solvent: instance.check_solvency(asset).is_ok(),
                    })
                    .collect();

                let mut users = BTreeMap::new();
                for (name, address) in &self.users {
                    let mut report = UserReport::default();
                    for (symbol, asset) in &self.assets {
                        let held = instance.balance_of(address, asset);
                        if held > 0 {
                            report.ledger.insert(symbol.clone(), held);
                        }
                        let wallet = node.bank.balance_of(asset, address);
                        if wallet > 0 {
                            report.wallet.insert(symbol.clone(), wallet);
                        }
                    }
                    users.insert(name.clone(), report);
                }

                ChainReport {
                    name: node.config.name.clone(),
                    snapshot: instance.snapshot(),
                    fee_reserve: instance.fee_reserve(),
                    assets,
                    users,
                    events: instance.events(),
                }
            })
            .collect();

        Report {
            generated_at: Utc::now(),
            protocol_version: PROTOCOL_VERSION,
            steps,
            deliveries,
            chains,
        }
    }
}

/// Creates and configures the instance for one chain.
fn deploy(
    chain: &ChainConfig,
    bank: Arc<InMemoryBank>,
    network: &Arc<LoopbackNetwork>,
    assets: &BTreeMap<String, AssetId>,
    fee_asset: AssetId,
) -> Result<ChainNode> {
    let exec = chain.execution;
    let config = InstanceConfig {
        address: chain.instance,
        chain_id: chain.id,
        owner: chain.owner,
        pauser: chain.pauser,
        fee_asset,
        execution_budget: ExecutionBudget::new(exec.min, exec.max, exec.gas_limit)
            .with_context(|| format!("invalid execution budget on {}", chain.name))?,
    };
    let endpoint = network.endpoint(chain.id)?;
    let instance = Arc::new(
        Instance::new(config, bank.clone(), endpoint)
            .with_context(|| format!("failed to create instance on {}", chain.name))?,
    );

    for destination in &chain.allow {
        instance.set_chain_allowed(&chain.owner, *destination, true)?;
    }

    let vault = match &chain.strategy {
        Some(strategy) => {
            let asset = lookup(assets, &strategy.asset)?;
            let vault = Arc::new(VaultStrategy::new(
                strategy.vault,
                instance.address(),
                Arc::clone(&bank),
                [asset],
            ));
            vault.set_apy(&asset, strategy.apy_bps);
            let handle: Arc<dyn StrategyHandle> = vault.clone();
            instance.set_strategy(&chain.owner, &asset, Some(handle))?;
            instance.set_strategies_enabled(&chain.owner, true)?;
            Some((asset, vault))
        }
        None => None,
    };

    if chain.fee_reserve > 0 {
        bank.mint(&fee_asset, &chain.instance, Amount::from(chain.fee_reserve))
            .with_context(|| format!("failed to fund fee reserve on {}", chain.name))?;
    }

    tracing::info!(chain = %chain.id, name = %chain.name, instance = %chain.instance, routed = vault.is_some(), "chain deployed");

    Ok(ChainNode {
        config: chain.clone(),
        bank,
        instance,
        vault,
    })
}

fn lookup(assets: &BTreeMap<String, AssetId>, symbol: &str) -> Result<AssetId> {
    assets
        .get(&symbol.to_uppercase())
        .copied()
        .ok_or_else(|| anyhow!("unknown asset {symbol}"))
}

fn action_name(step: &Step) -> &'static str {
    match step {
        Step::Deposit { .. } => "deposit",
        Step::Withdraw { .. } => "withdraw",
        Step::Transfer { .. } => "transfer",
        Step::Relay => "relay",
        Step::Pause { .. } => "pause",
        Step::Unpause { .. } => "unpause",
        Step::AccrueYield { .. } => "accrue_yield",
    }
}

// ---------------------------------------------------------------------------
// Relayer
// ---------------------------------------------------------------------------

/// Drains the network queue every `interval` until `shutdown` flips.
async fn relay_loop(
    network: Arc<LoopbackNetwork>,
    instances: HashMap<ChainId, Arc<Instance>>,
    interval: Duration,
    deliveries: mpsc::UnboundedSender<Delivery>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                while let Some(envelope) = network.next_envelope() {
                    if deliveries.send(deliver(&network, &instances, envelope)).is_err() {
                        return;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!(pending = network.pending(), "relayer stopped");
}

fn deliver(
    network: &LoopbackNetwork,
    instances: &HashMap<ChainId, Arc<Instance>>,
    envelope: Envelope,
) -> Delivery {
    let mut delivery = Delivery {
        message_id: envelope.message_id,
        source_chain: envelope.source_chain,
        destination_chain: envelope.destination_chain,
        receipt: None,
        error: None,
    };
    let destination = envelope.destination_chain;
    let result = match instances.get(&destination) {
        Some(instance) => network.deliver(envelope, instance).map_err(|e| e.to_string()),
        None => Err(format!("no instance on chain {destination}")),
    };
    match result {
        Ok(receipt) => delivery.receipt = Some(receipt),
        Err(error) => {
            tracing::warn!(message_id = %delivery.message_id, %destination, %error, "delivery failed");
            delivery.error = Some(error);
        }
    }
    delivery
}

/// Waits for every in-flight message to be reported. Returns how many
/// arrived.
async fn settle(
    deliveries: &mut mpsc::UnboundedReceiver<Delivery>,
    in_flight: &mut usize,
    log: &mut Vec<Delivery>,
    timeout: Duration,
) -> Result<usize, Failure> {
    let deadline = Instant::now() + timeout;
    let mut arrived = 0;
    while *in_flight > 0 {
        match tokio::time::timeout_at(deadline, deliveries.recv()).await {
            Ok(Some(delivery)) => {
                *in_flight -= 1;
                arrived += 1;
                log.push(delivery);
            }
            Ok(None) => return Err(Failure::scenario("relayer stopped")),
            Err(_) => {
                return Err(Failure::scenario(format!(
                    "{} message(s) still in flight after {timeout:?}",
                    *in_flight
                )))
            }
        }
    }
    Ok(arrived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn holding(report: &Report, chain: usize, symbol: &str) -> Amount {
        report.chains[chain].users["alice"]
            .ledger
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn default_scenario_settles_both_ways() {
        let report = Simulation::build(ScenarioConfig::default())
            .unwrap()
            .run(TIMEOUT)
            .await
            .unwrap();

        for step in &report.steps {
            assert!(step.outcome.is_ok(), "step {} failed: {:?}", step.step, step.outcome);
        }
        assert_eq!(report.deliveries.len(), 2);
        assert!(report.deliveries.iter().all(|d| d.error.is_none()));

        // 600 in, 250 out, 100 back, 200 withdrawn.
        assert_eq!(holding(&report, 0, "USDC"), 250);
        assert_eq!(holding(&report, 1, "USDC"), 150);
        assert_eq!(report.chains[0].users["alice"].wallet["USDC"], 600);

        for chain in &report.chains {
            assert!(chain.assets.iter().all(|a| a.solvent), "{} insolvent", chain.name);
        }
        let alpha_usdc = report.chains[0]
            .assets
            .iter()
            .find(|a| a.symbol == "USDC")
            .unwrap();
        assert_eq!(alpha_usdc.apy_bps, 450);
        assert!(alpha_usdc.strategy_tvl > 0);
    }

    #[tokio::test]
    async fn failed_steps_are_recorded_not_fatal() {
        let mut scenario = ScenarioConfig::default();
        scenario.steps = vec![
            Step::Withdraw {
                chain: ChainId(1),
                user: "alice".into(),
                asset: "USDC".into(),
                amount: 5,
            },
            Step::Deposit {
                chain: ChainId(1),
                user: "alice".into(),
                asset: "USDC".into(),
                amount: 5,
            },
        ];
        let report = Simulation::build(scenario).unwrap().run(TIMEOUT).await.unwrap();

        assert!(matches!(
            &report.steps[0].outcome,
            Outcome::Failed { kind, .. } if kind == "InsufficientResource"
        ));
        assert!(report.steps[1].outcome.is_ok());
        assert_eq!(holding(&report, 0, "USDC"), 5);
    }

    #[tokio::test]
    async fn paused_source_refuses_transfer() {
        let mut scenario = ScenarioConfig::default();
        scenario.steps = vec![
            Step::Deposit {
                chain: ChainId(1),
                user: "alice".into(),
                asset: "USDC".into(),
                amount: 50,
            },
            Step::Pause { chain: ChainId(1) },
            Step::Transfer {
                from: ChainId(1),
                to: ChainId(2),
                user: "alice".into(),
                asset: "USDC".into(),
                amount: 10,
                memo: String::new(),
            },
            Step::Relay,
        ];
        let report = Simulation::build(scenario).unwrap().run(TIMEOUT).await.unwrap();

        assert!(matches!(&report.steps[2].outcome, Outcome::Failed { kind, .. } if kind == "State"));
        // Nothing was submitted, so the relay step has nothing to wait for.
        assert_eq!(
            report.steps[3].outcome,
            Outcome::Ok {
                detail: "0 delivered".into()
            }
        );
        assert!(report.chains[0].snapshot.paused);
        assert_eq!(holding(&report, 0, "USDC"), 50);
    }

    #[tokio::test]
    async fn users_on_second_chain_get_wallets_there() {
        let mut scenario = ScenarioConfig::default();
        scenario.users.push(UserConfig {
            name: "bob".into(),
            address: Address::repeat_byte(0xb0),
            chain: ChainId(2),
            wallet: BTreeMap::from([("link".to_string(), 40)]),
        });
        scenario.steps = vec![Step::Deposit {
            chain: ChainId(2),
            user: "bob".into(),
            asset: "LINK".into(),
            amount: 40,
        }];
        let report = Simulation::build(scenario).unwrap().run(TIMEOUT).await.unwrap();

        assert!(report.steps[0].outcome.is_ok());
        assert_eq!(report.chains[1].users["bob"].ledger["LINK"], 40);
        assert!(report.chains[1].users["bob"].wallet.is_empty());
        // Deposited fee-asset funds are owed to bob, not to the fee reserve.
        assert_eq!(report.chains[1].fee_reserve, 1_000);
        assert!(report.chains[0].users["alice"].ledger.is_empty());
    }
}
