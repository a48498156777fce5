//! Shared two-chain world for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ferry_adapters::{InMemoryBank, LoopbackConfig, LoopbackError, LoopbackNetwork, VaultStrategy};
use ferry_protocol::{
    Address, Amount, AssetBank, AssetId, ChainId, ExecutionBudget, Instance, InstanceConfig, MessageId,
    ReceiptSummary, TransferRequest,
};

pub const CHAIN_A: ChainId = ChainId(1);
pub const CHAIN_B: ChainId = ChainId(2);
pub const FEE: Amount = 10;

pub const OWNER: Address = Address::repeat_byte(0x01);
pub const PAUSER: Address = Address::repeat_byte(0x02);
pub const ALICE: Address = Address::repeat_byte(0xa1);
pub const BOB: Address = Address::repeat_byte(0xb0);

/// One chain: its asset bank and the instance deployed on it.
pub struct Chain {
    pub bank: Arc<InMemoryBank>,
    pub instance: Arc<Instance>,
}

impl Chain {
    /// Mints `amount` to `user`, approves the instance, and deposits.
    pub fn fund(&self, user: &Address, asset: &AssetId, amount: Amount) {
        self.bank.mint(asset, user, amount).unwrap();
        self.bank
            .approve(asset, user, &self.instance.address(), amount)
            .unwrap();
        self.instance.deposit(user, asset, amount).unwrap();
    }

    /// Tops up the instance's fee reserve.
    pub fn fund_fees(&self, fee_asset: &AssetId, amount: Amount) {
        self.bank
            .mint(fee_asset, &self.instance.address(), amount)
            .unwrap();
    }

    /// Registers a vault for `asset` and turns routing on.
    pub fn route_through_vault(&self, asset: AssetId) -> Arc<VaultStrategy> {
        let vault = Arc::new(VaultStrategy::new(
            Address::repeat_byte(0x5a),
            self.instance.address(),
            self.bank.clone(),
            [asset],
        ));
        self.instance
            .set_strategy(&OWNER, &asset, Some(vault.clone()))
            .unwrap();
        self.instance.set_strategies_enabled(&OWNER, true).unwrap();
        vault
    }
}

pub struct World {
    pub net: Arc<LoopbackNetwork>,
    pub a: Chain,
    pub b: Chain,
    pub usdc: AssetId,
    pub link: AssetId,
}

fn chain(net: &Arc<LoopbackNetwork>, id: ChainId, address: Address, link: AssetId) -> Chain {
    let bank = Arc::new(InMemoryBank::new());
    bank.register("USDC", 6).unwrap();
    bank.register("LINK", 18).unwrap();
    net.attach(id, bank.clone());

    let config = InstanceConfig {
        address,
        chain_id: id,
        owner: OWNER,
        pauser: PAUSER,
        fee_asset: link,
        execution_budget: ExecutionBudget::default(),
    };
    let instance = Instance::new(config, bank.clone(), net.endpoint(id).unwrap()).unwrap();
    Chain {
        bank,
        instance: Arc::new(instance),
    }
}

/// Two chains with a lane in each direction, both allowlisted.
pub fn world() -> World {
    let registry = InMemoryBank::new();
    let usdc = registry.register("USDC", 6).unwrap();
    let link = registry.register("LINK", 18).unwrap();

    let net = LoopbackNetwork::new(LoopbackConfig {
        fee_asset: link,
        base_fee: FEE,
        fee_per_byte: 0,
    });
    let a = chain(&net, CHAIN_A, Address::repeat_byte(0xaa), link);
    let b = chain(&net, CHAIN_B, Address::repeat_byte(0xbb), link);

    a.instance.set_chain_allowed(&OWNER, CHAIN_B, true).unwrap();
    b.instance.set_chain_allowed(&OWNER, CHAIN_A, true).unwrap();

    World { net, a, b, usdc, link }
}

impl World {
    /// A transfer request addressed to the peer instance on `to`.
    pub fn request(&self, to: ChainId, asset: AssetId, amount: Amount) -> TransferRequest {
        let receiver = if to == CHAIN_A {
            self.a.instance.address()
        } else {
            self.b.instance.address()
        };
        TransferRequest {
            destination_chain: to,
            receiver,
            asset,
            amount,
            memo: "bridge".into(),
        }
    }

    pub fn chain(&self, id: ChainId) -> &Chain {
        if id == CHAIN_A {
            &self.a
        } else {
            &self.b
        }
    }

    /// Delivers every queued envelope to its destination instance.
    pub fn relay(&self) -> Vec<Result<ReceiptSummary, LoopbackError>> {
        let mut out = Vec::new();
        while let Some(envelope) = self.net.next_envelope() {
            let target = self.chain(envelope.destination_chain);
            out.push(self.net.deliver(envelope, &target.instance));
        }
        out
    }

    /// Sends and relays in one go. Returns the message id.
    pub fn bridge(&self, from: ChainId, user: &Address, asset: AssetId, amount: Amount) -> MessageId {
        let to = if from == CHAIN_A { CHAIN_B } else { CHAIN_A };
        let id = self
            .chain(from)
            .instance
            .request_transfer(user, self.request(to, asset, amount))
            .unwrap();
        for result in self.relay() {
            result.unwrap();
        }
        id
    }
}
