//! Integration tests for cross-chain transfers over the loopback network.
//!
//! Two instances on two chains, each with its own asset bank, wired to one
//! loopback network. Covers the round trip, delivery edge cases, and every
//! way an outbound request can be refused without touching the ledger.

mod common;

use common::*;
use ferry_adapters::{LoopbackError, LoopbackNetwork};
use ferry_protocol::{
    AssetBank, ChainId, ErrorKind, EventKind, FerryError, InboundMessage, Intent, MessageId, StrategyHandle, TokenAmount,
};

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn round_trip_restores_balances_and_supply() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 100);
    w.a.fund_fees(&w.link, 50);
    w.b.fund_fees(&w.link, 50);

    w.bridge(CHAIN_A, &ALICE, w.usdc, 60);
    assert_eq!(w.a.instance.balance_of(&ALICE, &w.usdc), 40);
    assert_eq!(w.b.instance.balance_of(&ALICE, &w.usdc), 60);
    assert_eq!(w.b.instance.direct_balance(&w.usdc), 60);

    w.bridge(CHAIN_B, &ALICE, w.usdc, 60);
    assert_eq!(w.a.instance.balance_of(&ALICE, &w.usdc), 100);
    assert_eq!(w.b.instance.balance_of(&ALICE, &w.usdc), 0);

    // Burned on the way out, minted on the way in.
    let supply = w.a.bank.total_supply(&w.usdc) + w.b.bank.total_supply(&w.usdc);
    assert_eq!(supply, 100);
    assert_eq!(w.a.instance.fee_reserve(), 50 - FEE);
    assert_eq!(w.b.instance.fee_reserve(), 50 - FEE);

    for chain in [&w.a, &w.b] {
        chain.instance.check_solvency(&w.usdc).unwrap();
        chain.instance.check_solvency(&w.link).unwrap();
    }
}

#[test]
fn receipt_and_events_name_the_requester() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 10);
    w.a.fund_fees(&w.link, FEE);

    let id = w
        .a
        .instance
        .request_transfer(&ALICE, w.request(CHAIN_B, w.usdc, 10))
        .unwrap();
    let receipt = w.relay().pop().unwrap().unwrap();

    assert_eq!(receipt.message_id, id);
    assert_eq!(receipt.requester, ALICE);
    assert_eq!(receipt.source_chain, CHAIN_A);
    assert_eq!(receipt.memo, "bridge");
    assert!(w
        .a
        .instance
        .events()
        .iter()
        .any(|e| matches!(e.kind, EventKind::TransferRequested { message_id, fee: FEE, .. } if message_id == id)));
    assert!(w
        .b
        .instance
        .events()
        .iter()
        .any(|e| matches!(e.kind, EventKind::TransferReceived { requester, .. } if requester == ALICE)));
}

// ---------------------------------------------------------------------------
// Delivery edge cases
// ---------------------------------------------------------------------------

#[test]
fn duplicate_delivery_is_rejected_and_unwound() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 30);
    w.a.fund_fees(&w.link, FEE);
    w.a.instance
        .request_transfer(&ALICE, w.request(CHAIN_B, w.usdc, 30))
        .unwrap();

    let envelope = w.net.next_envelope().unwrap();
    w.net.deliver(envelope.clone(), &w.b.instance).unwrap();

    let err = w.net.deliver(envelope, &w.b.instance).unwrap_err();
    assert!(matches!(err, LoopbackError::Delivery(FerryError::DuplicateMessage(_))));
    assert_eq!(w.b.instance.balance_of(&ALICE, &w.usdc), 30);
    assert_eq!(w.b.instance.direct_balance(&w.usdc), 30);
    assert_eq!(w.b.bank.total_supply(&w.usdc), 30);
}

#[test]
fn envelope_for_another_instance_is_refused() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 5);
    w.a.fund_fees(&w.link, FEE);
    w.a.instance
        .request_transfer(&ALICE, w.request(CHAIN_B, w.usdc, 5))
        .unwrap();

    let envelope = w.net.next_envelope().unwrap();
    let err = w.net.deliver(envelope, &w.a.instance).unwrap_err();
    assert!(matches!(err, LoopbackError::WrongReceiver { chain: CHAIN_B, .. }));
}

#[test]
fn only_the_local_endpoint_may_deliver() {
    let w = world();
    let message = InboundMessage {
        message_id: MessageId::new([9; 32]),
        source_chain: CHAIN_A,
        sender: w.a.instance.address(),
        tokens: vec![TokenAmount {
            asset: w.usdc,
            amount: 1_000,
        }],
        data: Intent::new(BOB, "forged").encode().unwrap(),
    };

    for caller in [BOB, LoopbackNetwork::endpoint_address(CHAIN_A)] {
        let err = w
            .b
            .instance
            .on_message_received(&caller, message.clone())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }
    assert_eq!(w.b.instance.balance_of(&BOB, &w.usdc), 0);
}

#[test]
fn inbound_settles_while_destination_paused() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 20);
    w.a.fund_fees(&w.link, FEE);
    w.b.instance.pause(&PAUSER).unwrap();

    w.bridge(CHAIN_A, &ALICE, w.usdc, 20);
    assert_eq!(w.b.instance.balance_of(&ALICE, &w.usdc), 20);
    assert!(matches!(
        w.b.instance.withdraw(&ALICE, &w.usdc, 20),
        Err(FerryError::Paused)
    ));
}

// ---------------------------------------------------------------------------
// Refused requests
// ---------------------------------------------------------------------------

#[test]
fn destination_not_allowlisted() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 50);
    w.a.fund_fees(&w.link, FEE);
    w.a.instance.set_chain_allowed(&OWNER, CHAIN_B, false).unwrap();

    let err = w
        .a
        .instance
        .request_transfer(&ALICE, w.request(CHAIN_B, w.usdc, 50))
        .unwrap_err();
    assert!(matches!(err, FerryError::ChainNotAllowed(CHAIN_B)));
    assert_eq!(w.a.instance.balance_of(&ALICE, &w.usdc), 50);
    assert_eq!(w.net.pending(), 0);
}

#[test]
fn allowlisted_but_unreachable_chain() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 50);
    w.a.fund_fees(&w.link, FEE);
    let nowhere = ChainId(77);
    w.a.instance.set_chain_allowed(&OWNER, nowhere, true).unwrap();

    let mut request = w.request(CHAIN_B, w.usdc, 50);
    request.destination_chain = nowhere;
    let err = w.a.instance.request_transfer(&ALICE, request).unwrap_err();
    assert!(matches!(err, FerryError::ChainNotSupported(c) if c == nowhere));
    assert_eq!(w.a.instance.balance_of(&ALICE, &w.usdc), 50);
}

#[test]
fn fee_shortfall_rolls_back() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 50);
    w.a.fund_fees(&w.link, FEE - 1);

    let err = w
        .a
        .instance
        .request_transfer(&ALICE, w.request(CHAIN_B, w.usdc, 50))
        .unwrap_err();
    assert!(matches!(
        err,
        FerryError::InsufficientFeeReserve {
            available,
            required: FEE,
        } if available == FEE - 1
    ));
    assert_eq!(w.a.instance.balance_of(&ALICE, &w.usdc), 50);
    assert_eq!(w.a.instance.direct_balance(&w.usdc), 50);
    assert_eq!(w.net.pending(), 0);
    let endpoint = LoopbackNetwork::endpoint_address(CHAIN_A);
    assert_eq!(w.a.bank.allowance(&w.link, &w.a.instance.address(), &endpoint), 0);
}

#[test]
fn user_fee_asset_deposits_do_not_pay_fees() {
    let w = world();
    // Alice's LINK is hers; the instance has no reserve of its own.
    w.a.fund(&ALICE, &w.link, 100);
    w.a.fund(&ALICE, &w.usdc, 1);
    assert_eq!(w.a.instance.fee_reserve(), 0);

    let err = w
        .a
        .instance
        .request_transfer(&ALICE, w.request(CHAIN_B, w.usdc, 1))
        .unwrap_err();
    assert!(matches!(err, FerryError::InsufficientFeeReserve { available: 0, .. }));
    assert_eq!(w.a.instance.balance_of(&ALICE, &w.link), 100);
}

#[test]
fn transfer_from_strategy_backed_balance() {
    let w = world();
    let vault = w.a.route_through_vault(w.usdc);
    w.a.fund(&ALICE, &w.usdc, 80);
    w.a.fund_fees(&w.link, FEE);
    assert_eq!(w.a.instance.direct_balance(&w.usdc), 0);

    w.bridge(CHAIN_A, &ALICE, w.usdc, 50);
    assert_eq!(w.a.instance.balance_of(&ALICE, &w.usdc), 30);
    assert_eq!(w.a.instance.user_strategy_balance(&ALICE, &w.usdc), 30);
    assert_eq!(vault.total_value_locked(&w.usdc), 30);
    assert_eq!(w.b.instance.balance_of(&ALICE, &w.usdc), 50);
    w.a.instance.check_solvency(&w.usdc).unwrap();
}

#[test]
fn paused_source_blocks_outbound() {
    let w = world();
    w.a.fund(&ALICE, &w.usdc, 10);
    w.a.fund_fees(&w.link, FEE);
    w.a.instance.pause(&OWNER).unwrap();
    assert!(matches!(
        w.a.instance.request_transfer(&ALICE, w.request(CHAIN_B, w.usdc, 10)),
        Err(FerryError::Paused)
    ));
}
