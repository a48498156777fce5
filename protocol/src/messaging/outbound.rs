//! # Outbound Message Builder
//!
//! Turns "move `amount` of `asset` plus an intent to chain X" into a
//! transport submission:
//!
//! 1. validate everything (guard, allowlist, identities, amount, memo,
//!    balance);
//! 2. debit the requester;
//! 3. build the message and its intent payload;
//! 4. quote the fee and check the fee reserve;
//! 5. release routed funds, approve the transport, submit.
//!
//! A synchronous failure in steps 3-5 restores the debit. Once the
//! transport has accepted the message the debit is final.

use serde::{Deserialize, Serialize};

use super::{ExecutionArgs, Intent, OutboundMessage, TokenAmount};
use crate::config::{ExecutionBudget, MAX_MEMO_LENGTH};
use crate::error::{FerryError, FerryResult};
use crate::events::EventKind;
use crate::instance::{Gate, Instance};
use crate::strategy::StrategyHandle;
use crate::types::{Address, Amount, AssetId, ChainId, MessageId};

/// A user's request to move value to a peer instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Destination chain; must be allowlisted.
    pub destination_chain: ChainId,
    /// Peer instance on the destination chain.
    pub receiver: Address,
    /// Asset to move.
    pub asset: AssetId,
    /// Amount to move.
    pub amount: Amount,
    /// Free-form text carried in the intent.
    #[serde(default)]
    pub memo: String,
}

/// Builds the transport message for a transfer by `requester`.
///
/// # Errors
///
/// [`FerryError::MemoTooLong`] if the memo does not fit in an intent.
pub fn build_message(
    requester: &Address,
    receiver: Address,
    token: TokenAmount,
    memo: &str,
    fee_asset: AssetId,
    budget: ExecutionBudget,
) -> FerryResult<OutboundMessage> {
    let data = Intent::new(*requester, memo).encode()?;
    Ok(OutboundMessage {
        receiver,
        tokens: vec![token],
        data,
        fee_asset,
        extra_args: ExecutionArgs {
            gas_limit: budget.value,
        },
    })
}

impl Instance {
    /// Debits `caller` and hands the value plus an intent to the transport.
    /// Returns the transport-assigned message id.
    ///
    /// # Errors
    ///
    /// Guard errors, validation errors (`ChainNotAllowed`,
    /// `ChainNotSupported`, null identities, zero amount, `MemoTooLong`),
    /// `InsufficientBalance`, `InsufficientFeeReserve`, and collaborator
    /// errors. The ledger is unchanged on every error.
    pub fn request_transfer(&self, caller: &Address, request: TransferRequest) -> FerryResult<MessageId> {
        let _lock = self.enter(Gate::Pausable)?;
        let TransferRequest {
            destination_chain,
            receiver,
            asset,
            amount,
            memo,
        } = request;

        if caller.is_zero() {
            return Err(FerryError::NullAddress("caller"));
        }
        if receiver.is_zero() {
            return Err(FerryError::NullAddress("receiver"));
        }
        if asset.is_null() {
            return Err(FerryError::NullAsset);
        }
        if amount == 0 {
            return Err(FerryError::ZeroAmount);
        }
        if memo.len() > MAX_MEMO_LENGTH {
            return Err(FerryError::MemoTooLong {
                len: memo.len(),
                max: MAX_MEMO_LENGTH,
            });
        }

        let (budget, handle) = {
            let st = self.state().read();
            if !st.allowlist.contains(&destination_chain) {
                return Err(FerryError::ChainNotAllowed(destination_chain));
            }
            (st.budget, st.router.route_lenient(&asset))
        };
        if !self.transport().is_chain_supported(destination_chain) {
            return Err(FerryError::ChainNotSupported(destination_chain));
        }

        // Funds are in flight from here on.
        let remaining = self.state().write().book.debit(caller, &asset, amount)?;

        let token = TokenAmount { asset, amount };
        let dispatched = build_message(caller, receiver, token, &memo, self.fee_asset(), budget)
            .and_then(|message| self.dispatch(caller, destination_chain, token, handle.as_deref(), message));

        match dispatched {
            Ok((message_id, fee)) => {
                self.record(EventKind::TransferRequested {
                    message_id,
                    requester: *caller,
                    destination_chain,
                    receiver,
                    asset,
                    amount,
                    fee,
                });
                tracing::info!(
                    %message_id,
                    requester = %caller,
                    destination = %destination_chain,
                    %receiver,
                    %asset,
                    amount,
                    fee,
                    remaining,
                    "transfer submitted"
                );
                Ok(message_id)
            }
            Err(e) => {
                tracing::warn!(requester = %caller, destination = %destination_chain, %asset, amount, error = %e, "transfer aborted, restoring balance");
                self.restore_debit(caller, &asset, amount);
                Err(e)
            }
        }
    }

    // Steps 4 and 5. Returns the message id and the fee paid.
    fn dispatch(
        &self,
        requester: &Address,
        destination: ChainId,
        token: TokenAmount,
        handle: Option<&dyn StrategyHandle>,
        message: OutboundMessage,
    ) -> FerryResult<(MessageId, Amount)> {
        let fee_asset = self.fee_asset();
        let fee = self.transport().quote_fee(destination, &message)?;

        // The debit already lowered what the ledger owes in the fee asset, so
        // when the transferred asset is the fee asset the in-flight amount
        // still counts as owed.
        let same_asset = token.asset == fee_asset;
        let in_flight = if same_asset { token.amount } else { 0 };
        let reserve = self.fee_reserve_with(in_flight);
        if reserve < fee {
            return Err(FerryError::InsufficientFeeReserve {
                available: reserve,
                required: fee,
            });
        }

        let released = match handle {
            Some(h) => self.release_position(h, &token.asset, token.amount, requester)?,
            None => 0,
        };

        let submitted = self.submit_guarded(destination, token, fee, message);
        if submitted.is_err() {
            if let Some(h) = handle {
                self.restore_position(h, &token.asset, released, requester);
            }
        }
        submitted.map(|id| (id, fee))
    }

    fn submit_guarded(
        &self,
        destination: ChainId,
        token: TokenAmount,
        fee: Amount,
        message: OutboundMessage,
    ) -> FerryResult<MessageId> {
        let me = self.address();
        let spender = self.transport().address();
        let fee_asset = self.fee_asset();

        let result = self.approve_and_submit(&me, &spender, destination, token, fee, message);

        // Whatever the transport did not draw must not stay drawable.
        for asset in [fee_asset, token.asset] {
            if self.bank().allowance(&asset, &me, &spender) > 0 {
                if let Err(e) = self.bank().approve(&asset, &me, &spender, 0) {
                    tracing::warn!(%asset, error = %e, "failed to clear transport allowance");
                }
            }
        }
        result
    }

    fn approve_and_submit(
        &self,
        me: &Address,
        spender: &Address,
        destination: ChainId,
        token: TokenAmount,
        fee: Amount,
        message: OutboundMessage,
    ) -> FerryResult<MessageId> {
        let fee_asset = self.fee_asset();
        if token.asset == fee_asset {
            let total = fee
                .checked_add(token.amount)
                .ok_or(FerryError::AmountOverflow)?;
            self.bank().approve(&fee_asset, me, spender, total)?;
        } else {
            self.bank().approve(&fee_asset, me, spender, fee)?;
            self.bank().approve(&token.asset, me, spender, token.amount)?;
        }
        Ok(self.transport().submit(me, destination, message)?)
    }
}
