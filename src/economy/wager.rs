//! Async side of the wager state machine
//!
//! These operations run off the simulation lane. They receive a ticket captured
//! by the lane (`game::systems::wager`), talk to the external collaborators, and
//! return a receipt or a `WagerError`. The lane applies the outcome; nothing
//! here touches the world.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::accounts::AccountStore;
use super::price::{cents_to_units, PriceCache};
use super::wallet::{Transfer, TransferMemo, Wallet};
use crate::game::state::PlayerId;
use crate::net::protocol::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WagerError {
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Invalid bet amount: {0} cents")]
    InvalidAmount(u64),
    #[error("A bet is already active")]
    BetAlreadyActive,
    #[error("Price quote unavailable")]
    PriceUnavailable,
    #[error("Bet transfer failed: {0}")]
    TransferFailed(String),
    #[error("Bet could not be persisted: {0}")]
    PersistFailed(String),
    /// Persist failed and the compensating transfer failed too; the stake sits with the house
    #[error("Bet could not be persisted and the stake was not returned: {reason}")]
    StakeNotReturned { receipt: BetReceipt, reason: String },
    #[error("Cash-out transfer failed: {0}")]
    CashoutTransferFailed(String),
    #[error("Player is not alive")]
    NotAlive,
    #[error("Another operation is pending")]
    OperationPending,
    #[error("Nothing to cash out")]
    NothingToCashOut,
    #[error("Player not found")]
    PlayerMissing,
}

impl WagerError {
    /// Machine-readable code sent to the player
    pub fn code(&self) -> ErrorCode {
        match self {
            WagerError::InsufficientBalance => ErrorCode::InsufficientBalance,
            WagerError::InvalidAmount(_) => ErrorCode::InvalidAmount,
            WagerError::BetAlreadyActive => ErrorCode::BetAlreadyActive,
            WagerError::PriceUnavailable => ErrorCode::PriceUnavailable,
            WagerError::TransferFailed(_) => ErrorCode::BetTransferFailed,
            WagerError::PersistFailed(_) => ErrorCode::BetPersistFailed,
            WagerError::StakeNotReturned { .. } => ErrorCode::BetStakeHeld,
            WagerError::CashoutTransferFailed(_) => ErrorCode::CashoutTransferFailed,
            WagerError::NotAlive => ErrorCode::NotAlive,
            WagerError::OperationPending => ErrorCode::OperationPending,
            WagerError::NothingToCashOut => ErrorCode::NothingToCashOut,
            WagerError::PlayerMissing => ErrorCode::NotJoined,
        }
    }

    /// Stake that left the player's wallet even though the bet failed
    pub fn held_stake(&self) -> Option<&BetReceipt> {
        match self {
            WagerError::StakeNotReturned { receipt, .. } => Some(receipt),
            _ => None,
        }
    }
}

/// Bet request captured on the lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetTicket {
    pub player: PlayerId,
    pub account: String,
    pub usd_cents: u64,
    /// Settled balance when the bet was requested
    pub balance: u64,
}

/// Accepted bet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetReceipt {
    /// Units staked (after the balance cap)
    pub units: u64,
    /// USD-cent value of the stake
    pub usd_cents: u64,
    pub new_balance: u64,
}

/// Cash-out request captured on the lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashoutTicket {
    pub player: PlayerId,
    pub account: String,
    pub balance: u64,
    pub bet_units: u64,
    pub bet_usd_cents: u64,
}

/// Completed cash-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashoutReceipt {
    pub final_balance: u64,
    /// Units returned from the active bet
    pub returned_units: u64,
}

/// Result of an async operation, delivered back to the lane
#[derive(Debug, Clone)]
pub enum Settlement {
    Bet {
        ticket: BetTicket,
        result: Result<BetReceipt, WagerError>,
    },
    Cashout {
        ticket: CashoutTicket,
        result: Result<CashoutReceipt, WagerError>,
    },
}

/// Wager operations against the external collaborators
pub struct WagerService {
    wallet: Arc<dyn Wallet>,
    accounts: Arc<dyn AccountStore>,
    prices: Arc<PriceCache>,
    allowed_usd_cents: Vec<u64>,
    chunk_usd_cents: u64,
}

impl WagerService {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        accounts: Arc<dyn AccountStore>,
        prices: Arc<PriceCache>,
        allowed_usd_cents: Vec<u64>,
        chunk_usd_cents: u64,
    ) -> Self {
        Self {
            wallet,
            accounts,
            prices,
            allowed_usd_cents,
            chunk_usd_cents: chunk_usd_cents.max(1),
        }
    }

    pub fn prices(&self) -> &Arc<PriceCache> {
        &self.prices
    }

    /// Whether `usd_cents` is one of the accepted denominations
    pub fn is_allowed(&self, usd_cents: u64) -> bool {
        self.allowed_usd_cents.contains(&usd_cents)
    }

    /// Lock a stake: quote, normalise, cap, transfer, persist.
    ///
    /// A failed transfer leaves everything untouched. A failed persist after a
    /// successful transfer is reversed with a compensating transfer.
    pub async fn place_bet(&self, ticket: &BetTicket) -> Result<BetReceipt, WagerError> {
        if !self.is_allowed(ticket.usd_cents) {
            return Err(WagerError::InvalidAmount(ticket.usd_cents));
        }

        let price = self
            .prices
            .quote()
            .await
            .map_err(|_| WagerError::PriceUnavailable)?;

        // Whole chunks only
        let usd_cents = (ticket.usd_cents / self.chunk_usd_cents) * self.chunk_usd_cents;
        let units = cents_to_units(usd_cents, price);
        if units == 0 {
            return Err(WagerError::InvalidAmount(ticket.usd_cents));
        }

        let stake = units.min(ticket.balance);
        if stake == 0 {
            return Err(WagerError::InsufficientBalance);
        }
        let stake_cents = if stake == units {
            usd_cents
        } else {
            ((usd_cents as u128 * stake as u128) / units as u128) as u64
        };

        self.wallet
            .transfer(Transfer::stake(&ticket.account, stake))
            .await
            .map_err(|e| {
                warn!("Bet transfer failed for {}: {}", ticket.player, e);
                WagerError::TransferFailed(e.to_string())
            })?;

        let new_balance = ticket.balance - stake;
        if let Err(e) = self
            .accounts
            .persist_balance(ticket.account.clone(), new_balance)
            .await
        {
            warn!("Bet persist failed for {}, compensating: {}", ticket.player, e);
            let reversal = Transfer::payout(&ticket.account, stake, TransferMemo::Compensation);
            if let Err(ce) = self.wallet.transfer(reversal).await {
                error!(
                    "Compensating transfer of {} units to {} failed: {}",
                    stake, ticket.account, ce
                );
                // The house holds the stake, so the lane must treat it as a live bet
                return Err(WagerError::StakeNotReturned {
                    receipt: BetReceipt {
                        units: stake,
                        usd_cents: stake_cents,
                        new_balance,
                    },
                    reason: ce.to_string(),
                });
            }
            return Err(WagerError::PersistFailed(e.to_string()));
        }

        info!(
            "Bet placed for {}: {} units ({} cents)",
            ticket.player, stake, stake_cents
        );
        Ok(BetReceipt {
            units: stake,
            usd_cents: stake_cents,
            new_balance,
        })
    }

    /// Return the active stake to the player and persist the final balance
    pub async fn cash_out(&self, ticket: &CashoutTicket) -> Result<CashoutReceipt, WagerError> {
        if ticket.bet_units > 0 {
            self.wallet
                .transfer(Transfer::payout(&ticket.account, ticket.bet_units, TransferMemo::Payout))
                .await
                .map_err(|e| {
                    warn!("Cash-out transfer failed for {}: {}", ticket.player, e);
                    WagerError::CashoutTransferFailed(e.to_string())
                })?;

            if let Err(e) = self
                .accounts
                .record_payout(ticket.account.clone(), ticket.bet_units)
                .await
            {
                warn!("Payout annotation failed for {}: {}", ticket.player, e);
            }
        }

        let final_balance = ticket.balance.saturating_add(ticket.bet_units);
        if let Err(e) = self
            .accounts
            .persist_balance(ticket.account.clone(), final_balance)
            .await
        {
            // The wallet ledger is authoritative; the cash-out stands
            warn!("Cash-out persist failed for {}: {}", ticket.player, e);
        }

        info!(
            "Cash-out for {}: final balance {} ({} returned)",
            ticket.player, final_balance, ticket.bet_units
        );
        Ok(CashoutReceipt {
            final_balance,
            returned_units: ticket.bet_units,
        })
    }

    /// Best-effort return of a stake whose owner left. Errors are only logged.
    pub async fn refund(&self, player: PlayerId, account: &str, units: u64, balance: u64) {
        if units == 0 {
            return;
        }
        match self
            .wallet
            .transfer(Transfer::payout(account, units, TransferMemo::Payout))
            .await
        {
            Ok(_) => {
                if let Err(e) = self.accounts.record_payout(account.to_string(), units).await {
                    warn!("Payout annotation failed for {}: {}", player, e);
                }
                if let Err(e) = self
                    .accounts
                    .persist_balance(account.to_string(), balance.saturating_add(units))
                    .await
                {
                    warn!("Refund persist failed for {}: {}", player, e);
                }
                info!("Refunded {} units to departed player {}", units, player);
            }
            Err(e) => error!("Refund of {} units to {} failed: {}", units, player, e),
        }
    }
}
