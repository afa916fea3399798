//! Balance transfer collaborator
//!
//! Transfers move whole units between a player account and the house. The real
//! backend is external; `LedgerWallet` is the in-memory ledger used by the dev
//! server and tests, with switchable failure injection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::BoxFuture;

/// Side of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    Player(String),
    House,
}

/// Why units moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMemo {
    /// Stake locked for a new bet
    Bet,
    /// Stake returned on cash-out or disconnect
    Payout,
    /// Reversal of a bet whose persistence failed
    Compensation,
}

/// One balance transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Party,
    pub to: Party,
    pub units: u64,
    pub memo: TransferMemo,
}

impl Transfer {
    pub fn stake(account: &str, units: u64) -> Self {
        Self {
            from: Party::Player(account.to_string()),
            to: Party::House,
            units,
            memo: TransferMemo::Bet,
        }
    }

    pub fn payout(account: &str, units: u64, memo: TransferMemo) -> Self {
        Self {
            from: Party::House,
            to: Party::Player(account.to_string()),
            units,
            memo,
        }
    }
}

/// Identifier assigned by the wallet to a completed transfer
pub type TransferId = u64;

#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletError {
    #[error("Insufficient funds: {available} available, {requested} requested")]
    InsufficientFunds { available: u64, requested: u64 },
    #[error("Unknown account: {0}")]
    UnknownAccount(String),
    #[error("Wallet unavailable: {0}")]
    Unavailable(String),
}

/// External balance transfer service
pub trait Wallet: Send + Sync {
    fn transfer(&self, transfer: Transfer) -> BoxFuture<'_, Result<TransferId, WalletError>>;
}

/// In-memory ledger
#[derive(Debug, Default)]
pub struct LedgerWallet {
    balances: Mutex<HashMap<String, u64>>,
    /// Units held by the house; the house is never short
    house: AtomicU64,
    completed: Mutex<Vec<Transfer>>,
    next_id: AtomicU64,
    fail_all: AtomicBool,
    fail_payouts: AtomicBool,
}

impl LedgerWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or top up) an account
    pub fn open_account(&self, account: &str, units: u64) {
        let mut balances = self.balances.lock();
        let entry = balances.entry(account.to_string()).or_insert(0);
        *entry = entry.saturating_add(units);
    }

    pub fn balance_of(&self, account: &str) -> Option<u64> {
        self.balances.lock().get(account).copied()
    }

    pub fn house_balance(&self) -> u64 {
        self.house.load(Ordering::Relaxed)
    }

    /// Completed transfers, oldest first
    pub fn transfers(&self) -> Vec<Transfer> {
        self.completed.lock().clone()
    }

    /// Make every transfer fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::Relaxed);
    }

    /// Make only house → player transfers fail
    pub fn set_failing_payouts(&self, failing: bool) {
        self.fail_payouts.store(failing, Ordering::Relaxed);
    }

    fn apply(&self, transfer: &Transfer) -> Result<TransferId, WalletError> {
        if self.fail_all.load(Ordering::Relaxed) {
            return Err(WalletError::Unavailable("injected failure".to_string()));
        }

        let mut balances = self.balances.lock();
        match (&transfer.from, &transfer.to) {
            (Party::Player(account), Party::House) => {
                let available = balances
                    .get_mut(account.as_str())
                    .ok_or_else(|| WalletError::UnknownAccount(account.clone()))?;
                if *available < transfer.units {
                    return Err(WalletError::InsufficientFunds {
                        available: *available,
                        requested: transfer.units,
                    });
                }
                *available -= transfer.units;
                self.house.fetch_add(transfer.units, Ordering::Relaxed);
            }
            (Party::House, Party::Player(account)) => {
                if self.fail_payouts.load(Ordering::Relaxed) {
                    return Err(WalletError::Unavailable("injected payout failure".to_string()));
                }
                let entry = balances.entry(account.clone()).or_insert(0);
                *entry = entry.saturating_add(transfer.units);
                // House float is unbounded; track net flow only
                let _ = self
                    .house
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |h| {
                        Some(h.saturating_sub(transfer.units))
                    });
            }
            (from, to) => {
                return Err(WalletError::Unavailable(format!(
                    "unsupported transfer {:?} -> {:?}",
                    from, to
                )));
            }
        }
        drop(balances);

        self.completed.lock().push(transfer.clone());
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Wallet for LedgerWallet {
    fn transfer(&self, transfer: Transfer) -> BoxFuture<'_, Result<TransferId, WalletError>> {
        Box::pin(async move { self.apply(&transfer) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stake_and_payout() {
        let wallet = LedgerWallet::new();
        wallet.open_account("alice", 1_000);

        wallet.transfer(Transfer::stake("alice", 400)).await.unwrap();
        assert_eq!(wallet.balance_of("alice"), Some(600));
        assert_eq!(wallet.house_balance(), 400);

        wallet
            .transfer(Transfer::payout("alice", 400, TransferMemo::Payout))
            .await
            .unwrap();
        assert_eq!(wallet.balance_of("alice"), Some(1_000));
        assert_eq!(wallet.house_balance(), 0);
        assert_eq!(wallet.transfers().len(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let wallet = LedgerWallet::new();
        wallet.open_account("bob", 10);
        let err = wallet.transfer(Transfer::stake("bob", 11)).await.unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { available: 10, requested: 11 }));
        assert_eq!(wallet.balance_of("bob"), Some(10));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let wallet = LedgerWallet::new();
        let err = wallet.transfer(Transfer::stake("ghost", 1)).await.unwrap_err();
        assert!(matches!(err, WalletError::UnknownAccount(_)));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let wallet = LedgerWallet::new();
        wallet.open_account("carol", 100);

        wallet.set_failing(true);
        assert!(wallet.transfer(Transfer::stake("carol", 50)).await.is_err());
        wallet.set_failing(false);

        wallet.transfer(Transfer::stake("carol", 50)).await.unwrap();
        wallet.set_failing_payouts(true);
        assert!(wallet
            .transfer(Transfer::payout("carol", 50, TransferMemo::Payout))
            .await
            .is_err());
        assert_eq!(wallet.balance_of("carol"), Some(50));
        assert_eq!(wallet.transfers().len(), 1);
    }
}
