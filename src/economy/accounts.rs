//! Account persistence and identity collaborators

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::wallet::LedgerWallet;
use super::BoxFuture;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Account store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Persistent account storage
pub trait AccountStore: Send + Sync {
    /// Store the settled balance of an account
    fn persist_balance(&self, account: String, balance: u64) -> BoxFuture<'_, Result<(), StoreError>>;
    /// Annotate a payout made to an account
    fn record_payout(&self, account: String, units: u64) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// In-memory account store with failure injection
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    balances: Mutex<HashMap<String, u64>>,
    payouts: Mutex<Vec<(String, u64)>>,
    failing: AtomicBool,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn balance_of(&self, account: &str) -> Option<u64> {
        self.balances.lock().get(account).copied()
    }

    pub fn payouts(&self) -> Vec<(String, u64)> {
        self.payouts.lock().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::Relaxed) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AccountStore for MemoryAccountStore {
    fn persist_balance(&self, account: String, balance: u64) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.check()?;
            self.balances.lock().insert(account, balance);
            Ok(())
        })
    }

    fn record_payout(&self, account: String, units: u64) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.check()?;
            self.payouts.lock().push((account, units));
            Ok(())
        })
    }
}

/// Authenticated identity handed to the simulation on join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account: String,
    pub balance: u64,
}

/// Validates join tokens
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: String) -> BoxFuture<'_, Result<Identity, AuthError>>;
}

/// Maximum accepted token length
const MAX_TOKEN_LEN: usize = 128;

/// Development identities: every token becomes a guest account
pub struct GuestIdentityProvider {
    starting_balance: u64,
    ledger: Option<Arc<LedgerWallet>>,
}

impl GuestIdentityProvider {
    pub fn new(starting_balance: u64) -> Self {
        Self {
            starting_balance,
            ledger: None,
        }
    }

    /// Open each guest account in the in-memory ledger as well
    pub fn with_ledger(mut self, ledger: Arc<LedgerWallet>) -> Self {
        self.ledger = Some(ledger);
        self
    }
}

impl IdentityProvider for GuestIdentityProvider {
    fn authenticate(&self, token: String) -> BoxFuture<'_, Result<Identity, AuthError>> {
        Box::pin(async move {
            let token = token.trim();
            if token.len() > MAX_TOKEN_LEN || token.chars().any(|c| c.is_control() || c.is_whitespace()) {
                return Err(AuthError::InvalidToken);
            }

            // Empty token = anonymous guest
            let account = if token.is_empty() {
                format!("guest-{}", Uuid::new_v4())
            } else {
                format!("guest-{}", token)
            };

            if let Some(ledger) = &self.ledger {
                if ledger.balance_of(&account).is_none() {
                    ledger.open_account(&account, self.starting_balance);
                }
            }

            Ok(Identity {
                account,
                balance: self.starting_balance,
            })
        })
    }
}
