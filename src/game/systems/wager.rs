//! Lane side of the wager state machine
//!
//! `no-bet -> bet-active -> {forfeited on death | cashed out}`
//!
//! `begin_*` validates a command against the player's current state, marks the
//! operation pending and returns a ticket for the async side. `apply_*` writes
//! the settled outcome back. Outcomes for players that are gone are discarded.

use tracing::debug;

use crate::config::SimConfig;
use crate::economy::wager::{
    BetReceipt, BetTicket, CashoutReceipt, CashoutTicket, WagerError,
};
use crate::game::state::{PendingOp, PlayerId, World};

/// Validate a bet request and mark it pending
pub fn begin_bet(
    world: &mut World,
    config: &SimConfig,
    id: PlayerId,
    usd_cents: u64,
) -> Result<BetTicket, WagerError> {
    let player = world.get_player_mut(id).ok_or(WagerError::PlayerMissing)?;

    if player.pending.is_some() {
        return Err(WagerError::OperationPending);
    }
    if player.cashed_out {
        return Err(WagerError::NotAlive);
    }
    if player.current_bet > 0 {
        return Err(WagerError::BetAlreadyActive);
    }
    if !config.allowed_bets_usd_cents.contains(&usd_cents) {
        return Err(WagerError::InvalidAmount(usd_cents));
    }
    if player.balance == 0 {
        return Err(WagerError::InsufficientBalance);
    }

    player.pending = Some(PendingOp::Bet);
    Ok(BetTicket {
        player: id,
        account: player.account.clone(),
        usd_cents,
        balance: player.balance,
    })
}

/// Write a bet outcome back. Returns false if the player is gone.
///
/// A stake the wallet kept after a failed rollback is applied like an accepted
/// bet so the local balance matches the ledger.
pub fn apply_bet_result(world: &mut World, id: PlayerId, result: &Result<BetReceipt, WagerError>) -> bool {
    let Some(player) = world.get_player_mut(id) else {
        debug!("Discarding bet settlement for departed player {}", id);
        return false;
    };
    if player.pending == Some(PendingOp::Bet) {
        player.pending = None;
    }

    let staked = match result {
        Ok(receipt) => Some(receipt),
        Err(e) => e.held_stake(),
    };
    if let Some(receipt) = staked {
        player.balance = receipt.new_balance;
        player.current_bet += receipt.units;
        player.current_bet_usd_cents += receipt.usd_cents;
    }
    true
}

/// Validate a cash-out and withdraw the player from play while it settles
pub fn begin_cashout(world: &mut World, id: PlayerId) -> Result<CashoutTicket, WagerError> {
    {
        let player = world.get_player(id).ok_or(WagerError::PlayerMissing)?;
        if player.pending.is_some() {
            return Err(WagerError::OperationPending);
        }
        if !player.alive || player.cashed_out {
            return Err(WagerError::NotAlive);
        }
        if player.total_units() == 0 {
            return Err(WagerError::NothingToCashOut);
        }
    }

    world.unindex_player(id);
    let player = world.get_player_mut(id).ok_or(WagerError::PlayerMissing)?;
    player.withdraw();
    player.pending = Some(PendingOp::CashOut);

    Ok(CashoutTicket {
        player: id,
        account: player.account.clone(),
        balance: player.balance,
        bet_units: player.current_bet,
        bet_usd_cents: player.current_bet_usd_cents,
    })
}

/// Write a cash-out outcome back. Returns false if the player is gone.
///
/// On failure the player stays withdrawn but may respawn; economy fields are untouched.
pub fn apply_cashout_result(
    world: &mut World,
    id: PlayerId,
    result: &Result<CashoutReceipt, WagerError>,
) -> bool {
    let Some(player) = world.get_player_mut(id) else {
        debug!("Discarding cash-out settlement for departed player {}", id);
        return false;
    };
    if player.pending == Some(PendingOp::CashOut) {
        player.pending = None;
    }

    if let Ok(receipt) = result {
        player.balance = receipt.final_balance;
        player.current_bet = 0;
        player.current_bet_usd_cents = 0;
        player.cashed_out = true;
        player.alive = false;
    }
    true
}
