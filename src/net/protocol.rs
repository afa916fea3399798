use serde::{Deserialize, Serialize};

use crate::economy::price::units_to_cents;
use crate::game::state::{FoodId, Player, PlayerId, WagerChunk};
use crate::game::systems::tail::PathPayload;
use crate::util::vec2::Vec2;

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Enter the arena. Must be the first message on a connection.
    Join {
        nickname: String,
        skin: u8,
        token: String,
    },
    /// Steering input; `None` keeps the current target heading
    Input {
        target_angle: Option<f32>,
        boost: bool,
    },
    /// Place a bet of one of the allowed USD-cent denominations
    SetBet { usd_cents: u64 },
    /// Respawn after death
    Respawn,
    /// Leave with the current balance plus the active bet
    CashoutRequest,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Join accepted
    Welcome(Welcome),
    /// Per-player AOI snapshot
    Snapshot(SnapshotPacket),
    /// Balance or bet changed
    Balance(BalanceUpdate),
    /// You died
    Death { killer_name: String, final_score: u32 },
    /// Cash-out settled
    CashoutConfirmed {
        balance_units: u64,
        balance_usd_cents: u64,
    },
    /// Command rejected
    Error { code: ErrorCode },
    /// Pong response with server timestamp
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

/// Machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InsufficientBalance,
    InvalidAmount,
    BetAlreadyActive,
    PriceUnavailable,
    BetTransferFailed,
    BetPersistFailed,
    BetStakeHeld,
    CashoutTransferFailed,
    NotAlive,
    OperationPending,
    NothingToCashOut,
    InvalidName,
    AuthFailed,
    NotJoined,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InsufficientBalance => "insufficient_balance",
            ErrorCode::InvalidAmount => "invalid_amount",
            ErrorCode::BetAlreadyActive => "bet_already_active",
            ErrorCode::PriceUnavailable => "price_unavailable",
            ErrorCode::BetTransferFailed => "bet_transfer_failed",
            ErrorCode::BetPersistFailed => "bet_persist_failed",
            ErrorCode::BetStakeHeld => "bet_stake_held",
            ErrorCode::CashoutTransferFailed => "cashout_transfer_failed",
            ErrorCode::NotAlive => "not_alive",
            ErrorCode::OperationPending => "operation_pending",
            ErrorCode::NothingToCashOut => "nothing_to_cash_out",
            ErrorCode::InvalidName => "invalid_name",
            ErrorCode::AuthFailed => "auth_failed",
            ErrorCode::NotJoined => "not_joined",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sent once after a successful join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub player_id: PlayerId,
    pub arena_center: Vec2,
    pub arena_radius: f32,
    pub base_length: f32,
    pub min_length: f32,
    pub tick_rate: u32,
    pub broadcast_rate: u32,
    pub balance: BalanceUpdate,
}

/// Balance and bet in units and USD cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub balance_units: u64,
    pub balance_usd_cents: u64,
    pub bet_units: u64,
    pub bet_usd_cents: u64,
    pub total_units: u64,
    pub total_usd_cents: u64,
}

impl BalanceUpdate {
    /// Balance update for a player; settled units are valued at `usd_per_unit`
    pub fn for_player(player: &Player, usd_per_unit: f64) -> Self {
        let balance_usd_cents = units_to_cents(player.balance, usd_per_unit);
        Self {
            balance_units: player.balance,
            balance_usd_cents,
            bet_units: player.current_bet,
            bet_usd_cents: player.current_bet_usd_cents,
            total_units: player.total_units(),
            total_usd_cents: balance_usd_cents.saturating_add(player.current_bet_usd_cents),
        }
    }
}

/// Receiving player's own state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfState {
    pub id: PlayerId,
    pub alive: bool,
    pub position: Vec2,
    pub velocity: Vec2,
    pub heading: f32,
    pub length: f32,
    pub head_radius: f32,
    pub boosting: bool,
    pub bet_units: u64,
}

/// Another (or the own) snake inside the view radius
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub skin: u8,
    pub position: Vec2,
    /// For client-side extrapolation
    pub velocity: Vec2,
    pub heading: f32,
    pub length: f32,
    pub head_radius: f32,
    pub boosting: bool,
    pub bet_units: u64,
    pub bet_usd_cents: u64,
    pub path: PathPayload,
}

/// Pellet inside the view radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodView {
    pub id: FoodId,
    pub position: Vec2,
    pub value: f32,
    pub color: u8,
    pub big: bool,
    pub created_ms: u64,
    pub phase: f32,
    pub wager: Option<WagerChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: PlayerId,
    pub name: String,
    pub length: f32,
    pub bet_units: u64,
}

/// Per-player broadcast packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPacket {
    pub tick: u64,
    pub you: SelfState,
    pub players: Vec<PlayerView>,
    pub foods: Vec<FoodView>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Segment;
    use uuid::Uuid;

    #[test]
    fn test_client_message_join() {
        let msg = ClientMessage::Join {
            nickname: "TestPlayer".to_string(),
            skin: 3,
            token: "tok".to_string(),
        };
        let encoded = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_client_message_input_without_angle() {
        let msg = ClientMessage::Input {
            target_angle: None,
            boost: true,
        };
        let decoded: ClientMessage = decode(&encode(&msg).unwrap()).unwrap();
        match decoded {
            ClientMessage::Input { target_angle, boost } => {
                assert!(target_angle.is_none());
                assert!(boost);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_snapshot_with_delta_path() {
        let id = Uuid::new_v4();
        let packet = SnapshotPacket {
            tick: 9,
            you: SelfState {
                id,
                alive: true,
                position: Vec2::new(1.0, 2.0),
                velocity: Vec2::ZERO,
                heading: 0.5,
                length: 100.0,
                head_radius: 10.0,
                boosting: false,
                bet_units: 0,
            },
            players: vec![PlayerView {
                id,
                name: "me".into(),
                skin: 1,
                position: Vec2::new(1.0, 2.0),
                velocity: Vec2::ZERO,
                heading: 0.5,
                length: 100.0,
                head_radius: 10.0,
                boosting: false,
                bet_units: 0,
                bet_usd_cents: 0,
                path: PathPayload::Delta {
                    tail: Some(Segment { x: 0.0, y: 0.0, seq: 4 }),
                    segments: vec![Segment { x: 1.0, y: 2.0, seq: 9 }],
                },
            }],
            foods: vec![],
            leaderboard: vec![],
        };
        let msg = ServerMessage::Snapshot(packet);
        let decoded: ServerMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_error_code_names() {
        assert_eq!(ErrorCode::InsufficientBalance.as_str(), "insufficient_balance");
        assert_eq!(ErrorCode::CashoutTransferFailed.to_string(), "cashout_transfer_failed");
        assert_eq!(
            serde_json::to_string(&ErrorCode::NothingToCashOut).unwrap(),
            "\"nothing_to_cash_out\""
        );
    }

    #[test]
    fn test_balance_update_for_player() {
        let mut p = Player::new(Uuid::new_v4(), "a".into(), "p".into(), 0, 9_500);
        p.current_bet = 500;
        p.current_bet_usd_cents = 500;
        let update = BalanceUpdate::for_player(&p, 0.01);
        assert_eq!(update.balance_usd_cents, 9_500);
        assert_eq!(update.total_units, 10_000);
        assert_eq!(update.total_usd_cents, 10_000);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<ClientMessage, _> = decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(result.is_err());
    }
}
