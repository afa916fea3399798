//! World state: players, food, spatial indices and tick history
//!
//! The `World` exclusively owns every `Player` and `Food`. The two spatial
//! grids only hold ids plus the `CellKey` each entity was inserted under,
//! which the owning record keeps so it can be removed later.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::time::Instant;

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::game::spatial::{CellKey, SpatialGrid};
use crate::game::systems::motion;
use crate::util::vec2::Vec2;

/// Unique player identifier
pub type PlayerId = Uuid;

/// Food identifier, allocated from a per-world counter
pub type FoodId = u64;

/// One point of a player's tail polyline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub x: f32,
    pub y: f32,
    /// Strictly increasing within one life, never reused
    pub seq: u32,
}

impl Segment {
    #[inline]
    pub fn new(position: Vec2, seq: u32) -> Self {
        Self {
            x: position.x,
            y: position.y,
            seq,
        }
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Economic operation in flight for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    Bet,
    CashOut,
}

/// Player state
///
/// Fields touched by motion and tail integration every tick come first.
#[derive(Debug, Clone)]
pub struct Player {
    // === Motion ===
    /// Head position in world space
    pub position: Vec2,
    /// Head position before the last motion step
    pub prev_position: Vec2,
    /// Instantaneous velocity (Δposition / dt)
    pub velocity: Vec2,
    /// Heading (radians)
    pub heading: f32,
    /// Heading the player is steering toward
    pub target_angle: f32,
    /// Speed computed in the last motion step
    pub speed: f32,
    /// Continuous mass / score
    pub length: f32,
    /// Boost intent; cleared automatically at the length floor
    pub boosting: bool,
    /// Drained length not yet dropped as a pellet
    pub boost_drop_acc: f32,
    pub alive: bool,

    // === Tail ===
    /// Tail polyline, oldest point at the front
    pub path: VecDeque<Segment>,
    /// Incrementally tracked arclength of `path`
    pub path_len: f32,
    /// Seq assigned to the next appended segment
    pub next_seq: u32,
    /// Travel distance since the last appended segment
    pub carry: f32,
    /// Newest seq included in the last broadcast
    pub last_broadcast_seq: u32,
    /// Next broadcast must send the full path
    pub needs_path_reset: bool,

    // === Economy ===
    /// Settled currency units
    pub balance: u64,
    /// Units locked in the active wager
    pub current_bet: u64,
    /// USD-cent value of the active wager
    pub current_bet_usd_cents: u64,
    pub cashed_out: bool,
    pub pending: Option<PendingOp>,

    // === Cold ===
    pub id: PlayerId,
    /// External account the balance belongs to
    pub account: String,
    pub name: String,
    pub skin: u8,
    pub kills: u32,
    pub spawn_tick: u64,
    /// Grid cell the player is indexed under (alive players only)
    pub cell: Option<CellKey>,
    /// Last accepted `input` message
    pub last_input_at: Option<Instant>,
}

impl Player {
    /// New, not yet spawned player
    pub fn new(id: PlayerId, account: String, name: String, skin: u8, balance: u64) -> Self {
        Self {
            position: Vec2::ZERO,
            prev_position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            heading: 0.0,
            target_angle: 0.0,
            speed: 0.0,
            length: 0.0,
            boosting: false,
            boost_drop_acc: 0.0,
            alive: false,
            path: VecDeque::new(),
            path_len: 0.0,
            next_seq: 0,
            carry: 0.0,
            last_broadcast_seq: 0,
            needs_path_reset: true,
            balance,
            current_bet: 0,
            current_bet_usd_cents: 0,
            cashed_out: false,
            pending: None,
            id,
            account,
            name,
            skin,
            kills: 0,
            spawn_tick: 0,
            cell: None,
            last_input_at: None,
        }
    }

    /// Head collision radius for the current length
    #[inline]
    pub fn head_radius(&self, config: &SimConfig) -> f32 {
        motion::head_radius(self.length, config)
    }

    /// Balance plus the stake riding on the active wager
    #[inline]
    pub fn total_units(&self) -> u64 {
        self.balance.saturating_add(self.current_bet)
    }

    /// Put the player back into play at `position`. Seq numbering restarts.
    pub fn reset_for_spawn(&mut self, position: Vec2, heading: f32, tick: u64, config: &SimConfig) {
        self.alive = true;
        self.position = position;
        self.prev_position = position;
        self.velocity = Vec2::ZERO;
        self.heading = heading;
        self.target_angle = heading;
        self.speed = config.base_speed;
        self.length = config.base_length;
        self.boosting = false;
        self.boost_drop_acc = 0.0;

        self.path.clear();
        self.path.push_back(Segment::new(position, 0));
        self.path_len = 0.0;
        self.next_seq = 1;
        self.carry = 0.0;
        self.last_broadcast_seq = 0;
        self.needs_path_reset = true;

        self.spawn_tick = tick;
    }

    /// Take the player out of play without touching its economy fields
    pub fn withdraw(&mut self) {
        self.alive = false;
        self.boosting = false;
        self.velocity = Vec2::ZERO;
        self.path.clear();
        self.path_len = 0.0;
        self.carry = 0.0;
        self.boost_drop_acc = 0.0;
    }
}

/// Wager value carried by a gold food chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerChunk {
    pub units: u64,
    pub usd_cents: u64,
}

/// Food pellet
#[derive(Debug, Clone)]
pub struct Food {
    pub id: FoodId,
    pub position: Vec2,
    /// Length granted to the eater
    pub value: f32,
    /// Palette index
    pub color: u8,
    /// Render emphasis
    pub big: bool,
    /// World clock at creation (milliseconds)
    pub created_ms: u64,
    /// Pulse animation offset (radians)
    pub phase: f32,
    /// Present only on chunks of a forfeited bet
    pub wager: Option<WagerChunk>,
    /// Grid cell the food is indexed under
    pub cell: CellKey,
}

/// Per-tick diagnostics record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: u64,
    pub alive_players: usize,
    pub total_players: usize,
    pub food_count: usize,
    pub kills: usize,
    pub active_bet_units: u64,
}

/// Description of a new pellet
#[derive(Debug, Clone, Copy)]
pub struct FoodSpec {
    pub position: Vec2,
    pub value: f32,
    pub color: u8,
    pub big: bool,
    pub wager: Option<WagerChunk>,
}

/// Complete simulation state
pub struct World {
    pub center: Vec2,
    pub radius: f32,
    pub tick: u64,
    /// Simulated seconds since the world was created
    pub elapsed: f64,
    pub players: HashMap<PlayerId, Player>,
    pub foods: HashMap<FoodId, Food>,
    pub player_index: SpatialGrid<PlayerId>,
    pub food_index: SpatialGrid<FoodId>,
    pub history: VecDeque<TickRecord>,
    history_capacity: usize,
    next_food_id: FoodId,
    pub rng: StdRng,
}

impl World {
    pub fn new(config: &SimConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// World with an injected RNG (deterministic tests)
    pub fn with_rng(config: &SimConfig, rng: StdRng) -> Self {
        Self {
            center: Vec2::new(config.arena_center_x, config.arena_center_y),
            radius: config.arena_radius,
            tick: 0,
            elapsed: 0.0,
            players: HashMap::new(),
            foods: HashMap::with_capacity(config.food_target),
            player_index: SpatialGrid::new(config.cell_size),
            food_index: SpatialGrid::new(config.cell_size),
            history: VecDeque::with_capacity(config.history_capacity),
            history_capacity: config.history_capacity.max(1),
            next_food_id: 1,
            rng,
        }
    }

    /// World clock in milliseconds
    #[inline]
    pub fn now_ms(&self) -> u64 {
        (self.elapsed * 1000.0) as u64
    }

    /// Uniform random point within `fraction` of the arena radius
    pub fn random_point(&mut self, fraction: f32) -> Vec2 {
        let r = self.radius * fraction * self.rng.gen::<f32>().sqrt();
        let theta = self.rng.gen_range(0.0..TAU);
        self.center + Vec2::from_angle(theta) * r
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// Units currently locked in wagers across all players
    pub fn active_bet_units(&self) -> u64 {
        self.players.values().map(|p| p.current_bet).sum()
    }

    /// Add a player and spawn it at a random point
    pub fn spawn_player(&mut self, mut player: Player, config: &SimConfig) -> PlayerId {
        let id = player.id;
        let position = self.random_point(config.spawn_radius_fraction);
        let heading = self.rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
        player.reset_for_spawn(position, heading, self.tick, config);
        player.cell = Some(self.player_index.insert(id, position));
        self.players.insert(id, player);
        id
    }

    /// Respawn a dead, non-cashed-out player. Returns false if not eligible.
    pub fn respawn_player(&mut self, id: PlayerId, config: &SimConfig) -> bool {
        let eligible = self
            .players
            .get(&id)
            .map(|p| !p.alive && !p.cashed_out && p.pending != Some(PendingOp::CashOut))
            .unwrap_or(false);
        if !eligible {
            return false;
        }

        let position = self.random_point(config.spawn_radius_fraction);
        let heading = self.rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
        let tick = self.tick;
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        player.reset_for_spawn(position, heading, tick, config);
        player.cell = Some(self.player_index.insert(id, position));
        true
    }

    /// Drop a player from the player index (no-op if not indexed)
    pub fn unindex_player(&mut self, id: PlayerId) {
        if let Some(player) = self.players.get_mut(&id) {
            if let Some(key) = player.cell.take() {
                self.player_index.remove(id, key);
            }
        }
    }

    /// Remove a player from the world. Safe to call for a missing id.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let mut player = self.players.remove(&id)?;
        if let Some(key) = player.cell.take() {
            self.player_index.remove(id, key);
        }
        Some(player)
    }

    /// Rebuild the player index from current positions of alive players
    pub fn rebuild_player_index(&mut self) {
        self.player_index.clear();
        for player in self.players.values_mut() {
            player.cell = if player.alive {
                Some(self.player_index.insert(player.id, player.position))
            } else {
                None
            };
        }
    }

    /// Create a pellet and index it
    pub fn add_food(&mut self, spec: FoodSpec) -> FoodId {
        let id = self.next_food_id;
        self.next_food_id += 1;
        let phase = self.rng.gen_range(0.0..TAU);
        let cell = self.food_index.insert(id, spec.position);
        self.foods.insert(
            id,
            Food {
                id,
                position: spec.position,
                value: spec.value,
                color: spec.color,
                big: spec.big,
                created_ms: self.now_ms(),
                phase,
                wager: spec.wager,
                cell,
            },
        );
        id
    }

    /// Remove a pellet from both the map and the index
    pub fn remove_food(&mut self, id: FoodId) -> Option<Food> {
        let food = self.foods.remove(&id)?;
        self.food_index.remove(id, food.cell);
        Some(food)
    }

    /// Append to the bounded history, evicting the oldest record
    pub fn record_history(&mut self, record: TickRecord) {
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}
