//! Fixed-order simulation tick
//!
//! Phases run synchronously in this order every tick:
//! sanitize → move → extend/trim tails → reindex → boost drops → pickup →
//! collide → replenish food → record history.

use std::sync::Arc;

use tracing::debug;

use crate::config::SimConfig;
use crate::game::kill_log::KillLog;
use crate::game::state::{Player, PlayerId, TickRecord, World};
use crate::game::systems::{collision, food, motion, tail};

/// Something the session must tell players about
#[derive(Debug, Clone, PartialEq)]
pub enum GameLoopEvent {
    /// Victim died on killer's body
    PlayerKilled {
        victim: PlayerId,
        killer: PlayerId,
        killer_name: String,
        final_score: u32,
    },
    /// Balance or bet changed; the player should get a balance update
    BalanceChanged { player_id: PlayerId },
}

pub struct GameLoop {
    world: World,
    config: SimConfig,
    kill_log: Arc<dyn KillLog>,
}

impl GameLoop {
    pub fn new(config: SimConfig, kill_log: Arc<dyn KillLog>) -> Self {
        let world = World::new(&config);
        Self::with_world(world, config, kill_log)
    }

    /// Loop over an existing world (seeded RNG in tests)
    pub fn with_world(world: World, config: SimConfig, kill_log: Arc<dyn KillLog>) -> Self {
        Self {
            world,
            config,
            kill_log,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// World and config borrowed together
    pub fn parts_mut(&mut self) -> (&mut World, &SimConfig) {
        (&mut self.world, &self.config)
    }

    /// Add and spawn a player
    pub fn add_player(&mut self, player: Player) -> PlayerId {
        self.world.spawn_player(player, &self.config)
    }

    /// Respawn a dead player; false if not eligible
    pub fn respawn(&mut self, id: PlayerId) -> bool {
        self.world.respawn_player(id, &self.config)
    }

    /// Remove a player entirely; safe for unknown ids
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.world.remove_player(id)
    }

    /// Apply steering input to an alive player
    pub fn apply_input(&mut self, id: PlayerId, target_angle: Option<f32>, boost: bool) -> bool {
        let config = &self.config;
        match self.world.get_player_mut(id) {
            Some(p) if p.alive => {
                if let Some(angle) = target_angle.filter(|a| a.is_finite()) {
                    p.target_angle = angle;
                }
                p.boosting = boost && motion::can_boost(p.length, config);
                true
            }
            _ => false,
        }
    }

    /// Run one tick of `dt` seconds
    pub fn tick(&mut self, dt: f32) -> Vec<GameLoopEvent> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let mut events = Vec::new();

        self.world.tick += 1;
        self.world.elapsed += dt as f64;

        motion::sanitize(&mut self.world, &self.config);
        motion::update(&mut self.world, &self.config, dt);
        tail::update(&mut self.world, &self.config);
        self.world.rebuild_player_index();

        food::drop_boost_mass(&mut self.world, &self.config);
        let pickups = food::resolve_pickups(&mut self.world, &self.config);
        for player_id in pickups.wager_credited {
            events.push(GameLoopEvent::BalanceChanged { player_id });
        }

        let deaths = collision::resolve(&mut self.world, &self.config, self.kill_log.as_ref());
        let kills = deaths.len();
        for death in deaths {
            events.push(GameLoopEvent::BalanceChanged {
                player_id: death.victim,
            });
            events.push(GameLoopEvent::PlayerKilled {
                victim: death.victim,
                killer: death.killer,
                killer_name: death.killer_name,
                final_score: death.final_length.max(0.0).round() as u32,
            });
        }

        let spawned = food::replenish(&mut self.world, &self.config);

        let record = TickRecord {
            tick: self.world.tick,
            alive_players: self.world.alive_count(),
            total_players: self.world.players.len(),
            food_count: self.world.foods.len(),
            kills,
            active_bet_units: self.world.active_bet_units(),
        };
        self.world.record_history(record);

        if pickups.eaten > 0 || kills > 0 {
            debug!(
                "Tick {}: {} eaten, {} kills, {} food spawned",
                self.world.tick, pickups.eaten, kills, spawned
            );
        }

        events
    }
}
