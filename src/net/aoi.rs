//! Area of Interest (AOI) snapshot builder
//!
//! Each broadcast cycle culls the world to a fixed view radius around every
//! alive player. Neighbor tails go out as seq deltas; a viewer that did not
//! see a neighbor in its previous packet gets that neighbor's full path.
//!
//! The builder reads settled state only. Broadcast cursors advance once per
//! cycle in [`AoiBuilder::finish_cycle`].

use std::cell::RefCell;

use hashbrown::HashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::config::SimConfig;
use crate::game::state::{Player, PlayerId, World};
use crate::game::systems::tail;
use crate::net::protocol::{FoodView, LeaderboardEntry, PlayerView, SelfState, SnapshotPacket};

// Thread-local reusable buffer for the top N calculation
thread_local! {
    static PLAYERS_BY_LENGTH_BUFFER: RefCell<Vec<(PlayerId, f32)>> = RefCell::new(Vec::with_capacity(256));
}

/// Global top-N by length, ties broken by id
pub fn leaderboard(world: &World, size: usize) -> Vec<LeaderboardEntry> {
    let top: SmallVec<[PlayerId; 16]> = PLAYERS_BY_LENGTH_BUFFER.with(|buffer_cell| {
        let mut buffer = buffer_cell.borrow_mut();
        buffer.clear();
        buffer.extend(world.alive_players().map(|p| (p.id, p.length)));
        buffer.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        buffer.iter().take(size).map(|(id, _)| *id).collect()
    });

    top.iter()
        .filter_map(|id| world.get_player(*id))
        .map(|p| LeaderboardEntry {
            id: p.id,
            name: p.name.clone(),
            length: p.length,
            bet_units: p.current_bet,
        })
        .collect()
}

fn self_state(player: &Player, config: &SimConfig) -> SelfState {
    SelfState {
        id: player.id,
        alive: player.alive,
        position: player.position,
        velocity: player.velocity,
        heading: player.heading,
        length: player.length,
        head_radius: player.head_radius(config),
        boosting: player.boosting,
        bet_units: player.current_bet,
    }
}

fn player_view(player: &Player, config: &SimConfig, reset: bool) -> PlayerView {
    PlayerView {
        id: player.id,
        name: player.name.clone(),
        skin: player.skin,
        position: player.position,
        velocity: player.velocity,
        heading: player.heading,
        length: player.length,
        head_radius: player.head_radius(config),
        boosting: player.boosting,
        bet_units: player.current_bet,
        bet_usd_cents: player.current_bet_usd_cents,
        path: tail::payload(player, reset),
    }
}

/// Builds per-viewer snapshots and remembers what each viewer saw last
#[derive(Default)]
pub struct AoiBuilder {
    visible: HashMap<PlayerId, FxHashSet<PlayerId>>,
}

impl AoiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for one viewer; `None` unless the viewer is alive
    pub fn build_for(
        &mut self,
        world: &World,
        config: &SimConfig,
        viewer: PlayerId,
        leaderboard: &[LeaderboardEntry],
    ) -> Option<SnapshotPacket> {
        let Some(me) = world.get_player(viewer).filter(|p| p.alive) else {
            self.visible.remove(&viewer);
            return None;
        };

        let center = me.position;
        let radius = config.view_radius;
        let radius_sq = radius * radius;

        let previous = self.visible.remove(&viewer).unwrap_or_default();
        let mut seen = FxHashSet::default();

        let mut neighbors: Vec<PlayerId> = world
            .player_index
            .query_radius(center, radius)
            .filter(|id| {
                world
                    .get_player(*id)
                    .is_some_and(|p| p.alive && p.position.distance_sq_to(center) <= radius_sq)
            })
            .collect();
        if !neighbors.contains(&viewer) {
            neighbors.push(viewer);
        }
        neighbors.sort_unstable();

        let mut players = Vec::with_capacity(neighbors.len());
        for id in neighbors {
            let Some(p) = world.get_player(id) else { continue };
            let reset = !previous.contains(&id);
            players.push(player_view(p, config, reset));
            seen.insert(id);
        }

        let mut foods: Vec<FoodView> = world
            .food_index
            .query_radius(center, radius)
            .filter_map(|id| world.foods.get(&id))
            .filter(|f| f.position.distance_sq_to(center) <= radius_sq)
            .map(|f| FoodView {
                id: f.id,
                position: f.position,
                value: f.value,
                color: f.color,
                big: f.big,
                created_ms: f.created_ms,
                phase: f.phase,
                wager: f.wager,
            })
            .collect();
        foods.sort_unstable_by_key(|f| f.id);

        self.visible.insert(viewer, seen);

        Some(SnapshotPacket {
            tick: world.tick,
            you: self_state(me, config),
            players,
            foods,
            leaderboard: leaderboard.to_vec(),
        })
    }

    /// Snapshots for every alive player, in id order
    pub fn build_all(&mut self, world: &World, config: &SimConfig) -> Vec<(PlayerId, SnapshotPacket)> {
        let board = leaderboard(world, config.leaderboard_size);

        let mut viewers: Vec<PlayerId> = world.alive_players().map(|p| p.id).collect();
        viewers.sort_unstable();

        self.visible.retain(|id, _| world.get_player(*id).is_some_and(|p| p.alive));

        viewers
            .into_iter()
            .filter_map(|id| self.build_for(world, config, id, &board).map(|packet| (id, packet)))
            .collect()
    }

    /// Advance every alive player's broadcast cursor
    pub fn finish_cycle(&mut self, world: &mut World) {
        for player in world.players.values_mut().filter(|p| p.alive) {
            tail::mark_broadcast(player);
        }
    }

    /// Drop state for a departed viewer
    pub fn forget(&mut self, viewer: PlayerId) {
        self.visible.remove(&viewer);
    }

    pub fn tracked_viewers(&self) -> usize {
        self.visible.len()
    }
}
