//! Collision & death resolution
//!
//! Heads are tested against other players' sampled bodies. Players are checked
//! in ascending id order and a victim leaves the player index as soon as it dies,
//! so of two snakes hitting each other the lower id dies and the other survives.

use smallvec::SmallVec;
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::game::kill_log::{KillEvent, KillLog};
use crate::game::state::{PlayerId, World};
use crate::game::systems::{food, motion};
use crate::util::vec2::Vec2;

/// Outcome of one death, consumed by the game loop for notifications
#[derive(Debug, Clone, PartialEq)]
pub struct Death {
    pub victim: PlayerId,
    pub killer: PlayerId,
    pub killer_name: String,
    pub position: Vec2,
    pub final_length: f32,
    pub forfeited_bet_units: u64,
    pub forfeited_bet_usd_cents: u64,
    /// Wager-tagged pellets created from the forfeited bet
    pub wager_food: usize,
}

/// Find the body (if any) the player's head is touching.
/// Candidates are tried in ascending id order.
///
/// Candidates come from the player index, which holds heads only. A body part
/// further than `collision_query_radius` from its own head is never tested.
pub fn find_killer(world: &World, config: &SimConfig, id: PlayerId) -> Option<PlayerId> {
    let player = world.players.get(&id).filter(|p| p.alive)?;
    let head = player.position;
    let head_r = player.head_radius(config);

    let mut candidates: SmallVec<[PlayerId; 16]> = world
        .player_index
        .query_radius(head, config.collision_query_radius)
        .filter(|&other| other != id)
        .collect();
    candidates.sort_unstable();

    let stride = config.body_sample_stride.max(1);
    candidates.into_iter().find(|other| {
        let Some(body) = world.players.get(other).filter(|p| p.alive) else {
            return false;
        };
        let reach = head_r + motion::head_radius(body.length, config);
        let reach_sq = reach * reach;
        let n = body.path.len();
        if n == 0 {
            return false;
        }

        // Strided samples plus the newest point, which sits right behind the head
        (0..n)
            .step_by(stride)
            .chain(std::iter::once(n - 1))
            .any(|i| body.path[i].position().distance_sq_to(head) < reach_sq)
    })
}

/// Run collision checks for every alive player and resolve the deaths
pub fn resolve(world: &mut World, config: &SimConfig, kill_log: &dyn KillLog) -> Vec<Death> {
    let mut order: Vec<PlayerId> = world.alive_players().map(|p| p.id).collect();
    order.sort_unstable();

    let mut deaths = Vec::new();
    for id in order {
        if let Some(killer) = find_killer(world, config, id) {
            if let Some(death) = kill_player(world, config, id, killer, kill_log) {
                deaths.push(death);
            }
        }
    }
    deaths
}

/// Kill `victim`: leave the index, forfeit the bet, scatter mass and stake, log it
pub fn kill_player(
    world: &mut World,
    config: &SimConfig,
    victim: PlayerId,
    killer: PlayerId,
    kill_log: &dyn KillLog,
) -> Option<Death> {
    world.unindex_player(victim);

    let (path, position, length, mass, bet_units, bet_cents, color, victim_name) = {
        let p = world.players.get_mut(&victim).filter(|p| p.alive)?;
        let mut path: Vec<Vec2> = p.path.iter().map(|s| s.position()).collect();
        path.push(p.position);
        let snapshot = (
            path,
            p.position,
            p.length,
            // Undropped boost drain goes down with the body
            p.length + p.boost_drop_acc,
            p.current_bet,
            p.current_bet_usd_cents,
            food::skin_color(p.skin),
            p.name.clone(),
        );
        p.withdraw();
        p.current_bet = 0;
        p.current_bet_usd_cents = 0;
        snapshot
    };

    let (killer_name, killer_length) = match world.players.get_mut(&killer) {
        Some(k) => {
            k.kills += 1;
            (k.name.clone(), k.length)
        }
        None => (String::new(), 0.0),
    };

    let placed = food::scatter_body(world, config, &path, mass, color);
    let wager_food = if bet_units > 0 {
        food::scatter_wager(world, config, &path, bet_units, bet_cents).len()
    } else {
        0
    };
    debug!(
        "Scattered {:.1} length as food for {} ({} wager chunks)",
        placed, victim, wager_food
    );

    kill_log.record(&KillEvent {
        tick: world.tick,
        at_ms: world.now_ms(),
        killer,
        killer_name: killer_name.clone(),
        killer_length,
        victim,
        victim_name: victim_name.clone(),
        victim_length: length,
        position,
        forfeited_bet_units: bet_units,
        forfeited_bet_usd_cents: bet_cents,
    });
    info!(
        "{} ({}) killed by {} ({}) at length {:.0}, forfeited {} units",
        victim_name, victim, killer_name, killer, length, bet_units
    );

    Some(Death {
        victim,
        killer,
        killer_name,
        position,
        final_length: length,
        forfeited_bet_units: bet_units,
        forfeited_bet_usd_cents: bet_cents,
        wager_food,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::kill_log::MemoryKillLog;
    use crate::game::state::{Player, Segment};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn setup() -> (World, SimConfig) {
        let config = SimConfig::default();
        let world = World::with_rng(&config, StdRng::seed_from_u64(3));
        (world, config)
    }

    /// Spawn a player at `head` with a straight body laid out along +x behind it
    fn place(world: &mut World, config: &SimConfig, id: PlayerId, head: Vec2) {
        let id = world.spawn_player(Player::new(id, "a".into(), format!("p{}", id.as_u128() % 100), 1, 0), config);
        let p = world.get_player_mut(id).unwrap();
        p.position = head;
        p.prev_position = head;
        p.path.clear();
        for i in 0..8u32 {
            let x = head.x - 12.0 * (8 - i) as f32;
            p.path.push_back(Segment::new(Vec2::new(x, head.y), i));
        }
        p.path_len = 12.0 * 7.0;
        world.rebuild_player_index();
    }

    #[test]
    fn test_head_into_body_kills_and_unindexes() {
        let (mut world, config) = setup();
        let killer = Uuid::from_u128(2);
        let victim = Uuid::from_u128(1);
        place(&mut world, &config, killer, Vec2::new(0.0, 0.0));
        // Victim's head sits on the killer's body
        place(&mut world, &config, victim, Vec2::new(-48.0, 5.0 + 300.0));
        world.get_player_mut(victim).unwrap().position = Vec2::new(-48.0, 5.0);
        world.rebuild_player_index();

        let log = MemoryKillLog::new();
        let deaths = resolve(&mut world, &config, &log);
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].victim, victim);
        assert_eq!(deaths[0].killer, killer);

        let v = world.get_player(victim).unwrap();
        assert!(!v.alive);
        assert!(v.path.is_empty());
        assert_eq!(v.path_len, 0.0);
        assert!(v.cell.is_none());
        assert!(!world.player_index.query_radius(Vec2::new(-48.0, 5.0), 50.0).any(|id| id == victim));

        let events = log.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].killer, killer);
        assert_eq!(events[0].victim, victim);
        assert_eq!(world.get_player(killer).unwrap().kills, 1);
    }

    #[test]
    fn test_far_apart_no_collision() {
        let (mut world, config) = setup();
        place(&mut world, &config, Uuid::from_u128(1), Vec2::new(0.0, 0.0));
        place(&mut world, &config, Uuid::from_u128(2), Vec2::new(0.0, 400.0));
        let log = MemoryKillLog::new();
        assert!(resolve(&mut world, &config, &log).is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_mutual_hit_lower_id_dies() {
        let (mut world, config) = setup();
        let low = Uuid::from_u128(10);
        let high = Uuid::from_u128(20);
        place(&mut world, &config, low, Vec2::new(0.0, 0.0));
        place(&mut world, &config, high, Vec2::new(0.0, 2.0));

        let log = MemoryKillLog::new();
        let deaths = resolve(&mut world, &config, &log);
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].victim, low);
        assert!(world.get_player(high).unwrap().alive);
    }

    #[test]
    fn test_death_forfeits_bet_into_wager_food() {
        let (mut world, config) = setup();
        let killer = Uuid::from_u128(2);
        let victim = Uuid::from_u128(1);
        place(&mut world, &config, killer, Vec2::new(0.0, 0.0));
        place(&mut world, &config, victim, Vec2::new(0.0, 500.0));
        {
            let v = world.get_player_mut(victim).unwrap();
            v.current_bet = 500;
            v.current_bet_usd_cents = 500;
            v.balance = 1_000;
        }

        let log = MemoryKillLog::new();
        let death = kill_player(&mut world, &config, victim, killer, &log).unwrap();
        assert_eq!(death.forfeited_bet_units, 500);
        assert!(death.wager_food >= 1);

        let v = world.get_player(victim).unwrap();
        assert_eq!(v.current_bet, 0);
        assert_eq!(v.current_bet_usd_cents, 0);
        assert_eq!(v.balance, 1_000);

        let wager_units: u64 = world.foods.values().filter_map(|f| f.wager).map(|w| w.units).sum();
        assert_eq!(wager_units, 500);

        let body: f32 = world.foods.values().filter(|f| f.wager.is_none()).map(|f| f.value).sum();
        assert!((body - config.base_length).abs() < 1e-2);
        assert_eq!(log.events()[0].forfeited_bet_units, 500);
    }

    #[test]
    fn test_pending_boost_drop_is_scattered_with_body() {
        let (mut world, config) = setup();
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        place(&mut world, &config, a, Vec2::ZERO);
        place(&mut world, &config, b, Vec2::new(0.0, 400.0));
        world.get_player_mut(a).unwrap().boost_drop_acc = 2.5;

        let log = MemoryKillLog::new();
        let death = kill_player(&mut world, &config, a, b, &log).unwrap();
        assert_eq!(death.final_length, config.base_length);

        let body: f32 = world.foods.values().map(|f| f.value).sum();
        assert!((body - (config.base_length + 2.5)).abs() < 1e-2);
    }

    #[test]
    fn test_body_beyond_query_radius_is_not_tested() {
        let (mut world, mut config) = setup();
        config.collision_query_radius = 150.0;
        let long = Uuid::from_u128(2);
        let crosser = Uuid::from_u128(1);
        place(&mut world, &config, long, Vec2::ZERO);
        {
            // Stretch the body 300 units back from its head
            let p = world.get_player_mut(long).unwrap();
            p.path.clear();
            for i in 0..26u32 {
                p.path.push_back(Segment::new(Vec2::new(-300.0 + 12.0 * i as f32, 0.0), i));
            }
            p.length = 300.0;
            p.path_len = 300.0;
        }
        place(&mut world, &config, crosser, Vec2::new(-280.0, 400.0));
        world.get_player_mut(crosser).unwrap().position = Vec2::new(-280.0, 2.0);
        world.rebuild_player_index();
        assert_eq!(find_killer(&world, &config, crosser), None);

        config.collision_query_radius = 600.0;
        assert_eq!(find_killer(&world, &config, crosser), Some(long));
    }

    #[test]
    fn test_dead_player_is_not_killed_twice() {
        let (mut world, config) = setup();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        place(&mut world, &config, a, Vec2::ZERO);
        place(&mut world, &config, b, Vec2::new(0.0, 400.0));
        let log = MemoryKillLog::new();
        assert!(kill_player(&mut world, &config, a, b, &log).is_some());
        assert!(kill_player(&mut world, &config, a, b, &log).is_none());
        assert_eq!(log.len(), 1);
    }
}
