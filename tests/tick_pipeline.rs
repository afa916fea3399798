//! End-to-end checks over many ticks of the simulation pipeline

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use serpent_arena_server::config::SimConfig;
use serpent_arena_server::game::game_loop::{GameLoop, GameLoopEvent};
use serpent_arena_server::game::kill_log::MemoryKillLog;
use serpent_arena_server::game::state::{Player, PlayerId, World};
use serpent_arena_server::game::systems::{collision, tail};
use serpent_arena_server::util::vec2::Vec2;

/// Crowded arena with no ambient food, so every unit of length has a source
fn closed_config() -> SimConfig {
    SimConfig {
        arena_radius: 700.0,
        food_target: 0,
        food_spawn_per_tick: 0,
        ..SimConfig::default()
    }
}

fn crowded_loop(config: SimConfig, players: usize, seed: u64) -> (GameLoop, Arc<MemoryKillLog>, Vec<PlayerId>) {
    let kill_log = Arc::new(MemoryKillLog::new());
    let world = World::with_rng(&config, StdRng::seed_from_u64(seed));
    let mut game_loop = GameLoop::with_world(world, config, kill_log.clone());

    let ids = (0..players)
        .map(|i| {
            game_loop.add_player(Player::new(
                Uuid::new_v4(),
                format!("acct{}", i),
                format!("P{}", i),
                (i % 20) as u8,
                1_000,
            ))
        })
        .collect();
    (game_loop, kill_log, ids)
}

/// Alive length plus pending boost drops plus plain pellets on the ground
fn total_mass(world: &World) -> f64 {
    let bodies: f64 = world
        .alive_players()
        .map(|p| (p.length + p.boost_drop_acc) as f64)
        .sum();
    let pellets: f64 = world
        .foods
        .values()
        .filter(|f| f.wager.is_none())
        .map(|f| f.value as f64)
        .sum();
    bodies + pellets
}

fn steer_randomly(game_loop: &mut GameLoop, ids: &[PlayerId], rng: &mut StdRng) {
    for (i, &id) in ids.iter().enumerate() {
        let angle = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
        game_loop.apply_input(id, Some(angle), i % 3 == 0);
    }
}

#[test]
fn test_length_conserved_across_boosts_and_deaths() {
    let (mut game_loop, kill_log, ids) = crowded_loop(closed_config(), 24, 11);
    let mut rng = StdRng::seed_from_u64(99);
    let dt = game_loop.config().tick_dt();

    let initial = total_mass(game_loop.world());
    assert!(initial > 0.0);

    for tick in 0..900 {
        if tick % 15 == 0 {
            steer_randomly(&mut game_loop, &ids, &mut rng);
        }
        game_loop.tick(dt);

        let now = total_mass(game_loop.world());
        assert!(
            (now - initial).abs() < 0.5,
            "mass drifted at tick {}: {} -> {} ({} kills so far)",
            tick,
            initial,
            now,
            kill_log.len()
        );
    }
}

#[test]
fn test_paths_track_length_and_seq_order() {
    let (mut game_loop, _log, ids) = crowded_loop(closed_config(), 16, 5);
    let mut rng = StdRng::seed_from_u64(3);
    let dt = game_loop.config().tick_dt();
    let spacing = game_loop.config().segment_spacing;

    for tick in 0..600 {
        if tick % 20 == 0 {
            steer_randomly(&mut game_loop, &ids, &mut rng);
        }
        game_loop.tick(dt);

        let config = game_loop.config();
        for p in game_loop.world().alive_players() {
            let target = tail::target_length(p.length, config);
            assert!(
                p.path_len <= target + spacing,
                "path {} longer than target {} for {}",
                p.path_len,
                target,
                p.id
            );
            assert!(p.path.len() <= config.max_segments);
            assert!(
                p.path.iter().zip(p.path.iter().skip(1)).all(|(a, b)| a.seq < b.seq),
                "seq not strictly increasing for {}",
                p.id
            );
            if let Some(last) = p.path.back() {
                assert!(last.seq < p.next_seq);
            }
        }
    }
}

#[test]
fn test_heads_stay_inside_arena() {
    let (mut game_loop, _log, ids) = crowded_loop(closed_config(), 12, 21);
    let dt = game_loop.config().tick_dt();

    // Everyone charges straight out toward the wall
    for &id in &ids {
        let position = game_loop.world().get_player(id).map(|p| p.position).unwrap();
        let outward = (position - game_loop.world().center).angle();
        game_loop.apply_input(id, Some(outward), false);
    }

    for _ in 0..300 {
        game_loop.tick(dt);
        let world = game_loop.world();
        let config = game_loop.config();
        for p in world.alive_players() {
            let reach = p.position.distance_to(world.center) + p.head_radius(config);
            assert!(reach <= world.radius + 1e-2, "{} escaped: {}", p.id, reach);
        }
    }
}

#[test]
fn test_kill_turns_body_into_food() {
    let config = closed_config();
    let (mut game_loop, kill_log, ids) = crowded_loop(config, 2, 8);
    let dt = game_loop.config().tick_dt();

    // Grow a tail before the kill
    for _ in 0..60 {
        game_loop.tick(dt);
    }
    let (victim, killer) = (ids[0], ids[1]);
    if !game_loop.world().get_player(victim).map_or(false, |p| p.alive) {
        // Already died on its own; nothing left to check
        return;
    }

    let victim_length = game_loop.world().get_player(victim).map(|p| p.length).unwrap();
    let food_before: f32 = game_loop.world().foods.values().map(|f| f.value).sum();

    let (world, config) = game_loop.parts_mut();
    let death = collision::kill_player(world, config, victim, killer, kill_log.as_ref()).unwrap();
    assert_eq!(death.victim, victim);
    assert_eq!(death.killer, killer);
    assert!((death.final_length - victim_length).abs() < 1e-4);

    let world = game_loop.world();
    let food_after: f32 = world.foods.values().map(|f| f.value).sum();
    assert!(food_after - food_before >= victim_length - 1e-2);
    assert!(!world.get_player(victim).unwrap().alive);
    assert!(world.player_index.query_radius(death.position, 1.0).all(|id| id != victim));
    assert_eq!(kill_log.len(), 1);
    assert_eq!(world.get_player(killer).unwrap().kills, 1);
}

#[test]
fn test_tick_reports_deaths_with_balance_updates() {
    let (mut game_loop, _log, ids) = crowded_loop(closed_config(), 24, 13);
    let mut rng = StdRng::seed_from_u64(17);
    let dt = game_loop.config().tick_dt();

    for tick in 0..900 {
        if tick % 15 == 0 {
            steer_randomly(&mut game_loop, &ids, &mut rng);
        }
        let events = game_loop.tick(dt);
        for (i, event) in events.iter().enumerate() {
            if let GameLoopEvent::PlayerKilled { victim, killer, .. } = event {
                assert_ne!(victim, killer);
                assert!(i > 0);
                assert_eq!(
                    events[i - 1],
                    GameLoopEvent::BalanceChanged { player_id: *victim }
                );
                assert!(!game_loop.world().get_player(*victim).unwrap().alive);
            }
        }
    }
}

#[test]
fn test_dead_players_hold_no_index_entries() {
    let (mut game_loop, _log, ids) = crowded_loop(closed_config(), 24, 29);
    let mut rng = StdRng::seed_from_u64(31);
    let dt = game_loop.config().tick_dt();

    for tick in 0..600 {
        if tick % 15 == 0 {
            steer_randomly(&mut game_loop, &ids, &mut rng);
        }
        game_loop.tick(dt);
    }

    let world = game_loop.world();
    let radius = world.radius;
    let indexed: Vec<PlayerId> = world.player_index.query_radius(Vec2::ZERO, radius * 2.0).collect();
    for id in indexed {
        assert!(world.get_player(id).unwrap().alive);
    }
}
