//! Food: ambient spawning, boost drops, death scatter, wager chunks and pickup

use rand::Rng;
use smallvec::SmallVec;

use crate::config::SimConfig;
use crate::game::constants::food::{BIG_VALUE_THRESHOLD, GOLD_COLOR, PALETTE_SIZE};
use crate::game::state::{FoodId, FoodSpec, PlayerId, WagerChunk, World};
use crate::game::systems::motion;
use crate::util::vec2::Vec2;

/// Values below this are treated as fully distributed
const VALUE_EPSILON: f32 = 1e-4;

/// Result of the pickup phase
#[derive(Debug, Default, Clone)]
pub struct PickupOutcome {
    pub eaten: usize,
    /// Players whose bet was credited by a wager chunk
    pub wager_credited: Vec<PlayerId>,
}

/// Palette colour for a player's skin
#[inline]
pub fn skin_color(skin: u8) -> u8 {
    skin % PALETTE_SIZE
}

/// Random point in a disc of `spread` around `origin`, kept inside the arena
fn scatter_point(world: &mut World, origin: Vec2, spread: f32) -> Vec2 {
    let r = spread * world.rng.gen::<f32>().sqrt();
    let theta = world.rng.gen_range(0.0..std::f32::consts::TAU);
    let point = origin + Vec2::from_angle(theta) * r;
    point.clamp_to_disc(world.center, world.radius)
}

/// Top the ambient population up toward `food_target`
pub fn replenish(world: &mut World, config: &SimConfig) -> usize {
    let deficit = config.food_target.saturating_sub(world.foods.len());
    let count = deficit.min(config.food_spawn_per_tick);

    for _ in 0..count {
        let position = world.random_point(config.spawn_radius_fraction);
        let value = world.rng.gen_range(config.food_min_value..=config.food_max_value);
        let color = world.rng.gen_range(0..PALETTE_SIZE);
        world.add_food(FoodSpec {
            position,
            value,
            color,
            big: value >= BIG_VALUE_THRESHOLD,
            wager: None,
        });
    }
    count
}

/// Drop accumulated boost drain as pellets at each booster's tail
pub fn drop_boost_mass(world: &mut World, config: &SimConfig) -> usize {
    let drop_value = config.boost_drop_value;
    if drop_value <= 0.0 {
        return 0;
    }

    let mut drops: Vec<(Vec2, u8)> = Vec::new();
    for player in world.players.values_mut().filter(|p| p.alive) {
        if player.boost_drop_acc < drop_value {
            continue;
        }
        let tail = player
            .path
            .front()
            .map(|s| s.position())
            .unwrap_or(player.position);
        while player.boost_drop_acc >= drop_value {
            player.boost_drop_acc -= drop_value;
            drops.push((tail, skin_color(player.skin)));
        }
    }

    let spread = config.death_scatter_spread;
    for &(tail, color) in &drops {
        let position = scatter_point(world, tail, spread);
        world.add_food(FoodSpec {
            position,
            value: drop_value,
            color,
            big: false,
            wager: None,
        });
    }
    drops.len()
}

/// Resample a polyline at `step` arclength. Always contains the first point.
pub fn resample(points: &[Vec2], step: f32) -> Vec<Vec2> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let mut out = vec![first];
    if step <= 0.0 {
        return out;
    }

    let mut until_next = step;
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (dir, len) = (b - a).normalize_with_length();
        let mut walked = 0.0;
        while len - walked >= until_next {
            walked += until_next;
            out.push(a + dir * walked);
            until_next = step;
        }
        until_next -= len - walked;
    }
    out
}

/// Convert a dead body into pellets along its path. Returns the value placed.
///
/// `ceil(total / chunk)` jittered pieces are laid from the head end back toward
/// the tail; whatever rounding leaves over is swept as small remainder pieces.
pub fn scatter_body(world: &mut World, config: &SimConfig, path: &[Vec2], total: f32, color: u8) -> f32 {
    if !total.is_finite() || total <= 0.0 || path.is_empty() {
        return 0.0;
    }
    let points = resample(path, config.segment_spacing * config.death_resample_factor);
    let n = points.len();
    let spread = config.death_scatter_spread;
    let chunk = config.death_chunk_value;
    let jitter = config.death_value_jitter;

    let pieces = (total / chunk).ceil() as usize;
    let mut remaining = total;
    let mut placed = 0.0;
    let mut cursor = 0usize;

    let place = |world: &mut World, value: f32, cursor: usize| {
        let origin = points[n - 1 - (cursor % n)];
        let position = scatter_point(world, origin, spread);
        world.add_food(FoodSpec {
            position,
            value,
            color,
            big: value >= BIG_VALUE_THRESHOLD,
            wager: None,
        });
    };

    for _ in 0..pieces {
        if remaining <= VALUE_EPSILON {
            break;
        }
        let factor = 1.0 + world.rng.gen_range(-jitter..=jitter);
        let value = (chunk * factor).min(remaining);
        place(world, value, cursor);
        cursor += 1;
        remaining -= value;
        placed += value;
    }

    while remaining > VALUE_EPSILON {
        let value = config.death_remainder_value.min(remaining);
        place(world, value, cursor);
        cursor += 1;
        remaining -= value;
        placed += value;
    }

    placed
}

/// Split a stake into chunks whose units and cents sum exactly to the inputs
pub fn split_wager(units: u64, usd_cents: u64, chunk_usd_cents: u64) -> Vec<WagerChunk> {
    if units == 0 {
        return Vec::new();
    }
    let by_value = usd_cents.div_ceil(chunk_usd_cents.max(1)).max(1);
    let n = by_value.min(units);

    let (unit_base, unit_rem) = (units / n, units % n);
    let (cent_base, cent_rem) = (usd_cents / n, usd_cents % n);
    (0..n)
        .map(|i| WagerChunk {
            units: unit_base + u64::from(i < unit_rem),
            usd_cents: cent_base + u64::from(i < cent_rem),
        })
        .collect()
}

/// Scatter a forfeited stake as gold wager chunks spread along the path.
/// Returns the ids of the created pellets.
pub fn scatter_wager(
    world: &mut World,
    config: &SimConfig,
    path: &[Vec2],
    units: u64,
    usd_cents: u64,
) -> Vec<FoodId> {
    let chunks = split_wager(units, usd_cents, config.wager_chunk_usd_cents);
    if chunks.is_empty() || path.is_empty() {
        return Vec::new();
    }
    let points = resample(path, config.segment_spacing * config.death_resample_factor);
    let n = points.len();
    let count = chunks.len();
    let spread = config.death_scatter_spread;

    let mut ids = Vec::with_capacity(count);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let origin = points[(i * n) / count];
        let position = scatter_point(world, origin, spread);
        ids.push(world.add_food(FoodSpec {
            position,
            value: config.wager_food_value,
            color: GOLD_COLOR,
            big: true,
            wager: Some(chunk),
        }));
    }
    ids
}

/// Eat every pellet within reach of an alive head.
///
/// Players are processed in id order so contested pellets go to the same
/// eater on every run. Eaten food leaves the map and the index together.
pub fn resolve_pickups(world: &mut World, config: &SimConfig) -> PickupOutcome {
    let mut eaters: Vec<(PlayerId, Vec2, f32)> = world
        .players
        .values()
        .filter(|p| p.alive)
        .map(|p| (p.id, p.position, p.head_radius(config) + config.food_pickup_margin))
        .collect();
    eaters.sort_unstable_by_key(|e| e.0);

    let mut outcome = PickupOutcome::default();
    let mut in_reach: SmallVec<[FoodId; 16]> = SmallVec::new();

    for (id, head, reach) in eaters {
        in_reach.clear();
        let reach_sq = reach * reach;
        for food_id in world.food_index.query_radius(head, reach) {
            if let Some(food) = world.foods.get(&food_id) {
                if food.position.distance_sq_to(head) <= reach_sq {
                    in_reach.push(food_id);
                }
            }
        }
        if in_reach.is_empty() {
            continue;
        }

        let mut growth = 0.0;
        let mut credit = WagerChunk { units: 0, usd_cents: 0 };
        for &food_id in &in_reach {
            if let Some(food) = world.remove_food(food_id) {
                growth += food.value;
                if let Some(chunk) = food.wager {
                    credit.units += chunk.units;
                    credit.usd_cents += chunk.usd_cents;
                }
                outcome.eaten += 1;
            }
        }

        if let Some(player) = world.players.get_mut(&id) {
            player.length += growth;
            if credit.units > 0 || credit.usd_cents > 0 {
                player.current_bet += credit.units;
                player.current_bet_usd_cents += credit.usd_cents;
                outcome.wager_credited.push(id);
            }
        }
    }

    // Growth can enlarge head radii past the boundary margin
    motion::reclamp_all(world, config);
    outcome
}
