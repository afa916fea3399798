//! Motion & growth: steering, length-dependent speed, boost cost and boundary clamping

use rayon::prelude::*;
use tracing::warn;

use crate::config::SimConfig;
use crate::game::state::{Player, World};
use crate::util::vec2::{angle_delta, normalize_angle, Vec2};

/// Boost is auto-disabled when length is within this of the floor
pub const BOOST_EPSILON: f32 = 1e-3;

/// Head radius: square-root growth over base length, capped
#[inline]
pub fn head_radius(length: f32, config: &SimConfig) -> f32 {
    let growth = (length - config.base_length).max(0.0);
    (config.head_radius_base + config.head_radius_growth * growth.sqrt()).min(config.head_radius_max)
}

/// Speed factor in (min_factor, 1]; 1 at or below base length
#[inline]
pub fn speed_factor(length: f32, config: &SimConfig) -> f32 {
    let growth = (length - config.base_length).max(0.0);
    let shrink = (1.0 / (1.0 + growth / config.speed_soft_cap)).powf(config.speed_exponent);
    config.min_speed_factor + (1.0 - config.min_speed_factor) * shrink
}

/// Whether a player of this length may boost
#[inline]
pub fn can_boost(length: f32, config: &SimConfig) -> bool {
    length > config.min_length + BOOST_EPSILON
}

/// Advance every alive player by `dt`
pub fn update(world: &mut World, config: &SimConfig, dt: f32) {
    let center = world.center;
    let radius = world.radius;

    world.players.par_values_mut().for_each(|player| {
        if player.alive {
            step_player(player, center, radius, config, dt);
        }
    });
}

/// Advance one player: turn, speed, boost drain, integrate, clamp
pub fn step_player(player: &mut Player, center: Vec2, radius: f32, config: &SimConfig, dt: f32) {
    let dt = dt.max(0.0);
    player.prev_position = player.position;

    if player.boosting && !can_boost(player.length, config) {
        player.boosting = false;
    }

    // Turn toward the target along the short way, rate-limited
    let max_turn = config.max_turn_rate * dt;
    let delta = angle_delta(player.heading, player.target_angle).clamp(-max_turn, max_turn);
    player.heading = normalize_angle(player.heading + delta);

    let mut speed = config.base_speed * speed_factor(player.length, config);
    if player.boosting {
        speed *= config.boost_multiplier;

        let drain = (config.boost_drain * dt).min(player.length - config.min_length).max(0.0);
        player.length -= drain;
        player.boost_drop_acc += drain;
        if !can_boost(player.length, config) {
            player.length = player.length.max(config.min_length);
            player.boosting = false;
        }
    }
    player.speed = speed;

    let moved = player.position + Vec2::from_angle(player.heading) * speed * dt;
    player.position = clamp_to_arena(moved, player.length, center, radius, config);

    player.velocity = if dt > 0.0 {
        (player.position - player.prev_position) * (1.0 / dt)
    } else {
        Vec2::ZERO
    };
}

/// Project a head position back inside `radius - head_radius`
#[inline]
pub fn clamp_to_arena(position: Vec2, length: f32, center: Vec2, radius: f32, config: &SimConfig) -> Vec2 {
    position.clamp_to_disc(center, radius - head_radius(length, config))
}

/// Re-apply the boundary after growth enlarged head radii
pub fn reclamp_all(world: &mut World, config: &SimConfig) {
    let center = world.center;
    let radius = world.radius;
    for player in world.players.values_mut().filter(|p| p.alive) {
        player.position = clamp_to_arena(player.position, player.length, center, radius, config);
    }
}

/// Repair non-finite motion state so one bad record cannot poison the tick.
/// Returns how many players were repaired.
pub fn sanitize(world: &mut World, config: &SimConfig) -> usize {
    let center = world.center;
    let mut repaired = 0;

    for player in world.players.values_mut().filter(|p| p.alive) {
        let mut fixed = false;
        if !player.length.is_finite() || player.length < config.min_length {
            warn!("Fixed invalid length for player {}", player.id);
            player.length = if player.length.is_finite() {
                config.min_length
            } else {
                config.base_length
            };
            fixed = true;
        }
        if !player.position.is_finite() {
            warn!("Fixed non-finite position for player {}", player.id);
            player.position = if player.prev_position.is_finite() {
                player.prev_position
            } else {
                center
            };
            fixed = true;
        }
        if !player.heading.is_finite() {
            warn!("Fixed non-finite heading for player {}", player.id);
            player.heading = 0.0;
            fixed = true;
        }
        if !player.target_angle.is_finite() {
            player.target_angle = player.heading;
            fixed = true;
        }
        if !player.velocity.is_finite() {
            player.velocity = Vec2::ZERO;
            fixed = true;
        }
        if fixed {
            repaired += 1;
        }
    }
    repaired
}
