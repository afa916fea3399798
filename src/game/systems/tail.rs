//! Tail/path engine
//!
//! The tail is a polyline of points laid at a fixed arclength spacing along the
//! head's travel. Leftover travel is carried between ticks so spacing stays exact.
//! After appending, the oldest end is trimmed so the arclength matches
//! `max(2 * spacing, length)`: whole segments are popped while they fit in the
//! excess, then the last remaining tail point is slid toward its neighbour.
//!
//! Every point gets a strictly increasing `seq`, which is what network deltas key on.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SimConfig;
use crate::game::state::{Player, Segment, World};
use crate::util::vec2::polyline_length;

/// Path data sent to a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathPayload {
    /// Complete path, replacing whatever the viewer holds
    Reset { segments: Vec<Segment> },
    /// Segments newer than the last broadcast plus the (possibly moved) tail point
    Delta {
        tail: Option<Segment>,
        segments: Vec<Segment>,
    },
}

impl PathPayload {
    pub fn is_reset(&self) -> bool {
        matches!(self, PathPayload::Reset { .. })
    }

    pub fn segment_count(&self) -> usize {
        match self {
            PathPayload::Reset { segments } | PathPayload::Delta { segments, .. } => segments.len(),
        }
    }
}

/// Arclength the path is trimmed to
#[inline]
pub fn target_length(length: f32, config: &SimConfig) -> f32 {
    (2.0 * config.segment_spacing).max(length)
}

/// Extend and trim the path of every alive player
pub fn update(world: &mut World, config: &SimConfig) {
    world.players.par_values_mut().for_each(|player| {
        if player.alive {
            advance(player, config);
        }
    });
}

/// Append segments along the last motion step, then trim
pub fn advance(player: &mut Player, config: &SimConfig) {
    append_travel(player, config);
    trim(player, config);
    enforce_segment_cap(player, config);
}

/// Lay points at exact spacing along `prev_position -> position`
fn append_travel(player: &mut Player, config: &SimConfig) {
    let spacing = config.segment_spacing;
    let travel = player.position - player.prev_position;
    let (dir, dist) = travel.normalize_with_length();
    if dist <= 0.0 || !dist.is_finite() {
        return;
    }

    // Distance along this step at which the next point lands
    let mut t = spacing - player.carry;
    while t <= dist {
        let point = player.prev_position + dir * t;
        push_point(player, Segment::new(point, player.next_seq));
        player.next_seq = player.next_seq.wrapping_add(1);
        t += spacing;
    }
    player.carry = (dist - (t - spacing)).max(0.0);
}

#[inline]
fn push_point(player: &mut Player, segment: Segment) {
    if let Some(last) = player.path.back() {
        player.path_len += last.position().distance_to(segment.position());
    }
    player.path.push_back(segment);
}

/// Trim the oldest end so the arclength equals the target
pub fn trim(player: &mut Player, config: &SimConfig) {
    let mut excess = player.path_len - target_length(player.length, config);

    while excess > 0.0 && player.path.len() >= 2 {
        let (tail, next) = (player.path[0].position(), player.path[1].position());
        let piece = tail.distance_to(next);

        if piece <= excess {
            player.path.pop_front();
            player.path_len -= piece;
            excess -= piece;
        } else {
            // Slide the tail point toward its neighbour; it keeps its seq
            let moved = tail.lerp(next, excess / piece);
            player.path[0].x = moved.x;
            player.path[0].y = moved.y;
            player.path_len -= excess;
            excess = 0.0;
        }
    }

    if player.path.len() < 2 {
        player.path_len = 0.0;
    }
}

/// Safety valve: cap the segment count and recompute the length from scratch
fn enforce_segment_cap(player: &mut Player, config: &SimConfig) {
    let overflow = player.path.len().saturating_sub(config.max_segments);
    if overflow == 0 {
        return;
    }
    warn!(
        "Path overflow for player {}: {} segments over cap {}, truncating",
        player.id,
        overflow,
        config.max_segments
    );
    player.path.drain(..overflow);
    player.path_len = polyline_length(player.path.iter().map(|s| s.position()));
}

/// Path payload for a viewer. `reset` forces the full path.
pub fn payload(player: &Player, reset: bool) -> PathPayload {
    if reset || player.needs_path_reset {
        return PathPayload::Reset {
            segments: player.path.iter().copied().collect(),
        };
    }

    let cursor = player.last_broadcast_seq;
    let fresh = player.path.iter().rev().take_while(|s| s.seq > cursor).count();
    let start = player.path.len() - fresh;
    PathPayload::Delta {
        tail: player.path.front().copied(),
        segments: player.path.range(start..).copied().collect(),
    }
}

/// Move the broadcast cursor to the newest segment
pub fn mark_broadcast(player: &mut Player) {
    if let Some(last) = player.path.back() {
        player.last_broadcast_seq = last.seq;
    }
    player.needs_path_reset = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::systems::motion;
    use crate::util::vec2::Vec2;
    use uuid::Uuid;

    fn live_player(config: &SimConfig) -> Player {
        let mut p = Player::new(Uuid::new_v4(), "a".into(), "p".into(), 0, 0);
        p.reset_for_spawn(Vec2::ZERO, 0.0, 0, config);
        p
    }

    fn run(p: &mut Player, config: &SimConfig, ticks: usize) {
        for _ in 0..ticks {
            motion::step_player(p, Vec2::ZERO, 1.0e6, config, 1.0 / 30.0);
            advance(p, config);
        }
    }

    #[test]
    fn test_spacing_is_exact_on_straight_line() {
        let config = SimConfig::default();
        let mut p = live_player(&config);
        run(&mut p, &config, 10);

        let pts: Vec<_> = p.path.iter().map(|s| s.position()).collect();
        for w in pts.windows(2).skip(1) {
            assert!((w[0].distance_to(w[1]) - config.segment_spacing).abs() < 1e-2);
        }
    }

    #[test]
    fn test_path_length_invariant() {
        let config = SimConfig::default();
        let mut p = live_player(&config);

        for i in 0..400 {
            p.target_angle = (i as f32 * 0.07).sin() * 3.0;
            p.boosting = i % 50 < 10;
            if i % 37 == 0 {
                p.length += 15.0;
            }
            motion::step_player(&mut p, Vec2::ZERO, 1.0e6, &config, 1.0 / 30.0);
            advance(&mut p, &config);

            let geometric = polyline_length(p.path.iter().map(|s| s.position()));
            assert!((geometric - p.path_len).abs() < 0.05, "tracked {} vs {}", p.path_len, geometric);
            assert!(p.path_len <= target_length(p.length, &config) + 1e-2);
        }
        // Fully grown by now
        assert!(p.path_len >= target_length(p.length, &config) - config.segment_spacing);
    }

    #[test]
    fn test_seq_strictly_increasing() {
        let config = SimConfig::default();
        let mut p = live_player(&config);
        p.target_angle = 2.0;
        run(&mut p, &config, 200);

        let seqs: Vec<u32> = p.path.iter().map(|s| s.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*seqs.last().unwrap() + 1, p.next_seq);
    }

    #[test]
    fn test_trim_interpolates_tail() {
        let config = SimConfig::default();
        let mut p = live_player(&config);
        p.path.clear();
        for i in 0..20 {
            p.path.push_back(Segment::new(Vec2::new(i as f32 * 10.0, 0.0), i));
        }
        p.path_len = 190.0;
        p.length = 105.0;

        trim(&mut p, &config);
        assert!((p.path_len - 105.0).abs() < 1e-3);
        // 85 excess: 8 whole segments popped, tail slid 5 units toward seq 9
        assert_eq!(p.path[0].seq, 8);
        assert!((p.path[0].x - 85.0).abs() < 1e-3);
    }

    #[test]
    fn test_segment_cap_recomputes_length() {
        let mut config = SimConfig::default();
        config.max_segments = 5;
        let mut p = live_player(&config);
        p.path.clear();
        for i in 0..10 {
            p.path.push_back(Segment::new(Vec2::new(i as f32, 0.0), i));
        }
        p.path_len = 9.0;
        p.length = 1000.0;

        advance(&mut p, &config);
        assert_eq!(p.path.len(), 5);
        assert_eq!(p.path[0].seq, 5);
        assert!((p.path_len - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_payload_reset_then_delta() {
        let config = SimConfig::default();
        let mut p = live_player(&config);
        run(&mut p, &config, 5);

        let first = payload(&p, false);
        assert!(first.is_reset());
        assert_eq!(first.segment_count(), p.path.len());
        mark_broadcast(&mut p);

        let quiet = payload(&p, false);
        assert_eq!(quiet.segment_count(), 0);

        let cursor = p.last_broadcast_seq;
        run(&mut p, &config, 5);
        match payload(&p, false) {
            PathPayload::Delta { tail, segments } => {
                assert_eq!(tail, p.path.front().copied());
                assert!(!segments.is_empty());
                assert!(segments.iter().all(|s| s.seq > cursor));
                assert_eq!(segments.last(), p.path.back());
            }
            other => panic!("expected delta, got {:?}", other),
        }

        assert!(payload(&p, true).is_reset());
    }
}
