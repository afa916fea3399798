//! Default values for every simulation tunable.
//!
//! `SimConfig::default()` is built from these; env overrides are applied in `config.rs`.

/// Arena and world bookkeeping
pub mod world {
    /// Arena radius in world units
    pub const ARENA_RADIUS: f32 = 3000.0;
    /// Arena center
    pub const CENTER_X: f32 = 0.0;
    pub const CENTER_Y: f32 = 0.0;
    /// Spawn points are drawn within this fraction of the arena radius
    pub const SPAWN_RADIUS_FRACTION: f32 = 0.95;
    /// Uniform grid cell size for both spatial indices
    pub const SPATIAL_CELL_SIZE: f32 = 100.0;
    /// Tick records kept for diagnostics
    pub const HISTORY_CAPACITY: usize = 600;
}

/// Simulation timing
pub mod timing {
    /// Simulation tick rate in Hz
    pub const TICK_RATE: u32 = 30;
    /// AOI broadcast rate in Hz (lower than the tick rate)
    pub const BROADCAST_RATE: u32 = 10;
}

/// Motion & growth
pub mod motion {
    /// Length a player spawns with
    pub const BASE_LENGTH: f32 = 100.0;
    /// Length floor; boosting auto-disables at or below it
    pub const MIN_LENGTH: f32 = 80.0;
    /// Head speed at base length (units/second)
    pub const BASE_SPEED: f32 = 180.0;
    /// Speed factor approached by very long players
    pub const MIN_SPEED_FACTOR: f32 = 0.55;
    /// Growth at which the slowdown curve is half-way
    pub const SPEED_SOFT_CAP: f32 = 400.0;
    /// Exponent of the slowdown curve
    pub const SPEED_EXPONENT: f32 = 0.5;
    /// Speed multiplier while boosting
    pub const BOOST_MULTIPLIER: f32 = 1.8;
    /// Length drained per second while boosting
    pub const BOOST_DRAIN: f32 = 12.0;
    /// Drained length is dropped as a pellet each time this much accumulates
    pub const BOOST_DROP_VALUE: f32 = 3.0;
    /// Maximum turning rate (radians/second)
    pub const MAX_TURN_RATE: f32 = 4.0;
    /// Head radius at base length
    pub const HEAD_RADIUS_BASE: f32 = 10.0;
    /// Head radius gained per sqrt(unit of growth)
    pub const HEAD_RADIUS_GROWTH: f32 = 0.35;
    /// Head radius cap
    pub const HEAD_RADIUS_MAX: f32 = 40.0;
}

/// Tail / path
pub mod tail {
    /// Arclength between consecutive path segments
    pub const SEGMENT_SPACING: f32 = 12.0;
    /// Hard cap on the segment count (recovery path)
    pub const MAX_SEGMENTS: usize = 2048;
}

/// Collision
pub mod collision {
    /// Radius around a head searched for candidate bodies
    pub const QUERY_RADIUS: f32 = 600.0;
    /// Every Nth body segment is tested
    pub const BODY_SAMPLE_STRIDE: usize = 3;
}

/// Food spawning, scatter and pickup
pub mod food {
    /// Ambient pellet population the world tops up to
    pub const TARGET_COUNT: usize = 1500;
    /// Ambient pellets spawned per tick at most
    pub const SPAWN_PER_TICK: usize = 20;
    pub const MIN_VALUE: f32 = 1.0;
    pub const MAX_VALUE: f32 = 3.0;
    /// Values at or above this render as big pellets
    pub const BIG_VALUE_THRESHOLD: f32 = 8.0;
    /// Extra reach added to the head radius when eating
    pub const PICKUP_MARGIN: f32 = 6.0;
    /// Number of regular palette colours
    pub const PALETTE_SIZE: u8 = 12;
    /// Palette index reserved for wager chunks
    pub const GOLD_COLOR: u8 = 255;

    /// Death path is resampled at `SEGMENT_SPACING * DEATH_RESAMPLE_FACTOR`
    pub const DEATH_RESAMPLE_FACTOR: f32 = 1.5;
    /// Nominal value of one death pellet
    pub const DEATH_CHUNK_VALUE: f32 = 10.0;
    /// Per-piece value jitter (fraction)
    pub const DEATH_VALUE_JITTER: f32 = 0.3;
    /// Rounding remainder is swept as pieces of this value
    pub const DEATH_REMAINDER_VALUE: f32 = 2.0;
    /// Random positional spread around each scatter point
    pub const DEATH_SCATTER_SPREAD: f32 = 6.0;
    /// Nutrition carried by a wager chunk
    pub const WAGER_FOOD_VALUE: f32 = 1.0;
}

/// Area-of-interest broadcasting
pub mod view {
    /// Visibility radius around each player's head
    pub const VIEW_RADIUS: f32 = 1400.0;
    /// Entries in the global leaderboard
    pub const LEADERBOARD_SIZE: usize = 10;
}

/// Wagering
pub mod economy {
    /// Accepted bet sizes in USD cents
    pub const ALLOWED_BETS_USD_CENTS: [u64; 4] = [100, 500, 1_000, 2_500];
    /// Scatter denomination of a forfeited bet in USD cents
    pub const WAGER_CHUNK_USD_CENTS: u64 = 50;
    /// How long a price quote stays fresh
    pub const PRICE_TTL_SECS: u64 = 30;
    /// Quote used by the fixed price feed
    pub const DEFAULT_USD_PER_UNIT: f64 = 0.001;
    /// Balance granted to guest identities
    pub const GUEST_STARTING_BALANCE: u64 = 10_000;
}

/// Networking
pub mod net {
    /// Maximum framed message size
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Minimum interval between accepted `input` messages per player
    pub const MIN_INPUT_INTERVAL_MS: u64 = 16;
    /// Messages per second accepted from one connection
    pub const MAX_MESSAGES_PER_SECOND: u32 = 90;
    /// Outbound queue depth per connection
    pub const OUTBOUND_QUEUE: usize = 64;
    /// Inbound command queue depth (all connections)
    pub const COMMAND_QUEUE: usize = 4096;
    /// Display name length cap
    pub const MAX_NAME_LEN: usize = 16;
    /// Number of cosmetic skins
    pub const SKIN_COUNT: u8 = 20;
}
