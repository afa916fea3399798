use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::game::constants::{collision, economy, food, motion, net, tail, timing, view, world};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port the game transport listens on
    pub port: u16,
    /// Port for the metrics/health HTTP endpoint
    pub metrics_port: u16,
    /// Balance handed to guest identities on join
    pub starting_balance: u64,
    /// Fixed USD-per-unit quote used when no price feed URL is configured
    pub price_usd_per_unit: f64,
    /// HTTP price feed endpoint (requires the `http_price` feature)
    pub price_feed_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            metrics_port: 9090,
            starting_balance: economy::GUEST_STARTING_BALANCE,
            price_usd_per_unit: economy::DEFAULT_USD_PER_UNIT,
            price_feed_url: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Some(port) = env_parse::<u16>("PORT") {
            if port > 0 {
                config.port = port;
            } else {
                tracing::warn!("PORT must be > 0, using default");
            }
        }

        if let Some(port) = env_parse::<u16>("METRICS_PORT") {
            if port > 0 {
                config.metrics_port = port;
            } else {
                tracing::warn!("METRICS_PORT must be > 0, using default");
            }
        }

        if let Some(balance) = env_parse::<u64>("STARTING_BALANCE") {
            config.starting_balance = balance;
        }

        if let Some(price) = env_parse::<f64>("PRICE_USD_PER_UNIT") {
            if price.is_finite() && price > 0.0 {
                config.price_usd_per_unit = price;
            } else {
                tracing::warn!("PRICE_USD_PER_UNIT must be positive, using default");
            }
        }

        if let Ok(url) = std::env::var("PRICE_FEED_URL") {
            if !url.trim().is_empty() {
                config.price_feed_url = Some(url);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.metrics_port == self.port {
            return Err("metrics_port must differ from port".to_string());
        }
        if !(self.price_usd_per_unit.is_finite() && self.price_usd_per_unit > 0.0) {
            return Err("price_usd_per_unit must be positive".to_string());
        }
        Ok(())
    }
}

/// Simulation tunables. Defaults come from `game::constants`.
#[derive(Debug, Clone)]
pub struct SimConfig {
    // World
    pub arena_center_x: f32,
    pub arena_center_y: f32,
    pub arena_radius: f32,
    pub spawn_radius_fraction: f32,
    pub cell_size: f32,
    pub history_capacity: usize,

    // Timing
    pub tick_rate: u32,
    pub broadcast_rate: u32,

    // Motion
    pub base_length: f32,
    pub min_length: f32,
    pub base_speed: f32,
    pub min_speed_factor: f32,
    pub speed_soft_cap: f32,
    pub speed_exponent: f32,
    pub boost_multiplier: f32,
    pub boost_drain: f32,
    pub boost_drop_value: f32,
    pub max_turn_rate: f32,
    pub head_radius_base: f32,
    pub head_radius_growth: f32,
    pub head_radius_max: f32,

    // Tail
    pub segment_spacing: f32,
    pub max_segments: usize,

    // Collision
    pub collision_query_radius: f32,
    pub body_sample_stride: usize,

    // Food
    pub food_target: usize,
    pub food_spawn_per_tick: usize,
    pub food_min_value: f32,
    pub food_max_value: f32,
    pub food_pickup_margin: f32,
    pub death_chunk_value: f32,
    pub death_resample_factor: f32,
    pub death_value_jitter: f32,
    pub death_remainder_value: f32,
    pub death_scatter_spread: f32,
    pub wager_food_value: f32,

    // View
    pub view_radius: f32,
    pub leaderboard_size: usize,

    // Economy
    pub allowed_bets_usd_cents: Vec<u64>,
    pub wager_chunk_usd_cents: u64,
    pub price_ttl_secs: u64,

    // Net
    pub min_input_interval_ms: u64,
    pub max_messages_per_second: u32,

    /// Seed for the world RNG; `None` seeds from entropy
    pub rng_seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arena_center_x: world::CENTER_X,
            arena_center_y: world::CENTER_Y,
            arena_radius: world::ARENA_RADIUS,
            spawn_radius_fraction: world::SPAWN_RADIUS_FRACTION,
            cell_size: world::SPATIAL_CELL_SIZE,
            history_capacity: world::HISTORY_CAPACITY,

            tick_rate: timing::TICK_RATE,
            broadcast_rate: timing::BROADCAST_RATE,

            base_length: motion::BASE_LENGTH,
            min_length: motion::MIN_LENGTH,
            base_speed: motion::BASE_SPEED,
            min_speed_factor: motion::MIN_SPEED_FACTOR,
            speed_soft_cap: motion::SPEED_SOFT_CAP,
            speed_exponent: motion::SPEED_EXPONENT,
            boost_multiplier: motion::BOOST_MULTIPLIER,
            boost_drain: motion::BOOST_DRAIN,
            boost_drop_value: motion::BOOST_DROP_VALUE,
            max_turn_rate: motion::MAX_TURN_RATE,
            head_radius_base: motion::HEAD_RADIUS_BASE,
            head_radius_growth: motion::HEAD_RADIUS_GROWTH,
            head_radius_max: motion::HEAD_RADIUS_MAX,

            segment_spacing: tail::SEGMENT_SPACING,
            max_segments: tail::MAX_SEGMENTS,

            collision_query_radius: collision::QUERY_RADIUS,
            body_sample_stride: collision::BODY_SAMPLE_STRIDE,

            food_target: food::TARGET_COUNT,
            food_spawn_per_tick: food::SPAWN_PER_TICK,
            food_min_value: food::MIN_VALUE,
            food_max_value: food::MAX_VALUE,
            food_pickup_margin: food::PICKUP_MARGIN,
            death_chunk_value: food::DEATH_CHUNK_VALUE,
            death_resample_factor: food::DEATH_RESAMPLE_FACTOR,
            death_value_jitter: food::DEATH_VALUE_JITTER,
            death_remainder_value: food::DEATH_REMAINDER_VALUE,
            death_scatter_spread: food::DEATH_SCATTER_SPREAD,
            wager_food_value: food::WAGER_FOOD_VALUE,

            view_radius: view::VIEW_RADIUS,
            leaderboard_size: view::LEADERBOARD_SIZE,

            allowed_bets_usd_cents: economy::ALLOWED_BETS_USD_CENTS.to_vec(),
            wager_chunk_usd_cents: economy::WAGER_CHUNK_USD_CENTS,
            price_ttl_secs: economy::PRICE_TTL_SECS,

            min_input_interval_ms: net::MIN_INPUT_INTERVAL_MS,
            max_messages_per_second: net::MAX_MESSAGES_PER_SECOND,

            rng_seed: None,
        }
    }
}

impl SimConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(radius) = env_parse::<f32>("ARENA_RADIUS") {
            if radius.is_finite() && radius > 0.0 {
                config.arena_radius = radius;
            } else {
                tracing::warn!("ARENA_RADIUS must be positive, using default");
            }
        }

        if let Some(rate) = env_parse::<u32>("TICK_RATE") {
            if (1..=240).contains(&rate) {
                config.tick_rate = rate;
            } else {
                tracing::warn!("TICK_RATE must be 1-240, using default");
            }
        }

        if let Some(rate) = env_parse::<u32>("BROADCAST_RATE") {
            if rate > 0 {
                config.broadcast_rate = rate;
            } else {
                tracing::warn!("BROADCAST_RATE must be > 0, using default");
            }
        }

        if let Some(target) = env_parse::<usize>("FOOD_TARGET") {
            config.food_target = target;
        }

        if let Some(radius) = env_parse::<f32>("VIEW_RADIUS") {
            if radius.is_finite() && radius > 0.0 {
                config.view_radius = radius;
            } else {
                tracing::warn!("VIEW_RADIUS must be positive, using default");
            }
        }

        if let Some(seed) = env_parse::<u64>("RNG_SEED") {
            config.rng_seed = Some(seed);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if !(self.arena_radius.is_finite() && self.arena_radius > self.head_radius_max) {
            return Err("arena_radius must exceed head_radius_max".to_string());
        }
        if self.cell_size <= 0.0 {
            return Err("cell_size must be positive".to_string());
        }
        if self.tick_rate == 0 || self.broadcast_rate == 0 {
            return Err("tick_rate and broadcast_rate must be at least 1".to_string());
        }
        if self.broadcast_rate > self.tick_rate {
            return Err("broadcast_rate cannot exceed tick_rate".to_string());
        }
        if self.min_length <= 0.0 || self.min_length > self.base_length {
            return Err("min_length must be in (0, base_length]".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_speed_factor) {
            return Err("min_speed_factor must be in [0, 1]".to_string());
        }
        if self.speed_soft_cap <= 0.0 {
            return Err("speed_soft_cap must be positive".to_string());
        }
        if self.segment_spacing <= 0.0 {
            return Err("segment_spacing must be positive".to_string());
        }
        if self.max_segments < 2 {
            return Err("max_segments must be at least 2".to_string());
        }
        // Candidates are found by head cell, so the radius bounds how far along
        // a body a crossing can still be detected
        if self.collision_query_radius < self.base_length + 2.0 * self.head_radius_max {
            return Err("collision_query_radius must cover a base-length body plus two head radii".to_string());
        }
        if self.body_sample_stride == 0 {
            return Err("body_sample_stride must be at least 1".to_string());
        }
        if self.food_min_value <= 0.0 || self.food_max_value < self.food_min_value {
            return Err("food value range is invalid".to_string());
        }
        if self.death_chunk_value <= 0.0 || self.death_remainder_value <= 0.0 {
            return Err("death food values must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.death_value_jitter) {
            return Err("death_value_jitter must be in [0, 1)".to_string());
        }
        if self.allowed_bets_usd_cents.is_empty() {
            return Err("allowed_bets_usd_cents cannot be empty".to_string());
        }
        if self.wager_chunk_usd_cents == 0 {
            return Err("wager_chunk_usd_cents must be at least 1".to_string());
        }
        if self.history_capacity == 0 {
            return Err("history_capacity must be at least 1".to_string());
        }
        Ok(())
    }

    /// Simulation step in seconds
    #[inline]
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}

/// Parse an env var, warning and returning `None` on malformed input
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}
