//! Serpent Arena Server Library
//!
//! Authoritative simulation for a multiplayer snake arena with in-round
//! wagers.
//!
//! # Features
//!
//! - `http_price` - HTTP price feed for live USD quotes (`PRICE_FEED_URL`)

pub mod config;
pub mod economy;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;
