pub mod aoi;
pub mod framing;
pub mod game_session;
pub mod protocol;
pub mod rate_limiter;
pub mod transport;
