pub mod collision;
pub mod food;
pub mod motion;
pub mod tail;
pub mod wager;
