pub mod constants;
pub mod game_loop;
pub mod kill_log;
pub mod spatial;
pub mod state;
pub mod systems;
