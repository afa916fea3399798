//! Kill log collaborator
//!
//! Every death produces one structured `KillEvent`. The default sink writes it
//! as a JSON line on the `kill_log` tracing target; tests use the in-memory sink.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::game::state::PlayerId;
use crate::util::vec2::Vec2;

/// Structured record of one kill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillEvent {
    pub tick: u64,
    /// World clock (milliseconds)
    pub at_ms: u64,
    pub killer: PlayerId,
    pub killer_name: String,
    pub killer_length: f32,
    pub victim: PlayerId,
    pub victim_name: String,
    pub victim_length: f32,
    /// Victim head position at death
    pub position: Vec2,
    pub forfeited_bet_units: u64,
    pub forfeited_bet_usd_cents: u64,
}

/// Append-only sink for kill events
pub trait KillLog: Send + Sync {
    fn record(&self, event: &KillEvent);
}

/// Writes each kill as a JSON line to the `kill_log` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingKillLog;

impl KillLog for TracingKillLog {
    fn record(&self, event: &KillEvent) {
        match serde_json::to_string(event) {
            Ok(line) => info!(target: "kill_log", "{}", line),
            Err(e) => warn!("Failed to serialize kill event for {}: {}", event.victim, e),
        }
    }
}

/// Keeps kill events in memory
#[derive(Debug, Default)]
pub struct MemoryKillLog {
    events: Mutex<Vec<KillEvent>>,
}

impl MemoryKillLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<KillEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl KillLog for MemoryKillLog {
    fn record(&self, event: &KillEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event() -> KillEvent {
        KillEvent {
            tick: 12,
            at_ms: 400,
            killer: Uuid::new_v4(),
            killer_name: "k".into(),
            killer_length: 140.0,
            victim: Uuid::new_v4(),
            victim_name: "v".into(),
            victim_length: 100.0,
            position: Vec2::new(1.0, 2.0),
            forfeited_bet_units: 500,
            forfeited_bet_usd_cents: 500,
        }
    }

    #[test]
    fn test_memory_log_records() {
        let log = MemoryKillLog::new();
        assert!(log.is_empty());
        let e = event();
        log.record(&e);
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0], e);
    }

    #[test]
    fn test_event_serializes_as_json() {
        let e = event();
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"forfeited_bet_units\":500"));
        let back: KillEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
