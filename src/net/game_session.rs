//! Simulation lane: runs the game loop and broadcasts state to players
//!
//! One task owns the world and drives a tick timer and a broadcast timer.
//! Network commands and async wager outcomes arrive on crossbeam queues and
//! are drained at the top of every tick, so the world is only mutated here.
//! Bets, cash-outs and refunds run as spawned tasks against the external
//! collaborators and report back through the settlement queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use hashbrown::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::economy::accounts::Identity;
use crate::economy::price::units_to_cents;
use crate::economy::wager::{Settlement, WagerService};
use crate::game::constants::net::{COMMAND_QUEUE, MAX_NAME_LEN, SKIN_COUNT};
use crate::game::game_loop::{GameLoop, GameLoopEvent};
use crate::game::state::{PendingOp, Player, PlayerId};
use crate::game::systems::wager;
use crate::metrics::Metrics;
use crate::net::aoi::AoiBuilder;
use crate::net::protocol::{BalanceUpdate, ClientMessage, ErrorCode, ServerMessage, Welcome};
use crate::net::rate_limiter::check_input_interval;
use crate::util::vec2::Vec2;

/// Work for the lane
#[derive(Debug)]
pub enum SessionCommand {
    /// Authenticated join; the transport assigns the id
    Join {
        player_id: PlayerId,
        identity: Identity,
        nickname: String,
        skin: u8,
        outbound: mpsc::Sender<ServerMessage>,
    },
    /// Any message after the join
    Client {
        player_id: PlayerId,
        message: ClientMessage,
        received_at: Instant,
    },
    Disconnect { player_id: PlayerId },
}

/// Cloneable submit side of the lane's queues
#[derive(Clone)]
pub struct SessionHandle {
    /// Joins and disconnects; never dropped
    control: Sender<SessionCommand>,
    /// Gameplay messages; dropped when full
    commands: Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn join(
        &self,
        player_id: PlayerId,
        identity: Identity,
        nickname: String,
        skin: u8,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> bool {
        self.control
            .send(SessionCommand::Join {
                player_id,
                identity,
                nickname,
                skin,
                outbound,
            })
            .is_ok()
    }

    /// Queue a gameplay message; false if the queue is full or the lane is gone
    pub fn client(&self, player_id: PlayerId, message: ClientMessage) -> bool {
        let command = SessionCommand::Client {
            player_id,
            message,
            received_at: Instant::now(),
        };
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Command queue full, dropping message from {}", player_id);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn disconnect(&self, player_id: PlayerId) {
        let _ = self.control.send(SessionCommand::Disconnect { player_id });
    }
}

struct PlayerConnection {
    outbound: mpsc::Sender<ServerMessage>,
}

/// Trim, strip markup and control characters, collapse whitespace, cap length
pub fn sanitize_name(raw: &str) -> Option<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| !(c.is_control() && !c.is_whitespace()) && !matches!(c, '<' | '>' | '&'))
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_NAME_LEN).collect();
    let name = capped.trim_end();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The simulation lane
pub struct GameSession {
    game_loop: GameLoop,
    aoi: AoiBuilder,
    connections: HashMap<PlayerId, PlayerConnection>,
    wager: Arc<WagerService>,
    metrics: Arc<Metrics>,
    control_rx: Receiver<SessionCommand>,
    commands_rx: Receiver<SessionCommand>,
    settlements_tx: Sender<Settlement>,
    settlements_rx: Receiver<Settlement>,
    /// Valuation used until the first live quote
    fallback_usd_per_unit: f64,
}

impl GameSession {
    pub fn new(
        game_loop: GameLoop,
        wager: Arc<WagerService>,
        metrics: Arc<Metrics>,
        fallback_usd_per_unit: f64,
    ) -> (Self, SessionHandle) {
        let (control_tx, control_rx) = unbounded();
        let (commands_tx, commands_rx) = bounded(COMMAND_QUEUE);
        let (settlements_tx, settlements_rx) = unbounded();

        let session = Self {
            game_loop,
            aoi: AoiBuilder::new(),
            connections: HashMap::new(),
            wager,
            metrics,
            control_rx,
            commands_rx,
            settlements_tx,
            settlements_rx,
            fallback_usd_per_unit,
        };
        let handle = SessionHandle {
            control: control_tx,
            commands: commands_tx,
        };
        (session, handle)
    }

    pub fn game_loop(&self) -> &GameLoop {
        &self.game_loop
    }

    pub fn game_loop_mut(&mut self) -> &mut GameLoop {
        &mut self.game_loop
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn usd_per_unit(&self) -> f64 {
        self.wager
            .prices()
            .last_known()
            .unwrap_or(self.fallback_usd_per_unit)
    }

    /// Queue a message for one player. Full queues drop the message.
    fn send(&self, player_id: PlayerId, message: ServerMessage) -> bool {
        let Some(conn) = self.connections.get(&player_id) else {
            return false;
        };
        match conn.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.messages_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Outbound queue full for {}, dropping message", player_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn send_error(&self, player_id: PlayerId, code: ErrorCode) {
        self.send(player_id, ServerMessage::Error { code });
    }

    fn send_balance(&self, player_id: PlayerId) {
        let price = self.usd_per_unit();
        if let Some(player) = self.game_loop.world().get_player(player_id) {
            let update = BalanceUpdate::for_player(player, price);
            self.send(player_id, ServerMessage::Balance(update));
        }
    }

    // ==================================================================
    // Inbound
    // ==================================================================

    /// Drain both command queues and the settlement queue without blocking
    pub fn drain_inbound(&mut self) {
        while let Ok(command) = self.control_rx.try_recv() {
            self.handle_command(command);
        }
        while let Ok(command) = self.commands_rx.try_recv() {
            self.handle_command(command);
        }
        self.drain_settlements();
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join {
                player_id,
                identity,
                nickname,
                skin,
                outbound,
            } => self.handle_join(player_id, identity, &nickname, skin, outbound),
            SessionCommand::Client {
                player_id,
                message,
                received_at,
            } => self.handle_client(player_id, message, received_at),
            SessionCommand::Disconnect { player_id } => self.handle_disconnect(player_id),
        }
    }

    fn handle_join(
        &mut self,
        player_id: PlayerId,
        identity: Identity,
        nickname: &str,
        skin: u8,
        outbound: mpsc::Sender<ServerMessage>,
    ) {
        let Some(name) = sanitize_name(nickname) else {
            let _ = outbound.try_send(ServerMessage::Error {
                code: ErrorCode::InvalidName,
            });
            return;
        };
        if self.connections.contains_key(&player_id) {
            warn!("Duplicate join for {}", player_id);
            return;
        }

        let skin = skin.min(SKIN_COUNT - 1);
        let player = Player::new(player_id, identity.account, name.clone(), skin, identity.balance);
        self.game_loop.add_player(player);
        self.connections.insert(player_id, PlayerConnection { outbound });

        let price = self.usd_per_unit();
        let config = self.game_loop.config();
        let Some(player) = self.game_loop.world().get_player(player_id) else {
            return;
        };
        let welcome = Welcome {
            player_id,
            arena_center: Vec2::new(config.arena_center_x, config.arena_center_y),
            arena_radius: config.arena_radius,
            base_length: config.base_length,
            min_length: config.min_length,
            tick_rate: config.tick_rate,
            broadcast_rate: config.broadcast_rate,
            balance: BalanceUpdate::for_player(player, price),
        };
        info!(
            "Player {} ({}) joined with {} units",
            name, player_id, identity.balance
        );
        self.send(player_id, ServerMessage::Welcome(welcome));
    }

    fn handle_client(&mut self, player_id: PlayerId, message: ClientMessage, received_at: Instant) {
        if !self.connections.contains_key(&player_id) {
            debug!("Dropping message from unknown player {}", player_id);
            return;
        }

        match message {
            ClientMessage::Join { .. } => debug!("Ignoring repeated join from {}", player_id),
            ClientMessage::Input { target_angle, boost } => {
                self.handle_input(player_id, target_angle, boost, received_at)
            }
            ClientMessage::SetBet { usd_cents } => self.handle_set_bet(player_id, usd_cents),
            ClientMessage::Respawn => {
                if self.game_loop.respawn(player_id) {
                    debug!("Respawned player {}", player_id);
                }
            }
            ClientMessage::CashoutRequest => self.handle_cashout(player_id),
            ClientMessage::Ping { timestamp } => {
                self.send(
                    player_id,
                    ServerMessage::Pong {
                        client_timestamp: timestamp,
                        server_timestamp: unix_millis(),
                    },
                );
            }
        }
    }

    fn handle_input(&mut self, player_id: PlayerId, target_angle: Option<f32>, boost: bool, at: Instant) {
        let min_interval = Duration::from_millis(self.game_loop.config().min_input_interval_ms);
        let Some(player) = self.game_loop.world_mut().get_player_mut(player_id) else {
            return;
        };
        if let Err(violation) = check_input_interval(player.last_input_at, at, min_interval) {
            debug!("Dropping input from {}: {}", player_id, violation);
            return;
        }
        player.last_input_at = Some(at);
        self.game_loop.apply_input(player_id, target_angle, boost);
    }

    fn handle_set_bet(&mut self, player_id: PlayerId, usd_cents: u64) {
        let ticket = {
            let (world, config) = self.game_loop.parts_mut();
            wager::begin_bet(world, config, player_id, usd_cents)
        };
        match ticket {
            Ok(ticket) => {
                let service = self.wager.clone();
                let settlements = self.settlements_tx.clone();
                tokio::spawn(async move {
                    let result = service.place_bet(&ticket).await;
                    let _ = settlements.send(Settlement::Bet { ticket, result });
                });
            }
            Err(e) => {
                debug!("Bet rejected for {}: {}", player_id, e);
                self.send_error(player_id, e.code());
            }
        }
    }

    fn handle_cashout(&mut self, player_id: PlayerId) {
        match wager::begin_cashout(self.game_loop.world_mut(), player_id) {
            Ok(ticket) => {
                self.aoi.forget(player_id);
                let service = self.wager.clone();
                let settlements = self.settlements_tx.clone();
                tokio::spawn(async move {
                    let result = service.cash_out(&ticket).await;
                    let _ = settlements.send(Settlement::Cashout { ticket, result });
                });
            }
            Err(e) => {
                debug!("Cash-out rejected for {}: {}", player_id, e);
                self.send_error(player_id, e.code());
            }
        }
    }

    fn handle_disconnect(&mut self, player_id: PlayerId) {
        self.connections.remove(&player_id);
        self.aoi.forget(player_id);

        let Some(player) = self.game_loop.remove_player(player_id) else {
            return;
        };
        info!("Player {} ({}) left", player.name, player_id);

        // A pending cash-out settles on its own
        if player.current_bet > 0 && player.pending != Some(PendingOp::CashOut) {
            self.spawn_refund(player.id, player.account, player.current_bet, player.balance);
        }
    }

    fn spawn_refund(&self, player_id: PlayerId, account: String, units: u64, balance: u64) {
        if units == 0 {
            return;
        }
        let service = self.wager.clone();
        tokio::spawn(async move {
            service.refund(player_id, &account, units, balance).await;
        });
    }

    /// Apply finished async operations. Returns how many were applied.
    pub fn drain_settlements(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(settlement) = self.settlements_rx.try_recv() {
            self.apply_settlement(settlement);
            applied += 1;
        }
        applied
    }

    fn apply_settlement(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Bet { ticket, result } => {
                let present = wager::apply_bet_result(self.game_loop.world_mut(), ticket.player, &result);
                match (present, result) {
                    (true, Ok(_)) => {
                        self.metrics.bets_placed.fetch_add(1, Ordering::Relaxed);
                        self.send_balance(ticket.player);
                    }
                    (true, Err(e)) => {
                        self.metrics.bets_failed.fetch_add(1, Ordering::Relaxed);
                        self.send_error(ticket.player, e.code());
                        if e.held_stake().is_some() {
                            self.send_balance(ticket.player);
                        }
                    }
                    (false, Ok(receipt)) => {
                        self.spawn_refund(ticket.player, ticket.account, receipt.units, receipt.new_balance);
                    }
                    (false, Err(e)) => {
                        if let Some(receipt) = e.held_stake() {
                            let (units, balance) = (receipt.units, receipt.new_balance);
                            self.spawn_refund(ticket.player, ticket.account, units, balance);
                        }
                    }
                }
            }
            Settlement::Cashout { ticket, result } => {
                let present =
                    wager::apply_cashout_result(self.game_loop.world_mut(), ticket.player, &result);
                match (present, result) {
                    (true, Ok(receipt)) => {
                        self.metrics.cashouts.fetch_add(1, Ordering::Relaxed);
                        let balance_usd_cents = units_to_cents(receipt.final_balance, self.usd_per_unit());
                        self.send(
                            ticket.player,
                            ServerMessage::CashoutConfirmed {
                                balance_units: receipt.final_balance,
                                balance_usd_cents,
                            },
                        );
                        self.send_balance(ticket.player);
                    }
                    (true, Err(e)) => {
                        self.metrics.cashouts_failed.fetch_add(1, Ordering::Relaxed);
                        self.send_error(ticket.player, e.code());
                    }
                    (false, Ok(_)) => {}
                    (false, Err(_)) => {
                        self.spawn_refund(ticket.player, ticket.account, ticket.bet_units, ticket.balance);
                    }
                }
            }
        }
    }

    // ==================================================================
    // Tick and broadcast
    // ==================================================================

    /// Drain inbound work, then run one simulation tick
    pub fn tick(&mut self) -> Vec<GameLoopEvent> {
        self.drain_inbound();

        let started = Instant::now();
        let dt = self.game_loop.config().tick_dt();
        let events = self.game_loop.tick(dt);
        self.metrics.record_tick_time(started.elapsed());

        for event in &events {
            match event {
                GameLoopEvent::PlayerKilled {
                    victim,
                    killer_name,
                    final_score,
                    ..
                } => {
                    self.metrics.kills_total.fetch_add(1, Ordering::Relaxed);
                    self.aoi.forget(*victim);
                    self.send(
                        *victim,
                        ServerMessage::Death {
                            killer_name: killer_name.clone(),
                            final_score: *final_score,
                        },
                    );
                }
                GameLoopEvent::BalanceChanged { player_id } => self.send_balance(*player_id),
            }
        }

        self.update_gauges();
        events
    }

    /// Send one AOI snapshot to every alive player, then advance broadcast cursors
    pub fn broadcast(&mut self) -> usize {
        let packets = self.aoi.build_all(self.game_loop.world(), self.game_loop.config());
        let mut sent = 0;
        for (player_id, packet) in packets {
            if self.send(player_id, ServerMessage::Snapshot(packet)) {
                sent += 1;
            } else {
                // Missed a delta; resync with full paths next cycle
                self.aoi.forget(player_id);
            }
        }
        self.aoi.finish_cycle(self.game_loop.world_mut());
        sent
    }

    fn update_gauges(&self) {
        let world = self.game_loop.world();
        self.metrics.total_players.store(world.players.len() as u64, Ordering::Relaxed);
        self.metrics.alive_players.store(world.alive_count() as u64, Ordering::Relaxed);
        self.metrics.food_count.store(world.foods.len() as u64, Ordering::Relaxed);
        self.metrics.active_bet_units.store(world.active_bet_units(), Ordering::Relaxed);
        self.metrics
            .connections_active
            .store(self.connections.len() as u64, Ordering::Relaxed);
    }

    fn log_stats(&self, elapsed_secs: u64) {
        let world = self.game_loop.world();
        info!(
            "Arena: {}s, tick {}, {}/{} alive, {} food, {} units at stake | tick p95 {}us",
            elapsed_secs,
            world.tick,
            world.alive_count(),
            world.players.len(),
            world.foods.len(),
            world.active_bet_units(),
            self.metrics.tick_time_p95_us.load(Ordering::Relaxed),
        );
    }

    /// Run the lane forever
    pub async fn run(mut self) {
        let config = self.game_loop.config();
        let tick_rate = config.tick_rate.max(1);
        let broadcast_rate = config.broadcast_rate.max(1);

        let mut ticker = interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut broadcaster = interval(Duration::from_secs_f64(1.0 / broadcast_rate as f64));
        broadcaster.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Simulation lane started at {} Hz, broadcasting at {} Hz",
            tick_rate, broadcast_rate
        );
        let start = Instant::now();
        let stats_every = tick_rate as u64 * 30;
        let mut tick_count: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                    tick_count += 1;
                    if tick_count % stats_every == 0 {
                        self.log_stats(start.elapsed().as_secs());
                    }
                }
                _ = broadcaster.tick() => {
                    self.broadcast();
                }
            }
        }
    }

    /// Spawn the lane on the current runtime
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
