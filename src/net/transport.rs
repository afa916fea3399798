//! Development TCP transport
//!
//! Every frame is `[u32 LE length][bincode payload]`. The first frame on a
//! connection must be a `Join`; its token is checked by the identity provider
//! before the join reaches the simulation lane. After that, inbound frames are
//! rate limited and forwarded to the lane, and a writer task drains the
//! connection's outbound queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::economy::accounts::IdentityProvider;
use crate::game::constants::net::OUTBOUND_QUEUE;
use crate::metrics::Metrics;
use crate::net::framing::{read_frame, read_message, write_frame, write_message, FramingError};
use crate::net::game_session::SessionHandle;
use crate::net::protocol::{decode, encode, ClientMessage, ErrorCode, ServerMessage};
use crate::net::rate_limiter::MessageRateLimit;

struct ConnectionContext {
    session: SessionHandle,
    identity: Arc<dyn IdentityProvider>,
    metrics: Arc<Metrics>,
    max_messages_per_second: u32,
}

/// TCP server feeding the simulation lane
pub struct TcpTransport {
    ctx: Arc<ConnectionContext>,
}

impl TcpTransport {
    pub fn new(
        session: SessionHandle,
        identity: Arc<dyn IdentityProvider>,
        metrics: Arc<Metrics>,
        max_messages_per_second: u32,
    ) -> Self {
        Self {
            ctx: Arc::new(ConnectionContext {
                session,
                identity,
                metrics,
                max_messages_per_second,
            }),
        }
    }

    /// Bind and serve forever
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("TCP transport listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let ctx = self.ctx.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, ctx).await {
                    warn!("Connection error from {}: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ConnectionContext>,
) -> Result<(), FramingError> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let (nickname, skin, token) = match read_frame::<_, ClientMessage>(&mut reader).await? {
        ClientMessage::Join {
            nickname,
            skin,
            token,
        } => (nickname, skin, token),
        _ => {
            debug!("First message from {} was not a join", peer);
            write_frame(
                &mut writer,
                &ServerMessage::Error {
                    code: ErrorCode::NotJoined,
                },
            )
            .await?;
            return Ok(());
        }
    };

    let identity = match ctx.identity.authenticate(token).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejecting join from {}: {}", peer, e);
            write_frame(
                &mut writer,
                &ServerMessage::Error {
                    code: ErrorCode::AuthFailed,
                },
            )
            .await?;
            return Ok(());
        }
    };

    let player_id = Uuid::new_v4();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

    let metrics = ctx.metrics.clone();
    let mut writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let data = match encode(&message) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to encode message for {}: {}", player_id, e);
                    continue;
                }
            };
            if let Err(e) = write_message(&mut writer, &data).await {
                debug!("Write to {} failed: {}", player_id, e);
                break;
            }
            metrics.record_sent(data.len() + 4);
        }
    });

    if !ctx.session.join(player_id, identity, nickname, skin, outbound_tx) {
        writer_task.abort();
        return Ok(());
    }
    debug!("Connection {} bound to player {}", peer, player_id);

    let mut limit = MessageRateLimit::new(ctx.max_messages_per_second, Instant::now());
    let result = loop {
        tokio::select! {
            frame = read_message(&mut reader) => match frame {
                Ok(data) => {
                    ctx.metrics.record_received(data.len() + 4);
                    if let Err(violation) = limit.check(Instant::now()) {
                        debug!("Dropping message from {}: {}", player_id, violation);
                        continue;
                    }
                    match decode::<ClientMessage>(&data) {
                        Ok(message) => {
                            ctx.session.client(player_id, message);
                        }
                        Err(e) => debug!("Failed to decode message from {}: {}", player_id, e),
                    }
                }
                Err(FramingError::ConnectionClosed) => break Ok(()),
                Err(e) => break Err(e),
            },
            // Outbound side closed: join rejected or socket gone
            _ = &mut writer_task => break Ok(()),
        }
    };

    ctx.session.disconnect(player_id);
    writer_task.abort();
    debug!("Connection {} closed (player {})", peer, player_id);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::economy::accounts::{GuestIdentityProvider, MemoryAccountStore};
    use crate::economy::price::{FixedPriceFeed, PriceCache};
    use crate::economy::wager::WagerService;
    use crate::economy::wallet::LedgerWallet;
    use crate::game::game_loop::GameLoop;
    use crate::game::kill_log::MemoryKillLog;
    use crate::net::game_session::GameSession;
    use std::time::Duration;

    async fn start_server() -> SocketAddr {
        let ledger = Arc::new(LedgerWallet::new());
        let prices = Arc::new(PriceCache::new(
            Arc::new(FixedPriceFeed(0.01)),
            Duration::from_secs(30),
        ));
        let wager = Arc::new(WagerService::new(
            ledger.clone(),
            Arc::new(MemoryAccountStore::new()),
            prices,
            vec![100, 500],
            50,
        ));
        let metrics = Arc::new(Metrics::new());
        let game_loop = GameLoop::new(SimConfig::default(), Arc::new(MemoryKillLog::new()));
        let (session, handle) = GameSession::new(game_loop, wager, metrics.clone(), 0.01);
        session.start();

        let identity = Arc::new(GuestIdentityProvider::new(5_000).with_ledger(ledger));
        let transport = TcpTransport::new(handle, identity, metrics, 90);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(transport.serve(listener));
        addr
    }

    #[tokio::test]
    async fn test_join_over_tcp() {
        let addr = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_frame(
            &mut stream,
            &ClientMessage::Join {
                nickname: "Tester".into(),
                skin: 2,
                token: "abc".into(),
            },
        )
        .await
        .unwrap();

        let reply: ServerMessage = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap();
        match reply {
            ServerMessage::Welcome(welcome) => assert_eq!(welcome.balance.balance_units, 5_000),
            other => panic!("expected welcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_frame_must_be_join() {
        let addr = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_frame(&mut stream, &ClientMessage::Respawn).await.unwrap();
        let reply: ServerMessage = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply,
            ServerMessage::Error {
                code: ErrorCode::NotJoined
            }
        );
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let addr = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_frame(
            &mut stream,
            &ClientMessage::Join {
                nickname: "Tester".into(),
                skin: 0,
                token: "has space".into(),
            },
        )
        .await
        .unwrap();
        let reply: ServerMessage = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply,
            ServerMessage::Error {
                code: ErrorCode::AuthFailed
            }
        );
    }
}
