//! Server network layer: WebSocket listener and fixed-rate reconciliation loop

use crate::config::ServerConfig;
use crate::game::ServerWorld;
use crate::registry::PeerRegistry;
use log::{debug, error, info, warn};
use shared::timing::is_overrun;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite, WebSocketStream};

/// Main server coordinating the listener, the peer registry and the world
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: PeerRegistry,
    world: ServerWorld,
    config: ServerConfig,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}{}", local_addr, config.path);

        Ok(Server {
            listener: Some(listener),
            local_addr,
            registry: PeerRegistry::new(),
            world: ServerWorld::new(config.pickup_cap, config.pickup_interval),
            config,
        })
    }

    /// Actual bound address, useful when binding to port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> PeerRegistry {
        self.registry.clone()
    }

    pub fn world(&self) -> &ServerWorld {
        &self.world
    }

    /// Spawns the task that accepts TCP connections and upgrades them
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let registry = self.registry.clone();
        let path = self.config.path.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let registry = registry.clone();
                        let path = path.clone();

                        // Handshakes run concurrently so a slow client cannot stall accepts
                        tokio::spawn(async move {
                            match upgrade(stream, path).await {
                                Ok(ws) => {
                                    let peer_id = registry.register(ws);
                                    info!("{} connected from {}", peer_id, addr);
                                }
                                Err(e) => warn!("Rejected connection from {}: {}", addr, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Runs one tick: applies departures and inbound frames, simulates,
    /// and broadcasts every resulting frame. Returns how many frames went out.
    pub fn step(&mut self, elapsed: Duration) -> usize {
        if is_overrun(elapsed) {
            warn!(
                "Tick {} overran: {:.1} ms since the previous tick",
                self.world.tick + 1,
                elapsed.as_secs_f64() * 1000.0
            );
        }

        let departed = self.registry.drain_departed();
        let inbound = self.registry.read_all();
        let outgoing = self.world.tick(inbound, &departed, elapsed);

        for frame in &outgoing {
            self.registry.broadcast(frame);
        }

        // Periodic monitoring
        if self.world.tick % 60 == 0 && !self.registry.is_empty() {
            debug!(
                "Tick {}: {} peers, {} avatars, {} pickups, {} projectiles",
                self.world.tick,
                self.registry.len(),
                self.world.avatars.len(),
                self.world.pickups.len(),
                self.world.projectiles.len()
            );
        }

        outgoing.len()
    }

    /// Main server loop. Ticks are never skipped or merged; a late tick simply
    /// sees a longer elapsed time.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tick_interval.tick().await;

            let now = Instant::now();
            let elapsed = now.duration_since(last_tick);
            last_tick = now;

            self.step(elapsed);
        }
    }
}

/// Completes the WebSocket handshake, answering 404 for any other path
async fn upgrade(
    stream: TcpStream,
    path: String,
) -> Result<WebSocketStream<TcpStream>, tungstenite::Error> {
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == path {
            return Ok(response);
        }

        let mut rejection =
            ErrorResponse::new(Some(format!("no endpoint at {}", request.uri().path())));
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        Err(rejection)
    };

    accept_hdr_async(stream, check_path).await
}
