//! Client network layer: the server connection and the headless run loop

use crate::game::Replica;
use crate::input::InputSource;
use log::{debug, info, warn};
use shared::{Avatar, Pump, Queue, TARGET_TPS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::{connect_async, WebSocketStream};

/// A single connection to the server. Cloning shares the same connection.
#[derive(Clone)]
pub struct Connection {
    pump: Pump,
    inbound: Arc<Queue<String>>,
}

impl Connection {
    /// Dials `ws://host:port/path` and starts pumping
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws, response) = connect_async(url).await?;
        info!("Connected to {} ({})", url, response.status());
        Ok(Self::from_stream(ws))
    }

    pub fn from_stream<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let inbound = Arc::new(Queue::new());
        let pump = Pump::spawn("server", ws, Arc::clone(&inbound), |message| message);
        Self { pump, inbound }
    }

    /// Queues a frame for the server. Never blocks.
    pub fn write(&self, message: impl Into<String>) {
        self.pump.write(message);
    }

    /// Takes every frame received since the last call, in arrival order
    pub fn read_all(&self) -> Vec<String> {
        self.inbound.drain_all()
    }

    pub fn close(&self) {
        self.pump.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pump.is_closed()
    }

    pub async fn closed(&self) {
        self.pump.closed().await
    }
}

/// Headless client: mirrors the world and flies its avatar from an input source
pub struct Client {
    connection: Connection,
    replica: Replica,
    input: Box<dyn InputSource + Send>,
    tick_duration: Duration,
}

impl Client {
    pub async fn new(
        url: &str,
        tick_rate: u32,
        input: Box<dyn InputSource + Send>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let connection = Connection::connect(url).await?;
        let rate = if tick_rate == 0 {
            TARGET_TPS as u32
        } else {
            tick_rate
        };
        let tick_duration = Duration::from_secs_f64(1.0 / rate as f64);
        Ok(Self::with_connection(connection, input, tick_duration))
    }

    pub fn with_connection(
        connection: Connection,
        input: Box<dyn InputSource + Send>,
        tick_duration: Duration,
    ) -> Self {
        let replica = Replica::new(Avatar::centered());
        info!("Local avatar {}", replica.local_id());

        Client {
            connection,
            replica,
            input,
            tick_duration,
        }
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// One client tick: merge what arrived, predict and send, then extrapolate
    pub fn step(&mut self, elapsed: Duration) {
        let frames = self.connection.read_all();
        if !frames.is_empty() {
            debug!("Applying {} frames", frames.len());
        }
        self.replica.apply_all(frames);

        let input = self.input.poll(elapsed);
        if let Some(frame) = self.replica.control(&input, elapsed) {
            self.connection.write(frame);
        }

        self.replica.advance(elapsed);
    }

    /// Ticks until the connection drops or `duration` has passed
    pub async fn run(
        &mut self,
        duration: Option<Duration>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let connection = self.connection.clone();
        let deadline = sleep(duration.unwrap_or(Duration::MAX));
        tokio::pin!(deadline);

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last_tick);
                    last_tick = now;

                    self.step(elapsed);

                    if self.replica.tick % 300 == 0 {
                        info!(
                            "Score {}, {} other avatars, {} pickups, {} projectiles",
                            self.replica.local.score,
                            self.replica.avatars.len(),
                            self.replica.pickups.len(),
                            self.replica.projectiles.len()
                        );
                    }
                },

                _ = connection.closed() => {
                    warn!("Connection to server lost");
                    break;
                },

                _ = &mut deadline => {
                    info!("Run time elapsed, disconnecting");
                    break;
                },
            }
        }

        self.connection.close();
        Ok(())
    }
}
