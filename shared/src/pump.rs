//! Per-connection I/O pump.
//!
//! A [`Pump`] owns one WebSocket connection and runs two tasks for its whole
//! lifetime: a receive loop that pushes every text frame into an inbound
//! [`Queue`], and a send loop that drains an outbound [`Queue`] onto the wire
//! on a 1 ms tick or as soon as [`Pump::write`] signals it. The loops share
//! nothing but the queues and a [`Shutdown`] signal. A read or write error
//! fires the signal, both loops observe it at their next poll, and the
//! connection is released once both halves are dropped.

use crate::queue::Queue;
use crate::SEND_TICK;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// One-shot cancellation signal; triggering it more than once is a no-op
#[derive(Debug, Default)]
pub struct Shutdown {
    fired: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns true only for the call that actually fired it.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once the signal has fired
    pub async fn wait(&self) {
        loop {
            // Register before checking so a trigger in between is not missed
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Handle to a running connection pump. Cloning shares the same connection.
#[derive(Debug, Clone)]
pub struct Pump {
    label: Arc<str>,
    outbound: Arc<Queue<String>>,
    wake: Arc<Notify>,
    shutdown: Arc<Shutdown>,
}

impl Pump {
    /// Starts pumping `ws`, tagging each inbound frame with `tag` before it is
    /// enqueued on `inbound`
    pub fn spawn<S, T, F>(
        label: impl Into<String>,
        ws: WebSocketStream<S>,
        inbound: Arc<Queue<T>>,
        tag: F,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        T: Send + 'static,
        F: Fn(String) -> T + Send + 'static,
    {
        let label: Arc<str> = Arc::from(label.into());
        let outbound = Arc::new(Queue::new());
        let wake = Arc::new(Notify::new());
        let shutdown = Arc::new(Shutdown::new());

        let (sink, stream) = ws.split();

        tokio::spawn(receive_loop(
            Arc::clone(&label),
            stream,
            inbound,
            tag,
            Arc::clone(&shutdown),
        ));
        tokio::spawn(send_loop(
            Arc::clone(&label),
            sink,
            Arc::clone(&outbound),
            Arc::clone(&wake),
            Arc::clone(&shutdown),
        ));

        debug!("[{}] pump started", label);

        Self {
            label,
            outbound,
            wake,
            shutdown,
        }
    }

    /// Queues a frame for sending. Fire-and-forget; frames written after the
    /// pump stopped are silently discarded.
    pub fn write(&self, message: impl Into<String>) {
        if self.shutdown.is_triggered() {
            return;
        }
        self.outbound.enqueue(message.into());
        self.wake.notify_one();
    }

    /// Stops both loops. Safe to call any number of times.
    pub fn close(&self) {
        if self.shutdown.trigger() {
            debug!("[{}] pump closed", self.label);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Resolves once the pump has stopped, for whatever reason
    pub async fn closed(&self) {
        self.shutdown.wait().await
    }
}

async fn receive_loop<S, T, F>(
    label: Arc<str>,
    mut stream: SplitStream<WebSocketStream<S>>,
    inbound: Arc<Queue<T>>,
    tag: F,
    shutdown: Arc<Shutdown>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(String) -> T,
{
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => inbound.enqueue(tag(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => inbound.enqueue(tag(text)),
                    Err(_) => warn!("[{}] dropping binary frame that is not UTF-8", label),
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!("[{}] connection closed by peer", label);
                    break;
                }
                // Ping and pong are answered by the transport
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("[{}] read error: {}", label, e);
                    break;
                }
            },
        }
    }

    shutdown.trigger();
}

async fn send_loop<S>(
    label: Arc<str>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    outbound: Arc<Queue<String>>,
    wake: Arc<Notify>,
    shutdown: Arc<Shutdown>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ticker = interval(SEND_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    'pump: loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }

        while let Some(message) = outbound.dequeue() {
            if let Err(e) = sink.send(Message::Text(message)).await {
                warn!("[{}] write error: {}", label, e);
                break 'pump;
            }
        }
    }

    shutdown.trigger();
    let _ = sink.close().await;
}
