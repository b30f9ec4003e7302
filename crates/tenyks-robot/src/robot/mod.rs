//! The Robot: connection lifecycle orchestrator.
//!
//! Per connection:
//! ```text
//! Disconnected → Connecting → AwaitingGreeting → Handshaking → Connected
//!      ↑                                                          │
//!      └──────────── Reconnecting ← (Stale | ForcedReconnect) ←───┘
//! ```
//! with `Closing → Closed` reachable from any state on shutdown.
//!
//! [`Robot::bootstrap`] establishes every configured connection once.
//! Connections that come up get one supervising task each
//! ([`Robot::supervise`]); the rest are dropped and never retried. A
//! supervising task reads lines, runs them through the [`Pipeline`] and
//! pushes results onto the shared outbound queue. It re-establishes its
//! connection when it goes stale or asks for it, and stops once the
//! connection's `user_disconnect` flag is set.

mod config;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use tenyks_core::irc as line;
use tenyks_core::{InboundLine, OutboundItem};

use crate::connection::{Connection, ConnectionError, ConnectionTable};
use crate::pipeline::{Pipeline, StageContext};

pub use config::{ReconnectPolicy, RobotConfig};

/// Lifecycle phase of one connection, used for logging transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    AwaitingGreeting,
    Handshaking,
    Connected,
    Stale,
    ForcedReconnect,
    Reconnecting,
    Closing,
    Closed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingGreeting => "awaiting_greeting",
            Self::Handshaking => "handshaking",
            Self::Connected => "connected",
            Self::Stale => "stale",
            Self::ForcedReconnect => "forced_reconnect",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How to open the socket when establishing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Connect,
    Reconnect,
}

/// Owns every connection and the tasks that supervise them.
pub struct Robot {
    connections: ConnectionTable,
    pipeline: Pipeline,
    outbound: mpsc::UnboundedSender<OutboundItem>,
    config: RobotConfig,
    shutdown_tx: watch::Sender<bool>,
    supervisors: Mutex<JoinSet<()>>,
}

impl Robot {
    pub fn new(
        connections: ConnectionTable,
        pipeline: Pipeline,
        outbound: mpsc::UnboundedSender<OutboundItem>,
        config: RobotConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            connections,
            pipeline,
            outbound,
            config,
            shutdown_tx,
            supervisors: Mutex::new(JoinSet::new()),
        }
    }

    /// Establish every configured connection once, concurrently.
    ///
    /// Returns the names of the connections that came up, sorted. Failures
    /// are logged and the connection is left out; nothing is retried here.
    pub async fn bootstrap(self: &Arc<Self>) -> Vec<String> {
        let mut attempts = JoinSet::new();
        for conn in self.connections.iter() {
            let robot = Arc::clone(self);
            let conn = Arc::clone(conn);
            attempts.spawn(async move {
                let result = robot.establish(conn.as_ref(), Open::Connect).await;
                (conn.name().to_string(), result)
            });
        }

        let mut active = Vec::new();
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    info!(connection = %name, "Connection bootstrapped");
                    active.push(name);
                }
                Ok((name, Err(e))) => {
                    error!(connection = %name, error = %e, "Bootstrap failed; connection dropped");
                    if let Some(conn) = self.connections.get(&name) {
                        conn.close().await;
                    }
                }
                Err(e) => error!(error = %e, "Bootstrap task failed"),
            }
        }
        active.sort();
        active
    }

    /// Bootstrap, then spawn one supervising task per active connection.
    pub async fn start(self: &Arc<Self>) -> Vec<String> {
        let active = self.bootstrap().await;
        for name in &active {
            if let Some(conn) = self.connections.get(name) {
                self.spawn_supervisor(Arc::clone(conn));
            }
        }
        info!(active = active.len(), configured = self.connections.len(), "Robot started");
        active
    }

    fn spawn_supervisor(self: &Arc<Self>, conn: Arc<dyn Connection>) {
        let robot = Arc::clone(self);
        self.supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move { robot.supervise(conn).await });
    }

    /// Open the socket, wait for the greeting, then handshake.
    async fn establish(&self, conn: &dyn Connection, open: Open) -> Result<(), ConnectionError> {
        let name = conn.name();
        match open {
            Open::Connect => {
                debug!(connection = %name, phase = %Phase::Connecting);
                conn.connect().await?;
            }
            Open::Reconnect => {
                debug!(connection = %name, phase = %Phase::Reconnecting);
                conn.reconnect().await?;
            }
        }
        debug!(connection = %name, phase = %Phase::AwaitingGreeting);
        self.await_greeting(conn).await?;
        debug!(connection = %name, phase = %Phase::Handshaking);
        Self::handshake(conn).await?;
        debug!(connection = %name, phase = %Phase::Connected);
        Ok(())
    }

    /// Succeeds as soon as any data arrives; the content is not checked.
    pub async fn await_greeting(&self, conn: &dyn Connection) -> Result<(), ConnectionError> {
        if conn.wait_for_data(self.config.greeting_timeout).await {
            Ok(())
        } else {
            Err(ConnectionError::NoGreeting {
                connection: conn.name().to_string(),
                timeout: self.config.greeting_timeout,
            })
        }
    }

    /// Register with the remote: optional `PASS`, `NICK`, `USER`, then the
    /// connection's post-connect hook. Every call sends the full sequence.
    pub async fn handshake(conn: &dyn Connection) -> Result<(), ConnectionError> {
        let config = conn.config();
        if let Some(password) = config.password() {
            conn.send(&line::pass(password)).await?;
        }
        conn.send(&line::nick(&config.nick)).await?;
        conn.send(&line::user(&config.ident, &config.host, &config.realname))
            .await?;
        conn.post_connect().await
    }

    /// Supervising loop for one connection. Returns once `user_disconnect`
    /// is observed.
    pub async fn supervise(&self, conn: Arc<dyn Connection>) {
        let name = conn.name().to_string();
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut attempt: u32 = 0;
        info!(connection = %name, "Supervising connection");

        loop {
            if conn.user_disconnect() {
                break;
            }

            let stale = conn
                .flags()
                .is_stale(Instant::now(), self.config.stale_after);
            if stale || conn.needs_reconnect() {
                let phase = if stale {
                    Phase::Stale
                } else {
                    Phase::ForcedReconnect
                };
                warn!(connection = %name, phase = %phase, "Re-establishing connection");

                match self.establish(conn.as_ref(), Open::Reconnect).await {
                    Ok(()) if conn.user_disconnect() => {
                        info!(connection = %name, "Shutdown began while re-establishing");
                        self.quit(conn.as_ref()).await;
                        break;
                    }
                    Ok(()) => {
                        info!(connection = %name, attempt, "Connection re-established");
                        attempt = 0;
                    }
                    Err(e) => {
                        conn.flags().request_reconnect();
                        let delay = self.config.reconnect.delay_for_attempt(attempt);
                        error!(
                            connection = %name,
                            error = %e,
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Failed to re-establish connection"
                        );
                        attempt = attempt.saturating_add(1);
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
                continue;
            }

            if let Some(raw) = conn.next_line(self.config.read_wait).await {
                self.forward(conn.as_ref(), raw);
            }
        }

        info!(connection = %name, phase = %Phase::Closed, "Supervising task stopped");
    }

    /// Run one line through the pipeline and queue the result, if any.
    fn forward(&self, conn: &dyn Connection, raw: String) {
        let ctx = StageContext::for_connection(conn.config());
        let Some(item) = self.pipeline.run(&ctx, InboundLine::new(conn.name(), raw)) else {
            return;
        };
        if self.outbound.send(item).is_err() {
            warn!(connection = %conn.name(), "Outbound queue closed; item dropped");
        }
    }

    /// Send `QUIT` and close the socket.
    async fn quit(&self, conn: &dyn Connection) {
        if let Err(e) = conn.send(&line::quit(&self.config.quit_message)).await {
            debug!(connection = %conn.name(), error = %e, "QUIT not sent");
        }
        conn.close().await;
    }

    /// Stop every connection.
    ///
    /// Marks every connection for disconnect, sends `QUIT` and closes it,
    /// then waits up to the grace period for the supervising tasks. Tasks
    /// still running after that are aborted and every connection is closed
    /// again.
    pub async fn shutdown(&self) {
        info!(phase = %Phase::Closing, "Shutting down connections");
        for conn in self.connections.iter() {
            conn.flags().set_user_disconnect();
        }
        self.shutdown_tx.send_replace(true);

        for conn in self.connections.iter() {
            self.quit(conn.as_ref()).await;
        }

        let mut supervisors = std::mem::take(
            &mut *self
                .supervisors
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while supervisors.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = supervisors.len(),
                "Supervising tasks did not stop in time; aborting"
            );
            supervisors.abort_all();
            while supervisors.join_next().await.is_some() {}
        }

        for conn in self.connections.iter() {
            conn.close().await;
        }
        info!(phase = %Phase::Closed, "All connections closed");
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("connections", &self.connections)
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
