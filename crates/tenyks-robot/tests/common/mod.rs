//! In-memory connection used by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tenyks::connection::{Connection, ConnectionError, ConnectionFlags};
use tenyks_core::ConnectionConfig;
use tenyks_core::config::ChannelJoin;

/// Records every call; never touches the network.
pub struct MockConnection {
    config: ConnectionConfig,
    flags: ConnectionFlags,
    greets: AtomicBool,
    greeting_delay: Duration,
    inbound: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<String>>,
    connects: AtomicUsize,
    reconnects: AtomicUsize,
    failing_reconnects: AtomicUsize,
    reconnect_delay: Mutex<Duration>,
    closes: AtomicUsize,
}

impl MockConnection {
    /// A connection whose remote greets after `greeting_delay`.
    pub fn new(config: ConnectionConfig, greeting_delay: Duration) -> Self {
        Self {
            config,
            flags: ConnectionFlags::new(),
            greets: AtomicBool::new(true),
            greeting_delay,
            inbound: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            failing_reconnects: AtomicUsize::new(0),
            reconnect_delay: Mutex::new(Duration::ZERO),
            closes: AtomicUsize::new(0),
        }
    }

    /// A connection whose remote never sends anything.
    pub fn silent(config: ConnectionConfig) -> Self {
        let conn = Self::new(config, Duration::ZERO);
        conn.greets.store(false, Ordering::SeqCst);
        conn
    }

    /// Make the next `n` reconnect attempts fail.
    pub fn fail_next_reconnects(&self, n: usize) {
        self.failing_reconnects.store(n, Ordering::SeqCst);
    }

    /// Make every later reconnect take `delay` before it resolves.
    pub fn delay_reconnects(&self, delay: Duration) {
        *self.reconnect_delay.lock().unwrap() = delay;
    }

    pub fn push_line(&self, line: &str) {
        self.inbound.lock().unwrap().push_back(line.to_string());
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn flags(&self) -> &ConnectionFlags {
        &self.flags
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.flags.clear_reconnect();
        self.flags.touch();
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), ConnectionError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.reconnect_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        let failing = self
            .failing_reconnects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.flags.request_reconnect();
            return Err(ConnectionError::ConnectTimeout(self.config.address()));
        }
        self.flags.clear_reconnect();
        self.flags.touch();
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn send(&self, line: &str) -> Result<(), ConnectionError> {
        self.sent.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn wait_for_data(&self, timeout: Duration) -> bool {
        if self.greets.load(Ordering::SeqCst) && self.greeting_delay <= timeout {
            tokio::time::sleep(self.greeting_delay).await;
            true
        } else {
            tokio::time::sleep(timeout).await;
            false
        }
    }

    async fn next_line(&self, wait: Duration) -> Option<String> {
        let line = self.inbound.lock().unwrap().pop_front();
        if line.is_none() {
            tokio::time::sleep(wait.min(Duration::from_millis(5))).await;
        }
        line
    }
}

/// `name` on `irc.example.org` as `nick`, joining `channels`.
pub fn config(name: &str, nick: &str, channels: &[&str]) -> ConnectionConfig {
    ConnectionConfig {
        name: name.to_string(),
        host: "irc.example.org".to_string(),
        port: 6667,
        password: None,
        nick: nick.to_string(),
        ident: "tenyks".to_string(),
        realname: "tenyks IRC bot".to_string(),
        admins: Default::default(),
        ssl: false,
        channels: channels
            .iter()
            .map(|c| ChannelJoin::try_from((*c).to_string()).unwrap())
            .collect(),
    }
}
