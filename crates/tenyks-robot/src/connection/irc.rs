//! Tokio-backed protocol connection.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use tenyks_core::ConnectionConfig;
use tenyks_core::irc::{self as line, Line};

use super::{Connection, ConnectionError, ConnectionFlags, tls};

const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest inbound line kept, terminator included.
const MAX_LINE: usize = 4096;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type SharedWriter = Arc<tokio::sync::Mutex<Option<BoxedWriter>>>;

/// A line-oriented connection to one remote server.
pub struct IrcConnection {
    config: ConnectionConfig,
    flags: Arc<ConnectionFlags>,
    tls: Option<TlsConnector>,
    writer: SharedWriter,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    /// Flips to `true` when the current socket delivers its first bytes.
    data_seen: Mutex<Option<watch::Receiver<bool>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl IrcConnection {
    pub fn new(config: ConnectionConfig) -> Result<Self, ConnectionError> {
        let tls = if config.ssl {
            Some(tls::connector()?)
        } else {
            None
        };
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            flags: Arc::new(ConnectionFlags::new()),
            tls,
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            data_seen: Mutex::new(None),
            reader: Mutex::new(None),
        })
    }

    async fn dial(&self) -> Result<(BoxedReader, BoxedWriter), ConnectionError> {
        let address = self.config.address();
        let tcp = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&address))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout(address.clone()))?
            .map_err(|source| ConnectionError::Connect {
                address: address.clone(),
                source,
            })?;
        tcp.set_nodelay(true)?;

        match &self.tls {
            Some(connector) => {
                let stream = connector
                    .connect(tls::server_name(&self.config.host)?, tcp)
                    .await
                    .map_err(|e| ConnectionError::Tls(e.to_string()))?;
                let (r, w) = tokio::io::split(stream);
                let r: BoxedReader = Box::new(r);
                let w: BoxedWriter = Box::new(w);
                Ok((r, w))
            }
            None => {
                let (r, w) = tcp.into_split();
                let r: BoxedReader = Box::new(r);
                let w: BoxedWriter = Box::new(w);
                Ok((r, w))
            }
        }
    }

    fn stop_reader(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl Connection for IrcConnection {
    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn flags(&self) -> &ConnectionFlags {
        &self.flags
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        info!(connection = %self.config.name, address = %self.config.address(), tls = self.config.ssl, "Connecting");
        let (reader, writer) = match self.dial().await {
            Ok(halves) => halves,
            Err(e) => {
                self.flags.request_reconnect();
                return Err(e);
            }
        };

        *self.writer.lock().await = Some(writer);
        self.flags.clear_reconnect();
        self.flags.touch();

        let (seen_tx, seen_rx) = watch::channel(false);
        *self
            .data_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(seen_rx);

        let handle = tokio::spawn(read_loop(
            self.config.name.clone(),
            reader,
            self.inbound_tx.clone(),
            Arc::clone(&self.flags),
            Arc::clone(&self.writer),
            seen_tx,
        ));
        if let Some(old) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            old.abort();
        }
        info!(connection = %self.config.name, "Socket open");
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), ConnectionError> {
        info!(connection = %self.config.name, "Reconnecting");
        self.close().await;
        self.connect().await
    }

    async fn close(&self) {
        self.stop_reader();
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(connection = %self.config.name, error = %e, "Socket shutdown failed");
            }
            info!(connection = %self.config.name, "Socket closed");
        }
    }

    async fn send(&self, line: &str) -> Result<(), ConnectionError> {
        let result = write_line(&self.writer, line).await;
        match &result {
            Ok(()) => debug!(connection = %self.config.name, line = line.trim_end(), "Sent"),
            Err(ConnectionError::NotConnected) => {}
            Err(e) => {
                warn!(connection = %self.config.name, error = %e, "Write failed");
                self.flags.request_reconnect();
            }
        }
        result
    }

    async fn wait_for_data(&self, timeout: Duration) -> bool {
        let rx = self
            .data_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(mut rx) = rx else {
            return false;
        };
        tokio::time::timeout(timeout, rx.wait_for(|seen| *seen))
            .await
            .is_ok_and(|seen| seen.is_ok())
    }

    async fn next_line(&self, wait: Duration) -> Option<String> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
    }
}

async fn write_line(writer: &SharedWriter, line: &str) -> Result<(), ConnectionError> {
    let mut guard = writer.lock().await;
    let w = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
    w.write_all(line.as_bytes()).await?;
    if !line.ends_with("\r\n") {
        w.write_all(b"\r\n").await?;
    }
    w.flush().await?;
    Ok(())
}

/// Read lines off the socket until it closes.
///
/// Any bytes refresh liveness and count as the greeting, whether or not
/// they complete a line. Each line lands on the inbound queue; `PING` is
/// answered here so keep-alive does not depend on the pipeline. A line
/// longer than [`MAX_LINE`] is dropped up to its terminator.
async fn read_loop(
    name: String,
    reader: BoxedReader,
    inbound_tx: mpsc::UnboundedSender<String>,
    flags: Arc<ConnectionFlags>,
    writer: SharedWriter,
    seen: watch::Sender<bool>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(512);
    let mut oversized = false;

    loop {
        let (used, complete) = match reader.fill_buf().await {
            Ok([]) => {
                info!(connection = %name, "Remote closed the connection");
                flags.request_reconnect();
                break;
            }
            Ok(available) => {
                let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
                    Some(end) => (&available[..=end], true),
                    None => (available, false),
                };
                if !oversized {
                    if buf.len() + chunk.len() > MAX_LINE {
                        warn!(connection = %name, limit = MAX_LINE, "Discarding oversized line");
                        oversized = true;
                        buf.clear();
                    } else {
                        buf.extend_from_slice(chunk);
                    }
                }
                (chunk.len(), complete)
            }
            Err(e) => {
                warn!(connection = %name, error = %e, "Read failed");
                flags.request_reconnect();
                break;
            }
        };
        reader.consume(used);
        flags.touch();
        seen.send_replace(true);

        if !complete || std::mem::take(&mut oversized) {
            continue;
        }
        let raw = String::from_utf8_lossy(&buf).into_owned();
        buf.clear();
        let text = raw.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            continue;
        }

        if let Ok(parsed) = Line::parse(text) {
            if parsed.command.eq_ignore_ascii_case("PING") {
                let token = parsed.trailing().unwrap_or_default();
                if let Err(e) = write_line(&writer, &line::pong(token)).await {
                    warn!(connection = %name, error = %e, "Failed to answer PING");
                }
            }
        }

        if inbound_tx.send(text.to_string()).is_err() {
            debug!(connection = %name, "Inbound queue closed");
            break;
        }
    }
}
