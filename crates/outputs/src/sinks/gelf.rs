//! GelfOutput - forwards events as GELF 1.1 over UDP or TCP
//!
//! UDP sends one datagram per event. TCP frames every message with a
//! trailing null byte and reconnects once on a failed write, no sooner than
//! `reconnect_delay` after the connection was lost.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use contracts::{Batch, ContractError, FilteredEvent, MessageOutput, Output};
use serde_json::{Map, Value};
use socket2::SockRef;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

const GELF_VERSION: &str = "1.1";
const FORWARDER: &str = "outflow.gelf";
/// Largest datagram sent without chunking
const MAX_DATAGRAM: usize = 65_000;

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GelfProtocol {
    Udp,
    Tcp,
}

impl FromStr for GelfProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GelfConnectOptions {
    /// Budget for resolving and connecting to the target
    pub connect_timeout: Duration,
    /// Minimum wait between losing a TCP connection and the next attempt
    pub reconnect_delay: Duration,
    pub tcp_no_delay: bool,
    pub tcp_keep_alive: bool,
}

impl Default for GelfConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1000),
            reconnect_delay: Duration::from_millis(500),
            tcp_no_delay: false,
            tcp_keep_alive: false,
        }
    }
}

struct TcpLink {
    conn: Option<TcpStream>,
    /// When the connection was lost or the last reconnect failed
    lost_at: Option<Instant>,
}

enum Transport {
    Udp(UdpSocket),
    Tcp(Mutex<TcpLink>),
}

/// Output sending GELF messages to a remote endpoint
pub struct GelfOutput {
    name: String,
    target: String,
    protocol: GelfProtocol,
    options: GelfConnectOptions,
    transport: Transport,
}

impl GelfOutput {
    /// Connect to `host:port`
    #[instrument(name = "gelf_output_connect", skip(name), fields(output = %name))]
    pub async fn connect(
        name: &str,
        host: &str,
        port: u16,
        protocol: GelfProtocol,
        options: GelfConnectOptions,
    ) -> std::io::Result<Self> {
        let name = name.to_string();
        let target = format!("{}:{}", host, port);
        let transport = match protocol {
            GelfProtocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                within(options.connect_timeout, &target, socket.connect(&target)).await?;
                Transport::Udp(socket)
            }
            GelfProtocol::Tcp => {
                let stream = open_tcp(&target, &options).await?;
                Transport::Tcp(Mutex::new(TcpLink {
                    conn: Some(stream),
                    lost_at: None,
                }))
            }
        };
        debug!(output = %name, target = %target, ?protocol, "GelfOutput connected");

        Ok(Self {
            name,
            target,
            protocol,
            options,
            transport,
        })
    }

    /// Create from params (for factory); requires `host`, `port` and `protocol`
    ///
    /// Optional: `connect_timeout` and `reconnect_delay` in milliseconds,
    /// `tcp_no_delay` and `tcp_keep_alive` as booleans.
    pub async fn from_params(
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let required = |key: &str| {
            params
                .get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    ContractError::output_instantiation(name, format!("missing '{}' parameter", key))
                })
        };
        let host = required("host")?;
        let port: u16 = required("port")?.parse().map_err(|e| {
            ContractError::output_instantiation(name, format!("invalid port: {}", e))
        })?;
        let protocol: GelfProtocol = required("protocol")?
            .parse()
            .map_err(|e: String| ContractError::output_instantiation(name, e))?;
        let options = connect_options(name, params)?;

        Self::connect(name, host, port, protocol, options)
            .await
            .map_err(|e| ContractError::output_connection(name, e.to_string()))
    }

    pub fn protocol(&self) -> GelfProtocol {
        self.protocol
    }

    pub fn options(&self) -> &GelfConnectOptions {
        &self.options
    }

    async fn send(&self, event: &FilteredEvent) -> Result<(), ContractError> {
        let payload = serde_json::to_vec(&to_gelf(event))
            .map_err(|e| ContractError::output_delivery(&self.name, e.to_string()))?;

        match &self.transport {
            Transport::Udp(socket) => {
                if payload.len() > MAX_DATAGRAM {
                    return Err(ContractError::output_delivery(
                        &self.name,
                        format!("message of {} bytes exceeds datagram limit", payload.len()),
                    ));
                }
                socket
                    .send(&payload)
                    .await
                    .map_err(|e| ContractError::output_delivery(&self.name, e.to_string()))?;
            }
            Transport::Tcp(link) => {
                let mut frame = payload;
                frame.push(0);
                let mut link = link.lock().await;
                if let Some(conn) = link.conn.as_mut() {
                    match conn.write_all(&frame).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            warn!(output = %self.name, error = %e, "GELF write failed, reconnecting");
                            link.conn = None;
                            link.lost_at = Some(Instant::now());
                        }
                    }
                }
                let mut conn = self.reconnect(&mut link).await?;
                if let Err(e) = conn.write_all(&frame).await {
                    link.lost_at = Some(Instant::now());
                    return Err(ContractError::output_delivery(&self.name, e.to_string()));
                }
                link.conn = Some(conn);
            }
        }
        Ok(())
    }

    /// Open a new connection once the reconnect delay has passed
    async fn reconnect(&self, link: &mut TcpLink) -> Result<TcpStream, ContractError> {
        if let Some(lost_at) = link.lost_at {
            let wait = self.options.reconnect_delay.saturating_sub(lost_at.elapsed());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        match open_tcp(&self.target, &self.options).await {
            Ok(conn) => {
                link.lost_at = None;
                Ok(conn)
            }
            Err(e) => {
                link.lost_at = Some(Instant::now());
                Err(ContractError::output_connection(&self.name, e.to_string()))
            }
        }
    }

    async fn shutdown(&self) -> Result<(), ContractError> {
        if let Transport::Tcp(link) = &self.transport {
            if let Some(mut conn) = link.lock().await.conn.take() {
                let _ = conn.shutdown().await;
            }
        }
        debug!(output = %self.name, "GelfOutput closed");
        Ok(())
    }
}

async fn within<T>(
    budget: Duration,
    target: &str,
    connect: impl std::future::Future<Output = std::io::Result<T>>,
) -> std::io::Result<T> {
    tokio::time::timeout(budget, connect).await.map_err(|_| {
        std::io::Error::new(
            ErrorKind::TimedOut,
            format!("connect to {} timed out after {}ms", target, budget.as_millis()),
        )
    })?
}

async fn open_tcp(target: &str, options: &GelfConnectOptions) -> std::io::Result<TcpStream> {
    let stream = within(options.connect_timeout, target, TcpStream::connect(target)).await?;
    if let Err(e) = stream.set_nodelay(options.tcp_no_delay) {
        debug!(target = %target, error = %e, "Failed to set TCP_NODELAY");
    }
    if options.tcp_keep_alive {
        if let Err(e) = SockRef::from(&stream).set_keepalive(true) {
            debug!(target = %target, error = %e, "Failed to enable TCP keep-alive");
        }
    }
    Ok(stream)
}

fn connect_options(
    name: &str,
    params: &HashMap<String, String>,
) -> Result<GelfConnectOptions, ContractError> {
    let invalid = |key: &str, e: &dyn std::fmt::Display| {
        ContractError::output_instantiation(name, format!("invalid '{}' parameter: {}", key, e))
    };
    let millis = |key: &str, default: Duration| match params.get(key).filter(|v| !v.is_empty()) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) => Err(invalid(key, &"must be positive")),
            Ok(ms) => Ok(Duration::from_millis(ms)),
            Err(e) => Err(invalid(key, &e)),
        },
        None => Ok(default),
    };
    let flag = |key: &str| match params.get(key).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse::<bool>().map_err(|e| invalid(key, &e)),
        None => Ok(false),
    };

    let defaults = GelfConnectOptions::default();
    Ok(GelfConnectOptions {
        connect_timeout: millis("connect_timeout", defaults.connect_timeout)?,
        reconnect_delay: millis("reconnect_delay", defaults.reconnect_delay)?,
        tcp_no_delay: flag("tcp_no_delay")?,
        tcp_keep_alive: flag("tcp_keep_alive")?,
    })
}

/// Build the GELF message of an event
fn to_gelf(event: &FilteredEvent) -> Value {
    let inner = event.event();
    let mut gelf = Map::new();
    gelf.insert("version".into(), GELF_VERSION.into());
    let host = if inner.source.is_empty() {
        "unknown"
    } else {
        inner.source.as_str()
    };
    gelf.insert("host".into(), host.into());
    gelf.insert("short_message".into(), inner.message.clone().into());
    if let Some(full) = inner.fields.get("full_message") {
        gelf.insert("full_message".into(), full.clone());
    }
    let timestamp = inner.timestamp.timestamp_millis() as f64 / 1000.0;
    gelf.insert("timestamp".into(), timestamp.into());
    if let Some(level) = inner.fields.get("level").and_then(extract_level) {
        gelf.insert("level".into(), level.into());
    }
    gelf.insert("_forwarder".into(), FORWARDER.into());

    for (key, value) in &inner.fields {
        if matches!(key.as_str(), "level" | "full_message" | "id" | "_id") {
            continue;
        }
        let key = if key.starts_with('_') {
            key.clone()
        } else {
            format!("_{}", key)
        };
        gelf.insert(key, value.clone());
    }
    Value::Object(gelf)
}

/// Syslog severity (0-7) from a number or numeric string
fn extract_level(raw: &Value) -> Option<u8> {
    let level = match raw {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    u8::try_from(level).ok().filter(|l| *l <= 7)
}

#[async_trait]
impl Output for GelfOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "gelf_output_deliver",
        skip(self, batch),
        fields(output = %self.name, events = batch.len())
    )]
    async fn deliver(&self, batch: &Batch) -> Result<(), ContractError> {
        for event in batch {
            self.send(event).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ContractError> {
        self.shutdown().await
    }
}

#[async_trait]
impl MessageOutput for GelfOutput {
    fn id(&self) -> &str {
        &self.name
    }

    async fn write(&self, event: &FilteredEvent) -> Result<(), ContractError> {
        self.send(event).await
    }

    async fn stop(&self) -> Result<(), ContractError> {
        self.shutdown().await
    }
}
