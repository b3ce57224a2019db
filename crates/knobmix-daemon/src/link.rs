//! Serial link state machine.
//!
//! The link finds the knob panel among the serial ports, synchronizes with
//! it, keeps it alive and relays its data lines:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!       Searching ──► Connecting ──► Handshaking ──► Linked │
//!            ▲            │  ▲            │            │    │
//!            │ backoff    │  └────────────┘            ▼    │
//!            └────────────┘   timeout / wrong line  Disconnected
//! ```
//!
//! Every wait (handshake, heartbeat, backoff) is raced against the shutdown
//! signal. Errors on one port never stop the link; they only send it back to
//! searching.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use knobmix_core::SharedRelay;
use knobmix_protocol::{LineKind, LineStream, ProtocolError, ProtocolResult};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::port::{PortProvider, candidate_ports};
use crate::signals::ShutdownHandle;

/// Observable state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Enumerating ports.
    Searching,
    /// Opening candidate ports one by one.
    Connecting,
    /// A port is open, waiting for the handshake key.
    Handshaking,
    /// Synchronized with the panel, relaying data.
    Linked,
    /// The link was lost, waiting before searching again.
    Disconnected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Searching => "searching",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Linked => "linked",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Counters kept over the lifetime of a link.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStats {
    /// Successful handshakes.
    pub links_established: u64,
    /// Links lost after a successful handshake.
    pub disconnects: u64,
    /// Data lines pushed to the relay.
    pub lines_relayed: u64,
    /// Heartbeats echoed.
    pub heartbeats: u64,
    /// Port of the most recent link.
    pub last_port: Option<String>,
    /// When the most recent link was established.
    pub last_connected: Option<DateTime<Utc>>,
    /// When the most recent link was lost.
    pub last_disconnected: Option<DateTime<Utc>>,
}

impl LinkStats {
    fn record_link(&mut self, port: &str) {
        self.links_established += 1;
        self.last_port = Some(port.to_string());
        self.last_connected = Some(Utc::now());
    }

    fn record_disconnect(&mut self) {
        self.disconnects += 1;
        self.last_disconnected = Some(Utc::now());
    }
}

/// Internal phase, owning whatever the state needs.
enum Phase<S> {
    Searching,
    Connecting {
        candidates: VecDeque<String>,
    },
    Handshaking {
        port: String,
        stream: LineStream<S>,
        candidates: VecDeque<String>,
    },
    Linked {
        port: String,
        stream: LineStream<S>,
        deadline: Instant,
    },
    Disconnected,
}

impl<S> Phase<S> {
    fn state(&self) -> LinkState {
        match self {
            Self::Searching => LinkState::Searching,
            Self::Connecting { .. } => LinkState::Connecting,
            Self::Handshaking { .. } => LinkState::Handshaking,
            Self::Linked { .. } => LinkState::Linked,
            Self::Disconnected => LinkState::Disconnected,
        }
    }
}

/// The serial link to the knob panel.
pub struct Link<P: PortProvider> {
    provider: P,
    config: LinkConfig,
    relay: SharedRelay,
    shutdown: ShutdownHandle,
    phase: Phase<P::Port>,
    active_port: Option<String>,
    stats: LinkStats,
}

impl<P: PortProvider> Link<P> {
    /// Creates a link in the `Searching` state.
    pub fn new(
        provider: P,
        config: LinkConfig,
        relay: SharedRelay,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            provider,
            config,
            relay,
            shutdown,
            phase: Phase::Searching,
            active_port: None,
            stats: LinkStats::default(),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> LinkState {
        self.phase.state()
    }

    /// Returns the port of the established link, if any.
    pub fn active_port(&self) -> Option<&str> {
        self.active_port.as_deref()
    }

    /// Returns the lifetime counters.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Runs the state machine until shutdown and returns the final counters.
    pub async fn run(mut self) -> LinkStats {
        info!(
            baud_rate = self.config.baud_rate,
            port = ?self.config.port,
            "Link started"
        );

        loop {
            match self.step().await {
                Ok(state) => trace!(state = %state, "Link step"),
                Err(e) if e.is_shutdown() => break,
                Err(e) => warn!(error = %e, "Link step failed"),
            }
        }

        info!(
            links = self.stats.links_established,
            lines = self.stats.lines_relayed,
            "Link stopped"
        );
        self.stats
    }

    /// Performs one transition and returns the new state.
    ///
    /// While linked, one step handles one received line. Returns
    /// [`DaemonError::Shutdown`] once shutdown is requested; the port, if
    /// any, is closed.
    pub async fn step(&mut self) -> DaemonResult<LinkState> {
        if self.shutdown.is_shutdown() {
            self.close();
            return Err(DaemonError::Shutdown);
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Searching);
        let before = phase.state();

        let next = match phase {
            Phase::Searching => Ok(self.search()),
            Phase::Connecting { candidates } => self.connect(candidates).await,
            Phase::Handshaking {
                port,
                stream,
                candidates,
            } => self.handshake(port, stream, candidates).await,
            Phase::Linked {
                port,
                stream,
                deadline,
            } => self.linked(port, stream, deadline).await,
            Phase::Disconnected => pause(&self.shutdown, self.config.reconnect_delay)
                .await
                .map(|()| Phase::Searching),
        };
        let next = match next {
            Ok(next) => next,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        let after = next.state();
        if before != after {
            debug!(from = %before, to = %after, "Link state changed");
        }
        self.phase = next;
        Ok(after)
    }

    fn search(&mut self) -> Phase<P::Port> {
        let ports = match self.provider.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "Port enumeration failed");
                Vec::new()
            }
        };
        let candidates = candidate_ports(&ports, self.config.port.as_deref());
        debug!(candidates = ?candidates, "Searching for knob panel");
        Phase::Connecting {
            candidates: candidates.into(),
        }
    }

    async fn connect(
        &mut self,
        mut candidates: VecDeque<String>,
    ) -> DaemonResult<Phase<P::Port>> {
        let Some(port) = candidates.pop_front() else {
            debug!(
                backoff_ms = self.config.search_backoff.as_millis() as u64,
                "No knob panel found, backing off"
            );
            pause(&self.shutdown, self.config.search_backoff).await?;
            return Ok(Phase::Searching);
        };

        match self.provider.open(&port, self.config.baud_rate) {
            Ok(stream) => {
                debug!(port = %port, "Port opened, waiting for handshake");
                Ok(Phase::Handshaking {
                    stream: LineStream::with_max_len(stream, self.config.max_line_length),
                    port,
                    candidates,
                })
            }
            Err(e) => {
                debug!(port = %port, error = %e, "Cannot open port");
                Ok(Phase::Connecting { candidates })
            }
        }
    }

    async fn handshake(
        &mut self,
        port: String,
        mut stream: LineStream<P::Port>,
        candidates: VecDeque<String>,
    ) -> DaemonResult<Phase<P::Port>> {
        let shutdown = self.shutdown.wait();
        let received = tokio::select! {
            _ = shutdown.wait() => return Err(DaemonError::Shutdown),
            received = timeout(self.config.handshake_timeout, stream.read_line()) => received,
        };

        let line = match received {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                debug!(port = %port, "Port closed during handshake");
                return Ok(Phase::Connecting { candidates });
            }
            Ok(Err(e)) => {
                debug!(port = %port, error = %e, "Read failed during handshake");
                return Ok(Phase::Connecting { candidates });
            }
            Err(_) => {
                debug!(
                    port = %port,
                    timeout_ms = self.config.handshake_timeout.as_millis() as u64,
                    "No handshake received, abandoning port"
                );
                return Ok(Phase::Connecting { candidates });
            }
        };

        if !self.config.tokens.is_handshake(&line) {
            debug!(port = %port, line = %line, "Unexpected first line, abandoning port");
            return Ok(Phase::Connecting { candidates });
        }

        let ack = &self.config.tokens.handshake_ack;
        if let Err(e) = send(&mut stream, ack, self.config.handshake_timeout).await {
            warn!(port = %port, error = %e, "Failed to acknowledge handshake");
            return Ok(Phase::Connecting { candidates });
        }

        info!(port = %port, "Knob panel linked");
        self.stats.record_link(&port);
        self.active_port = Some(port.clone());
        Ok(Phase::Linked {
            port,
            stream,
            deadline: Instant::now() + self.config.heartbeat_timeout,
        })
    }

    async fn linked(
        &mut self,
        port: String,
        mut stream: LineStream<P::Port>,
        mut deadline: Instant,
    ) -> DaemonResult<Phase<P::Port>> {
        let shutdown = self.shutdown.wait();
        let received = tokio::select! {
            biased;
            _ = shutdown.wait() => return Err(DaemonError::Shutdown),
            _ = sleep_until(deadline) => None,
            received = stream.read_line() => Some(received),
        };

        let line = match received {
            Some(Ok(Some(line))) => line,
            Some(Ok(None)) => return Ok(self.disconnect(&port, "port closed")),
            Some(Err(ProtocolError::LineTooLong { length, max })) => {
                debug!(port = %port, length, max, "Dropping overlong line");
                return Ok(Phase::Linked {
                    port,
                    stream,
                    deadline,
                });
            }
            Some(Err(e)) => return Ok(self.disconnect(&port, &e.to_string())),
            None => return Ok(self.disconnect(&port, "heartbeat lost")),
        };
        if Instant::now() >= deadline {
            return Ok(self.disconnect(&port, "heartbeat lost"));
        }

        match self.config.tokens.classify(&line) {
            LineKind::Heartbeat => {
                let echo = &self.config.tokens.heartbeat;
                if let Err(e) = send(&mut stream, echo, self.config.handshake_timeout).await {
                    return Ok(self.disconnect(&port, &e.to_string()));
                }
                self.stats.heartbeats += 1;
                deadline = Instant::now() + self.config.heartbeat_timeout;
                trace!(port = %port, "Heartbeat echoed");
            }
            LineKind::Handshake => {
                // The panel restarted without the port closing.
                let ack = &self.config.tokens.handshake_ack;
                if let Err(e) = send(&mut stream, ack, self.config.handshake_timeout).await {
                    return Ok(self.disconnect(&port, &e.to_string()));
                }
                deadline = Instant::now() + self.config.heartbeat_timeout;
                info!(port = %port, "Knob panel sent handshake again, acknowledged");
            }
            LineKind::Data(data) => {
                trace!(line = data, "Relaying line");
                self.relay.push(data);
                self.stats.lines_relayed += 1;
            }
        }

        Ok(Phase::Linked {
            port,
            stream,
            deadline,
        })
    }

    fn disconnect(&mut self, port: &str, reason: &str) -> Phase<P::Port> {
        warn!(port = %port, reason = %reason, "Knob panel link lost");
        self.active_port = None;
        self.stats.record_disconnect();
        Phase::Disconnected
    }

    fn close(&mut self) {
        if let Some(port) = self.active_port.take() {
            info!(port = %port, "Closing knob panel link");
        }
        self.phase = Phase::Searching;
    }
}

/// Writes a line, giving up after `limit`.
async fn send<S>(stream: &mut LineStream<S>, line: &str, limit: Duration) -> ProtocolResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    timeout(limit, stream.write_line(line))
        .await
        .map_err(|_| ProtocolError::timeout("write"))?
}

/// Sleeps for `duration` unless shutdown comes first.
async fn pause(shutdown: &ShutdownHandle, duration: Duration) -> DaemonResult<()> {
    let shutdown = shutdown.wait();
    tokio::select! {
        _ = shutdown.wait() => Err(DaemonError::Shutdown),
        _ = sleep(duration) => Ok(()),
    }
}
