//! One readiness-driven event loop.
//!
//! # Responsibilities
//! - Accept every pending connection when the shared listener is readable
//! - Route readiness events to connections by token
//! - Give each connection with outstanding readiness one step per iteration
//! - Close connections older than the configured timeout
//! - Force-close everything and return once shutdown is triggered
//!
//! # Design Decisions
//! - Never blocks in the loop body; the only wait is `Poll::poll`
//! - Poll with a zero timeout while any connection still has work, so a busy
//!   connection cannot delay new events for the others
//! - A failing connection is logged and dropped; the loop keeps serving

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use rustls::{ServerConfig, ServerConnection};

use crate::lifecycle::ShutdownToken;
use crate::net::transport::would_block;
use crate::net::{ClientTransport, Connection, ConnectionError, ConnectionId, Progress, Side};
use crate::observability::metrics;
use crate::worker::ProxyContext;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

/// Longest idle wait, so timeouts are enforced without traffic.
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Loop tuning taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub max_events: usize,
    pub connection_timeout: Duration,
}

/// A single worker: its own multiplexer, connections, router and cache.
#[derive(Debug)]
pub struct Worker {
    index: usize,
    poll: Poll,
    listener: TcpListener,
    tls: Option<Arc<ServerConfig>>,
    ctx: ProxyContext,
    settings: WorkerSettings,
    shutdown: ShutdownToken,
    connections: HashMap<ConnectionId, Connection>,
    /// Connections with remembered readiness still to act on.
    ready: HashSet<ConnectionId>,
    last_sweep: Instant,
}

impl Worker {
    /// Build the worker and register its listener handle and shutdown waker.
    pub fn new(
        index: usize,
        mut listener: TcpListener,
        tls: Option<Arc<ServerConfig>>,
        ctx: ProxyContext,
        settings: WorkerSettings,
        shutdown: ShutdownToken,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        shutdown.register_waker(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            index,
            poll,
            listener,
            tls,
            ctx,
            settings,
            shutdown,
            connections: HashMap::new(),
            ready: HashSet::new(),
            last_sweep: Instant::now(),
        })
    }

    /// Run until shutdown. Only multiplexer failures are returned.
    pub fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.settings.max_events);
        tracing::info!(worker = self.index, tls = self.tls.is_some(), "Worker started");

        while !self.shutdown.is_triggered() {
            let timeout = if self.ready.is_empty() {
                SWEEP_INTERVAL.min(self.settings.connection_timeout)
            } else {
                Duration::ZERO
            };

            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(worker = self.index, error = %e, "Poll failed");
                self.close_all(ConnectionError::Shutdown);
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_pending(),
                    WAKER => {}
                    token => self.dispatch(token, event),
                }
            }

            self.step_ready();
            self.sweep_expired();
        }

        tracing::info!(
            worker = self.index,
            open_connections = self.connections.len(),
            "Worker shutting down"
        );
        self.close_all(ConnectionError::Shutdown);
        tracing::info!(worker = self.index, "Worker stopped");
        Ok(())
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if would_block(&e) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!(worker = self.index, error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let transport = match &self.tls {
            None => ClientTransport::plain(stream),
            Some(config) => match ServerConnection::new(Arc::clone(config)) {
                Ok(session) => ClientTransport::tls(stream, session),
                Err(e) => {
                    tracing::error!(worker = self.index, %peer, error = %e, "Failed to create TLS session");
                    return;
                }
            },
        };

        let id = ConnectionId::new();
        let mut conn = Connection::new(id, peer, transport, self.ctx.limits.buffer_capacity);
        if let Err(e) = conn.register(self.poll.registry()) {
            tracing::error!(worker = self.index, connection_id = %id, error = %e, "Failed to register connection");
            return;
        }

        tracing::info!(worker = self.index, connection_id = %id, %peer, "Connection accepted");
        metrics::record_accept();

        self.connections.insert(id, conn);
        // First handshake or read attempt happens right away.
        self.step_connection(id);
    }

    fn dispatch(&mut self, token: Token, event: &Event) {
        let (id, side) = Side::from_token(token);
        // Events for connections closed earlier in this batch are stale.
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.on_event(side, event);
            self.ready.insert(id);
        }
    }

    fn step_ready(&mut self) {
        let ready: Vec<ConnectionId> = self.ready.drain().collect();
        for id in ready {
            self.step_connection(id);
        }
    }

    fn step_connection(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        if !conn.has_work() {
            return;
        }

        match conn.step(self.poll.registry(), &mut self.ctx) {
            Ok(Progress::Continue) => {
                if conn.has_work() {
                    self.ready.insert(id);
                }
            }
            Ok(Progress::Done) => self.remove(id, None),
            Err(err) => self.remove(id, Some(err)),
        }
    }

    fn sweep_expired(&mut self) {
        if self.last_sweep.elapsed() < SWEEP_INTERVAL.min(self.settings.connection_timeout) {
            return;
        }
        self.last_sweep = Instant::now();

        let limit = self.settings.connection_timeout;
        let expired: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.age() >= limit)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            tracing::debug!(worker = self.index, connection_id = %id, "Connection timed out");
            self.remove(id, Some(ConnectionError::Timeout(limit)));
        }
    }

    fn remove(&mut self, id: ConnectionId, cause: Option<ConnectionError>) {
        self.ready.remove(&id);
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.close(self.poll.registry(), cause.as_ref());
        }
    }

    fn close_all(&mut self, cause: ConnectionError) {
        for (_, mut conn) in self.connections.drain() {
            conn.close(self.poll.registry(), Some(&cause));
        }
        self.ready.clear();
    }
}
