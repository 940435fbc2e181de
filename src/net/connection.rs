//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Drive one client connection from accept to close
//! - Accumulate and parse the request, dial the selected backend
//! - Relay backend bytes to the client with backpressure
//! - Generate unique connection IDs for tracing
//!
//! # State Transitions
//! ```text
//! Handshaking ──► ReadingRequest ──► ConnectingBackend ──► Relaying ──► Closed
//!                       │                                     ▲
//!                       └──────────── cache hit ──────────────┘
//! any state ── error / timeout / shutdown ──► Closed
//! ```
//!
//! # Design Decisions
//! - Readiness is remembered per socket and cleared only on `WouldBlock`;
//!   an edge reported by the multiplexer is never lost between steps
//! - `step` does one bounded unit of work so the worker can interleave
//!   connections fairly
//! - The backend receives the exact bytes the client sent

use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use thiserror::Error;

use crate::http::{parse_request, HttpRequest, ParseError, ParseOutcome};
use crate::net::transport::{would_block, ClientTransport, FlushStatus, HandshakeStatus, ReadStatus};
use crate::observability::metrics;
use crate::routing::RouterError;
use crate::worker::ProxyContext;

/// Global atomic counter for connection IDs.
/// Starts at 1; id 0 is reserved so its tokens stay free for the worker.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The two sockets of a proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client = 0,
    Backend = 1,
}

impl Side {
    /// Multiplexer token for this side of connection `id`.
    pub fn token(self, id: ConnectionId) -> Token {
        Token(((id.0 as usize) << 1) | self as usize)
    }

    /// Recover the connection and side from a token.
    pub fn from_token(token: Token) -> (ConnectionId, Side) {
        let side = if token.0 & 1 == 0 { Side::Client } else { Side::Backend };
        (ConnectionId((token.0 >> 1) as u64), side)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TLS handshake in progress.
    Handshaking,
    /// Accumulating request bytes until a full request parses.
    ReadingRequest,
    /// Non-blocking connect to the backend in flight.
    ConnectingBackend,
    /// Forwarding the request and streaming the response back.
    Relaying,
    /// Terminal; both sockets released.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handshaking => "handshaking",
            Self::ReadingRequest => "reading_request",
            Self::ConnectingBackend => "connecting_backend",
            Self::Relaying => "relaying",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection ended early. Always scoped to one connection; the
/// worker logs it and keeps serving.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("client I/O error: {0}")]
    Client(#[source] io::Error),

    #[error("client closed the connection")]
    ClientClosed,

    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),

    #[error(transparent)]
    NoBackend(#[from] RouterError),

    #[error("failed to connect to backend {addr}: {source}")]
    BackendConnect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("backend I/O error: {0}")]
    Backend(#[source] io::Error),

    #[error("readiness registration failed: {0}")]
    Register(#[source] io::Error),

    #[error("backend event without a backend socket")]
    MissingBackend,

    #[error("connection exceeded its {0:?} lifetime")]
    Timeout(Duration),

    #[error("worker shutting down")]
    Shutdown,
}

impl ConnectionError {
    /// Short label used for metrics and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "handshake",
            Self::Client(_) => "client_error",
            Self::ClientClosed => "client_closed",
            Self::Malformed(_) => "malformed",
            Self::NoBackend(_) => "no_backend",
            Self::BackendConnect { .. } => "backend_connect",
            Self::Backend(_) => "backend_error",
            Self::Register(_) => "register",
            Self::MissingBackend => "missing_backend",
            Self::Timeout(_) => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Outcome of a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More work remains; the connection stays registered.
    Continue,
    /// The response has been fully delivered.
    Done,
}

/// Remembered readiness for one socket.
#[derive(Debug, Clone, Copy, Default)]
struct Readiness {
    readable: bool,
    writable: bool,
    error: bool,
}

#[derive(Debug)]
struct BackendSocket {
    stream: TcpStream,
    addr: SocketAddr,
    interest: Interest,
}

/// One proxied client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
    created_at: Instant,

    client: ClientTransport,
    client_interest: Interest,
    client_ready: Readiness,

    backend: Option<BackendSocket>,
    backend_ready: Readiness,
    /// A backend event arrived while no backend socket existed.
    orphan_event: bool,

    /// Request accumulation buffer; its length is the fixed capacity.
    buffer: Vec<u8>,
    used: usize,
    /// Prefix of `buffer[..used]` already written to the backend.
    forwarded: usize,
    request: Option<HttpRequest>,

    /// Bytes accepted from the backend but not yet taken by the client.
    outbound: Vec<u8>,
    outbound_offset: usize,
    chunk: Vec<u8>,
    backend_done: bool,
    /// Copy of the response for the cache, dropped once it outgrows the
    /// object limit.
    capture: Option<Vec<u8>>,

    bytes_to_backend: u64,
    bytes_to_client: u64,
}

impl Connection {
    /// Wrap an accepted client socket. TLS transports start in
    /// `Handshaking`, plain ones go straight to `ReadingRequest`.
    pub fn new(id: ConnectionId, peer: SocketAddr, client: ClientTransport, buffer_capacity: usize) -> Self {
        let state = if client.is_tls() {
            ConnectionState::Handshaking
        } else {
            ConnectionState::ReadingRequest
        };

        Self {
            id,
            peer,
            state,
            created_at: Instant::now(),
            client,
            client_interest: Interest::READABLE,
            // Bytes may already be queued before the first edge is seen.
            client_ready: Readiness {
                readable: true,
                writable: true,
                error: false,
            },
            backend: None,
            backend_ready: Readiness::default(),
            orphan_event: false,
            buffer: vec![0; buffer_capacity],
            used: 0,
            forwarded: 0,
            request: None,
            outbound: Vec::new(),
            outbound_offset: 0,
            chunk: Vec::new(),
            backend_done: false,
            capture: None,
            bytes_to_backend: 0,
            bytes_to_client: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Time since accept, regardless of state.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    pub fn backend_addr(&self) -> Option<SocketAddr> {
        self.backend.as_ref().map(|b| b.addr)
    }

    /// Register the client socket for read readiness.
    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        let token = Side::Client.token(self.id);
        registry.register(self.client.source(), token, Interest::READABLE)?;
        self.client_interest = Interest::READABLE;
        Ok(())
    }

    /// Record a readiness event for one side.
    pub fn on_event(&mut self, side: Side, event: &Event) {
        let readable = event.is_readable() || event.is_read_closed();
        let writable = event.is_writable() || event.is_write_closed();
        match side {
            Side::Client => {
                self.client_ready.readable |= readable;
                self.client_ready.writable |= writable;
                self.client_ready.error |= event.is_error();
            }
            Side::Backend if self.backend.is_none() => self.orphan_event = true,
            Side::Backend => {
                // Errors surface through the next read or connect check.
                self.backend_ready.readable |= readable || event.is_error();
                self.backend_ready.writable |= writable || event.is_error();
            }
        }
    }

    /// Whether some remembered readiness can be acted on right now.
    pub fn has_work(&self) -> bool {
        if self.client_ready.error || self.orphan_event {
            return true;
        }

        let client = self.client_ready;
        let backend = self.backend_ready;
        match self.state {
            ConnectionState::Handshaking => {
                if self.client.has_pending_output() {
                    client.writable
                } else {
                    client.readable
                }
            }
            ConnectionState::ReadingRequest => {
                client.readable || (client.writable && self.client.has_pending_output())
            }
            ConnectionState::ConnectingBackend => backend.writable,
            ConnectionState::Relaying => {
                let pending = self.client_output_pending();
                (backend.writable && self.request_pending())
                    || (client.writable && pending)
                    || (!self.backend_done && !pending && backend.readable)
                    || (self.backend_done && !pending)
            }
            ConnectionState::Closed => false,
        }
    }

    /// Perform one bounded unit of work for the current state.
    pub fn step(&mut self, registry: &Registry, ctx: &mut ProxyContext) -> Result<Progress, ConnectionError> {
        if self.orphan_event {
            return Err(ConnectionError::MissingBackend);
        }
        if self.client_ready.error {
            let err = self
                .client
                .source()
                .take_error()
                .ok()
                .flatten()
                .unwrap_or_else(|| io::Error::other("client socket error"));
            return Err(match self.state {
                ConnectionState::Handshaking => ConnectionError::Handshake(err),
                _ => ConnectionError::Client(err),
            });
        }

        let progress = match self.state {
            ConnectionState::Handshaking => self.advance_handshake()?,
            ConnectionState::ReadingRequest => self.read_request(registry, ctx)?,
            ConnectionState::ConnectingBackend => self.finish_connect()?,
            ConnectionState::Relaying => self.relay(ctx)?,
            ConnectionState::Closed => return Ok(Progress::Done),
        };

        if progress == Progress::Continue {
            self.sync_interest(registry)?;
        }
        Ok(progress)
    }

    /// Release both sockets and log the outcome. Idempotent.
    pub fn close(&mut self, registry: &Registry, cause: Option<&ConnectionError>) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let previous = self.state;
        self.state = ConnectionState::Closed;

        self.client.close();
        let _ = registry.deregister(self.client.source());
        if let Some(mut backend) = self.backend.take() {
            let _ = registry.deregister(&mut backend.stream);
        }

        self.buffer = Vec::new();
        self.outbound = Vec::new();
        self.chunk = Vec::new();
        self.capture = None;

        let elapsed_ms = self.age().as_millis() as u64;
        match cause {
            None => tracing::info!(
                connection_id = %self.id,
                bytes_to_backend = self.bytes_to_backend,
                bytes_to_client = self.bytes_to_client,
                elapsed_ms,
                "Connection closed"
            ),
            Some(err)
                if matches!(
                    err,
                    ConnectionError::Timeout(_)
                        | ConnectionError::Shutdown
                        | ConnectionError::ClientClosed
                ) =>
            {
                tracing::info!(
                    connection_id = %self.id,
                    state = %previous,
                    reason = err.reason(),
                    bytes_to_backend = self.bytes_to_backend,
                    bytes_to_client = self.bytes_to_client,
                    elapsed_ms,
                    "Connection closed"
                )
            }
            Some(err) => tracing::warn!(
                connection_id = %self.id,
                state = %previous,
                reason = err.reason(),
                error = %err,
                bytes_to_backend = self.bytes_to_backend,
                bytes_to_client = self.bytes_to_client,
                "Connection closed with error"
            ),
        }

        metrics::record_close(
            cause.map_or("completed", ConnectionError::reason),
            self.bytes_to_backend,
            self.bytes_to_client,
        );
    }

    fn advance_handshake(&mut self) -> Result<Progress, ConnectionError> {
        match self.client.handshake_step().map_err(ConnectionError::Handshake)? {
            HandshakeStatus::Complete => {
                if let Some((protocol, cipher)) = self.client.session_description() {
                    tracing::info!(
                        connection_id = %self.id,
                        %protocol,
                        %cipher,
                        "TLS handshake completed"
                    );
                }
                self.state = ConnectionState::ReadingRequest;
                // The final flight may have carried application data.
                self.client_ready.readable = true;
            }
            HandshakeStatus::Progress => {}
            HandshakeStatus::WantRead => self.client_ready.readable = false,
            HandshakeStatus::WantWrite => self.client_ready.writable = false,
        }
        Ok(Progress::Continue)
    }

    fn read_request(&mut self, registry: &Registry, ctx: &mut ProxyContext) -> Result<Progress, ConnectionError> {
        if self.client_ready.writable
            && self.client.has_pending_output()
            && self.client.flush().map_err(ConnectionError::Client)? == FlushStatus::Blocked
        {
            self.client_ready.writable = false;
        }
        if !self.client_ready.readable {
            return Ok(Progress::Continue);
        }

        let status = self
            .client
            .read_plaintext(&mut self.buffer[self.used..])
            .map_err(ConnectionError::Client)?;
        match status {
            ReadStatus::Data(n) => self.used += n,
            ReadStatus::Blocked => {
                self.client_ready.readable = false;
                return Ok(Progress::Continue);
            }
            ReadStatus::Pending => return Ok(Progress::Continue),
            ReadStatus::Closed => return Err(ConnectionError::ClientClosed),
        }

        let request = match parse_request(&self.buffer[..self.used], &ctx.limits) {
            ParseOutcome::Incomplete if self.used == self.buffer.len() => {
                return Err(ParseError::BufferOverflow(self.buffer.len()).into());
            }
            ParseOutcome::Incomplete => return Ok(Progress::Continue),
            ParseOutcome::Malformed(err) => return Err(err.into()),
            ParseOutcome::Complete { request, consumed } => {
                if consumed < self.used {
                    tracing::debug!(
                        connection_id = %self.id,
                        trailing_bytes = self.used - consumed,
                        "Bytes after request are forwarded unparsed"
                    );
                }
                request
            }
        };

        tracing::info!(
            connection_id = %self.id,
            method = %request.method,
            path = %request.path,
            "Request parsed"
        );
        self.dispatch(registry, ctx, request)
    }

    /// Serve from cache or start the backend dial.
    fn dispatch(&mut self, registry: &Registry, ctx: &mut ProxyContext, request: HttpRequest) -> Result<Progress, ConnectionError> {
        if request.is_cacheable() {
            if let Some(cache) = ctx.cache.as_mut() {
                if let Some(payload) = cache.get(&request.path) {
                    metrics::record_cache_lookup(true);
                    tracing::info!(
                        connection_id = %self.id,
                        path = %request.path,
                        bytes = payload.len(),
                        "Serving response from cache"
                    );
                    self.outbound.extend_from_slice(payload);
                    self.forwarded = self.used;
                    self.backend_done = true;
                    self.request = Some(request);
                    self.state = ConnectionState::Relaying;
                    self.flush_to_client()?;
                    return Ok(Progress::Continue);
                }
                metrics::record_cache_lookup(false);
                self.capture = Some(Vec::new());
            }
        }

        let addr = ctx.router.select(&request.path)?.addr();
        let mut stream = TcpStream::connect(addr).map_err(|source| {
            metrics::record_backend_dial(false);
            ConnectionError::BackendConnect { addr, source }
        })?;
        registry
            .register(&mut stream, Side::Backend.token(self.id), Interest::WRITABLE)
            .map_err(ConnectionError::Register)?;

        tracing::debug!(connection_id = %self.id, backend = %addr, "Connecting to backend");
        self.backend = Some(BackendSocket {
            stream,
            addr,
            interest: Interest::WRITABLE,
        });
        self.request = Some(request);
        self.state = ConnectionState::ConnectingBackend;
        Ok(Progress::Continue)
    }

    fn finish_connect(&mut self) -> Result<Progress, ConnectionError> {
        if !self.backend_ready.writable {
            return Ok(Progress::Continue);
        }
        let backend = self.backend.as_mut().ok_or(ConnectionError::MissingBackend)?;
        let addr = backend.addr;
        let failed = |source| {
            metrics::record_backend_dial(false);
            ConnectionError::BackendConnect { addr, source }
        };

        if let Some(source) = backend.stream.take_error().map_err(failed)? {
            return Err(failed(source));
        }
        match backend.stream.peer_addr() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                self.backend_ready.writable = false;
                return Ok(Progress::Continue);
            }
            Err(e) => return Err(failed(e)),
        }

        metrics::record_backend_dial(true);
        tracing::info!(connection_id = %self.id, backend = %addr, "Backend connected");
        self.state = ConnectionState::Relaying;
        self.forward_request()?;
        Ok(Progress::Continue)
    }

    fn relay(&mut self, ctx: &mut ProxyContext) -> Result<Progress, ConnectionError> {
        if self.backend_ready.writable && self.request_pending() {
            self.forward_request()?;
        }
        if self.client_ready.writable && self.client_output_pending() {
            self.flush_to_client()?;
        }
        // Backpressure: nothing new is read until the client has taken the
        // previous chunk.
        if !self.backend_done && !self.client_output_pending() && self.backend_ready.readable {
            self.read_backend(ctx)?;
        }

        if self.backend_done && !self.client_output_pending() {
            self.store_response(ctx);
            return Ok(Progress::Done);
        }
        Ok(Progress::Continue)
    }

    fn forward_request(&mut self) -> Result<(), ConnectionError> {
        if !self.request_pending() {
            return Ok(());
        }
        let backend = self.backend.as_mut().ok_or(ConnectionError::MissingBackend)?;
        match backend.stream.write(&self.buffer[self.forwarded..self.used]) {
            Ok(0) => return Err(ConnectionError::Backend(io::ErrorKind::WriteZero.into())),
            Ok(n) => {
                self.forwarded += n;
                self.bytes_to_backend += n as u64;
            }
            Err(e) if would_block(&e) => self.backend_ready.writable = false,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ConnectionError::Backend(e)),
        }
        Ok(())
    }

    fn read_backend(&mut self, ctx: &ProxyContext) -> Result<(), ConnectionError> {
        let backend = self.backend.as_mut().ok_or(ConnectionError::MissingBackend)?;
        let addr = backend.addr;
        if self.chunk.len() != ctx.relay_chunk_size {
            self.chunk.resize(ctx.relay_chunk_size, 0);
        }

        match backend.stream.read(&mut self.chunk) {
            Ok(0) => {
                tracing::debug!(connection_id = %self.id, backend = %addr, "Backend finished response");
                self.backend_done = true;
            }
            Ok(n) => {
                self.outbound.extend_from_slice(&self.chunk[..n]);
                let keep = match self.capture.as_mut() {
                    Some(capture) if capture.len() + n <= ctx.max_object_bytes => {
                        capture.extend_from_slice(&self.chunk[..n]);
                        true
                    }
                    Some(_) => false,
                    None => true,
                };
                if !keep {
                    tracing::debug!(connection_id = %self.id, "Response too large to cache");
                    self.capture = None;
                }
                self.flush_to_client()?;
            }
            Err(e) if would_block(&e) => self.backend_ready.readable = false,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                // Deliver what already arrived, then close.
                tracing::warn!(connection_id = %self.id, backend = %addr, error = %e, "Backend read failed");
                self.backend_done = true;
                self.capture = None;
            }
        }
        Ok(())
    }

    fn flush_to_client(&mut self) -> Result<(), ConnectionError> {
        if self.outbound_offset < self.outbound.len() {
            match self.client.queue(&self.outbound[self.outbound_offset..]) {
                Ok(n) => {
                    self.outbound_offset += n;
                    self.bytes_to_client += n as u64;
                }
                Err(e) if would_block(&e) => self.client_ready.writable = false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ConnectionError::Client(e)),
            }
            if self.outbound_offset == self.outbound.len() {
                self.outbound.clear();
                self.outbound_offset = 0;
            }
        }

        if self.client.flush().map_err(ConnectionError::Client)? == FlushStatus::Blocked {
            self.client_ready.writable = false;
        }
        Ok(())
    }

    fn store_response(&mut self, ctx: &mut ProxyContext) {
        let (Some(capture), Some(request), Some(cache)) =
            (self.capture.take(), self.request.as_ref(), ctx.cache.as_mut())
        else {
            return;
        };
        if !is_ok_response(&capture) {
            tracing::debug!(connection_id = %self.id, path = %request.path, "Response not cacheable");
            return;
        }

        match cache.put(&request.path, &capture) {
            Ok(()) => tracing::info!(
                connection_id = %self.id,
                path = %request.path,
                bytes = capture.len(),
                "Response cached"
            ),
            Err(err) => tracing::warn!(
                connection_id = %self.id,
                path = %request.path,
                error = %err,
                "Response not cached"
            ),
        }
    }

    fn request_pending(&self) -> bool {
        self.forwarded < self.used
    }

    fn client_output_pending(&self) -> bool {
        self.outbound_offset < self.outbound.len() || self.client.has_pending_output()
    }

    fn wanted_client_interest(&self) -> Interest {
        if self.client_output_pending() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    fn wanted_backend_interest(&self) -> Interest {
        match self.state {
            ConnectionState::Relaying if self.request_pending() => Interest::READABLE | Interest::WRITABLE,
            ConnectionState::Relaying => Interest::READABLE,
            _ => Interest::WRITABLE,
        }
    }

    fn sync_interest(&mut self, registry: &Registry) -> Result<(), ConnectionError> {
        let wanted = self.wanted_client_interest();
        if wanted != self.client_interest {
            registry
                .reregister(self.client.source(), Side::Client.token(self.id), wanted)
                .map_err(ConnectionError::Register)?;
            self.client_interest = wanted;
        }

        let wanted = self.wanted_backend_interest();
        if let Some(backend) = self.backend.as_mut() {
            if wanted != backend.interest {
                registry
                    .reregister(&mut backend.stream, Side::Backend.token(self.id), wanted)
                    .map_err(ConnectionError::Register)?;
                backend.interest = wanted;
            }
        }
        Ok(())
    }
}

/// `HTTP/1.x 200` status line.
fn is_ok_response(response: &[u8]) -> bool {
    let Some(rest) = response.strip_prefix(b"HTTP/1.") else {
        return false;
    };
    rest.len() > 5
        && rest[0].is_ascii_digit()
        && &rest[1..5] == b" 200"
        && matches!(rest[5], b' ' | b'\r')
}
