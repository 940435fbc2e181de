//! Shared listening socket.
//!
//! # Responsibilities
//! - Bind to the configured address with an explicit backlog
//! - Hand each worker its own readiness-capable handle to the same socket
//!
//! # Design Decisions
//! - One socket, many handles: the kernel distributes connections across
//!   workers, no application-level coordination
//! - Non-blocking from the start; accept readiness is edge-driven per worker

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to create, configure or bind the socket.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Failed to duplicate the socket handle for a worker.
    #[error("Failed to clone listener: {0}")]
    Clone(#[source] std::io::Error),
}

/// A bound, listening TCP socket shared by all workers.
#[derive(Debug)]
pub struct SharedListener {
    inner: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl SharedListener {
    /// Bind and listen on `addr` with the given backlog.
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket
            .listen(i32::try_from(backlog).unwrap_or(i32::MAX))
            .map_err(bind_err)?;

        let inner: std::net::TcpListener = socket.into();
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(address = %local_addr, backlog, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A new handle to the same socket, ready to register with a worker's
    /// multiplexer.
    pub fn worker_handle(&self) -> Result<mio::net::TcpListener, ListenerError> {
        let listener = self.inner.try_clone().map_err(ListenerError::Clone)?;
        Ok(mio::net::TcpListener::from_std(listener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binds_ephemeral_port() {
        let listener = SharedListener::bind("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.worker_handle().is_ok());
    }

    #[test]
    fn test_second_bind_on_same_port_fails() {
        let first = SharedListener::bind("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let err = SharedListener::bind(first.local_addr(), 16).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }
}
