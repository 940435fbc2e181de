//! Startup orchestration and worker supervision.
//!
//! # Responsibilities
//! - Load TLS material, build the backend table, bind the listener
//! - Spawn the configured number of worker threads
//! - Trigger shutdown and join the workers
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing is left running
//! - Subsystems initialize in order; the listener is bound last, right
//!   before the workers start accepting
//! - Worker failures after startup are logged, never escalated

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::config::ProxyConfig;
use crate::lifecycle::ShutdownToken;
use crate::net::{load_tls_config, ListenerError, SharedListener, TlsError};
use crate::routing::{BackendRouter, RouterError};
use crate::worker::{ProxyContext, Worker, WorkerSettings};

/// Fatal errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to start worker {index}: {source}")]
    Worker {
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// Owns the worker threads for the lifetime of the proxy.
#[derive(Debug)]
pub struct Supervisor {
    workers: Vec<JoinHandle<io::Result<()>>>,
    shutdown: ShutdownToken,
    local_addr: SocketAddr,
}

impl Supervisor {
    /// Bring the proxy up according to `config`.
    pub fn start(config: &ProxyConfig) -> Result<Self, StartupError> {
        let tls = match &config.listener.tls {
            Some(tls) => Some(load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))?),
            None => None,
        };

        let router = BackendRouter::from_config(&config.backends)?;
        if router.is_empty() {
            tracing::warn!("No backends configured; every request will be refused");
        }

        let addr: SocketAddr = config
            .listener
            .bind_address
            .parse()
            .map_err(|_| StartupError::BindAddress(config.listener.bind_address.clone()))?;
        let listener = SharedListener::bind(addr, config.listener.backlog)?;

        let settings = WorkerSettings {
            max_events: config.workers.max_events,
            connection_timeout: Duration::from_secs(config.connection.timeout_secs),
        };
        let shutdown = ShutdownToken::new();
        let mut supervisor = Self {
            workers: Vec::with_capacity(config.workers.count),
            shutdown: shutdown.clone(),
            local_addr: listener.local_addr(),
        };

        for index in 0..config.workers.count {
            let spawned = listener.worker_handle().map_err(StartupError::from).and_then(|handle| {
                let ctx = ProxyContext::new(router.clone(), config);
                let worker = Worker::new(index, handle, tls.clone(), ctx, settings, shutdown.clone())
                    .map_err(|source| StartupError::Worker { index, source })?;
                thread::Builder::new()
                    .name(format!("proxy-worker-{index}"))
                    .spawn(move || worker.run())
                    .map_err(|source| StartupError::Worker { index, source })
            });

            match spawned {
                Ok(handle) => supervisor.workers.push(handle),
                Err(err) => {
                    // Stop whatever already started before reporting.
                    supervisor.shutdown();
                    supervisor.join();
                    return Err(err);
                }
            }
        }

        tracing::info!(
            address = %supervisor.local_addr,
            workers = supervisor.workers.len(),
            tls = tls.is_some(),
            backends = router.len(),
            "Proxy started"
        );
        Ok(supervisor)
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that can trigger shutdown from elsewhere, e.g. a signal task.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Ask every worker to stop.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for every worker to exit. Returns how many ended with an error.
    pub fn join(self) -> usize {
        let mut failed = 0;
        for (index, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::error!(worker = index, error = %e, "Worker failed");
                }
                Err(_) => {
                    failed += 1;
                    tracing::error!(worker = index, "Worker panicked");
                }
            }
        }
        tracing::info!(failed, "All workers stopped");
        failed
    }
}
