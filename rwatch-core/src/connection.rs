//! Endpoint failover and the give-up timer.
//!
//! The [`ConnectionManager`] walks an ordered list of endpoints and returns
//! the first one that both dials and answers a liveness probe within the
//! per-attempt timeout. The [`RetryWindow`] measures how long the watcher
//! has been unable to get a live connection.

use crate::endpoint::Endpoint;
use crate::subscription::{LogFeed, LogFilter, SubscribeError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors that can occur while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The transport could not be opened
    #[error("dial failed: {0}")]
    Dial(String),

    /// The endpoint accepted the connection but did not answer the probe
    #[error("liveness probe failed: {0}")]
    Probe(String),

    /// Dial or probe did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Every endpoint in the list failed
    #[error("all {attempted} RPC endpoint(s) failed")]
    AllFailed { attempted: usize },
}

/// An open session to one endpoint.
#[async_trait]
pub trait ChainConnection: Send + Sync + Sized {
    /// Current block height, used as the liveness probe.
    async fn block_number(&self) -> Result<u64, ConnectError>;

    /// Open a live log feed matching `filter`.
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogFeed, SubscribeError>;

    /// Close the session.
    async fn close(self);
}

/// Opens connections to endpoints.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Connection: ChainConnection;

    async fn dial(&self, endpoint: &Endpoint) -> Result<Self::Connection, ConnectError>;
}

/// Default bound on dial + probe for a single endpoint.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Picks the first healthy endpoint from an ordered list.
pub struct ConnectionManager<D> {
    dialer: D,
    endpoints: Vec<Endpoint>,
    attempt_timeout: Duration,
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(dialer: D, endpoints: Vec<Endpoint>, attempt_timeout: Duration) -> Self {
        Self {
            dialer,
            endpoints,
            attempt_timeout,
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Try each endpoint in order; return the first live connection.
    ///
    /// Connections that dial but fail the probe are closed before moving on.
    /// The caller owns backoff and retry.
    pub async fn connect(&self) -> Result<(D::Connection, Endpoint), ConnectError> {
        for endpoint in &self.endpoints {
            match self.try_endpoint(endpoint).await {
                Ok(connection) => {
                    info!(endpoint = %endpoint, "Connected to RPC");
                    return Ok((connection, endpoint.clone()));
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "RPC endpoint unavailable");
                }
            }
        }
        Err(ConnectError::AllFailed {
            attempted: self.endpoints.len(),
        })
    }

    async fn try_endpoint(&self, endpoint: &Endpoint) -> Result<D::Connection, ConnectError> {
        let deadline = Instant::now() + self.attempt_timeout;

        let connection = tokio::time::timeout_at(deadline, self.dialer.dial(endpoint))
            .await
            .map_err(|_| ConnectError::Timeout(self.attempt_timeout))??;

        let probe = tokio::time::timeout_at(deadline, connection.block_number()).await;
        match probe {
            Ok(Ok(block)) => {
                debug!(endpoint = %endpoint, block, "Liveness probe succeeded");
                Ok(connection)
            }
            Ok(Err(e)) => {
                connection.close().await;
                Err(e)
            }
            Err(_) => {
                connection.close().await;
                Err(ConnectError::Timeout(self.attempt_timeout))
            }
        }
    }
}

/// Tracks continuous connection failure against a maximum window.
#[derive(Debug, Clone, Copy)]
pub struct RetryWindow {
    started: Instant,
    max: Duration,
}

impl RetryWindow {
    /// A zero `max` disables giving up.
    pub fn new(max: Duration) -> Self {
        Self {
            started: Instant::now(),
            max,
        }
    }

    /// Restart the window; called whenever the watcher was last known healthy.
    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Time since the last reset has exceeded the configured maximum.
    pub fn is_exhausted(&self) -> bool {
        !self.max.is_zero() && self.elapsed() > self.max
    }
}
