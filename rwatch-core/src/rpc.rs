//! Ethereum JSON-RPC implementation of the connection seams, over alloy.

use crate::connection::{ChainConnection, ConnectError, Dialer};
use crate::endpoint::Endpoint;
use crate::events::ChainLog;
use crate::subscription::{LogFeed, LogFilter, SubscribeError, forward_stream, log_feed};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

/// Dials endpoints with the transport implied by their scheme
/// (`ws`/`wss` for subscriptions, `http`/`https` for probing only).
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcDialer;

#[async_trait]
impl Dialer for RpcDialer {
    type Connection = RpcConnection;

    async fn dial(&self, endpoint: &Endpoint) -> Result<RpcConnection, ConnectError> {
        let provider = ProviderBuilder::new()
            .connect(endpoint.as_str())
            .await
            .map_err(|e| ConnectError::Dial(redact(&e.to_string(), endpoint)))?;
        Ok(RpcConnection {
            provider: provider.erased(),
            endpoint: endpoint.clone(),
        })
    }
}

/// A live provider for one endpoint.
pub struct RpcConnection {
    provider: DynProvider,
    endpoint: Endpoint,
}

#[async_trait]
impl ChainConnection for RpcConnection {
    async fn block_number(&self) -> Result<u64, ConnectError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ConnectError::Probe(redact(&e.to_string(), &self.endpoint)))
    }

    async fn subscribe(&self, filter: &LogFilter) -> Result<LogFeed, SubscribeError> {
        let subscription = self
            .provider
            .subscribe_logs(&filter.to_rpc_filter())
            .await
            .map_err(|e| SubscribeError::Rpc(redact(&e.to_string(), &self.endpoint)))?;

        let stream = Box::pin(subscription.into_stream().map(ChainLog::from));
        let (sender, feed) = log_feed();
        let task = tokio::spawn(forward_stream(sender, stream, filter.feed));
        Ok(feed.with_task(task))
    }

    async fn close(self) {
        debug!(endpoint = %self.endpoint, "Closing RPC connection");
        drop(self.provider);
    }
}

/// Transport errors may echo the URL they failed on; keep only the mask.
fn redact(message: &str, endpoint: &Endpoint) -> String {
    message.replace(endpoint.as_str(), &endpoint.masked())
}
