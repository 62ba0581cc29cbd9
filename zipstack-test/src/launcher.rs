//! Queue server launchers

use async_trait::async_trait;
use zipstack_sqs::{EmbeddedSqsServer, RunningSqsServer, ServerError, SqsLimits};

/// Starts a queue server for a fixture
#[async_trait]
pub trait QueueServerLauncher: Send + Sync {
    type Handle: QueueServerHandle;

    /// Start a server bound to `port` and wait until it accepts requests.
    async fn launch(&self, port: u16, limits: SqsLimits) -> Result<Self::Handle, ServerError>;
}

/// A server started by a [`QueueServerLauncher`]
#[async_trait]
pub trait QueueServerHandle: Send + Sync {
    fn port(&self) -> u16;

    async fn stop_and_wait(&mut self) -> Result<(), ServerError>;
}

/// Launches the in-process server from `zipstack-sqs` on loopback
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedSqsLauncher;

#[async_trait]
impl QueueServerLauncher for EmbeddedSqsLauncher {
    type Handle = RunningSqsServer;

    async fn launch(&self, port: u16, limits: SqsLimits) -> Result<Self::Handle, ServerError> {
        EmbeddedSqsServer::builder()
            .port(port)
            .limits(limits)
            .start()
            .await
    }
}

#[async_trait]
impl QueueServerHandle for RunningSqsServer {
    fn port(&self) -> u16 {
        RunningSqsServer::port(self)
    }

    async fn stop_and_wait(&mut self) -> Result<(), ServerError> {
        RunningSqsServer::stop_and_wait(self).await
    }
}
