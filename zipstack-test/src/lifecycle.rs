//! Test lifecycle hooks

use async_trait::async_trait;

use crate::error::FixtureError;
use crate::launcher::QueueServerLauncher;
use crate::rule::SqsRule;

/// Hooks a test harness drives around a group of tests
#[async_trait]
pub trait TestLifecycle: Send {
    /// Set up shared resources; repeated calls reuse them.
    async fn start(&mut self, port: u16) -> Result<(), FixtureError>;

    /// Reset shared resources before each test.
    async fn before_each(&mut self) -> Result<(), FixtureError>;

    /// Release shared resources once all tests have run.
    async fn after_all(&mut self) -> Result<(), FixtureError>;
}

#[async_trait]
impl<L> TestLifecycle for SqsRule<L>
where
    L: QueueServerLauncher,
{
    async fn start(&mut self, port: u16) -> Result<(), FixtureError> {
        SqsRule::start(self, port).await.map(|_| ())
    }

    async fn before_each(&mut self) -> Result<(), FixtureError> {
        self.before().await
    }

    async fn after_all(&mut self) -> Result<(), FixtureError> {
        self.after().await
    }
}
