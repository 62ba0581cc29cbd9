//! Test fixture for span pipelines reading from SQS
//!
//! Provides an [`SqsRule`] that:
//! - starts an embedded SQS server on a chosen port
//! - creates the `zipkin` queue and purges it before each test
//! - drains and decodes span messages (JSON or proto3, raw or base64)
//! - stops the server after the tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zipstack_test::{free_port, SqsRule};
//!
//! #[tokio::test]
//! async fn test_collector() {
//!     let mut rule = SqsRule::new();
//!     rule.start(free_port().unwrap()).await.unwrap();
//!     rule.before().await.unwrap();
//!
//!     rule.send(r#"[{"traceId":"1","id":"2"}]"#).await.unwrap();
//!     let spans = rule.get_spans(false).await.unwrap();
//!     assert_eq!(spans.len(), 1);
//!
//!     rule.after().await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod launcher;
pub mod lifecycle;
pub mod rule;

pub use config::{DeleteTiming, RuleConfig};
pub use error::FixtureError;
pub use launcher::{EmbeddedSqsLauncher, QueueServerHandle, QueueServerLauncher};
pub use lifecycle::TestLifecycle;
pub use rule::SqsRule;

/// Pick a free local port for a fixture
pub fn free_port() -> Result<u16, FixtureError> {
    portpicker::pick_unused_port().ok_or(FixtureError::NoPortAvailable)
}

/// Install a fmt subscriber honouring `RUST_LOG`; later calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zipstack=debug,zipstack_sqs=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
