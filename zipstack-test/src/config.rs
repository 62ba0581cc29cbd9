//! Fixture configuration

use serde::Deserialize;
use zipstack_sqs::SqsLimits;

use crate::error::FixtureError;

const ENV_PREFIX: &str = "ZIPSTACK_TEST";

/// When `get_spans(true)` deletes what it has drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteTiming {
    /// Delete the batch fetched after each decoded batch. The first batch
    /// is never deleted and stays in flight until its visibility timeout.
    #[default]
    Deferred,
    /// Delete each batch right after decoding it.
    Immediate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    #[serde(default)]
    pub limits: SqsLimits,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_credential")]
    pub access_key_id: String,

    #[serde(default = "default_credential")]
    pub secret_access_key: String,

    #[serde(default)]
    pub delete_timing: DeleteTiming,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            limits: SqsLimits::default(),
            region: default_region(),
            access_key_id: default_credential(),
            secret_access_key: default_credential(),
            delete_timing: DeleteTiming::default(),
        }
    }
}

fn default_queue_name() -> String {
    "zipkin".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_credential() -> String {
    "x".to_string()
}

impl RuleConfig {
    /// Load configuration from an optional `zipstack-test` file and
    /// `ZIPSTACK_TEST_*` environment variables
    pub fn load() -> Result<Self, FixtureError> {
        Self::load_with(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(environment: config::Environment) -> Result<Self, FixtureError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("zipstack-test").required(false))
            .add_source(environment)
            .build()?;

        Ok(config.try_deserialize::<RuleConfig>()?)
    }

    pub fn with_delete_timing(mut self, delete_timing: DeleteTiming) -> Self {
        self.delete_timing = delete_timing;
        self
    }

    pub fn with_queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }
}
