//! SQS fixture for span pipeline tests

use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::{Credentials, Region};
use aws_sdk_sqs::types::{Message, QueueAttributeName};
use aws_sdk_sqs::Client;
use tracing::{debug, info};
use zipstack_span::{decode_message_body, Span};

use crate::config::{DeleteTiming, RuleConfig};
use crate::error::FixtureError;
use crate::launcher::{EmbeddedSqsLauncher, QueueServerHandle, QueueServerLauncher};

const VISIBLE_COUNT: &str = "ApproximateNumberOfMessages";
const NOT_VISIBLE_COUNT: &str = "ApproximateNumberOfMessagesNotVisible";

enum ServerSlot<H> {
    Idle,
    Running(H),
    Stopped,
}

/// Client and queue created by `start`; present together or not at all
struct QueueConnection {
    client: Client,
    queue_url: String,
}

impl QueueConnection {
    async fn receive(&self) -> Result<Vec<Message>, FixtureError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        Ok(output.messages.unwrap_or_default())
    }

    async fn delete_all(&self, batch: &[Message]) -> Result<(), FixtureError> {
        for receipt_handle in batch.iter().filter_map(Message::receipt_handle) {
            self.client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(receipt_handle)
                .send()
                .await
                .map_err(aws_sdk_sqs::Error::from)?;
        }
        Ok(())
    }
}

/// Runs a queue server for a group of tests and reads spans off its queue.
///
/// `start` launches the server and creates the queue, `before` purges it
/// between tests and `after` stops the server. Queries, drains and sends
/// fail with [`FixtureError::NotStarted`] until `start` has run.
pub struct SqsRule<L: QueueServerLauncher = EmbeddedSqsLauncher> {
    config: RuleConfig,
    launcher: L,
    server: ServerSlot<L::Handle>,
    connection: Option<QueueConnection>,
}

impl SqsRule<EmbeddedSqsLauncher> {
    pub fn new() -> Self {
        Self::with_config(RuleConfig::default())
    }

    pub fn with_config(config: RuleConfig) -> Self {
        Self::with_launcher(EmbeddedSqsLauncher, config)
    }
}

impl Default for SqsRule<EmbeddedSqsLauncher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: QueueServerLauncher> SqsRule<L> {
    pub fn with_launcher(launcher: L, config: RuleConfig) -> Self {
        Self {
            config,
            launcher,
            server: ServerSlot::Idle,
            connection: None,
        }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Launch the server on `port` and create the queue.
    ///
    /// Calling it again reuses the running server and the existing queue.
    pub async fn start(&mut self, port: u16) -> Result<&mut Self, FixtureError> {
        match self.server {
            ServerSlot::Stopped => return Err(FixtureError::Stopped),
            ServerSlot::Running(_) => {}
            ServerSlot::Idle => {
                info!(port, limits = %self.config.limits, "Starting SQS server");
                let handle = self.launcher.launch(port, self.config.limits).await?;
                self.server = ServerSlot::Running(handle);
            }
        }

        if self.connection.is_none() {
            let port = match &self.server {
                ServerSlot::Running(handle) => handle.port(),
                _ => port,
            };
            let client = self.connect(port).await;

            let output = client
                .create_queue()
                .queue_name(&self.config.queue_name)
                .send()
                .await
                .map_err(aws_sdk_sqs::Error::from)?;
            let queue_url = output
                .queue_url()
                .ok_or(FixtureError::MissingQueueUrl)?
                .to_string();

            info!(queue_url = %queue_url, "Created queue");
            self.connection = Some(QueueConnection { client, queue_url });
        }

        Ok(self)
    }

    async fn connect(&self, port: u16) -> Client {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(format!("http://localhost:{port}"))
            .credentials_provider(Credentials::new(
                &self.config.access_key_id,
                &self.config.secret_access_key,
                None,
                None,
                "zipstack-test",
            ))
            .region(Region::new(self.config.region.clone()))
            .load()
            .await;

        Client::new(&config)
    }

    /// URL of the queue created by `start`
    pub fn queue_url(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.queue_url.as_str())
    }

    pub fn client(&self) -> Option<&Client> {
        self.connection.as_ref().map(|c| &c.client)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.server, ServerSlot::Running(_))
    }

    fn connection(&self) -> Result<&QueueConnection, FixtureError> {
        if matches!(self.server, ServerSlot::Stopped) {
            return Err(FixtureError::Stopped);
        }
        self.connection.as_ref().ok_or(FixtureError::NotStarted)
    }

    /// Purge the queue. Does nothing before `start`.
    pub async fn before(&mut self) -> Result<(), FixtureError> {
        let conn = match self.connection() {
            Ok(conn) => conn,
            Err(FixtureError::NotStarted) => return Ok(()),
            Err(e) => return Err(e),
        };

        conn.client
            .purge_queue()
            .queue_url(&conn.queue_url)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        debug!(queue_url = %conn.queue_url, "Purged queue");
        Ok(())
    }

    /// Stop the server and wait for it to exit. Does nothing before `start`.
    pub async fn after(&mut self) -> Result<(), FixtureError> {
        match std::mem::replace(&mut self.server, ServerSlot::Stopped) {
            ServerSlot::Running(mut handle) => {
                info!(port = handle.port(), "Stopping SQS server");
                handle.stop_and_wait().await?;
            }
            other => self.server = other,
        }
        Ok(())
    }

    /// `ApproximateNumberOfMessages` of the queue
    pub async fn queue_count(&self) -> Result<u32, FixtureError> {
        self.queue_attribute(VISIBLE_COUNT).await
    }

    /// `ApproximateNumberOfMessagesNotVisible` of the queue
    pub async fn not_visible_count(&self) -> Result<u32, FixtureError> {
        self.queue_attribute(NOT_VISIBLE_COUNT).await
    }

    async fn queue_attribute(&self, name: &'static str) -> Result<u32, FixtureError> {
        let conn = self.connection()?;
        let attribute = QueueAttributeName::from(name);

        let output = conn
            .client
            .get_queue_attributes()
            .queue_url(&conn.queue_url)
            .attribute_names(attribute.clone())
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        let value = output
            .attributes()
            .and_then(|attributes| attributes.get(&attribute))
            .ok_or(FixtureError::MissingAttribute(name))?;

        value.parse().map_err(|_| FixtureError::InvalidAttribute {
            name,
            value: value.clone(),
        })
    }

    /// Receive until the queue yields an empty batch and decode every body.
    ///
    /// Spans come back in batch order, then message order within a batch.
    /// With `delete` and [`DeleteTiming::Deferred`], deletion trails one
    /// batch behind: each batch fetched after a decoded one is deleted, so
    /// the first batch is left in flight. [`DeleteTiming::Immediate`]
    /// deletes each batch once it is decoded.
    pub async fn get_spans(&self, delete: bool) -> Result<Vec<Span>, FixtureError> {
        let conn = self.connection()?;
        let timing = self.config.delete_timing;

        let mut spans = Vec::new();
        let mut batch = conn.receive().await?;
        while !batch.is_empty() {
            for message in &batch {
                spans.extend(decode_message_body(message.body().unwrap_or_default())?);
            }

            if delete && timing == DeleteTiming::Immediate {
                conn.delete_all(&batch).await?;
            }

            batch = conn.receive().await?;

            if delete && timing == DeleteTiming::Deferred {
                conn.delete_all(&batch).await?;
            }
        }

        debug!(count = spans.len(), delete, "Drained spans");
        Ok(spans)
    }

    /// Send one message with `body` as-is
    pub async fn send(&self, body: impl Into<String>) -> Result<(), FixtureError> {
        let conn = self.connection()?;

        conn.client
            .send_message()
            .queue_url(&conn.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;
        Ok(())
    }
}
