//! Embedded SQS server lifecycle

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{handle_request, health_check};
use crate::limits::SqsLimits;
use crate::storage::{SqsError, SqsState};

const HEALTH_CHECK_ATTEMPTS: u32 = 30;
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Request body cap under strict limits; oversized messages inside it get
/// an SQS error rather than a bare 413
const STRICT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Health check failed after {0} attempts")]
    HealthCheckFailed(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server did not shut down cleanly: {0}")]
    Shutdown(String),

    #[error(transparent)]
    Sqs(#[from] SqsError),
}

/// Build the SQS router for the given state.
///
/// Relaxed limits lift the request body cap along with the message size
/// check.
pub fn router(state: Arc<SqsState>) -> Router {
    let body_limit = if state.storage.limits().is_strict() {
        DefaultBodyLimit::max(STRICT_BODY_LIMIT)
    } else {
        DefaultBodyLimit::disable()
    };

    Router::new()
        .route("/", post(handle_request))
        .route("/health", get(health_check))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builder for an in-process SQS server
#[derive(Debug, Clone)]
pub struct EmbeddedSqsServer {
    host: IpAddr,
    port: u16,
    limits: SqsLimits,
    queues: Vec<String>,
}

impl Default for EmbeddedSqsServer {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            limits: SqsLimits::default(),
            queues: Vec::new(),
        }
    }
}

impl EmbeddedSqsServer {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Port to bind; zero picks an ephemeral port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn limits(mut self, limits: SqsLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Queue to create before the server accepts requests
    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.queues.push(name.into());
        self
    }

    /// Bind, spawn the serving task and wait until `/health` answers.
    pub async fn start(self) -> Result<RunningSqsServer, ServerError> {
        let addr = SocketAddr::new(self.host, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let port = local_addr.port();

        let state = Arc::new(SqsState::new(
            format!("http://localhost:{port}"),
            self.limits,
        ));
        for name in &self.queues {
            state
                .storage
                .create_queue(name, &std::collections::HashMap::new())?;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::clone(&state));
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "SQS server exited with error");
            }
        });

        let server = RunningSqsServer {
            port,
            state,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };
        wait_for_ready(local_addr).await?;

        info!(port, limits = %self.limits, "Embedded SQS server started");
        Ok(server)
    }
}

async fn wait_for_ready(addr: SocketAddr) -> Result<(), ServerError> {
    let probe_ip = if addr.ip().is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        addr.ip()
    };
    let url = format!("http://{}/health", SocketAddr::new(probe_ip, addr.port()));
    let client = reqwest::Client::new();

    for attempt in 1..=HEALTH_CHECK_ATTEMPTS {
        if let Ok(response) = client.get(&url).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }

        if attempt % 10 == 0 {
            warn!(attempt, "Still waiting for embedded SQS server to start");
        }
        sleep(HEALTH_CHECK_INTERVAL).await;
    }

    Err(ServerError::HealthCheckFailed(HEALTH_CHECK_ATTEMPTS))
}

/// Handle to a started server; dropping it aborts the serving task
pub struct RunningSqsServer {
    port: u16,
    state: Arc<SqsState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RunningSqsServer {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn state(&self) -> &Arc<SqsState> {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop accepting connections and wait for the serving task to exit.
    ///
    /// Calling it again after the server has stopped is a no-op.
    pub async fn stop_and_wait(&mut self) -> Result<(), ServerError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        match timeout(SHUTDOWN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {
                info!(port = self.port, "Embedded SQS server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::Shutdown(e.to_string())),
            Err(_) => {
                warn!(port = self.port, "Graceful shutdown timed out, aborting");
                task.abort();
                Err(ServerError::Shutdown(format!(
                    "timed out after {}s",
                    SHUTDOWN_TIMEOUT.as_secs()
                )))
            }
        }
    }
}

impl Drop for RunningSqsServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RunningSqsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningSqsServer")
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
