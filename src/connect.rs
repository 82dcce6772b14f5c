//! Simulated database connections.
//!
//! Nothing is contacted: a connection attempt waits for a fixed delay and then succeeds with a
//! configured probability. The wait can be cancelled through a [`CancelToken`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, DatabaseKind};
use crate::domain::{DashConfig, DashError};

#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        CancelToken {
            state: Arc::new(state),
        }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once `cancel` was called on any clone of this token.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRequest {
    pub name: String,
    pub kind: DatabaseKind,
    pub url: String,
}

impl ConnectionRequest {
    pub fn validate(&self) -> Result<(), DashError> {
        if self.name.trim().is_empty() || self.url.trim().is_empty() {
            return Err(DashError::MissingFields);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionSettings {
    pub delay: Duration,
    pub success_rate: f64,
}

impl From<&DashConfig> for ConnectionSettings {
    fn from(cfg: &DashConfig) -> Self {
        ConnectionSettings {
            delay: Duration::from_millis(cfg.connect_delay_ms),
            success_rate: cfg.connect_success_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Success,
    Failed,
}

/// Waits for `delay` unless the token is cancelled first.
pub async fn simulate_latency(delay: Duration, cancel: &CancelToken) -> Result<(), DashError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DashError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

pub async fn test_connection(
    request: &ConnectionRequest,
    settings: ConnectionSettings,
    cancel: &CancelToken,
) -> Result<ConnectionStatus, DashError> {
    request.validate()?;
    debug!(
        "Testing {} connection \"{}\" ({}ms)",
        request.kind,
        request.name,
        settings.delay.as_millis()
    );
    simulate_latency(settings.delay, cancel).await?;

    let success = rand::rng().random_bool(settings.success_rate.clamp(0.0, 1.0));
    if success {
        info!("Connected to {} database \"{}\"", request.kind, request.name);
        Ok(ConnectionStatus::Success)
    } else {
        warn!("Connection to \"{}\" failed", request.name);
        Ok(ConnectionStatus::Failed)
    }
}

/// Tests the connection and registers it as a project on success. Returns the project id.
pub async fn connect(
    catalog: &mut Catalog,
    request: &ConnectionRequest,
    settings: ConnectionSettings,
    cancel: &CancelToken,
) -> Result<Option<String>, DashError> {
    match test_connection(request, settings, cancel).await? {
        ConnectionStatus::Success => {
            let project = catalog.add_project(request.name.trim(), request.kind);
            Ok(Some(project.id.clone()))
        }
        ConnectionStatus::Failed => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConnectionRequest {
        ConnectionRequest {
            name: "Staging".to_string(),
            kind: DatabaseKind::Neondb,
            url: DatabaseKind::Neondb.example_url().to_string(),
        }
    }

    fn settings(success_rate: f64) -> ConnectionSettings {
        ConnectionSettings {
            delay: Duration::from_millis(1),
            success_rate,
        }
    }

    #[tokio::test]
    async fn missing_fields_fail_before_waiting() {
        let mut req = request();
        req.url = "  ".to_string();
        let result = test_connection(&req, settings(1.0), &CancelToken::new()).await;
        assert!(matches!(result, Err(DashError::MissingFields)));
    }

    #[tokio::test]
    async fn outcome_follows_success_rate() {
        let token = CancelToken::new();
        assert_eq!(
            test_connection(&request(), settings(1.0), &token).await.unwrap(),
            ConnectionStatus::Success
        );
        assert_eq!(
            test_connection(&request(), settings(0.0), &token).await.unwrap(),
            ConnectionStatus::Failed
        );
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let token = CancelToken::new();
        let slow = ConnectionSettings {
            delay: Duration::from_secs(60),
            success_rate: 1.0,
        };
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            canceller.cancel();
        });
        let result = test_connection(&request(), slow, &token).await;
        assert!(matches!(result, Err(DashError::Cancelled)));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn successful_connect_adds_project() {
        let mut catalog = Catalog::new();
        let id = connect(&mut catalog, &request(), settings(1.0), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("1"));
        assert_eq!(catalog.projects()[0].kind, DatabaseKind::Neondb);
    }
}
