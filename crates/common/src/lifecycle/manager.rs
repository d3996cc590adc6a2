//! Lifecycle contract for long-lived services
//!
//! Services are constructed explicitly, started with `initialize`, and torn
//! down with `shutdown`. Status moves through
//! `Created → Initializing → Running → ShuttingDown → Shutdown`, or to
//! `Error` when initialization fails outright.

use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

/// Standard lifecycle trait for services with startup and teardown work
#[async_trait::async_trait]
pub trait Lifecycle: Send + Sync {
    /// Error type for this service
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stable name used in logs and health reports
    fn name(&self) -> &'static str;

    /// Acquire resources and start background work. Calling it again on a
    /// running service is a no-op.
    async fn initialize(&self) -> Result<(), Self::Error>;

    /// Release resources and stop background work
    async fn shutdown(&self) -> Result<(), Self::Error>;

    /// Report current health
    async fn health_check(&self) -> ManagerHealth;

    /// Current lifecycle status
    fn status(&self) -> ManagerStatus;
}

/// Service lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStatus {
    /// Created but not initialized
    Created,
    /// Initialization in progress
    Initializing,
    /// Running and operational
    Running,
    /// Shutdown in progress
    ShuttingDown,
    /// Shut down
    Shutdown,
    /// Initialization failed
    Error,
}

impl ManagerStatus {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl std::fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "Shutting Down"),
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Status holder shared by a service's methods.
#[derive(Debug)]
pub struct StatusCell {
    inner: RwLock<ManagerStatus>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self { inner: RwLock::new(ManagerStatus::Created) }
    }
}

impl StatusCell {
    pub fn get(&self) -> ManagerStatus {
        *self.inner.read()
    }

    pub fn set(&self, status: ManagerStatus) {
        *self.inner.write() = status;
    }

    /// Moves to `next` only if the current status is one of `from`.
    /// Returns whether the transition happened.
    pub fn transition(&self, from: &[ManagerStatus], next: ManagerStatus) -> bool {
        let mut guard = self.inner.write();
        if from.contains(&*guard) {
            *guard = next;
            true
        } else {
            false
        }
    }
}

/// Service health status
#[derive(Debug, Clone, Serialize)]
pub struct ManagerHealth {
    /// Overall health status
    pub is_healthy: bool,
    /// Health score from 0.0 (unhealthy) to 1.0 (perfectly healthy)
    pub score: f64,
    /// Optional health message
    pub message: Option<String>,
    /// Individual component health checks
    pub components: Vec<ComponentHealth>,
    /// Timestamp of health check
    pub timestamp: SystemTime,
}

impl ManagerHealth {
    /// Create a healthy status
    pub fn healthy() -> Self {
        Self {
            is_healthy: true,
            score: 1.0,
            message: None,
            components: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Create an unhealthy status with a message
    pub fn unhealthy<S: Into<String>>(message: S) -> Self {
        Self {
            is_healthy: false,
            score: 0.0,
            message: Some(message.into()),
            components: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Create a degraded status with a score
    pub fn degraded<S: Into<String>>(score: f64, message: S) -> Self {
        Self {
            is_healthy: score > 0.5,
            score: score.clamp(0.0, 1.0),
            message: Some(message.into()),
            components: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Add a component health check
    pub fn with_component(mut self, component: ComponentHealth) -> Self {
        self.components.push(component);
        self
    }

    /// Looks up a component by name.
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|component| component.name == name)
    }
}

/// Individual component health within a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub is_healthy: bool,
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), is_healthy: true, message: None }
    }

    pub fn unhealthy<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self { name: name.into(), is_healthy: false, message: Some(message.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `StatusCell::transition` for the guarded transition scenario.
    ///
    /// Assertions:
    /// - Confirms a transition from an allowed status succeeds.
    /// - Confirms a transition from a disallowed status is refused.
    #[test]
    fn test_status_cell_transition() {
        let cell = StatusCell::default();
        assert_eq!(cell.get(), ManagerStatus::Created);

        assert!(cell.transition(&[ManagerStatus::Created], ManagerStatus::Initializing));
        assert!(!cell.transition(&[ManagerStatus::Created], ManagerStatus::Running));
        assert_eq!(cell.get(), ManagerStatus::Initializing);
    }

    /// Validates `ManagerHealth::degraded` for the score clamping scenario.
    ///
    /// Assertions:
    /// - Confirms scores are clamped into `0.0..=1.0`.
    /// - Confirms a component can be found by name.
    #[test]
    fn test_manager_health_degraded() {
        let health = ManagerHealth::degraded(1.7, "memory only")
            .with_component(ComponentHealth::unhealthy("persistent_tier", "store offline"));

        assert!(health.is_healthy);
        assert_eq!(health.score, 1.0);
        assert_eq!(health.component("persistent_tier").map(|c| c.is_healthy), Some(false));
        assert!(!ManagerHealth::degraded(0.2, "bad").is_healthy);
    }

    /// Validates `ManagerStatus` display strings.
    #[test]
    fn test_manager_status_display() {
        assert_eq!(ManagerStatus::ShuttingDown.to_string(), "Shutting Down");
        assert!(ManagerStatus::Running.is_running());
    }
}
