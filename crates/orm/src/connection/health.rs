//! Connection Health Reporting
//!
//! Per-connection results of a registry-wide health check.

use std::time::Duration;

use crate::backends::DriverKind;
use crate::error::OrmError;

/// Responses slower than this are reported as a warning
pub const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_millis(1000);

/// Health of one named connection
#[derive(Debug, Clone)]
pub struct ConnectionHealthReport {
    pub connection: String,
    pub driver: DriverKind,
    pub status: HealthStatus,
}

impl ConnectionHealthReport {
    pub(crate) fn from_check(
        connection: &str,
        driver: DriverKind,
        result: Result<Duration, OrmError>,
    ) -> Self {
        let status = match result {
            Ok(elapsed) if elapsed >= SLOW_RESPONSE_THRESHOLD => HealthStatus::Warning {
                reason: format!("Slow response: {:?}", elapsed),
                response_time: elapsed,
            },
            Ok(elapsed) => HealthStatus::Healthy {
                response_time: elapsed,
            },
            Err(err) => HealthStatus::Unhealthy {
                reason: err.to_string(),
            },
        };

        Self {
            connection: connection.to_string(),
            driver,
            status,
        }
    }

    pub fn is_healthy(&self) -> bool {
        !matches!(self.status, HealthStatus::Unhealthy { .. })
    }
}

/// Health status enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    /// Connection answered normally
    Healthy { response_time: Duration },
    /// Connection answered, but slowly
    Warning { reason: String, response_time: Duration },
    /// Connection is not operational
    Unhealthy { reason: String },
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy { response_time } => write!(f, "HEALTHY ({:?})", response_time),
            HealthStatus::Warning { reason, .. } => write!(f, "WARNING: {}", reason),
            HealthStatus::Unhealthy { reason } => write!(f, "UNHEALTHY: {}", reason),
        }
    }
}
