//! Error types for flow provisioning operations.
//!
//! This module defines the error types used throughout the flow manager
//! crates. All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::flow::FlowRanges;

/// Result type alias for flow provisioning operations.
pub type FlowMgrResult<T> = Result<T, FlowMgrError>;

/// Errors that can occur while provisioning static flows.
#[derive(Debug, Error)]
pub enum FlowMgrError {
    /// Static topology or daemon configuration is malformed.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message, including the parse position when known.
        message: String,
    },

    /// A configuration or record file could not be read.
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        /// The file that failed to load.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Port groups span more than one switch.
    #[error("Topology spans {switches} switches; interconnection across more than one switch is unsupported")]
    Topology {
        /// Number of switch groups presented.
        switches: usize,
    },

    /// A controller call failed, either with a non-success status or
    /// before any response was received.
    #[error("HTTP {method} over '{endpoint}' failed: {}", describe_status(*status, reason))]
    Transport {
        /// HTTP method of the failed call.
        method: String,
        /// Controller endpoint (`host:port`).
        endpoint: String,
        /// HTTP status code, absent for network and timeout failures.
        status: Option<u16>,
        /// Reason phrase or transport error text.
        reason: String,
    },

    /// A port's device-identity, profile or vif-details payload could not
    /// be decoded.
    #[error("Malformed payload on port '{port_id}': {message}")]
    MalformedPayload {
        /// The affected port.
        port_id: String,
        /// Error message.
        message: String,
    },

    /// The port being bound or deleted is unknown to the control plane.
    #[error("Port '{port_id}' not found")]
    PortNotFound {
        /// The port identifier.
        port_id: String,
    },

    /// A synthesis or retirement batch stopped at its first failure.
    ///
    /// Work completed before the failure is left in place.
    #[error("Flow batch aborted after {completed} operations: {source}")]
    BatchAborted {
        /// Number of flows created or deleted before the failure.
        completed: usize,
        /// Per-switch index ranges of created flows.
        ranges: FlowRanges,
        /// The failure that stopped the batch.
        #[source]
        source: Box<FlowMgrError>,
    },
}

fn describe_status(status: Option<u16>, reason: &str) -> String {
    match status {
        Some(code) => format!("returned {}: {}", code, reason),
        None => reason.to_string(),
    }
}

impl FlowMgrError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an IO error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a malformed payload error.
    pub fn malformed(port_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            port_id: port_id.into(),
            message: message.into(),
        }
    }

    /// Creates a port not found error.
    pub fn port_not_found(port_id: impl Into<String>) -> Self {
        Self::PortNotFound {
            port_id: port_id.into(),
        }
    }

    /// Creates a transport error carrying an HTTP status.
    pub fn http_status(
        method: impl Into<String>,
        endpoint: impl Into<String>,
        status: u16,
        reason: impl Into<String>,
    ) -> Self {
        Self::Transport {
            method: method.into(),
            endpoint: endpoint.into(),
            status: Some(status),
            reason: reason.into(),
        }
    }

    /// Wraps a failure that stopped a batch.
    pub fn aborted(completed: usize, ranges: FlowRanges, source: FlowMgrError) -> Self {
        Self::BatchAborted {
            completed,
            ranges,
            source: Box::new(source),
        }
    }

    /// Returns true if re-running the whole bind or delete event may succeed.
    ///
    /// Configuration and topology errors never clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowMgrError::Transport { .. } | FlowMgrError::PortNotFound { .. } => true,
            FlowMgrError::BatchAborted { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Number of operations completed before the failure, if the error
    /// came out of a batch.
    pub fn completed(&self) -> Option<usize> {
        match self {
            FlowMgrError::BatchAborted { completed, .. } => Some(*completed),
            _ => None,
        }
    }
}
