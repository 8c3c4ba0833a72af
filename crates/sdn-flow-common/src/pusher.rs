//! Controller transport for static flow entries.
//!
//! The [`FlowPusher`] trait is the seam between flow synthesis and the SDN
//! controller. [`StaticFlowClient`] implements it against the Floodlight
//! static flow pusher REST API: one JSON request per flow, `POST` to create
//! and `DELETE` to remove, with no pipelining.
//!
//! # Example
//!
//! ```ignore
//! use sdn_flow_common::pusher::{FlowPusher, StaticFlowClient};
//! use std::time::Duration;
//!
//! let client = StaticFlowClient::new("localhost", 8800, Duration::from_secs(10))?;
//! client.push(&rule.to_entry()).await?;
//! ```

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FlowMgrError, FlowMgrResult};
use crate::flow::{FlowDeletion, StaticFlowEntry};

/// Base path of the static flow pusher API.
pub const STATIC_FLOW_BASE_PATH: &str = "/wm/staticflowentrypusher";

/// Default controller port.
pub const DEFAULT_CONTROLLER_PORT: u16 = 8800;

/// Creates and deletes individual static flows on the controller.
#[async_trait]
pub trait FlowPusher: Send + Sync {
    /// Controller endpoint used in diagnostics.
    fn endpoint(&self) -> String;

    /// Creates (or overwrites) one static flow.
    async fn push(&self, entry: &StaticFlowEntry) -> FlowMgrResult<()>;

    /// Deletes one static flow by name.
    async fn remove(&self, deletion: &FlowDeletion) -> FlowMgrResult<()>;

    /// Lists the static flows installed on a switch.
    async fn list(&self, dpid: &str) -> FlowMgrResult<serde_json::Value>;
}

/// Status and body of a controller response.
#[derive(Debug, Clone)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase for the status.
    pub reason: String,
    /// Response body.
    pub body: String,
}

impl RestResponse {
    /// Returns true for any 2xx status.
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// REST client for the Floodlight static flow pusher.
#[derive(Debug, Clone)]
pub struct StaticFlowClient {
    client: reqwest::Client,
    server: String,
    port: u16,
    base_path: String,
}

impl StaticFlowClient {
    /// Creates a client with a bounded per-request timeout.
    pub fn new(server: impl Into<String>, port: u16, timeout: Duration) -> FlowMgrResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlowMgrError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server: server.into(),
            port,
            base_path: STATIC_FLOW_BASE_PATH.to_string(),
        })
    }

    /// Overrides the API base path.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into().trim_end_matches('/').to_string();
        self
    }

    fn flows_url(&self) -> String {
        format!("http://{}:{}{}/json", self.server, self.port, self.base_path)
    }

    fn list_url(&self, dpid: &str) -> String {
        format!(
            "http://{}:{}{}/list/{}/json",
            self.server, self.port, self.base_path, dpid
        )
    }

    async fn rest_call<B>(&self, method: Method, url: &str, body: Option<&B>) -> FlowMgrResult<RestResponse>
    where
        B: Serialize + ?Sized + Sync,
    {
        debug!(method = %method, url = %url, "Controller request");

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(method = %method, url = %url, error = %e, "Controller unreachable");
            FlowMgrError::Transport {
                method: method.to_string(),
                endpoint: self.endpoint(),
                status: None,
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        // An unreadable body does not change the outcome of the call.
        let body = response.text().await.unwrap_or_default();

        Ok(RestResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }

    async fn call_or_throw<B>(&self, method: Method, url: &str, body: Option<&B>) -> FlowMgrResult<RestResponse>
    where
        B: Serialize + ?Sized + Sync,
    {
        let response = self.rest_call(method.clone(), url, body).await?;
        if response.success() {
            Ok(response)
        } else {
            warn!(
                method = %method,
                status = response.status,
                reason = %response.reason,
                "Controller rejected request"
            );
            Err(FlowMgrError::http_status(
                method.as_str(),
                self.endpoint(),
                response.status,
                response.reason,
            ))
        }
    }
}

#[async_trait]
impl FlowPusher for StaticFlowClient {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    async fn push(&self, entry: &StaticFlowEntry) -> FlowMgrResult<()> {
        debug!(flow = %entry.name, switch = %entry.switch, "Pushing static flow");
        self.call_or_throw(Method::POST, &self.flows_url(), Some(entry))
            .await?;
        Ok(())
    }

    async fn remove(&self, deletion: &FlowDeletion) -> FlowMgrResult<()> {
        debug!(flow = %deletion.name, switch = %deletion.switch, "Deleting static flow");
        self.call_or_throw(Method::DELETE, &self.flows_url(), Some(deletion))
            .await?;
        Ok(())
    }

    async fn list(&self, dpid: &str) -> FlowMgrResult<serde_json::Value> {
        let url = self.list_url(dpid);
        let response = self
            .call_or_throw::<()>(Method::GET, &url, None)
            .await?;
        serde_json::from_str(&response.body).map_err(|e| FlowMgrError::Transport {
            method: "GET".to_string(),
            endpoint: self.endpoint(),
            status: Some(response.status),
            reason: format!("invalid JSON body: {}", e),
        })
    }
}
