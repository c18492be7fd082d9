//! Peer-side client for the report relay protocol.
//!
//! One request/response exchange per connection: connect to the host with
//! the relay ALPN, open a bidirectional stream, write the request, read the
//! response. Every network step runs under the configured request timeout
//! so a dead radio link fails the attempt instead of hanging the router.

use std::time::Duration;

use async_trait::async_trait;
use iroh::{Endpoint, EndpointAddr};
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{ReportError, ReportResult};
use crate::mesh::protocol::{
    MeshRequest, MeshResponse, MeshWireRequest, MeshWireResponse, REPORT_ALPN,
};
use crate::ticket::HostTicket;
use crate::types::report::{NewReport, Report, StatusEvent};
use crate::types::ReportRef;

/// How a device reaches its group host.
///
/// [`MeshHostClient`] is the iroh-backed implementation; tests drive the
/// proxy in-process through the same trait.
#[async_trait]
pub trait HostGateway: Send + Sync {
    /// Submit a report through the host.
    async fn submit_report(&self, payload: NewReport) -> ReportResult<Report>;

    /// Relay a status transition through the host.
    async fn update_status(&self, target: ReportRef, event: StatusEvent) -> ReportResult<Report>;

    /// Fetch the host's view of the group's reports.
    async fn list_reports(&self) -> ReportResult<Vec<Report>>;
}

/// iroh-backed client for a group host.
pub struct MeshHostClient {
    endpoint: Endpoint,
    host_addr: EndpointAddr,
    request_timeout: Duration,
    max_message_bytes: usize,
}

impl MeshHostClient {
    /// Create a client dialing the given host address over an existing
    /// endpoint.
    pub fn new(endpoint: Endpoint, host_addr: EndpointAddr, config: &SyncConfig) -> Self {
        Self {
            endpoint,
            host_addr,
            request_timeout: config.request_timeout,
            max_message_bytes: config.max_message_bytes,
        }
    }

    /// Create a client from a shared host ticket.
    pub fn from_ticket(
        endpoint: Endpoint,
        ticket: &HostTicket,
        config: &SyncConfig,
    ) -> ReportResult<Self> {
        Ok(Self::new(endpoint, ticket.host.to_endpoint_addr()?, config))
    }

    /// Perform one request/response exchange with the host.
    async fn request(&self, request: MeshRequest) -> ReportResult<MeshResponse> {
        let label = request.label();
        let bytes = MeshWireRequest::new(request)
            .encode()
            .map_err(|e| ReportError::Serialization(e.to_string()))?;

        let exchange = async {
            let connection = self
                .endpoint
                .connect(self.host_addr.clone(), REPORT_ALPN)
                .await
                .map_err(|e| ReportError::Network(format!("Failed to connect to host: {}", e)))?;

            let (mut send, mut recv) = connection
                .open_bi()
                .await
                .map_err(|e| ReportError::Network(format!("Failed to open bi stream: {}", e)))?;

            send.write_all(&bytes)
                .await
                .map_err(|e| ReportError::Network(format!("Failed to send request: {}", e)))?;
            send.finish()
                .map_err(|e| ReportError::Network(format!("Failed to finish send stream: {}", e)))?;

            let response_bytes = recv
                .read_to_end(self.max_message_bytes)
                .await
                .map_err(|e| ReportError::Network(format!("Failed to read response: {}", e)))?;

            MeshWireResponse::decode(&response_bytes)
                .map(MeshWireResponse::into_inner)
                .map_err(|e| ReportError::Serialization(format!("Invalid host response: {}", e)))
        };

        let response = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| {
                ReportError::Timeout(format!(
                    "host {} exchange exceeded {:?}",
                    label, self.request_timeout
                ))
            })??;

        debug!(request = label, "Host exchange complete");
        Ok(response)
    }

    fn expect_report(response: MeshResponse) -> ReportResult<Report> {
        match response {
            MeshResponse::Report { report } => Ok(report),
            MeshResponse::Error { message } => Err(ReportError::Network(message)),
            MeshResponse::Reports { .. } => Err(ReportError::Serialization(
                "unexpected list response".to_string(),
            )),
        }
    }
}

#[async_trait]
impl HostGateway for MeshHostClient {
    async fn submit_report(&self, payload: NewReport) -> ReportResult<Report> {
        let response = self.request(MeshRequest::SubmitReport { payload }).await?;
        Self::expect_report(response)
    }

    async fn update_status(&self, target: ReportRef, event: StatusEvent) -> ReportResult<Report> {
        let response = self.request(MeshRequest::UpdateStatus { target, event }).await?;
        Self::expect_report(response)
    }

    async fn list_reports(&self) -> ReportResult<Vec<Report>> {
        match self.request(MeshRequest::ListReports).await? {
            MeshResponse::Reports { reports } => Ok(reports),
            MeshResponse::Error { message } => Err(ReportError::Network(message)),
            MeshResponse::Report { .. } => Err(ReportError::Serialization(
                "unexpected single-report response".to_string(),
            )),
        }
    }
}

/// In-process gateway driving a [`HostProxy`](crate::mesh::proxy::HostProxy)
/// directly, exercising the full wire encode/decode path without a network.
pub struct LoopbackHostGateway {
    proxy: std::sync::Arc<crate::mesh::proxy::HostProxy>,
}

impl LoopbackHostGateway {
    /// Wrap a proxy.
    pub fn new(proxy: std::sync::Arc<crate::mesh::proxy::HostProxy>) -> Self {
        Self { proxy }
    }

    async fn request(&self, request: MeshRequest) -> ReportResult<MeshResponse> {
        let bytes = MeshWireRequest::new(request)
            .encode()
            .map_err(|e| ReportError::Serialization(e.to_string()))?;
        let response_bytes = self.proxy.handle(&bytes).await;
        MeshWireResponse::decode(&response_bytes)
            .map(MeshWireResponse::into_inner)
            .map_err(|e| ReportError::Serialization(format!("Invalid proxy response: {}", e)))
    }
}

#[async_trait]
impl HostGateway for LoopbackHostGateway {
    async fn submit_report(&self, payload: NewReport) -> ReportResult<Report> {
        let response = self.request(MeshRequest::SubmitReport { payload }).await?;
        MeshHostClient::expect_report(response)
    }

    async fn update_status(&self, target: ReportRef, event: StatusEvent) -> ReportResult<Report> {
        let response = self.request(MeshRequest::UpdateStatus { target, event }).await?;
        MeshHostClient::expect_report(response)
    }

    async fn list_reports(&self) -> ReportResult<Vec<Report>> {
        match self.request(MeshRequest::ListReports).await? {
            MeshResponse::Reports { reports } => Ok(reports),
            MeshResponse::Error { message } => Err(ReportError::Network(message)),
            MeshResponse::Report { .. } => Err(ReportError::Serialization(
                "unexpected single-report response".to_string(),
            )),
        }
    }
}
