//! Host-side network endpoint for the report relay protocol.
//!
//! Registers a [`ReportProtocolHandler`] with the iroh Router to handle
//! incoming `REPORT_ALPN` connections: an asynchronous accept loop, one
//! bidirectional stream per request, bounded by a per-request timeout.
//! Loss of the radio link only stops new peer traffic; the host's own
//! queue draining and backend syncing continue independently.

use std::sync::Arc;
use std::time::Duration;

use iroh::endpoint::Connection;
use iroh::protocol::{ProtocolHandler, Router};
use iroh::{Endpoint, EndpointAddr, SecretKey};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{ReportError, ReportResult};
use crate::mesh::protocol::REPORT_ALPN;
use crate::mesh::proxy::HostProxy;
use crate::ticket::{HostAddrBytes, HostTicket};

/// Protocol handler for the report relay protocol.
///
/// Registered with the Router to handle incoming REPORT_ALPN connections.
/// Each connection carries one request/response exchange.
#[derive(Clone)]
pub struct ReportProtocolHandler {
    proxy: Arc<HostProxy>,
    request_timeout: Duration,
    max_message_bytes: usize,
}

impl std::fmt::Debug for ReportProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportProtocolHandler")
            .field("proxy", &"<HostProxy>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ReportProtocolHandler {
    /// Create a handler serving the given proxy.
    pub fn new(proxy: Arc<HostProxy>, config: &SyncConfig) -> Self {
        Self {
            proxy,
            request_timeout: config.proxy_timeout,
            max_message_bytes: config.max_message_bytes,
        }
    }

    /// Get the ALPN identifier for this protocol
    pub const fn alpn() -> &'static [u8] {
        REPORT_ALPN
    }

    /// Handle one relay connection: read the request, serve it through the
    /// proxy under the per-request timeout, write the response.
    async fn handle_connection(
        connection: Connection,
        proxy: Arc<HostProxy>,
        request_timeout: Duration,
        max_message_bytes: usize,
    ) -> ReportResult<()> {
        let remote_id = connection.remote_id();
        debug!(?remote_id, "Handling relay connection");

        let (mut send, mut recv) = connection
            .accept_bi()
            .await
            .map_err(|e| ReportError::Network(format!("Failed to accept bi stream: {}", e)))?;

        let request_bytes = recv
            .read_to_end(max_message_bytes)
            .await
            .map_err(|e| ReportError::Network(format!("Failed to read request: {}", e)))?;

        // The request fails rather than blocking the host's foreground work.
        let response_bytes =
            tokio::time::timeout(request_timeout, proxy.handle(&request_bytes))
                .await
                .map_err(|_| {
                    ReportError::Timeout(format!(
                        "relay request exceeded {:?}",
                        request_timeout
                    ))
                })?;

        send.write_all(&response_bytes)
            .await
            .map_err(|e| ReportError::Network(format!("Failed to write response: {}", e)))?;
        send.finish()
            .map_err(|e| ReportError::Network(format!("Failed to finish stream: {}", e)))?;

        debug!(
            ?remote_id,
            response_size = response_bytes.len(),
            "Relay request handled"
        );
        Ok(())
    }
}

impl ProtocolHandler for ReportProtocolHandler {
    fn accept(
        &self,
        conn: Connection,
    ) -> impl std::future::Future<Output = Result<(), iroh::protocol::AcceptError>> + Send {
        let proxy = self.proxy.clone();
        let request_timeout = self.request_timeout;
        let max_message_bytes = self.max_message_bytes;

        async move {
            debug!(peer = %conn.remote_id(), "Router accepting relay connection");

            if let Err(e) =
                Self::handle_connection(conn, proxy, request_timeout, max_message_bytes).await
            {
                error!(error = ?e, "Failed to handle relay connection");
                return Err(iroh::protocol::AcceptError::from_err(e));
            }

            Ok(())
        }
    }
}

/// A bound host endpoint serving the relay protocol.
pub struct HostEndpoint {
    endpoint: Endpoint,
    router: Router,
    proxy: Arc<HostProxy>,
}

impl HostEndpoint {
    /// Bind an endpoint and start accepting relay connections.
    ///
    /// Passing a persisted `secret_key` keeps the host id (and any shared
    /// tickets) stable across restarts.
    pub async fn bind(
        proxy: Arc<HostProxy>,
        config: &SyncConfig,
        secret_key: Option<SecretKey>,
    ) -> ReportResult<Self> {
        let secret_key = secret_key.unwrap_or_else(|| SecretKey::generate(&mut rand::rng()));

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![REPORT_ALPN.to_vec()])
            .bind()
            .await
            .map_err(|e| ReportError::Network(format!("Failed to bind endpoint: {}", e)))?;

        let endpoint_id = endpoint.id();
        info!(%endpoint_id, group = %proxy.group(), "Host endpoint bound");

        let handler = ReportProtocolHandler::new(proxy.clone(), config);
        let router = Router::builder(endpoint.clone())
            .accept(REPORT_ALPN, handler)
            .spawn();

        Ok(Self {
            endpoint,
            router,
            proxy,
        })
    }

    /// This host's endpoint id (the public identifier peers connect to).
    pub fn endpoint_id(&self) -> iroh::EndpointId {
        self.endpoint.id()
    }

    /// This host's current addressing information.
    pub fn endpoint_addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    /// A reference to the underlying endpoint (peers dialing out reuse it).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The proxy this endpoint serves.
    pub fn proxy(&self) -> &Arc<HostProxy> {
        &self.proxy
    }

    /// A shareable ticket for joining this host's group.
    pub fn ticket(&self) -> ReportResult<HostTicket> {
        let addr = self.endpoint_addr();
        Ok(HostTicket::new(
            self.proxy.group(),
            HostAddrBytes::from_endpoint_addr(&addr),
        ))
    }

    /// Stop accepting peer connections and close the endpoint.
    pub async fn shutdown(self) {
        info!("Shutting down host endpoint");
        if let Err(e) = self.router.shutdown().await {
            warn!(error = ?e, "Failed to shutdown router cleanly");
        }
        self.endpoint.close().await;
    }
}
