//! HTTP write client for the InfluxDB v2 write API

use super::line_protocol::Precision;
use super::LineWriter;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

/// Write endpoint settings
#[derive(Debug, Clone)]
pub struct WriteClientConfig {
    /// Base address, e.g. https://localhost:8086
    pub addr: String,
    pub org: String,
    pub bucket: String,
    /// Sent as `Authorization: Token <token>` when set
    pub token: Option<String>,
    pub precision: Precision,
    /// Accept invalid or self-signed certificates.
    ///
    /// Needed for self-signed InfluxDB deployments; the connection is then
    /// open to interception.
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

/// Lazily connected write client
///
/// The session is built on the first write, reused afterwards, and dropped
/// by [`LineWriter::close`].
pub struct HttpWriteClient {
    config: WriteClientConfig,
    write_url: String,
    session: Option<Client>,
}

impl HttpWriteClient {
    pub fn new(config: WriteClientConfig) -> Result<Self> {
        let base = format!("{}/api/v2/write", config.addr.trim_end_matches('/'));
        let url = Url::parse_with_params(
            &base,
            &[
                ("org", config.org.as_str()),
                ("bucket", config.bucket.as_str()),
                ("precision", config.precision.as_str()),
            ],
        )
        .map_err(|e| AppError::Config(format!("Invalid write address '{}': {}", config.addr, e)))?;

        if config.skip_tls_verify {
            warn!("TLS certificate verification disabled for {}", config.addr);
        }

        Ok(Self {
            config,
            write_url: url.to_string(),
            session: None,
        })
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn session(&mut self) -> Result<&Client> {
        if self.session.is_none() {
            let client = Client::builder()
                .timeout(self.config.timeout)
                .danger_accept_invalid_certs(self.config.skip_tls_verify)
                .build()
                .map_err(|e| transport_error("Opening write session to", &self.config.addr, e))?;
            debug!("Opened write session to {}", self.config.addr);
            self.session = Some(client);
        }

        self.session
            .as_ref()
            .ok_or_else(|| AppError::Internal("write session missing".to_string()))
    }
}

#[async_trait]
impl LineWriter for HttpWriteClient {
    fn address(&self) -> &str {
        &self.write_url
    }

    async fn write(&mut self, body: String) -> Result<()> {
        let address = self.write_url.clone();
        let auth = self.config.token.as_ref().map(|t| format!("Token {}", t));

        let mut request = self
            .session()?
            .post(&address)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some(auth) = auth {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error("POST to", &address, e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            error!("POST to {} failed: {} - {}", address, status, body);
            return Err(AppError::WriteFailure {
                address,
                status,
                body,
            });
        }

        Ok(())
    }

    async fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("Closed write session to {}", self.config.addr);
        }
    }
}

/// Log a transport failure before it is absorbed by the worker
fn transport_error(action: &str, address: &str, e: reqwest::Error) -> AppError {
    error!("{} {} failed: {}", action, address, e);
    AppError::Transport(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::logs::CapturedLogs;
    use crate::test_support::mock_sink::MockSink;
    use crate::test_support::spawn_server;

    fn config(addr: String) -> WriteClientConfig {
        WriteClientConfig {
            addr,
            org: "acme corp".to_string(),
            bucket: "candles".to_string(),
            token: Some("s3cr3t".to_string()),
            precision: Precision::Us,
            skip_tls_verify: false,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_write_url_carries_routing_keys() {
        let client = HttpWriteClient::new(config("https://influx.local:8086/".to_string())).unwrap();
        assert_eq!(
            client.address(),
            "https://influx.local:8086/api/v2/write?org=acme+corp&bucket=candles&precision=us"
        );
    }

    #[test]
    fn test_invalid_address_is_config_error() {
        let result = HttpWriteClient::new(config("not a url".to_string()));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_successful_write() {
        // given
        let sink = MockSink::new();
        let base = spawn_server(sink.router()).await;
        let mut client = HttpWriteClient::new(config(base)).unwrap();
        assert!(!client.has_session());

        // when
        client.write("m,t=1 f=1 1".to_string()).await.unwrap();

        // then
        assert!(client.has_session());
        let writes = sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].body, "m,t=1 f=1 1");
        assert_eq!(writes[0].authorization.as_deref(), Some("Token s3cr3t"));
        assert_eq!(writes[0].query["org"], "acme corp");
        assert_eq!(writes[0].query["bucket"], "candles");
        assert_eq!(writes[0].query["precision"], "us");
    }

    #[tokio::test]
    async fn test_error_status_is_write_failure() {
        let sink = MockSink::new();
        sink.respond_with(400, "partial write: field type conflict");
        let base = spawn_server(sink.router()).await;
        let mut client = HttpWriteClient::new(config(base)).unwrap();

        let err = client.write("bad".to_string()).await.unwrap_err();

        match err {
            AppError::WriteFailure { address, status, body } => {
                assert!(address.ends_with("/api/v2/write?org=acme+corp&bucket=candles&precision=us"));
                assert_eq!(status, 400);
                assert_eq!(body, "partial write: field type conflict");
            }
            other => panic!("expected write failure, got {:?}", other),
        }
        // The session survives a failed write
        assert!(client.has_session());
    }

    #[tokio::test]
    async fn test_no_token_means_no_auth_header() {
        let sink = MockSink::new();
        let base = spawn_server(sink.router()).await;
        let mut cfg = config(base);
        cfg.token = None;
        let mut client = HttpWriteClient::new(cfg).unwrap();

        client.write("m f=1 1".to_string()).await.unwrap();
        assert_eq!(sink.writes()[0].authorization, None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (logs, _guard) = CapturedLogs::install();

        let mut client = HttpWriteClient::new(config(format!("http://{}", addr))).unwrap();
        let err = client.write("m f=1 1".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));

        // The worker does not log write-path errors, so the client must
        let errors = logs.errors();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains(&format!("POST to http://{}/api/v2/write", addr)));
    }

    #[tokio::test]
    async fn test_close_releases_session_and_reopens_on_demand() {
        let sink = MockSink::new();
        let base = spawn_server(sink.router()).await;
        let mut cfg = config(base);
        cfg.skip_tls_verify = true;
        let mut client = HttpWriteClient::new(cfg).unwrap();

        client.write("a f=1 1".to_string()).await.unwrap();
        client.close().await;
        assert!(!client.has_session());

        client.write("b f=1 2".to_string()).await.unwrap();
        assert!(client.has_session());
        assert_eq!(sink.writes().len(), 2);
    }
}
