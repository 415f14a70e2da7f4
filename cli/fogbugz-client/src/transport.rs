//! Delivery of API requests.

use std::str::FromStr;
use std::time::Duration;

use enum_dispatch::enum_dispatch;
use reqwest::header::{self, HeaderMap};
use tracing::{debug, trace};

use crate::command::ApiRequest;
use crate::config::FogbugzConfig;
use crate::error::FogbugzClientError;
use crate::mock::MockTransport;

/// Failure reported by a transport, passed through to the caller unchanged.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Sends an [ApiRequest] and returns the raw response body.
///
/// This trait enables alternate implementations:
/// - **HTTP**: form POST to the FogBugz API via [HttpTransport]
/// - **Mock**: canned bodies without HTTP via [MockTransport]
#[enum_dispatch]
#[allow(async_fn_in_trait)]
pub trait TransportTrait {
    async fn send(&self, request: ApiRequest) -> Result<String, TransportError>;
}

/// Either a real HTTP transport or a mock transport for testing.
#[derive(Debug)]
#[enum_dispatch(TransportTrait)]
pub enum Transport {
    Http(HttpTransport),
    Mock(MockTransport),
}

/// Transport backed by a [reqwest::Client].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &FogbugzConfig) -> Result<Self, FogbugzClientError> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    /// Use a preconfigured client, e.g. one with a proxy or custom TLS roots.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl TransportTrait for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<String, TransportError> {
        debug!(url = %request.url, cmd = request.cmd(), "sending FogBugz request");
        let response = self
            .client
            .post(request.url)
            .form(&request.form)
            .send()
            .await?
            .error_for_status()?;
        let status = response.status();
        let body = response.text().await?;
        trace!(%status, bytes = body.len(), "received FogBugz response");
        Ok(body)
    }
}

/// Build the HTTP client with default headers and timeouts.
fn build_http_client(config: &FogbugzConfig) -> Result<reqwest::Client, FogbugzClientError> {
    let mut headers = HeaderMap::new();

    for (key, value) in &config.extra_headers {
        headers.insert(
            header::HeaderName::from_str(key).map_err(
                |e: reqwest::header::InvalidHeaderName| FogbugzClientError::Other(e.to_string()),
            )?,
            header::HeaderValue::from_str(value).map_err(
                |e: reqwest::header::InvalidHeaderValue| FogbugzClientError::Other(e.to_string()),
            )?,
        );
    }

    debug!(
        host = %config.host,
        extra_headers = config.extra_headers.len(),
        "building FogBugz HTTP client"
    );

    let client_builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(60));

    let client_builder = if let Some(ref user_agent) = config.user_agent {
        client_builder.user_agent(user_agent)
    } else {
        client_builder
    };

    client_builder
        .build()
        .map_err(|e| FogbugzClientError::Other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use url::Url;

    use super::*;
    use crate::command::Command;

    fn config() -> FogbugzConfig {
        FogbugzConfig::new("example.fogbugz.com", "me@example.com", "pw")
    }

    fn endpoint(server: &MockServer) -> Url {
        Url::parse(&server.url("/api.asp")).unwrap()
    }

    #[tokio::test]
    async fn posts_form_and_returns_body() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api.asp")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_contains("cmd=search")
                .body_contains("q=project%3Afoo");
            then.status(200).body("<response></response>");
        });

        let transport = HttpTransport::new(&config()).unwrap();
        let request = Command::search("project:foo", None, None).into_request(&endpoint(&server));
        let body = transport.send(request).await.unwrap();

        assert_eq!(body, "<response></response>");
        mock.assert();
    }

    #[tokio::test]
    async fn extra_headers_and_user_agent_set_on_requests() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.header("x-fogbugz-test", "test-value")
                .header("user-agent", "my-custom-user-agent");
            then.status(200).body("<response></response>");
        });

        let mut config = config();
        config
            .extra_headers
            .insert("x-fogbugz-test".to_string(), "test-value".to_string());
        config.user_agent = Some("my-custom-user-agent".to_string());

        let transport = HttpTransport::new(&config).unwrap();
        let _ = transport
            .send(Command::logoff().into_request(&endpoint(&server)))
            .await;
        mock.assert();
    }

    #[tokio::test]
    async fn http_error_status_is_a_transport_error() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|_, then| {
            then.status(503).body("unavailable");
        });

        let transport = HttpTransport::new(&config()).unwrap();
        let err = transport
            .send(Command::logoff().into_request(&endpoint(&server)))
            .await
            .unwrap_err();

        let reqwest_err = err.downcast_ref::<reqwest::Error>().unwrap();
        assert_eq!(reqwest_err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        mock.assert();
    }

    #[test]
    fn invalid_extra_header_is_rejected() {
        let mut config = config();
        config
            .extra_headers
            .insert("not a header".to_string(), "value".to_string());
        assert!(matches!(
            HttpTransport::new(&config),
            Err(FogbugzClientError::Other(_))
        ));
    }
}
