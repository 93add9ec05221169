use crate::cancel::CancelToken;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Endpoint configuration for the OTLP/HTTP exporters.
#[derive(Debug, Clone)]
pub struct OtlpExporterOptions {
    pub endpoint: String,
    /// Extra headers added to every request (e.g. auth tokens).
    pub headers: Vec<(String, String)>,
}

impl OtlpExporterOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Blocking HTTP transport shared by the per-signal OTLP exporters.
///
/// Runs on the processor's dedicated export thread, so a blocking client is
/// the right shape; the request timeout is derived from the cancel token's
/// remaining time.
pub(crate) struct OtlpHttpClient {
    client: Client,
    endpoint: String,
    headers: Vec<(String, String)>,
}

impl OtlpHttpClient {
    pub(crate) fn new(options: OtlpExporterOptions) -> Self {
        Self {
            client: Client::new(),
            endpoint: options.endpoint,
            headers: options.headers,
        }
    }

    /// POSTs an encoded export request. `true` only for a 2xx response.
    pub(crate) fn send(&self, body: Vec<u8>, cancel: &CancelToken) -> bool {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .body(body);

        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        if let Some(remaining) = cancel.remaining() {
            if remaining.is_zero() {
                warn!(endpoint = %self.endpoint, "telemetry send cancelled before the request started");
                return false;
            }
            request = request.timeout(remaining);
        }

        match request.send() {
            Ok(response) if response.status().is_success() => {
                debug!(endpoint = %self.endpoint, "telemetry sent successfully");
                true
            }
            Ok(response) => {
                warn!(
                    endpoint = %self.endpoint,
                    status = %response.status(),
                    "error status returned sending telemetry"
                );
                false
            }
            Err(error) => {
                warn!(endpoint = %self.endpoint, %error, "failed to send telemetry");
                false
            }
        }
    }
}
