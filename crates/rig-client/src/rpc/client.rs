//! Connect-protocol RPC client over `reqwest`.
//!
//! Unary calls are JSON `POST {host}{procedure}` requests. Streaming calls
//! carry envelope-framed JSON (see [`super::stream`]). Every call passes
//! through the configured [`InterceptorChain`] before it is sent.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::interceptor::{InterceptorChain, UnaryRequest};
use super::stream::{StreamingClientConn, StreamingHandlerConn};
use super::{RpcError, Spec, StreamType};
use crate::config::REQUEST_TIMEOUT_SECS;

const CONTENT_TYPE_JSON: &str = "application/json";

const PROTOCOL_VERSION_HEADER: HeaderName = HeaderName::from_static("connect-protocol-version");

/// RPC client bound to one host.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    host: String,
    interceptors: InterceptorChain,
    unary_timeout: Duration,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, host: impl Into<String>) -> Self {
        Self::with_interceptors(http, host, InterceptorChain::default())
    }

    pub fn with_interceptors(
        http: reqwest::Client,
        host: impl Into<String>,
        interceptors: InterceptorChain,
    ) -> Self {
        Self {
            http,
            host: host.into().trim_end_matches('/').to_string(),
            interceptors,
            unary_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Deadline for each unary call. Streams have none and rely on the
    /// transport's keep-alive instead.
    pub fn with_unary_timeout(mut self, timeout: Duration) -> Self {
        self.unary_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    fn url(&self, procedure: &str) -> String {
        format!("{}{}", self.host, procedure)
    }

    /// Perform a unary call.
    pub async fn unary<Req, Res>(&self, procedure: &str, message: &Req) -> Result<Res, RpcError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(message).map_err(RpcError::Encode)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_JSON),
        );
        headers.insert(PROTOCOL_VERSION_HEADER, HeaderValue::from_static("1"));

        let mut request = UnaryRequest::new(Spec::unary(procedure), headers, body);
        self.interceptors.unary(&mut request).await?;
        let (spec, headers, body) = request.into_parts();

        debug!(procedure = %spec.procedure, "Sending unary request");

        let response = self
            .http
            .post(self.url(&spec.procedure))
            .timeout(self.unary_timeout)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(procedure = %spec.procedure, status = %status, "Unary request failed");
            return Err(RpcError::from_status(status, &body));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(RpcError::Decode)
    }

    /// Open an outgoing stream. Interceptors have already run on the
    /// returned connection.
    pub async fn stream(
        &self,
        procedure: &str,
        stream_type: StreamType,
    ) -> Result<StreamingClientConn, RpcError> {
        let spec = Spec::new(procedure, stream_type);
        let url = self.url(&spec.procedure);
        let mut conn = StreamingClientConn::new(spec, url, self.http.clone());
        self.interceptors.streaming_client(&mut conn).await?;
        Ok(conn)
    }

    /// Run the interceptor chain on an incoming stream, then hand it to
    /// `handler`.
    pub async fn handle_stream<F, Fut, T>(
        &self,
        mut conn: StreamingHandlerConn,
        handler: F,
    ) -> Result<T, RpcError>
    where
        F: FnOnce(StreamingHandlerConn) -> Fut,
        Fut: std::future::Future<Output = Result<T, RpcError>>,
    {
        self.interceptors.streaming_handler(&mut conn).await?;
        handler(conn).await
    }
}
