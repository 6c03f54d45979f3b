use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::stream::{StreamingClientConn, StreamingHandlerConn};
use super::{RpcError, Spec};

/// Outgoing unary call as seen by interceptors.
#[derive(Debug)]
pub struct UnaryRequest {
    spec: Spec,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl UnaryRequest {
    pub fn new(spec: Spec, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            spec,
            headers,
            body,
        }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_parts(self) -> (Spec, HeaderMap, Vec<u8>) {
        (self.spec, self.headers, self.body)
    }
}

/// Hook run on every call before any data is sent.
///
/// One method per call shape. The defaults pass the call through untouched,
/// so an interceptor only overrides the shapes it cares about. Returning an
/// error aborts the call.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept_unary(&self, _request: &mut UnaryRequest) -> Result<(), RpcError> {
        Ok(())
    }

    async fn intercept_streaming_client(
        &self,
        _conn: &mut StreamingClientConn,
    ) -> Result<(), RpcError> {
        Ok(())
    }

    async fn intercept_streaming_handler(
        &self,
        _conn: &mut StreamingHandlerConn,
    ) -> Result<(), RpcError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Interceptor + ?Sized> Interceptor for Arc<T> {
    async fn intercept_unary(&self, request: &mut UnaryRequest) -> Result<(), RpcError> {
        (**self).intercept_unary(request).await
    }

    async fn intercept_streaming_client(
        &self,
        conn: &mut StreamingClientConn,
    ) -> Result<(), RpcError> {
        (**self).intercept_streaming_client(conn).await
    }

    async fn intercept_streaming_handler(
        &self,
        conn: &mut StreamingHandlerConn,
    ) -> Result<(), RpcError> {
        (**self).intercept_streaming_handler(conn).await
    }
}

/// Ordered interceptor list; runs front to back.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub(crate) async fn unary(&self, request: &mut UnaryRequest) -> Result<(), RpcError> {
        for interceptor in &self.interceptors {
            interceptor.intercept_unary(request).await?;
        }
        Ok(())
    }

    pub(crate) async fn streaming_client(
        &self,
        conn: &mut StreamingClientConn,
    ) -> Result<(), RpcError> {
        for interceptor in &self.interceptors {
            interceptor.intercept_streaming_client(conn).await?;
        }
        Ok(())
    }

    pub(crate) async fn streaming_handler(
        &self,
        conn: &mut StreamingHandlerConn,
    ) -> Result<(), RpcError> {
        for interceptor in &self.interceptors {
            interceptor.intercept_streaming_handler(conn).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}
