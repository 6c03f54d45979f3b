//! Interceptor that keeps every outgoing call authenticated.
//!
//! Before a call leaves, [`AuthInterceptor::ensure_authorized`]:
//!
//! 1. skips procedures that need no session (login, registration, ...);
//! 2. logs in with the configured credential if the store is empty;
//! 3. refreshes the access token if it expires within the margin;
//! 4. sets `authorization: Bearer <access token>`.
//!
//! Failed exchanges are logged and otherwise ignored. The call is always
//! forwarded and the server decides whether to accept it.
//!
//! Concurrent calls are not coordinated: two calls that both see an expiring
//! token both refresh, and the store keeps whichever pair is written last.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, trace, warn};

use super::claims::AccessClaims;
use super::credentials::Credential;
use super::resolver::CredentialResolver;
use super::session::SessionStore;
use crate::procedures;
use crate::rpc::{Interceptor, RpcError, StreamingClientConn, StreamingHandlerConn, UnaryRequest};

/// Lead time before expiry at which a token is refreshed.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 30;

/// When to refresh an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Tokens expiring at or before `now + margin` are refreshed.
    pub margin: Duration,
    /// Refresh tokens that decode but carry no `exp` claim.
    pub refresh_without_expiry: bool,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            refresh_without_expiry: true,
        }
    }
}

pub struct AuthInterceptor {
    store: Arc<dyn SessionStore>,
    credential: Option<Credential>,
    resolver: CredentialResolver,
    policy: RefreshPolicy,
}

impl AuthInterceptor {
    pub fn new(
        store: Arc<dyn SessionStore>,
        credential: Option<Credential>,
        resolver: CredentialResolver,
    ) -> Self {
        Self {
            store,
            credential,
            resolver,
            policy: RefreshPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Make sure `headers` carry the current access token for `procedure`,
    /// logging in or refreshing first if needed. Never fails.
    pub async fn ensure_authorized(&self, procedure: &str, headers: &mut HeaderMap) {
        if !procedures::requires_auth(procedure) {
            trace!(procedure = %procedure, "Procedure is exempt from auth");
            return;
        }

        self.login_if_needed(procedure).await;
        self.refresh_if_expiring(procedure).await;

        let access_token = self.store.access_token();
        match HeaderValue::from_str(&format!("Bearer {}", access_token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
            Err(_) => {
                warn!(procedure = %procedure, "Access token is not a valid header value");
            }
        }
    }

    async fn login_if_needed(&self, procedure: &str) {
        if !self.store.access_token().is_empty() {
            return;
        }
        let Some(credential) = &self.credential else {
            return;
        };

        match self.resolver.exchange_credential(credential).await {
            Ok(tokens) => {
                debug!(procedure = %procedure, store = self.store.name(), "Logged in with configured credential");
                self.store
                    .set_tokens(&tokens.access_token, &tokens.refresh_token);
            }
            Err(e) => {
                warn!(procedure = %procedure, error = %e, "Credential exchange failed");
            }
        }
    }

    async fn refresh_if_expiring(&self, procedure: &str) {
        let claims = match AccessClaims::decode_unverified(&self.store.access_token()) {
            Ok(claims) => claims,
            Err(e) => {
                trace!(procedure = %procedure, error = %e, "Cannot read token expiry, skipping refresh");
                return;
            }
        };

        let expiring = claims
            .expires_within(self.policy.margin, Utc::now())
            .unwrap_or(self.policy.refresh_without_expiry);
        if !expiring {
            return;
        }

        debug!(procedure = %procedure, expires_at = ?claims.expires_at(), "Access token expiring, refreshing");
        match self
            .resolver
            .exchange_refresh_token(&self.store.refresh_token())
            .await
        {
            Ok(tokens) => {
                self.store
                    .set_tokens(&tokens.access_token, &tokens.refresh_token);
            }
            Err(e) => {
                warn!(procedure = %procedure, error = %e, "Token refresh failed");
            }
        }
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    async fn intercept_unary(&self, request: &mut UnaryRequest) -> Result<(), RpcError> {
        let procedure = request.spec().procedure.clone();
        self.ensure_authorized(&procedure, request.headers_mut()).await;
        Ok(())
    }

    async fn intercept_streaming_client(
        &self,
        conn: &mut StreamingClientConn,
    ) -> Result<(), RpcError> {
        let procedure = conn.spec().procedure.clone();
        self.ensure_authorized(&procedure, conn.request_headers_mut())
            .await;
        Ok(())
    }

    async fn intercept_streaming_handler(
        &self,
        conn: &mut StreamingHandlerConn,
    ) -> Result<(), RpcError> {
        let procedure = conn.spec().procedure.clone();
        self.ensure_authorized(&procedure, conn.request_headers_mut())
            .await;
        Ok(())
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("store", &self.store.name())
            .field("credential", &self.credential)
            .field("policy", &self.policy)
            .finish()
    }
}
