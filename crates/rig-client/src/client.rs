//! Entry point for talking to the Rig APIs.
//!
//! [`Client`] owns one interceptor chain shared by every service accessor:
//! the auth interceptor first, then any caller-supplied interceptors.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::auth::{
    AuthInterceptor, Credential, CredentialResolver, MemorySessionStore, RefreshPolicy,
    SessionStore, TokenPair,
};
use crate::config::ClientConfig;
use crate::models::{
    GetRequest, GetResponse, LoginRequest, LoginResponse, LogoutRequest, LogoutResponse,
    RefreshTokenRequest, RefreshTokenResponse,
};
use crate::procedures;
use crate::rpc::{
    Interceptor, InterceptorChain, RpcClient, RpcError, Spec, StreamType, StreamingClientConn,
};

/// Builder for [`Client`]. Starts from [`ClientConfig::from_env`].
pub struct ClientBuilder {
    config: ClientConfig,
    session_store: Option<Arc<dyn SessionStore>>,
    http_client: Option<reqwest::Client>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    refresh_policy: RefreshPolicy,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::from_config(ClientConfig::from_env())
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit configuration, ignoring the environment.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            session_store: None,
            http_client: None,
            interceptors: Vec::new(),
            refresh_policy: RefreshPolicy::default(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Log in with OAuth2 client credentials when no session exists.
    pub fn client_credentials(
        self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.credential(Credential::client_credentials(client_id, client_secret))
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.config.credential = Some(credential);
        self
    }

    /// Keep tokens somewhere other than memory, e.g. a
    /// [`crate::auth::FileSessionStore`].
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Use a caller-supplied transport instead of the default one.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Interceptors run after the auth interceptor, in the given order.
    pub fn interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    pub fn build(self) -> Result<Client, RpcError> {
        let http = match self.http_client {
            Some(client) => client,
            None => self.config.build_http_client()?,
        };
        let store = self
            .session_store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));

        debug!(
            host = %self.config.host,
            store = store.name(),
            credential = self.config.credential.is_some(),
            "Building Rig client"
        );

        let resolver = CredentialResolver::new(http.clone(), self.config.host.clone());
        let auth = AuthInterceptor::new(store.clone(), self.config.credential, resolver)
            .with_policy(self.refresh_policy);

        let auth: Arc<dyn Interceptor> = Arc::new(auth);
        let mut chain = vec![auth];
        chain.extend(self.interceptors);

        Ok(Client {
            store,
            rpc: RpcClient::with_interceptors(http, self.config.host, InterceptorChain::new(chain)),
        })
    }
}

/// Client for the Rig APIs.
/// Clone is cheap and clones share the session.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn SessionStore>,
    rpc: RpcClient,
}

impl Client {
    /// Client configured from the environment.
    pub fn new() -> Result<Self, RpcError> {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Replace the session's access/refresh pair, e.g. after logging in
    /// out-of-band. Expiring tokens are refreshed on later calls.
    pub fn set_access_token(&self, access_token: &str, refresh_token: &str) {
        self.store.set_tokens(access_token, refresh_token);
    }

    pub fn tokens(&self) -> TokenPair {
        self.store.tokens()
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn host(&self) -> &str {
        self.rpc.host()
    }

    /// Underlying RPC client with the full interceptor chain.
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    fn service(&self, name: &'static str) -> ServiceClient {
        ServiceClient {
            service: name,
            rpc: self.rpc.clone(),
        }
    }

    /// Logging in, registering users and managing the current session.
    pub fn authentication(&self) -> AuthenticationClient {
        AuthenticationClient {
            inner: self.service(procedures::AUTHENTICATION_SERVICE),
        }
    }

    pub fn user(&self) -> ServiceClient {
        self.service("api.v1.user.Service")
    }

    /// OAuth2 service accounts.
    pub fn service_account(&self) -> ServiceClient {
        self.service("api.v1.service_account.Service")
    }

    pub fn group(&self) -> ServiceClient {
        self.service("api.v1.group.Service")
    }

    pub fn capsule(&self) -> ServiceClient {
        self.service("api.v1.capsule.Service")
    }

    pub fn project(&self) -> ServiceClient {
        self.service("api.v1.project.Service")
    }

    pub fn cluster(&self) -> ServiceClient {
        self.service("api.v1.cluster.Service")
    }

    pub fn image(&self) -> ServiceClient {
        self.service("api.v1.image.Service")
    }

    pub fn environment(&self) -> ServiceClient {
        self.service("api.v1.environment.Service")
    }

    pub fn role(&self) -> ServiceClient {
        self.service("api.v1.role.Service")
    }

    pub fn settings(&self) -> ServiceClient {
        self.service("api.v1.settings.Service")
    }

    pub fn metrics(&self) -> ServiceClient {
        self.service("api.v1.metrics.Service")
    }

    pub fn activity(&self) -> ServiceClient {
        self.service("api.v1.activity.Service")
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.rpc.host())
            .field("store", &self.store.name())
            .finish()
    }
}

/// Calls into one service, e.g. `api.v1.user.Service`.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    service: &'static str,
    rpc: RpcClient,
}

impl ServiceClient {
    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn procedure(&self, method: &str) -> String {
        Spec::procedure_path(self.service, method)
    }

    /// Unary call to `method` of this service.
    pub async fn call<Req, Res>(&self, method: &str, request: &Req) -> Result<Res, RpcError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.rpc.unary(&self.procedure(method), request).await
    }

    /// Open a stream to `method` of this service.
    pub async fn stream(
        &self,
        method: &str,
        stream_type: StreamType,
    ) -> Result<StreamingClientConn, RpcError> {
        self.rpc.stream(&self.procedure(method), stream_type).await
    }
}

/// Authentication service with typed calls for the session procedures.
#[derive(Clone, Debug)]
pub struct AuthenticationClient {
    inner: ServiceClient,
}

impl AuthenticationClient {
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, RpcError> {
        self.inner.call("Login", request).await
    }

    pub async fn refresh_token(
        &self,
        request: &RefreshTokenRequest,
    ) -> Result<RefreshTokenResponse, RpcError> {
        self.inner.call("RefreshToken", request).await
    }

    /// The user behind the current session.
    pub async fn get(&self) -> Result<GetResponse, RpcError> {
        self.inner.call("Get", &GetRequest {}).await
    }

    pub async fn logout(&self) -> Result<LogoutResponse, RpcError> {
        self.inner.call("Logout", &LogoutRequest {}).await
    }

    /// Any other method of the authentication service.
    pub async fn call<Req, Res>(&self, method: &str, request: &Req) -> Result<Res, RpcError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.inner.call(method, request).await
    }
}
