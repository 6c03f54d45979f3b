use tracing::debug;

use super::credentials::Credential;
use super::session::TokenPair;
use crate::models::{LoginResponse, RefreshTokenRequest, RefreshTokenResponse, Token};
use crate::procedures;
use crate::rpc::{RpcClient, RpcError};

/// Obtains token pairs from the authentication service.
///
/// Its RPC client carries no interceptors: these calls bootstrap
/// authentication and must not pass back through the auth interceptor.
#[derive(Clone, Debug)]
pub struct CredentialResolver {
    rpc: RpcClient,
}

impl CredentialResolver {
    pub fn new(http: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(http, host),
        }
    }

    /// Exchange a long-lived credential for a token pair via `Login`.
    pub async fn exchange_credential(&self, credential: &Credential) -> Result<TokenPair, RpcError> {
        debug!(credential = ?credential, "Exchanging credential for token pair");
        let response: LoginResponse = self
            .rpc
            .unary(procedures::LOGIN, &credential.to_login_request())
            .await?;
        Self::token_pair(response.token)
    }

    /// Exchange a refresh token for a renewed pair via `RefreshToken`.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenPair, RpcError> {
        debug!("Exchanging refresh token for token pair");
        let request = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response: RefreshTokenResponse =
            self.rpc.unary(procedures::REFRESH_TOKEN, &request).await?;
        Self::token_pair(response.token)
    }

    fn token_pair(token: Option<Token>) -> Result<TokenPair, RpcError> {
        match token {
            Some(token) if !token.access_token.is_empty() => Ok(token.into()),
            _ => Err(RpcError::InvalidResponse(
                "response carries no access token".to_string(),
            )),
        }
    }
}
