//! Wire messages for the procedures the client calls directly.
//!
//! Everything else the platform exposes is reached through
//! `ServiceClient::call` with caller-supplied message types.

pub mod authentication;

pub use authentication::{
    ClientCredentials, GetRequest, GetResponse, LoginMethod, LoginRequest, LoginResponse,
    LogoutRequest, LogoutResponse, RefreshTokenRequest, RefreshTokenResponse, Token,
    UserIdentifier, UserInfo, UserPassword,
};
