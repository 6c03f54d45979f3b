//! Authentication module for keeping calls authorized.
//!
//! This module provides:
//! - `SessionStore`: where the current access/refresh pair lives, with
//!   in-memory, file and OS keychain implementations
//! - `Credential`: the long-lived secret used for the first login
//! - `CredentialResolver`: exchanges credentials and refresh tokens for pairs
//! - `AuthInterceptor`: stamps a fresh bearer token onto every call
//!
//! Access tokens are refreshed 30 seconds before they expire.

pub mod claims;
pub mod credentials;
pub mod interceptor;
pub mod keychain;
pub mod resolver;
pub mod session;

pub use claims::{AccessClaims, ClaimsError};
pub use credentials::Credential;
pub use interceptor::{AuthInterceptor, RefreshPolicy, DEFAULT_REFRESH_MARGIN_SECS};
pub use keychain::KeyringSessionStore;
pub use resolver::CredentialResolver;
pub use session::{FileSessionStore, MemorySessionStore, SessionStore, TokenPair};
