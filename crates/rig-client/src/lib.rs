//! Rust client for the Rig platform APIs.
//!
//! The client keeps a session for you: it logs in with a configured
//! credential when no session exists, refreshes the access token shortly
//! before it expires, and attaches `Authorization: Bearer <token>` to every
//! call that needs it.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), rig_client::RpcError> {
//! let client = rig_client::Client::builder()
//!     .host("https://rig.example.com")
//!     .client_credentials("my-client-id", "my-client-secret")
//!     .build()?;
//!
//! let me = client.authentication().get().await?;
//! println!("{:?}", me.user_info);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod models;
pub mod procedures;
pub mod rpc;

pub use auth::{
    Credential, FileSessionStore, KeyringSessionStore, MemorySessionStore, RefreshPolicy,
    SessionStore, TokenPair,
};
pub use client::{AuthenticationClient, Client, ClientBuilder, ServiceClient};
pub use config::ClientConfig;
pub use rpc::{Code, Interceptor, RpcError};
