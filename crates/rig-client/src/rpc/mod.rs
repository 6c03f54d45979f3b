//! Connect-style RPC plumbing.
//!
//! This module provides the `RpcClient` that sends unary and streaming
//! calls, and the `Interceptor` hook that sees every call before it leaves.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod spec;
pub mod stream;

pub use client::RpcClient;
pub use error::{Code, RpcError};
pub use interceptor::{Interceptor, InterceptorChain, UnaryRequest};
pub use spec::{Spec, StreamType};
pub use stream::{StreamResponse, StreamingClientConn, StreamingHandlerConn};
